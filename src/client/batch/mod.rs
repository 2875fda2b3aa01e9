//! # Batch Ingestion Queue
//!
//! Turns a set of captured images into a sequential Add-Item workflow. The
//! queue and its cursor are persisted after every step so an interrupted
//! batch resumes where it stopped.
//!
//! Items are processed strictly one at a time: an ingestion claims the
//! current entry before creating it, a second ingestion is refused while the
//! claim is held, and the cursor advances only after the entry has been
//! created through the service layer. Cancelling drops the remaining
//! entries; items already created stay.

use crate::client::capture::{Cart, CartItem, ItemDraft};
use crate::client::local_db::{self, KeyValueStore, StorageError};
use crate::client::offline::{Confirmation, EntityService, ServiceError, WriteReceipt};
use crate::shared::wardrobe::{NewItem, WardrobeItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const BATCH_KEY: &str = "batch.queue";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("no batch in progress")]
    NoActiveBatch,
    #[error("batch entry {got} is not the current entry {expected}")]
    NotCurrent { expected: String, got: String },
    #[error("batch entry {id} is already being saved")]
    InProgress { id: String },
    #[error(transparent)]
    Ingest(#[from] ServiceError),
}

/// Ordered entries plus the cursor of the next one to process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQueue {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub entries: Vec<CartItem>,
    pub cursor: usize,
    /// Completed entries are also removed from the cart
    pub from_cart: bool,
    pub started_at: DateTime<Utc>,
    /// The current entry is being saved
    #[serde(skip)]
    pub claimed: bool,
}

impl BatchQueue {
    pub fn new(entries: Vec<CartItem>, from_cart: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries,
            cursor: 0,
            from_cart,
            started_at: Utc::now(),
            claimed: false,
        }
    }

    pub fn current(&self) -> Option<&CartItem> {
        self.entries.get(self.cursor)
    }

    pub fn remaining(&self) -> usize {
        self.entries.len().saturating_sub(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current().is_none()
    }

    /// Advance past `id`, which must be the current entry
    pub fn complete(&mut self, id: &str) -> Result<(), BatchError> {
        let current = self.current().ok_or(BatchError::NoActiveBatch)?;
        if current.id != id {
            return Err(BatchError::NotCurrent {
                expected: current.id.clone(),
                got: id.to_string(),
            });
        }
        self.cursor += 1;
        self.claimed = false;
        Ok(())
    }
}

/// Exclusive right to save the current entry of one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchClaim {
    pub batch_id: Uuid,
    pub entry: CartItem,
}

/// Answer to "cancel the batch?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
    Proceed,
    /// Ask first; `remaining` entries would be abandoned
    Confirm { remaining: usize },
}

/// Progress through the active batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

/// Owns the active batch and its persistence
pub struct BatchCoordinator {
    queue: Mutex<Option<BatchQueue>>,
    storage: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator").finish_non_exhaustive()
    }
}

impl BatchCoordinator {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            queue: Mutex::new(None),
            storage,
        }
    }

    /// Resume a persisted batch. Returns the number of entries left.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let restored = match local_db::load_json::<BatchQueue>(self.storage.as_ref(), BATCH_KEY).await {
            Ok(restored) => restored.filter(|q| !q.is_exhausted()),
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Discarding corrupt batch queue: {}", e);
                None
            }
            Err(e) => return Err(e),
        };
        let remaining = restored.as_ref().map_or(0, BatchQueue::remaining);
        if remaining > 0 {
            tracing::info!("Resuming batch with {} items left", remaining);
        }
        *self.queue.lock().await = restored;
        Ok(remaining)
    }

    async fn persist(&self, queue: &Option<BatchQueue>) {
        let result = match queue {
            Some(queue) if !queue.is_exhausted() => {
                local_db::save_json(self.storage.as_ref(), BATCH_KEY, queue).await
            }
            _ => self.storage.remove(BATCH_KEY).await,
        };
        if let Err(e) = result {
            tracing::warn!("Batch progress not persisted: {}", e);
        }
    }

    /// Replace any active batch with `entries`
    pub async fn start(&self, entries: Vec<CartItem>, from_cart: bool) -> usize {
        let mut queue = self.queue.lock().await;
        if let Some(previous) = queue.as_ref() {
            tracing::warn!("Starting a new batch abandons {} items", previous.remaining());
        }
        let total = entries.len();
        *queue = (total > 0).then(|| BatchQueue::new(entries, from_cart));
        self.persist(&queue).await;
        tracing::info!("Batch started with {} items (from cart: {})", total, from_cart);
        total
    }

    /// Current entry; calling again without completing returns the same entry
    pub async fn next_item(&self) -> Option<CartItem> {
        self.queue.lock().await.as_ref().and_then(|q| q.current().cloned())
    }

    /// Claim the current entry for saving. Fails while another claim is held.
    pub async fn claim(&self) -> Result<BatchClaim, BatchError> {
        let mut queue = self.queue.lock().await;
        let active = queue.as_mut().ok_or(BatchError::NoActiveBatch)?;
        let entry = active.current().cloned().ok_or(BatchError::NoActiveBatch)?;
        if active.claimed {
            return Err(BatchError::InProgress { id: entry.id });
        }
        active.claimed = true;
        Ok(BatchClaim {
            batch_id: active.id,
            entry,
        })
    }

    /// Give a claim back without advancing
    pub async fn release(&self, claim: &BatchClaim) {
        if let Some(active) = self.queue.lock().await.as_mut() {
            if active.id == claim.batch_id {
                active.claimed = false;
            }
        }
    }

    /// Advance past a claimed entry. `replaced` is set when the batch was
    /// cancelled or restarted while the entry was being saved.
    pub async fn complete_claim(&self, claim: &BatchClaim) -> Result<ClaimOutcome, BatchError> {
        let mut queue = self.queue.lock().await;
        if !queue.as_ref().is_some_and(|q| q.id == claim.batch_id) {
            let next = queue.as_ref().and_then(|q| q.current().cloned());
            return Ok(ClaimOutcome { next, replaced: true });
        }
        let next = self.advance(&mut queue, &claim.entry.id).await?;
        Ok(ClaimOutcome { next, replaced: false })
    }

    /// Mark the current entry done and return the next one, if any
    pub async fn complete_item(&self, id: &str) -> Result<Option<CartItem>, BatchError> {
        let mut queue = self.queue.lock().await;
        self.advance(&mut queue, id).await
    }

    async fn advance(&self, queue: &mut Option<BatchQueue>, id: &str) -> Result<Option<CartItem>, BatchError> {
        let active = queue.as_mut().ok_or(BatchError::NoActiveBatch)?;
        active.complete(id)?;
        let next = active.current().cloned();
        tracing::debug!(
            "Batch item {} done ({}/{})",
            id,
            active.cursor,
            active.entries.len()
        );
        if next.is_none() {
            tracing::info!("Batch finished");
            *queue = None;
        }
        self.persist(queue).await;
        Ok(next)
    }

    /// Whether cancelling needs the user's confirmation
    pub async fn cancel_prompt(&self) -> CancelDecision {
        match self.queue.lock().await.as_ref().map(BatchQueue::remaining) {
            Some(remaining) if remaining > 1 => CancelDecision::Confirm { remaining },
            _ => CancelDecision::Proceed,
        }
    }

    /// Drop the remaining entries. Returns how many were abandoned.
    pub async fn cancel(&self) -> usize {
        let mut queue = self.queue.lock().await;
        let abandoned = queue.take().map_or(0, |q| q.remaining());
        self.persist(&queue).await;
        if abandoned > 0 {
            tracing::info!("Batch cancelled; {} items abandoned", abandoned);
        }
        abandoned
    }

    pub async fn is_active(&self) -> bool {
        self.queue.lock().await.is_some()
    }

    pub async fn from_cart(&self) -> bool {
        self.queue.lock().await.as_ref().is_some_and(|q| q.from_cart)
    }

    pub async fn progress(&self) -> Option<BatchProgress> {
        self.queue.lock().await.as_ref().map(|q| BatchProgress {
            completed: q.cursor,
            total: q.entries.len(),
        })
    }
}

/// Result of completing a claim
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    pub next: Option<CartItem>,
    /// The claimed batch is gone; `next` belongs to whatever replaced it
    pub replaced: bool,
}

/// What one ingestion step produced
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub receipt: WriteReceipt<WardrobeItem>,
    /// Entry to process next; `None` when the batch is done
    pub next: Option<CartItem>,
}

/// Creates batch entries as wardrobe items, one at a time
#[derive(Debug, Clone)]
pub struct BatchIngestor {
    coordinator: Arc<BatchCoordinator>,
    items: Arc<EntityService<WardrobeItem>>,
    cart: Arc<Cart>,
}

impl BatchIngestor {
    pub fn new(coordinator: Arc<BatchCoordinator>, items: Arc<EntityService<WardrobeItem>>, cart: Arc<Cart>) -> Self {
        Self {
            coordinator,
            items,
            cart,
        }
    }

    /// Prefilled draft for the current entry
    pub async fn current_draft(&self) -> Option<ItemDraft> {
        self.coordinator.next_item().await.map(|entry| entry.draft())
    }

    /// Create the current entry from the user's completed form, then advance
    pub async fn ingest_current(&self, user_id: &str, item: NewItem) -> Result<Ingested, BatchError> {
        let claim = self.coordinator.claim().await?;
        let current = &claim.entry;
        let from_cart = self.coordinator.from_cart().await;

        let entity = item.into_item(user_id, Utc::now());
        let receipt = match self.items.create(entity.clone()).await {
            Ok(receipt) => receipt,
            Err(ServiceError::Network { message }) => {
                tracing::info!("Batch item {} saved locally; upload queued ({})", current.id, message);
                WriteReceipt {
                    entity: self.items.store().get(&entity.id).unwrap_or(entity),
                    confirmation: Confirmation::Queued,
                }
            }
            Err(e) => {
                self.coordinator.release(&claim).await;
                return Err(BatchError::Ingest(e));
            }
        };

        let outcome = self.coordinator.complete_claim(&claim).await?;
        if outcome.replaced {
            tracing::warn!(
                "Batch ended while {} was being saved; item {} was created outside it",
                current.id,
                receipt.entity.id
            );
        }

        if from_cart {
            if let Err(e) = self.cart.remove(&current.id).await {
                tracing::warn!("Cart entry {} not removed: {}", current.id, e);
            }
        }
        Ok(Ingested {
            receipt,
            next: outcome.next,
        })
    }
}
