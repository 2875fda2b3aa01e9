//! # Offline-First Service Layer
//!
//! One API for reading and writing the wardrobe that is safe to call with or
//! without connectivity.
//!
//! ## Architecture
//!
//! - **Reads** return the hydrated local store immediately and refresh it in
//!   the background when online.
//! - **Writes** are applied to the local store first, then sent to the
//!   backend. A write that cannot reach the backend is queued and flushed by
//!   the next sync cycle; a write the backend rejects is compensated with its
//!   inverse operation.
//!
//! ## Key Components
//!
//! - `optimistic.rs`: compensation ledger for in-flight writes
//! - `queue.rs`: persisted, coalescing queue of pending mutations
//! - `retry.rs`: backoff policy for automatic sync retries
//! - `reconciliation.rs`: merging the remote list with pending local intent
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wardrobe_core::client::offline::OfflineService;
//! use wardrobe_core::shared::wardrobe::{Color, NewItem};
//!
//! # async fn example(service: &OfflineService) -> Result<(), wardrobe_core::client::offline::ServiceError> {
//! let receipt = service
//!     .create_item(
//!         "user-1",
//!         NewItem {
//!             title: "Red Jacket".to_string(),
//!             colors: vec![Color::new("#FF0000")],
//!             image_uri: Some("file:///tmp/a.jpg".to_string()),
//!             ..NewItem::default()
//!         },
//!     )
//!     .await?;
//! println!("{} ({:?})", receipt.entity.id, receipt.confirmation);
//! # Ok(())
//! # }
//! ```

pub mod optimistic;
pub mod queue;
pub mod reconciliation;
pub mod retry;

pub use optimistic::{Compensation, OptimisticLedger, OptimisticUpdate};
pub use queue::{Enqueued, Mutation, PendingQueue, QueuedMutation};
pub use reconciliation::{reconcile, ReconciliationConflict, ReconciliationResult};
pub use retry::{BackoffStrategy, RetryPolicy};

use crate::client::api::{RemoteCollection, RemoteError};
use crate::client::local_db::StorageError;
use crate::client::store::{EntityStore, Selection};
use crate::client::sync::{CollectionSync, NetworkMonitor, SyncOutcome, SyncStatus, SyncTrigger};
use crate::shared::error::SharedError;
use crate::shared::wardrobe::{
    Entity, ItemPatch, NewItem, NewOutfit, Outfit, OutfitPatch, WardrobeItem,
};
use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Errors returned to callers of the service layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Local precondition failed; the network was never touched
    #[error(transparent)]
    Validation(#[from] SharedError),

    /// Transport failure while online. The change is kept and queued.
    #[error("network error: {message}")]
    Network { message: String },

    /// The backend refused the request. Status 0 means its reply was unreadable.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("{id} not found")]
    NotFound { id: String },

    #[error("{} of {} deletions failed", .failed.len(), .attempted)]
    PartialBatchFailure { failed: Vec<String>, attempted: usize },
}

impl ServiceError {
    /// Retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Network { .. } | ServiceError::PartialBatchFailure { .. }
        )
    }

    fn from_remote(error: RemoteError, id: &str) -> Self {
        match error {
            RemoteError::Network(message) => ServiceError::Network { message },
            RemoteError::Server { status, message } => ServiceError::Server { status, message },
            RemoteError::NotFound(_) => ServiceError::NotFound { id: id.to_string() },
            RemoteError::Decode(message) => ServiceError::Server { status: 0, message },
        }
    }
}

/// How far a write got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Accepted by the backend
    Confirmed,
    /// Applied locally and waiting in the pending queue
    Queued,
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReceipt<T> {
    /// The entity as now stored locally
    pub entity: T,
    pub confirmation: Confirmation,
}

/// Cached entities plus the background refresh started for them, if any
#[derive(Debug)]
pub struct CachedRead<T> {
    pub entities: Vec<T>,
    pub refresh: Option<JoinHandle<SyncOutcome>>,
}

impl<T> CachedRead<T> {
    /// Wait for the background refresh. `None` when none was started.
    pub async fn refreshed(self) -> Option<SyncOutcome> {
        match self.refresh?.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("Background refresh task failed: {}", e);
                None
            }
        }
    }
}

/// Per-id outcome of a batch delete that did not fail
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteReport {
    pub deleted: Vec<String>,
    /// Removed locally, waiting for the backend
    pub queued: Vec<String>,
}

/// Offline-first CRUD over one collection
pub struct EntityService<T: Entity> {
    store: Arc<EntityStore<T>>,
    queue: Arc<PendingQueue<T>>,
    remote: Arc<dyn RemoteCollection<T>>,
    network: NetworkMonitor,
    sync: Arc<CollectionSync<T>>,
}

impl<T: Entity> std::fmt::Debug for EntityService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityService").field("kind", &T::KIND).finish()
    }
}

impl<T: Entity> EntityService<T> {
    /// Build on top of the sync cycle that owns the collection's store and queue
    pub fn new(sync: Arc<CollectionSync<T>>) -> Self {
        Self {
            store: sync.store().clone(),
            queue: sync.queue().clone(),
            remote: sync.remote().clone(),
            network: sync.network().clone(),
            sync,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore<T>> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<PendingQueue<T>> {
        &self.queue
    }

    /// Writes applied locally but not yet settled
    pub async fn in_flight(&self) -> usize {
        self.sync.ledger().count_pending().await
    }

    /// Cached entities right away; a background refresh is spawned when online
    pub fn get_user(&self, user_id: &str) -> CachedRead<T> {
        let entities = self.store.all();
        let refresh = if self.network.is_online() {
            let sync = self.sync.clone();
            let user_id = user_id.to_string();
            Some(tokio::spawn(async move {
                sync.sync(&user_id, SyncTrigger::Manual).await
            }))
        } else {
            tracing::debug!("Offline; serving {} cached {}", entities.len(), T::KIND);
            self.store.set_sync_status(SyncStatus::Offline);
            None
        };
        CachedRead { entities, refresh }
    }

    /// Awaited corrective reload. Ids in `selection` that no longer exist are
    /// dropped from it.
    pub async fn load(&self, user_id: &str, selection: Option<&mut Selection>) -> SyncOutcome {
        let outcome = self.sync.sync(user_id, SyncTrigger::Manual).await;
        if let Some(selection) = selection {
            selection.retain(|id| self.store.contains(id));
        }
        outcome
    }

    pub async fn create(&self, entity: T) -> Result<WriteReceipt<T>, ServiceError> {
        entity.validate()?;
        let local_id = entity.id().to_string();

        let op = {
            let _apply = self.sync.lock_apply().await;
            log_storage::<T, _>(self.store.add(entity.clone()).await);
            self.sync
                .ledger()
                .record(
                    Mutation::Create { entity: entity.clone() },
                    Compensation::Remove { id: local_id.clone() },
                )
                .await
        };

        let (confirmation, id) = self.commit(Mutation::Create { entity: entity.clone() }, op).await?;
        let entity = self.store.get(&id).unwrap_or(entity);
        Ok(WriteReceipt { entity, confirmation })
    }

    pub async fn update(&self, id: &str, patch: &T::Patch) -> Result<WriteReceipt<T>, ServiceError> {
        let previous = self.require(id)?;
        let mut updated = previous.clone();
        updated.apply_patch(patch);
        updated.touch(Utc::now());
        updated.validate()?;
        self.write_update(previous, updated).await
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<WriteReceipt<T>, ServiceError> {
        let previous = self.require(id)?;
        let mut updated = previous.clone();
        updated.set_favorite(!previous.is_favorite());
        updated.touch(Utc::now());
        self.write_update(previous, updated).await
    }

    async fn write_update(&self, previous: T, updated: T) -> Result<WriteReceipt<T>, ServiceError> {
        let id = updated.id().to_string();
        let op = {
            let _apply = self.sync.lock_apply().await;
            log_storage::<T, _>(self.store.replace(updated.clone()).await);
            self.sync
                .ledger()
                .record(Mutation::Update { entity: updated.clone() }, Compensation::Restore { previous })
                .await
        };

        let (confirmation, _) = self.commit(Mutation::Update { entity: updated.clone() }, op).await?;
        Ok(WriteReceipt {
            entity: updated,
            confirmation,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<Confirmation, ServiceError> {
        let entity = self.require(id)?;
        let op = {
            let _apply = self.sync.lock_apply().await;
            let index = self.store.position(id).unwrap_or(0);
            log_storage::<T, _>(self.store.remove_locally(id).await);
            self.sync
                .ledger()
                .record(Mutation::Delete { id: id.to_string() }, Compensation::Reinsert { index, entity })
                .await
        };

        let (confirmation, _) = self.commit(Mutation::Delete { id: id.to_string() }, op).await?;
        Ok(confirmation)
    }

    /// Delete `ids` concurrently. The selection is cleared for the duration;
    /// if any deletion is rejected while online it is restored to exactly the
    /// rejected ids and selection mode is re-entered.
    pub async fn delete_many(
        &self,
        ids: &[String],
        selection: &mut Selection,
    ) -> Result<BatchDeleteReport, ServiceError> {
        selection.clear();

        let results = join_all(ids.iter().map(|id| self.delete(id))).await;

        let mut report = BatchDeleteReport::default();
        let mut failed = Vec::new();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(Confirmation::Confirmed) => report.deleted.push(id.clone()),
                Ok(Confirmation::Queued) | Err(ServiceError::Network { .. }) => {
                    report.queued.push(id.clone())
                }
                Err(e) => {
                    tracing::warn!("Deleting {} {} failed: {}", T::KIND, id, e);
                    failed.push(id.clone());
                }
            }
        }

        if failed.is_empty() || !self.network.is_online() {
            selection.exit();
            tracing::info!(
                "Deleted {} {} ({} queued)",
                report.deleted.len() + report.queued.len(),
                T::KIND,
                report.queued.len()
            );
            return Ok(report);
        }

        selection.restore(failed.iter().cloned());
        Err(ServiceError::PartialBatchFailure {
            failed,
            attempted: ids.len(),
        })
    }

    fn require(&self, id: &str) -> Result<T, ServiceError> {
        self.store
            .get(id)
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })
    }

    /// Send an already applied mutation to the backend, or queue it.
    /// Returns the entity id as now stored.
    async fn commit(&self, mutation: Mutation<T>, op: Uuid) -> Result<(Confirmation, String), ServiceError> {
        let entity_id = mutation.entity_id().to_string();

        if !self.network.is_online() {
            tracing::debug!("Offline; queueing {} of {} {}", mutation.label(), T::KIND, entity_id);
            self.defer(mutation, op).await;
            return Ok((Confirmation::Queued, entity_id));
        }
        if self.queue.has_pending(&entity_id).await {
            tracing::debug!("{} {} has pending writes; queueing {}", T::KIND, entity_id, mutation.label());
            self.defer(mutation, op).await;
            return Ok((Confirmation::Queued, entity_id));
        }

        let result = match &mutation {
            Mutation::Create { entity } => self.remote.create(entity).await.map(|stored| stored.id().to_string()),
            Mutation::Update { entity } => self.remote.update(entity).await.map(|_| entity_id.clone()),
            Mutation::Delete { id } => match self.remote.delete(id).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => Ok(id.clone()),
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(stored_id) => {
                self.sync.confirm_write(op, &entity_id, &stored_id).await;
                Ok((Confirmation::Confirmed, stored_id))
            }
            Err(RemoteError::Network(message)) => {
                self.defer(mutation, op).await;
                if self.network.is_online() {
                    tracing::warn!("{} {} failed in transit; queued: {}", T::KIND, entity_id, message);
                    Err(ServiceError::Network { message })
                } else {
                    tracing::debug!("Connection lost during {} {}; queued", T::KIND, entity_id);
                    Ok((Confirmation::Queued, entity_id))
                }
            }
            Err(e) => {
                tracing::warn!("Backend rejected {} of {} {}: {}", mutation.label(), T::KIND, entity_id, e);
                let _apply = self.sync.lock_apply().await;
                if let Err(storage) = self.sync.ledger().rollback(op, &self.store).await {
                    tracing::warn!("Compensated {} kept in memory only: {}", T::KIND, storage);
                }
                Err(ServiceError::from_remote(e, &entity_id))
            }
        }
    }

    async fn defer(&self, mutation: Mutation<T>, op: Uuid) {
        let _apply = self.sync.lock_apply().await;
        match self.queue.enqueue(mutation).await {
            Ok(outcome) => tracing::debug!("{} mutation {:?}", T::KIND, outcome),
            Err(e) => tracing::warn!("Queued {} mutation kept in memory only: {}", T::KIND, e),
        }
        self.sync.ledger().release(op).await;
    }
}

impl EntityService<Outfit> {
    /// Copy an outfit under a new id and create it like any other outfit
    pub async fn duplicate(&self, id: &str) -> Result<WriteReceipt<Outfit>, ServiceError> {
        let original = self.require(id)?;
        self.create(original.duplicate(Utc::now())).await
    }
}

fn log_storage<T: Entity, R>(result: Result<R, StorageError>) {
    if let Err(e) = result {
        tracing::warn!("Local {} change not persisted: {}", T::KIND, e);
    }
}

/// Item and outfit services behind one handle
#[derive(Debug, Clone)]
pub struct OfflineService {
    items: Arc<EntityService<WardrobeItem>>,
    outfits: Arc<EntityService<Outfit>>,
    network: NetworkMonitor,
}

impl OfflineService {
    pub fn new(
        items: Arc<EntityService<WardrobeItem>>,
        outfits: Arc<EntityService<Outfit>>,
        network: NetworkMonitor,
    ) -> Self {
        Self { items, outfits, network }
    }

    pub fn items(&self) -> &Arc<EntityService<WardrobeItem>> {
        &self.items
    }

    pub fn outfits(&self) -> &Arc<EntityService<Outfit>> {
        &self.outfits
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    pub fn get_user_items(&self, user_id: &str) -> CachedRead<WardrobeItem> {
        self.items.get_user(user_id)
    }

    pub async fn load_items(&self, user_id: &str, selection: Option<&mut Selection>) -> SyncOutcome {
        self.items.load(user_id, selection).await
    }

    pub async fn create_item(&self, user_id: &str, item: NewItem) -> Result<WriteReceipt<WardrobeItem>, ServiceError> {
        self.items.create(item.into_item(user_id, Utc::now())).await
    }

    pub async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<WriteReceipt<WardrobeItem>, ServiceError> {
        self.items.update(id, patch).await
    }

    pub async fn delete_item(&self, id: &str) -> Result<Confirmation, ServiceError> {
        self.items.delete(id).await
    }

    pub async fn toggle_item_favorite(&self, id: &str) -> Result<WriteReceipt<WardrobeItem>, ServiceError> {
        self.items.toggle_favorite(id).await
    }

    pub async fn delete_items(&self, ids: &[String], selection: &mut Selection) -> Result<BatchDeleteReport, ServiceError> {
        self.items.delete_many(ids, selection).await
    }

    pub fn get_user_outfits(&self, user_id: &str) -> CachedRead<Outfit> {
        self.outfits.get_user(user_id)
    }

    pub async fn load_outfits(&self, user_id: &str, selection: Option<&mut Selection>) -> SyncOutcome {
        self.outfits.load(user_id, selection).await
    }

    pub async fn create_outfit(&self, user_id: &str, outfit: NewOutfit) -> Result<WriteReceipt<Outfit>, ServiceError> {
        self.outfits.create(outfit.into_outfit(user_id, Utc::now())).await
    }

    pub async fn update_outfit(&self, id: &str, patch: &OutfitPatch) -> Result<WriteReceipt<Outfit>, ServiceError> {
        self.outfits.update(id, patch).await
    }

    pub async fn delete_outfit(&self, id: &str) -> Result<Confirmation, ServiceError> {
        self.outfits.delete(id).await
    }

    pub async fn toggle_outfit_favorite(&self, id: &str) -> Result<WriteReceipt<Outfit>, ServiceError> {
        self.outfits.toggle_favorite(id).await
    }

    pub async fn duplicate_outfit(&self, id: &str) -> Result<WriteReceipt<Outfit>, ServiceError> {
        self.outfits.duplicate(id).await
    }

    pub async fn delete_outfits(&self, ids: &[String], selection: &mut Selection) -> Result<BatchDeleteReport, ServiceError> {
        self.outfits.delete_many(ids, selection).await
    }
}
