//! # Pending Mutation Queue
//!
//! Writes that could not be confirmed by the backend wait here, in order,
//! until the next sync cycle flushes them. The queue is persisted after every
//! change so queued writes survive restarts.
//!
//! Mutations of the same entity are coalesced so at most one entry per
//! entity is pending:
//!
//! | queued   | new      | result          |
//! |----------|----------|-----------------|
//! | Create   | Update   | Create (latest) |
//! | Create   | Delete   | nothing         |
//! | Update   | Update   | Update (latest) |
//! | Update   | Delete   | Delete          |
//! | Delete   | Create   | Update          |

use crate::client::local_db::{self, KeyValueStore, StorageError};
use crate::shared::wardrobe::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A write awaiting remote confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[serde(bound(deserialize = "T: Entity"))]
pub enum Mutation<T> {
    Create { entity: T },
    Update { entity: T },
    Delete { id: String },
}

impl<T: Entity> Mutation<T> {
    pub fn entity_id(&self) -> &str {
        match self {
            Mutation::Create { entity } | Mutation::Update { entity } => entity.id(),
            Mutation::Delete { id } => id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }

    /// Point the mutation at `new_id` if it targets `old_id`
    pub fn rewrite_id(&mut self, old_id: &str, new_id: &str) -> bool {
        match self {
            Mutation::Create { entity } | Mutation::Update { entity } if entity.id() == old_id => {
                entity.set_id(new_id.to_string());
                true
            }
            Mutation::Delete { id } if id == old_id => {
                *id = new_id.to_string();
                true
            }
            _ => false,
        }
    }
}

/// Queued mutation with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Entity"))]
pub struct QueuedMutation<T> {
    pub id: Uuid,
    pub mutation: Mutation<T>,
    pub queued_at: DateTime<Utc>,
    /// Failed flush attempts
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Bumped whenever a later mutation is merged into this entry
    #[serde(default)]
    pub revision: u32,
}

/// What `enqueue` did with a new mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Appended,
    Merged,
    /// The new mutation cancelled the pending one
    Cancelled,
}

/// Ordered, persisted queue of pending mutations for one collection
pub struct PendingQueue<T: Entity> {
    entries: Mutex<VecDeque<QueuedMutation<T>>>,
    storage: Arc<dyn KeyValueStore>,
}

impl<T: Entity> std::fmt::Debug for PendingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue").field("kind", &T::KIND).finish()
    }
}

impl<T: Entity> PendingQueue<T> {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            storage,
        }
    }

    /// Restore the persisted queue. A corrupt queue is discarded.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let key = T::KIND.queue_key();
        let restored = match local_db::load_json::<VecDeque<QueuedMutation<T>>>(self.storage.as_ref(), key).await {
            Ok(restored) => restored.unwrap_or_default(),
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Discarding corrupt {} queue: {}", T::KIND, e);
                VecDeque::new()
            }
            Err(e) => return Err(e),
        };
        let mut entries = self.entries.lock().await;
        *entries = restored;
        if !entries.is_empty() {
            tracing::info!("Restored {} pending {} mutations", entries.len(), T::KIND);
        }
        Ok(entries.len())
    }

    async fn persist(&self, entries: &VecDeque<QueuedMutation<T>>) -> Result<(), StorageError> {
        local_db::save_json(self.storage.as_ref(), T::KIND.queue_key(), entries).await
    }

    /// Add a mutation, coalescing with any pending mutation of the same entity
    pub async fn enqueue(&self, mutation: Mutation<T>) -> Result<Enqueued, StorageError> {
        let mut entries = self.entries.lock().await;
        let position = entries
            .iter()
            .position(|e| e.mutation.entity_id() == mutation.entity_id());

        let outcome = match position {
            None => {
                entries.push_back(QueuedMutation {
                    id: Uuid::new_v4(),
                    mutation,
                    queued_at: Utc::now(),
                    attempts: 0,
                    last_error: None,
                    revision: 0,
                });
                Enqueued::Appended
            }
            Some(index) => {
                let merged = coalesce(&entries[index].mutation, mutation);
                match merged {
                    Some(merged) => {
                        entries[index].mutation = merged;
                        entries[index].revision = entries[index].revision.wrapping_add(1);
                        Enqueued::Merged
                    }
                    None => {
                        entries.remove(index);
                        Enqueued::Cancelled
                    }
                }
            }
        };
        tracing::debug!("Queued {} mutation ({:?}), {} pending", T::KIND, outcome, entries.len());
        self.persist(&entries).await?;
        Ok(outcome)
    }

    /// Oldest pending mutation
    pub async fn front(&self) -> Option<QueuedMutation<T>> {
        self.entries.lock().await.front().cloned()
    }

    /// All pending mutations in order
    pub async fn snapshot(&self) -> Vec<QueuedMutation<T>> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn has_pending(&self, entity_id: &str) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|e| e.mutation.entity_id() == entity_id)
    }

    pub async fn pending_ids(&self) -> HashSet<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.mutation.entity_id().to_string())
            .collect()
    }

    /// Drop a flushed (or rejected) mutation
    pub async fn complete(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    /// Retire an entry the backend has just accepted.
    ///
    /// If the user changed the entity while the flush was in flight the entry
    /// stays queued: a flushed create becomes an update, and a create that was
    /// cancelled locally becomes a delete of the now-remote `entity_id`.
    pub async fn settle(&self, flushed: &QueuedMutation<T>, entity_id: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        let was_create = matches!(flushed.mutation, Mutation::Create { .. });
        match entries.iter().position(|e| e.id == flushed.id) {
            Some(index) if entries[index].revision == flushed.revision => {
                entries.remove(index);
            }
            Some(index) => {
                if was_create {
                    let current = std::mem::replace(
                        &mut entries[index].mutation,
                        Mutation::Delete { id: String::new() },
                    );
                    entries[index].mutation = match current {
                        Mutation::Create { entity } => Mutation::Update { entity },
                        other => other,
                    };
                }
                tracing::debug!("{} {} changed during flush; kept queued", T::KIND, entity_id);
            }
            None if was_create => {
                entries.push_back(QueuedMutation {
                    id: Uuid::new_v4(),
                    mutation: Mutation::Delete {
                        id: entity_id.to_string(),
                    },
                    queued_at: Utc::now(),
                    attempts: 0,
                    last_error: None,
                    revision: 0,
                });
            }
            None => {}
        }
        self.persist(&entries).await
    }

    pub async fn record_failure(&self, id: Uuid, error: String) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_error = Some(error);
            self.persist(&entries).await?;
        }
        Ok(())
    }

    /// Point pending mutations at a server-assigned id
    pub async fn rewrite_id(&self, old_id: &str, new_id: &str) -> Result<usize, StorageError> {
        let mut entries = self.entries.lock().await;
        let mut rewritten = 0;
        for entry in entries.iter_mut() {
            if entry.mutation.rewrite_id(old_id, new_id) {
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            self.persist(&entries).await?;
        }
        Ok(rewritten)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&entries).await
    }
}

/// Merge a new mutation into a pending one. `None` means both cancel out.
fn coalesce<T: Entity>(pending: &Mutation<T>, next: Mutation<T>) -> Option<Mutation<T>> {
    match (pending, next) {
        (Mutation::Create { .. }, Mutation::Create { entity } | Mutation::Update { entity }) => {
            Some(Mutation::Create { entity })
        }
        (Mutation::Create { .. }, Mutation::Delete { .. }) => None,
        (Mutation::Update { .. } | Mutation::Delete { .. }, Mutation::Create { entity } | Mutation::Update { entity }) => {
            Some(Mutation::Update { entity })
        }
        (Mutation::Update { .. } | Mutation::Delete { .. }, Mutation::Delete { id }) => Some(Mutation::Delete { id }),
    }
}
