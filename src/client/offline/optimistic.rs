//! # Optimistic Updates
//!
//! Every write is applied to the local store before the remote call is
//! issued. The ledger remembers how to undo each in-flight write so a
//! rejected write can be compensated with its inverse operation instead of
//! a wholesale reload.
//!
//! The ledger also remembers what each write applied. A sync cycle replays
//! those writes on top of the remote snapshot, so an optimistic change
//! survives a refresh that races with its remote call. A confirmed write
//! keeps being replayed until a list request issued after its confirmation
//! has been reconciled.

use crate::client::local_db::StorageError;
use crate::client::offline::queue::Mutation;
use crate::client::store::EntityStore;
use crate::shared::wardrobe::Entity;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Inverse of an applied optimistic write
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation<T> {
    /// Undo a create
    Remove { id: String },
    /// Undo an update
    Restore { previous: T },
    /// Undo a delete
    Reinsert { index: usize, entity: T },
}

#[derive(Debug, Clone)]
pub struct OptimisticUpdate<T> {
    pub id: Uuid,
    pub entity_id: String,
    /// The write as applied to the local store
    pub applied: Mutation<T>,
    pub compensation: Compensation<T>,
    pub applied_at: DateTime<Utc>,
    /// List epoch at which the backend accepted the write
    pub confirmed_at_epoch: Option<u64>,
}

impl<T> OptimisticUpdate<T> {
    fn in_flight(&self) -> bool {
        self.confirmed_at_epoch.is_none()
    }
}

/// Optimistic writes for one collection, oldest first
#[derive(Debug)]
pub struct OptimisticLedger<T> {
    updates: RwLock<Vec<OptimisticUpdate<T>>>,
}

impl<T: Entity> OptimisticLedger<T> {
    pub fn new() -> Self {
        Self {
            updates: RwLock::new(Vec::new()),
        }
    }

    /// Remember a write that was just applied locally and how to undo it
    pub async fn record(&self, applied: Mutation<T>, compensation: Compensation<T>) -> Uuid {
        let update = OptimisticUpdate {
            id: Uuid::new_v4(),
            entity_id: applied.entity_id().to_string(),
            applied,
            compensation,
            applied_at: Utc::now(),
            confirmed_at_epoch: None,
        };
        let id = update.id;
        self.updates.write().await.push(update);
        id
    }

    /// The backend accepted the write while list epoch `epoch` was current
    pub async fn confirm(&self, id: Uuid, epoch: u64) -> bool {
        match self.updates.write().await.iter_mut().find(|u| u.id == id) {
            Some(update) => {
                update.confirmed_at_epoch = Some(epoch);
                true
            }
            None => false,
        }
    }

    /// The write was handed to the pending queue, which replays it from now on
    pub async fn release(&self, id: Uuid) -> bool {
        let mut updates = self.updates.write().await;
        let before = updates.len();
        updates.retain(|u| u.id != id);
        updates.len() != before
    }

    /// Undo a rejected write against `store`
    pub async fn rollback(&self, id: Uuid, store: &EntityStore<T>) -> Result<bool, StorageError> {
        let update = {
            let mut updates = self.updates.write().await;
            match updates.iter().position(|u| u.id == id) {
                Some(index) => updates.remove(index),
                None => return Ok(false),
            }
        };
        tracing::debug!(
            "Compensating optimistic {} write on {}",
            T::KIND,
            update.entity_id
        );
        match update.compensation {
            Compensation::Remove { id } => {
                store.remove_locally(&id).await?;
            }
            Compensation::Restore { previous } => {
                store.replace(previous).await?;
            }
            Compensation::Reinsert { index, entity } => {
                store.restore(index, entity).await?;
            }
        }
        Ok(true)
    }

    /// Writes a remote list requested at `list_epoch` may not reflect yet.
    /// Confirmed writes the list is known to include are forgotten.
    pub async fn overlay(&self, list_epoch: u64) -> Vec<Mutation<T>> {
        let mut updates = self.updates.write().await;
        updates.retain(|u| u.confirmed_at_epoch.map_or(true, |epoch| epoch >= list_epoch));
        updates.iter().map(|u| u.applied.clone()).collect()
    }

    /// Follow a server-assigned id
    pub async fn rekey(&self, local_id: &str, server_id: &str) {
        for update in self.updates.write().await.iter_mut() {
            if update.entity_id == local_id {
                update.entity_id = server_id.to_string();
                update.applied.rewrite_id(local_id, server_id);
            }
        }
    }

    /// Writes still waiting for the backend
    pub async fn count_pending(&self) -> usize {
        self.updates.read().await.iter().filter(|u| u.in_flight()).count()
    }
}

impl<T: Entity> Default for OptimisticLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}
