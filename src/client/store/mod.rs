//! # Local Entity Store
//!
//! In-memory projection of one cached collection, hydrated from and persisted
//! to a [`KeyValueStore`]. It is the single source of truth for rendering:
//! every change goes through the methods below, reads never touch storage
//! and never fail.
//!
//! Mutations are applied in memory first and persisted afterwards; a failed
//! write is reported to the caller but the in-memory change stays applied.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wardrobe_core::client::local_db::MemoryStore;
//! use wardrobe_core::client::store::ItemStore;
//! use wardrobe_core::shared::wardrobe::{ItemFilter, SortOptions};
//!
//! # async fn example() -> Result<(), wardrobe_core::client::local_db::StorageError> {
//! let store = ItemStore::new(Arc::new(MemoryStore::new()));
//! store.load().await?;
//! let visible = store.filtered(&ItemFilter::new().with_color("red"), SortOptions::default());
//! # Ok(())
//! # }
//! ```

pub mod items;
pub mod outfits;
pub mod selection;

pub use selection::Selection;

use crate::client::local_db::{self, KeyValueStore, StorageError};
use crate::client::sync::SyncStatus;
use crate::shared::wardrobe::{Entity, Outfit, SortOptions, WardrobeItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{watch, Mutex};

pub type ItemStore = EntityStore<WardrobeItem>;
pub type OutfitStore = EntityStore<Outfit>;

/// Persisted form of a collection
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Entity"))]
struct Snapshot<T> {
    entities: Vec<T>,
    #[serde(default)]
    last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct StoreState<T> {
    entities: Vec<T>,
    last_synced_at: Option<DateTime<Utc>>,
    hydrated: bool,
}

/// Cached collection of one entity kind
pub struct EntityStore<T: Entity> {
    state: RwLock<StoreState<T>>,
    storage: Arc<dyn KeyValueStore>,
    /// Serialises snapshot writes so the last write always carries the newest state
    persist_lock: Mutex<()>,
    status: watch::Sender<SyncStatus>,
}

impl<T: Entity> std::fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("kind", &T::KIND)
            .field("len", &self.len())
            .field("status", &self.sync_status())
            .finish()
    }
}

impl<T: Entity> EntityStore<T> {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            state: RwLock::new(StoreState {
                entities: Vec::new(),
                last_synced_at: None,
                hydrated: false,
            }),
            storage,
            persist_lock: Mutex::new(()),
            status,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hydrate from persistent storage. Must complete before the first read
    /// is served. A corrupt snapshot is discarded and the store starts empty.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let key = T::KIND.store_key();
        let snapshot = match local_db::load_json::<Snapshot<T>>(self.storage.as_ref(), key).await {
            Ok(snapshot) => snapshot,
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Discarding corrupt {} snapshot: {}", T::KIND, e);
                None
            }
            Err(e) => return Err(e),
        };

        let mut state = self.write();
        match snapshot {
            Some(snapshot) => {
                state.entities = snapshot.entities;
                state.last_synced_at = snapshot.last_synced_at;
            }
            None => {
                state.entities.clear();
                state.last_synced_at = None;
            }
        }
        state.hydrated = true;
        tracing::debug!("Hydrated {} {}", state.entities.len(), T::KIND);
        Ok(state.entities.len())
    }

    /// Write the current in-memory state
    pub async fn save(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let state = self.read();
            Snapshot {
                entities: state.entities.clone(),
                last_synced_at: state.last_synced_at,
            }
        };
        let result = local_db::save_json(self.storage.as_ref(), T::KIND.store_key(), &snapshot).await;
        if let Err(e) = &result {
            tracing::error!("Failed to persist {}: {}", T::KIND, e);
        }
        result
    }

    pub fn is_hydrated(&self) -> bool {
        self.read().hydrated
    }

    /// Replace the whole collection
    pub async fn set_items(&self, entities: Vec<T>) -> Result<(), StorageError> {
        self.write().entities = entities;
        self.save().await
    }

    /// Insert at the front; an entity with the same id is replaced in place
    pub async fn add(&self, entity: T) -> Result<(), StorageError> {
        {
            let mut state = self.write();
            match state.entities.iter().position(|e| e.id() == entity.id()) {
                Some(index) => state.entities[index] = entity,
                None => state.entities.insert(0, entity),
            }
        }
        self.save().await
    }

    /// Apply a patch and stamp `updated_at`. Returns the updated entity, or
    /// `None` when the id is unknown.
    pub async fn update(&self, id: &str, patch: &T::Patch) -> Result<Option<T>, StorageError> {
        let updated = {
            let mut state = self.write();
            state.entities.iter_mut().find(|e| e.id() == id).map(|entity| {
                entity.apply_patch(patch);
                entity.touch(Utc::now());
                entity.clone()
            })
        };
        if updated.is_some() {
            self.save().await?;
        }
        Ok(updated)
    }

    /// Replace an entity by its id, keeping its position
    pub async fn replace(&self, entity: T) -> Result<bool, StorageError> {
        self.rekey(&entity.id().to_string(), entity).await
    }

    /// Replace the entity stored under `old_id` with `entity`, whose id may differ
    pub async fn rekey(&self, old_id: &str, entity: T) -> Result<bool, StorageError> {
        let replaced = {
            let mut state = self.write();
            match state.entities.iter().position(|e| e.id() == old_id) {
                Some(index) => {
                    let new_id = entity.id().to_string();
                    state.entities[index] = entity;
                    if new_id != old_id {
                        let mut seen = false;
                        state.entities.retain(|e| {
                            if e.id() != new_id {
                                return true;
                            }
                            let keep = !seen;
                            seen = true;
                            keep
                        });
                    }
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.save().await?;
        }
        Ok(replaced)
    }

    /// Optimistic half of a delete. Never talks to the network. Returns the
    /// removed entity and the position it occupied.
    pub async fn remove_locally(&self, id: &str) -> Result<Option<(usize, T)>, StorageError> {
        let removed = {
            let mut state = self.write();
            state
                .entities
                .iter()
                .position(|e| e.id() == id)
                .map(|index| (index, state.entities.remove(index)))
        };
        if removed.is_some() {
            self.save().await?;
        }
        Ok(removed)
    }

    /// Put a removed entity back at (or near) its old position
    pub async fn restore(&self, index: usize, entity: T) -> Result<(), StorageError> {
        {
            let mut state = self.write();
            if state.entities.iter().any(|e| e.id() == entity.id()) {
                return Ok(());
            }
            let index = index.min(state.entities.len());
            state.entities.insert(index, entity);
        }
        self.save().await
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.read().entities.iter().find(|e| e.id() == id).cloned()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.read().entities.iter().position(|e| e.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().entities.iter().any(|e| e.id() == id)
    }

    /// Snapshot of the collection in stored order
    pub fn all(&self) -> Vec<T> {
        self.read().entities.clone()
    }

    pub fn len(&self) -> usize {
        self.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entities.is_empty()
    }

    /// Entities matching `filter`, ordered by `sort`. Ties keep stored order.
    pub fn filtered(&self, filter: &T::Filter, sort: SortOptions) -> Vec<T> {
        let state = self.read();
        let mut matching: Vec<T> = state
            .entities
            .iter()
            .filter(|e| e.matches(filter))
            .cloned()
            .collect();
        drop(state);

        matching.sort_by(|a, b| {
            a.sort_value(sort.field)
                .compare(&b.sort_value(sort.field), sort.direction)
        });
        matching
    }

    pub fn sync_status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Set the coarse sync indicator shown by the UI
    pub fn set_sync_status(&self, status: SyncStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!("{} sync status {} -> {}", T::KIND, current, status);
            *current = status;
            true
        });
    }

    /// Receive every sync status change
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.read().last_synced_at
    }

    /// Record a completed authoritative fetch
    pub async fn mark_synced(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.write().last_synced_at = Some(at);
        self.save().await
    }

    /// True when the collection is empty, never synced, or older than `max_age`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let state = self.read();
        if state.entities.is_empty() {
            return true;
        }
        match state.last_synced_at {
            None => true,
            Some(at) => match chrono::Duration::from_std(max_age) {
                Ok(max_age) => now - at >= max_age,
                Err(_) => false,
            },
        }
    }
}
