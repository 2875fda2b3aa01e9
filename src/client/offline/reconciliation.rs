//! # State Reconciliation
//!
//! Aligns the authoritative remote list with local intent that has not been
//! flushed yet. The remote snapshot wins for every entity without a pending
//! mutation; pending mutations are re-applied on top so the user never sees
//! an unconfirmed change revert. Writes still in flight, or confirmed after
//! the list was requested, are applied last.

use crate::client::offline::queue::{Mutation, QueuedMutation};
use crate::shared::wardrobe::Entity;
use chrono::{DateTime, Utc};

/// A pending local update that is older than the remote version it overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConflict {
    pub entity_id: String,
    pub local_updated_at: DateTime<Utc>,
    pub remote_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReconciliationResult<T> {
    /// Collection to store
    pub entities: Vec<T>,
    pub conflicts: Vec<ReconciliationConflict>,
    /// Queued and in-flight writes re-applied on top of the remote list
    pub pending_applied: usize,
}

/// Merge `remote` with still-pending local mutations, then with optimistic
/// writes the remote list may not reflect yet
pub fn reconcile<T: Entity>(
    remote: Vec<T>,
    pending: &[QueuedMutation<T>],
    in_flight: &[Mutation<T>],
) -> ReconciliationResult<T> {
    let mut entities = remote;
    let mut conflicts = Vec::new();

    for entry in pending {
        if let Mutation::Update { entity } = &entry.mutation {
            if let Some(remote) = entities.iter().find(|e| e.id() == entity.id()) {
                if remote.updated_at() > entity.updated_at() {
                    tracing::warn!(
                        "Remote {} {} is newer than the pending local edit; keeping local",
                        T::KIND,
                        entity.id()
                    );
                    conflicts.push(ReconciliationConflict {
                        entity_id: entity.id().to_string(),
                        local_updated_at: entity.updated_at(),
                        remote_updated_at: remote.updated_at(),
                    });
                }
            }
        }
        apply(&mut entities, &entry.mutation);
    }
    for mutation in in_flight {
        apply(&mut entities, mutation);
    }

    ReconciliationResult {
        entities,
        conflicts,
        pending_applied: pending.len() + in_flight.len(),
    }
}

fn apply<T: Entity>(entities: &mut Vec<T>, mutation: &Mutation<T>) {
    match mutation {
        Mutation::Create { entity } => upsert(entities, entity.clone(), true),
        Mutation::Update { entity } => upsert(entities, entity.clone(), false),
        Mutation::Delete { id } => entities.retain(|e| e.id() != id),
    }
}

fn upsert<T: Entity>(entities: &mut Vec<T>, entity: T, front: bool) {
    match entities.iter().position(|e| e.id() == entity.id()) {
        Some(index) => entities[index] = entity,
        None if front => entities.insert(0, entity),
        None => entities.push(entity),
    }
}
