//! # Sync Engine
//!
//! Brings each cached collection in line with the backend. One cycle runs at
//! a time per collection:
//!
//! ```text
//! Idle -> Syncing -> { Synced | Offline | Error }
//! ```
//!
//! A cycle flushes the pending mutation queue in order, fetches the
//! authoritative list, re-applies whatever is still pending on top of it and
//! replaces the local store with the result. A trigger that arrives while a
//! cycle is running is coalesced, not queued.
//!
//! Optimistic writes issued by the service layer go through the same
//! collection: applying, confirming and rolling one back is serialized with
//! the reconcile step, and writes the fetched list may predate are replayed
//! over it.
//!
//! Failed cycles schedule an automatic [`SyncTrigger::Retry`] with
//! exponential backoff until the retry ceiling is reached; from then on only
//! a user-driven trigger can recover the collection.
//!
//! ## Key Components
//!
//! - `CollectionSync`: cycle logic for one entity kind
//! - `SyncEngine`: both collections plus the background task that reacts to
//!   reconnects and retry deadlines
//! - `NetworkMonitor`: connectivity signal
//! - `SyncScheduler`: trigger gating and backoff deadlines
//! - `SyncMetrics`: counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wardrobe_core::client::sync::SyncTrigger;
//! # async fn example(engine: &wardrobe_core::client::sync::SyncEngine) {
//! engine.set_user("user-1").await;
//! engine.start().await;
//! let outcome = engine.trigger(SyncTrigger::PullToRefresh).await;
//! # }
//! ```

pub mod metrics;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;

pub use metrics::SyncMetrics;
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use scheduler::{SyncScheduler, SyncTrigger};
pub use sync_state::{SyncState, SyncStatus};

use crate::client::api::{RemoteCollection, RemoteError};
use crate::client::offline::optimistic::OptimisticLedger;
use crate::client::offline::queue::{Mutation, PendingQueue, QueuedMutation};
use crate::client::offline::reconciliation::{reconcile, ReconciliationConflict, ReconciliationResult};
use crate::client::store::EntityStore;
use crate::shared::wardrobe::{Entity, EntityKind, Outfit, WardrobeItem};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};
use uuid::Uuid;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Summary of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub kind: EntityKind,
    pub trigger: SyncTrigger,
    /// Queued mutations accepted by the backend
    pub flushed: usize,
    /// Queued mutations the backend refused for good; dropped
    pub rejected: usize,
    /// Entities in the remote list
    pub fetched: usize,
    pub conflicts: Vec<ReconciliationConflict>,
    pub pending_remaining: usize,
    pub duration: Duration,
}

/// Result of asking for a sync cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// No connectivity; cache stands in
    Offline,
    /// The trigger's precondition did not hold (fresh cache, retry not due)
    Skipped,
    /// Another cycle was already running
    Coalesced,
    Failed { status: SyncStatus, error: RemoteError },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

#[derive(Debug, Default)]
struct FlushStats {
    flushed: usize,
    rejected: usize,
}

/// Sync cycle for one collection
pub struct CollectionSync<T: Entity> {
    store: Arc<EntityStore<T>>,
    queue: Arc<PendingQueue<T>>,
    remote: Arc<dyn RemoteCollection<T>>,
    network: NetworkMonitor,
    scheduler: SyncScheduler,
    /// Held for the whole cycle; `try_lock` failure means coalesce
    cycle: Mutex<()>,
    /// Serializes local optimistic changes with reconcile-and-replace
    apply: Mutex<()>,
    ledger: OptimisticLedger<T>,
    /// Bumped before every remote list request
    list_epoch: AtomicU64,
    state: RwLock<SyncState>,
    metrics: RwLock<SyncMetrics>,
}

impl<T: Entity> std::fmt::Debug for CollectionSync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionSync").field("kind", &T::KIND).finish()
    }
}

impl<T: Entity> CollectionSync<T> {
    pub fn new(
        store: Arc<EntityStore<T>>,
        queue: Arc<PendingQueue<T>>,
        remote: Arc<dyn RemoteCollection<T>>,
        network: NetworkMonitor,
        scheduler: SyncScheduler,
    ) -> Self {
        Self {
            store,
            queue,
            remote,
            network,
            scheduler,
            cycle: Mutex::new(()),
            apply: Mutex::new(()),
            ledger: OptimisticLedger::new(),
            list_epoch: AtomicU64::new(0),
            state: RwLock::new(SyncState::default()),
            metrics: RwLock::new(SyncMetrics::new()),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore<T>> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<PendingQueue<T>> {
        &self.queue
    }

    pub fn remote(&self) -> &Arc<dyn RemoteCollection<T>> {
        &self.remote
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn ledger(&self) -> &OptimisticLedger<T> {
        &self.ledger
    }

    /// Hold while changing the store outside a cycle so a concurrent
    /// reconcile never sees half of the change
    pub(crate) async fn lock_apply(&self) -> MutexGuard<'_, ()> {
        self.apply.lock().await
    }

    /// Record that the backend accepted optimistic write `op`, adopting
    /// the server id when it differs from the local one
    pub(crate) async fn confirm_write(&self, op: Uuid, local_id: &str, stored_id: &str) {
        let _apply = self.apply.lock().await;
        if stored_id != local_id {
            self.rekey(local_id, stored_id).await;
        }
        self.ledger.confirm(op, self.list_epoch.load(Ordering::SeqCst)).await;
    }

    pub async fn state(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn next_retry_at(&self) -> Option<Instant> {
        self.state.read().await.next_retry_at
    }

    /// Run a cycle for `user_id` unless the trigger's precondition fails or a
    /// cycle is already running.
    pub async fn sync(&self, user_id: &str, trigger: SyncTrigger) -> SyncOutcome {
        let stale = self.store.is_stale(Utc::now(), self.scheduler.stale_after());
        {
            let state = self.state.read().await;
            if !self.scheduler.should_sync(trigger, stale, &state, Instant::now()) {
                tracing::debug!("{} sync skipped for {}", T::KIND, trigger);
                return SyncOutcome::Skipped;
            }
        }

        let _cycle = match self.cycle.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("{} sync already running; {} coalesced", T::KIND, trigger);
                self.metrics.write().await.record_coalesced();
                return SyncOutcome::Coalesced;
            }
        };
        self.run_cycle(user_id, trigger).await
    }

    async fn run_cycle(&self, user_id: &str, trigger: SyncTrigger) -> SyncOutcome {
        if !self.network.is_online() {
            tracing::debug!("{} sync ({}) offline; serving cache", T::KIND, trigger);
            self.state.write().await.went_offline();
            self.store.set_sync_status(SyncStatus::Offline);
            return SyncOutcome::Offline;
        }

        tracing::info!("{} sync started ({})", T::KIND, trigger);
        let started = Instant::now();
        self.state.write().await.begin();
        self.store.set_sync_status(SyncStatus::Syncing);
        self.metrics.write().await.record_sync_start();

        let stats = match self.flush_queue().await {
            Ok(stats) => stats,
            Err(e) => return self.fail(e).await,
        };

        let list_epoch = self.list_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let remote = match self.remote.list(user_id).await {
            Ok(remote) => remote,
            Err(e) => return self.fail(e).await,
        };
        let fetched = remote.len();

        let (pending, conflicts) = {
            let _apply = self.apply.lock().await;
            let pending = self.queue.snapshot().await;
            let in_flight = self.ledger.overlay(list_epoch).await;
            let ReconciliationResult {
                entities,
                conflicts,
                pending_applied,
            } = reconcile(remote, &pending, &in_flight);
            if pending_applied > 0 {
                tracing::debug!("Re-applied {} local {} writes over the remote list", pending_applied, T::KIND);
            }
            if let Err(e) = self.store.set_items(entities).await {
                tracing::warn!("Synced {} kept in memory only: {}", T::KIND, e);
            }
            (pending, conflicts)
        };
        let now = Utc::now();
        if let Err(e) = self.store.mark_synced(now).await {
            tracing::warn!("Failed to persist {} sync time: {}", T::KIND, e);
        }

        self.state.write().await.succeed(now, pending.len());
        self.store.set_sync_status(SyncStatus::Synced);
        self.metrics.write().await.record_sync_success(stats.flushed);

        let report = SyncReport {
            kind: T::KIND,
            trigger,
            flushed: stats.flushed,
            rejected: stats.rejected,
            fetched,
            conflicts,
            pending_remaining: pending.len(),
            duration: started.elapsed(),
        };
        tracing::info!(
            "{} sync finished: {} flushed, {} fetched, {} still pending",
            T::KIND,
            report.flushed,
            report.fetched,
            report.pending_remaining
        );
        SyncOutcome::Completed(report)
    }

    async fn fail(&self, error: RemoteError) -> SyncOutcome {
        let status = if self.network.is_online() {
            SyncStatus::Error
        } else {
            SyncStatus::Offline
        };

        let retry_at = {
            let mut state = self.state.write().await;
            state.fail(status, error.to_string());
            self.scheduler.schedule_retry(&mut state, Instant::now())
        };
        self.store.set_sync_status(status);
        self.metrics.write().await.record_sync_failure();

        match retry_at {
            Some(at) => tracing::warn!(
                "{} sync failed ({}); retrying in {:?}",
                T::KIND,
                error,
                at.saturating_duration_since(Instant::now())
            ),
            None => tracing::error!(
                "{} sync failed ({}); automatic retries exhausted",
                T::KIND,
                error
            ),
        }
        SyncOutcome::Failed { status, error }
    }

    /// Push queued mutations oldest first. Stops at the first transient failure
    /// so ordering is preserved.
    async fn flush_queue(&self) -> Result<FlushStats, RemoteError> {
        let mut stats = FlushStats::default();
        while let Some(entry) = self.queue.front().await {
            match self.flush_entry(&entry).await {
                Ok(final_id) => {
                    stats.flushed += 1;
                    if let Err(e) = self.queue.settle(&entry, &final_id).await {
                        tracing::warn!("Failed to persist {} queue: {}", T::KIND, e);
                    }
                }
                Err(e) if is_permanent(&e) => {
                    tracing::warn!(
                        "Dropping queued {} {} of {}: {}",
                        T::KIND,
                        entry.mutation.label(),
                        entry.mutation.entity_id(),
                        e
                    );
                    stats.rejected += 1;
                    if let Err(e) = self.queue.complete(entry.id).await {
                        tracing::warn!("Failed to persist {} queue: {}", T::KIND, e);
                    }
                }
                Err(e) => {
                    if let Err(storage) = self.queue.record_failure(entry.id, e.to_string()).await {
                        tracing::warn!("Failed to persist {} queue: {}", T::KIND, storage);
                    }
                    return Err(e);
                }
            }
        }
        Ok(stats)
    }

    /// Returns the entity id as known to the backend
    async fn flush_entry(&self, entry: &QueuedMutation<T>) -> Result<String, RemoteError> {
        match &entry.mutation {
            Mutation::Create { entity } => {
                let stored = self.remote.create(entity).await?;
                if stored.id() != entity.id() {
                    self.adopt_server_id(entity.id(), stored.id()).await;
                }
                Ok(stored.id().to_string())
            }
            Mutation::Update { entity } => {
                self.remote.update(entity).await?;
                Ok(entity.id().to_string())
            }
            Mutation::Delete { id } => match self.remote.delete(id).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => Ok(id.clone()),
                Err(e) => Err(e),
            },
        }
    }

    /// Replace a locally generated id with the one the backend assigned
    pub(crate) async fn adopt_server_id(&self, local_id: &str, server_id: &str) {
        let _apply = self.apply.lock().await;
        self.rekey(local_id, server_id).await;
    }

    async fn rekey(&self, local_id: &str, server_id: &str) {
        tracing::debug!("{} {} is {} on the server", T::KIND, local_id, server_id);
        if let Some(mut local) = self.store.get(local_id) {
            local.set_id(server_id.to_string());
            if let Err(e) = self.store.rekey(local_id, local).await {
                tracing::warn!("Failed to persist {} id change: {}", T::KIND, e);
            }
        }
        if let Err(e) = self.queue.rewrite_id(local_id, server_id).await {
            tracing::warn!("Failed to persist {} queue: {}", T::KIND, e);
        }
        self.ledger.rekey(local_id, server_id).await;
    }
}

/// The backend will never accept this mutation, retrying is pointless
fn is_permanent(error: &RemoteError) -> bool {
    match error {
        RemoteError::NotFound(_) => true,
        RemoteError::Server { status, .. } => (400..500).contains(status) && *status != 408 && *status != 429,
        RemoteError::Network(_) | RemoteError::Decode(_) => false,
    }
}

/// Outcomes of one trigger across both collections
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    pub items: SyncOutcome,
    pub outfits: SyncOutcome,
}

struct BackgroundTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Drives both collections and owns the background task
pub struct SyncEngine {
    items: Arc<CollectionSync<WardrobeItem>>,
    outfits: Arc<CollectionSync<Outfit>>,
    network: NetworkMonitor,
    user: Arc<RwLock<Option<String>>>,
    background: Mutex<Option<BackgroundTask>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("network", &self.network.get_status())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        items: Arc<CollectionSync<WardrobeItem>>,
        outfits: Arc<CollectionSync<Outfit>>,
        network: NetworkMonitor,
    ) -> Self {
        Self {
            items,
            outfits,
            network,
            user: Arc::new(RwLock::new(None)),
            background: Mutex::new(None),
        }
    }

    pub fn items(&self) -> &Arc<CollectionSync<WardrobeItem>> {
        &self.items
    }

    pub fn outfits(&self) -> &Arc<CollectionSync<Outfit>> {
        &self.outfits
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Set the user whose collections are synced
    pub async fn set_user(&self, user_id: impl Into<String>) {
        *self.user.write().await = Some(user_id.into());
    }

    pub async fn clear_user(&self) {
        *self.user.write().await = None;
    }

    pub async fn user(&self) -> Option<String> {
        self.user.read().await.clone()
    }

    /// Run `trigger` against both collections concurrently. `None` when no
    /// user is signed in.
    pub async fn trigger(&self, trigger: SyncTrigger) -> Option<EngineOutcome> {
        let user = self.user().await?;
        Some(run_both(&self.items, &self.outfits, &user, trigger).await)
    }

    pub async fn is_running(&self) -> bool {
        self.background.lock().await.is_some()
    }

    /// Start the background task: reconnects fire `Reconnected`, retry
    /// deadlines fire `Retry`.
    pub async fn start(&self) {
        let mut background = self.background.lock().await;
        if background.is_some() {
            tracing::debug!("Sync engine already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(background_loop(
            self.items.clone(),
            self.outfits.clone(),
            self.network.subscribe(),
            self.user.clone(),
            shutdown_rx,
        ));
        *background = Some(BackgroundTask { handle, shutdown });
        tracing::info!("Sync engine started");
    }

    /// Stop the background task and wait for it to exit
    pub async fn stop(&self) {
        let task = self.background.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!("Sync task ended abnormally: {}", e);
            }
            tracing::info!("Sync engine stopped");
        }
    }
}

async fn run_both(
    items: &CollectionSync<WardrobeItem>,
    outfits: &CollectionSync<Outfit>,
    user: &str,
    trigger: SyncTrigger,
) -> EngineOutcome {
    let (items, outfits) = tokio::join!(items.sync(user, trigger), outfits.sync(user, trigger));
    EngineOutcome { items, outfits }
}

async fn background_loop(
    items: Arc<CollectionSync<WardrobeItem>>,
    outfits: Arc<CollectionSync<Outfit>>,
    mut network: watch::Receiver<NetworkStatus>,
    user: Arc<RwLock<Option<String>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_status = *network.borrow_and_update();
    loop {
        let deadline = match (items.next_retry_at().await, outfits.next_retry_at().await) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let trigger = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            changed = network.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *network.borrow_and_update();
                let reconnected = !last_status.is_online() && status.is_online();
                last_status = status;
                if !reconnected {
                    continue;
                }
                SyncTrigger::Reconnected
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                SyncTrigger::Retry
            }
        };

        let user = user.read().await.clone();
        match user {
            Some(user) => {
                tracing::debug!("Background sync: {}", trigger);
                run_both(&items, &outfits, &user, trigger).await;
            }
            None => tracing::debug!("Background {} ignored; no user", trigger),
        }
    }
    tracing::debug!("Sync task exiting");
}
