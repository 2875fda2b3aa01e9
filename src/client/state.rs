use crate::client::api::RemoteCollection;
use crate::client::batch::{BatchCoordinator, BatchIngestor};
use crate::client::capture::{Cart, CaptureController};
use crate::client::local_db::{KeyValueStore, StorageError};
use crate::client::offline::{EntityService, OfflineService, PendingQueue, RetryPolicy};
use crate::client::store::{ItemStore, OutfitStore};
use crate::client::sync::{CollectionSync, EngineOutcome, NetworkMonitor, SyncEngine, SyncScheduler, SyncTrigger};
use crate::shared::config::AppConfig;
use crate::shared::wardrobe::{Outfit, WardrobeItem};
use std::sync::Arc;

/// Everything the app needs, wired together and hydrated. Components get
/// handles from here instead of reaching for globals.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub network: NetworkMonitor,
    pub items: Arc<ItemStore>,
    pub outfits: Arc<OutfitStore>,
    pub service: OfflineService,
    pub sync: Arc<SyncEngine>,
    pub capture: Arc<CaptureController>,
    pub cart: Arc<Cart>,
    pub batch: Arc<BatchCoordinator>,
    pub ingestor: BatchIngestor,
}

impl AppState {
    /// Wire and hydrate with connectivity assumed online
    pub async fn initialize<B>(config: AppConfig, storage: Arc<dyn KeyValueStore>, backend: Arc<B>) -> Result<Self, StorageError>
    where
        B: RemoteCollection<WardrobeItem> + RemoteCollection<Outfit> + 'static,
    {
        Self::initialize_with_network(config, storage, backend, NetworkMonitor::default()).await
    }

    /// Wire and hydrate. Every persisted collection is loaded before this
    /// returns, so the first read already sees cached data.
    pub async fn initialize_with_network<B>(
        config: AppConfig,
        storage: Arc<dyn KeyValueStore>,
        backend: Arc<B>,
        network: NetworkMonitor,
    ) -> Result<Self, StorageError>
    where
        B: RemoteCollection<WardrobeItem> + RemoteCollection<Outfit> + 'static,
    {
        let items = Arc::new(ItemStore::new(storage.clone()));
        let outfits = Arc::new(OutfitStore::new(storage.clone()));
        let item_queue = Arc::new(PendingQueue::<WardrobeItem>::new(storage.clone()));
        let outfit_queue = Arc::new(PendingQueue::<Outfit>::new(storage.clone()));
        let cart = Arc::new(Cart::new(storage.clone()));
        let batch = Arc::new(BatchCoordinator::new(storage));

        let item_count = items.load().await?;
        let outfit_count = outfits.load().await?;
        let pending = item_queue.load().await? + outfit_queue.load().await?;
        let cart_count = cart.load().await?;
        let batch_left = batch.load().await?;
        tracing::info!(
            "Hydrated {} items, {} outfits, {} pending writes, {} cart entries, {} batch entries left",
            item_count,
            outfit_count,
            pending,
            cart_count,
            batch_left
        );

        let scheduler = SyncScheduler::new(RetryPolicy::from_settings(&config.retry), config.stale_after);
        let item_remote: Arc<dyn RemoteCollection<WardrobeItem>> = backend.clone();
        let outfit_remote: Arc<dyn RemoteCollection<Outfit>> = backend;

        let item_sync = Arc::new(CollectionSync::new(
            items.clone(),
            item_queue,
            item_remote,
            network.clone(),
            scheduler.clone(),
        ));
        let outfit_sync = Arc::new(CollectionSync::new(
            outfits.clone(),
            outfit_queue,
            outfit_remote,
            network.clone(),
            scheduler,
        ));

        let item_service = Arc::new(EntityService::new(item_sync.clone()));
        let outfit_service = Arc::new(EntityService::new(outfit_sync.clone()));
        let service = OfflineService::new(item_service.clone(), outfit_service, network.clone());
        let sync = Arc::new(SyncEngine::new(item_sync, outfit_sync, network.clone()));

        let capture = Arc::new(CaptureController::new(cart.clone(), config.detection_timeout));
        let ingestor = BatchIngestor::new(batch.clone(), item_service, cart.clone());

        Ok(Self {
            config,
            network,
            items,
            outfits,
            service,
            sync,
            capture,
            cart,
            batch,
            ingestor,
        })
    }

    /// Attach `user_id`, start background sync and run the startup cycle
    pub async fn sign_in(&self, user_id: &str) -> Option<EngineOutcome> {
        self.sync.set_user(user_id).await;
        self.sync.start().await;
        self.sync.trigger(SyncTrigger::Startup).await
    }

    pub async fn sign_out(&self) {
        self.sync.stop().await;
        self.sync.clear_user().await;
    }

    /// Turn the gallery selection into a batch and start it
    pub async fn add_selection_now(&self) -> usize {
        let entries = self.capture.add_now();
        self.batch.start(entries, false).await
    }

    /// Start a batch over the cart entries with `ids`, or the whole cart
    pub async fn start_cart_batch(&self, ids: Option<&[String]>) -> usize {
        let entries = self
            .cart
            .items()
            .await
            .into_iter()
            .filter(|entry| ids.map_or(true, |ids| ids.contains(&entry.id)))
            .collect();
        self.batch.start(entries, true).await
    }
}
