//! Rehydration from the SQLite-backed store

use crate::assert_ok;
use crate::common::*;
use std::sync::Arc;
use wardrobe_core::client::local_db::KeyValueStore;
use wardrobe_core::client::{AppState, LocalDatabase, SyncTrigger};

async fn open_state(path: &std::path::Path, backend: Arc<MockBackend>, online: bool) -> AppState {
    let database = assert_ok!(LocalDatabase::open(path).await);
    let storage: Arc<dyn KeyValueStore> = Arc::new(database);
    let network = wardrobe_core::client::NetworkMonitor::new(online);
    assert_ok!(AppState::initialize_with_network(test_config(), storage, backend, network).await)
}

#[tokio::test]
async fn test_offline_work_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wardrobe").join("local.db");
    let backend = Arc::new(MockBackend::with_items(vec![item("i-1", "Cardigan")]));

    let receipt = {
        let state = open_state(&path, backend.clone(), true).await;
        state.sync.set_user(USER).await;
        state.sync.trigger(SyncTrigger::Startup).await;
        state.network.set_online(false);
        assert_ok!(state.service.create_item(USER, new_item("Red Jacket", "#ff0000")).await)
    };

    let state = open_state(&path, backend.clone(), false).await;
    let cached = state.service.get_user_items(USER);
    let ids: Vec<_> = cached.entities.iter().map(|i| i.id.clone()).collect();
    assert!(ids.contains(&"i-1".to_string()));
    assert!(ids.contains(&receipt.entity.id));
    assert_eq!(state.service.items().queue().len().await, 1);
    assert!(state.items.last_synced_at().is_some());

    state.network.set_online(true);
    state.sync.set_user(USER).await;
    state.sync.trigger(SyncTrigger::Reconnected).await;
    assert_eq!(backend.server_items().len(), 2);
    assert!(state.service.items().queue().is_empty().await);
}
