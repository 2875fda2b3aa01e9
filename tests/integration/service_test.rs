//! Offline-first service layer against an in-process backend

use crate::common::*;
use crate::{assert_completed, assert_err, assert_ids, assert_ok};
use wardrobe_core::client::api::RemoteError;
use wardrobe_core::client::offline::Confirmation;
use wardrobe_core::client::{SyncStatus, SyncTrigger};
use wardrobe_core::client::{Selection, ServiceError};
use wardrobe_core::shared::wardrobe::{ItemPatch, NewItem, NewOutfit};

#[tokio::test]
async fn test_create_is_visible_before_backend_answers() {
    let h = harness(true).await;
    let gate = h.backend.hold();

    let service = h.state.service.clone();
    let pending = tokio::spawn(async move { service.create_item(USER, new_item("Linen Shirt", "#f5f5dc")).await });

    gate.entered.notified().await;
    let cached = h.state.items.all();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].title, "Linen Shirt");

    h.backend.open();
    let receipt = assert_ok!(pending.await.unwrap());
    assert_eq!(receipt.confirmation, Confirmation::Confirmed);
    assert_eq!(h.backend.server_items().len(), 1);
    assert_eq!(h.state.service.items().in_flight().await, 0);
}

#[tokio::test]
async fn test_offline_create_is_queued_without_error() {
    let h = harness(false).await;

    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Red Jacket", "#ff0000")).await);

    assert_eq!(receipt.confirmation, Confirmation::Queued);
    assert!(h.state.items.contains(&receipt.entity.id));
    assert_eq!(h.state.service.items().queue().len().await, 1);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_red_jacket_created_offline_reaches_backend_on_reconnect() {
    let h = harness(false).await;

    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Red Jacket", "#ff0000")).await);
    let id = receipt.entity.id.clone();

    h.network.set_online(true);
    let outcome = h.state.sync.trigger(SyncTrigger::Reconnected).await.expect("user is set");
    let report = assert_completed!(outcome.items);

    assert_eq!(report.flushed, 1);
    assert_eq!(report.pending_remaining, 0);
    assert_ids!(h.backend.server_items(), [id.as_str()]);
    assert_ids!(h.state.items.all(), [id.as_str()]);
    assert_eq!(h.state.items.get(&id).unwrap().title, "Red Jacket");
    assert_eq!(h.state.items.sync_status(), SyncStatus::Synced);
    assert!(h.state.service.items().queue().is_empty().await);
}

#[tokio::test]
async fn test_offline_edits_to_one_item_coalesce_into_one_call() {
    let h = harness(false).await;

    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Red Jacket", "#ff0000")).await);
    let id = receipt.entity.id.clone();
    let patch = ItemPatch {
        title: Some("Red Wool Jacket".to_string()),
        ..Default::default()
    };
    assert_ok!(h.state.service.update_item(&id, &patch).await);
    assert_ok!(h.state.service.toggle_item_favorite(&id).await);
    assert_eq!(h.state.service.items().queue().len().await, 1);

    h.network.set_online(true);
    h.state.sync.trigger(SyncTrigger::Reconnected).await;

    assert_eq!(h.backend.call_count("create:items"), 1);
    assert_eq!(h.backend.call_count("update:items"), 0);
    let stored = &h.backend.server_items()[0];
    assert_eq!(stored.title, "Red Wool Jacket");
    assert!(stored.is_favorite);
}

#[tokio::test]
async fn test_created_then_deleted_offline_never_reaches_backend() {
    let h = harness(false).await;

    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Scarf", "#123")).await);
    assert_eq!(
        assert_ok!(h.state.service.delete_item(&receipt.entity.id).await),
        Confirmation::Queued
    );
    assert!(h.state.service.items().queue().is_empty().await);

    h.network.set_online(true);
    h.state.sync.trigger(SyncTrigger::Reconnected).await;
    assert_eq!(h.backend.call_count("create"), 0);
    assert!(h.state.items.is_empty());
}

#[tokio::test]
async fn test_validation_error_leaves_store_untouched() {
    let h = harness(true).await;

    let colorless = NewItem {
        colors: Vec::new(),
        ..new_item("Plain Tee", "#fff")
    };
    assert_err!(h.state.service.create_item(USER, colorless).await, ServiceError::Validation(_));

    let imageless = NewItem {
        image_uri: None,
        ..new_item("Plain Tee", "#fff")
    };
    assert_err!(h.state.service.create_item(USER, imageless).await, ServiceError::Validation(_));

    assert!(h.state.items.is_empty());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_update_is_rolled_back() {
    let h = harness_with(MockBackend::with_items(vec![item("i-1", "Denim Jacket")]), true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;
    h.backend.fail_id(
        "i-1",
        RemoteError::Server {
            status: 422,
            message: "invalid".to_string(),
        },
    );

    let patch = ItemPatch {
        title: Some("Leather Jacket".to_string()),
        ..Default::default()
    };
    let result = h.state.service.update_item("i-1", &patch).await;

    assert_err!(result, ServiceError::Server { status: 422, .. });
    assert_eq!(h.state.items.get("i-1").unwrap().title, "Denim Jacket");
    assert!(h.state.service.items().queue().is_empty().await);
    assert_eq!(h.state.service.items().in_flight().await, 0);
}

#[tokio::test]
async fn test_rejected_delete_reinserts_at_original_position() {
    let backend = MockBackend::with_items(vec![item("a", "A"), item("b", "B"), item("c", "C")]);
    let h = harness_with(backend, true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;
    h.backend.fail_id(
        "b",
        RemoteError::Server {
            status: 500,
            message: "boom".to_string(),
        },
    );

    assert_err!(h.state.service.delete_item("b").await, ServiceError::Server { status: 500, .. });
    assert_ids!(h.state.items.all(), ["a", "b", "c"]);
}

#[tokio::test]
async fn test_transport_failure_while_online_queues_and_reports() {
    let h = harness(true).await;
    h.backend.set_unreachable(true);

    let result = h.state.service.create_item(USER, new_item("Boots", "#3b2f2f")).await;

    assert_err!(result, ServiceError::Network { .. });
    assert_eq!(h.state.items.len(), 1);
    assert_eq!(h.state.service.items().queue().len().await, 1);

    h.backend.set_unreachable(false);
    let outcome = h.state.sync.trigger(SyncTrigger::Manual).await.expect("user is set");
    assert_eq!(assert_completed!(outcome.items).flushed, 1);
    assert_eq!(h.backend.server_items().len(), 1);
}

#[tokio::test]
async fn test_batch_delete_restores_selection_to_failed_ids() {
    let ids = ["i-1", "i-2", "i-3", "i-4", "i-5"];
    let backend = MockBackend::with_items(ids.iter().map(|id| item(id, id)).collect());
    let h = harness_with(backend, true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;
    for failing in ["i-2", "i-4"] {
        h.backend.fail_id(
            failing,
            RemoteError::Server {
                status: 500,
                message: "boom".to_string(),
            },
        );
    }

    let mut selection = Selection::new();
    selection.select_all(ids);
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let result = h.state.service.delete_items(&ids, &mut selection).await;

    match result {
        Err(ServiceError::PartialBatchFailure { failed, attempted }) => {
            assert_eq!(failed, vec!["i-2".to_string(), "i-4".to_string()]);
            assert_eq!(attempted, 5);
        }
        other => panic!("Expected a partial batch failure, got: {:?}", other),
    }
    assert!(selection.is_active());
    assert_eq!(selection.len(), 2);
    assert!(selection.contains("i-2") && selection.contains("i-4"));
    assert_ids!(h.backend.server_items(), ["i-2", "i-4"]);
    assert_ids!(h.state.items.all(), ["i-2", "i-4"]);
}

#[tokio::test]
async fn test_batch_delete_offline_queues_everything() {
    let backend = MockBackend::with_items(vec![item("a", "A"), item("b", "B")]);
    let h = harness_with(backend, true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;
    h.network.set_online(false);

    let mut selection = Selection::new();
    selection.select_all(["a", "b"]);
    let ids = vec!["a".to_string(), "b".to_string()];
    let report = assert_ok!(h.state.service.delete_items(&ids, &mut selection).await);

    assert_eq!(report.queued, ids);
    assert!(report.deleted.is_empty());
    assert!(!selection.is_active());
    assert!(selection.is_empty());
    assert!(h.state.items.is_empty());
    assert_eq!(h.state.service.items().queue().len().await, 2);
}

#[tokio::test]
async fn test_cached_read_offline_has_no_refresh() {
    let h = harness(false).await;
    assert_ok!(h.state.service.create_item(USER, new_item("Cap", "#000")).await);

    let read = h.state.service.get_user_items(USER);

    assert_eq!(read.entities.len(), 1);
    assert_eq!(h.state.items.sync_status(), SyncStatus::Offline);
    assert!(read.refreshed().await.is_none());
}

#[tokio::test]
async fn test_cached_read_online_refreshes_in_background() {
    let backend = MockBackend::with_items(vec![item("i-1", "Knit Sweater")]);
    let h = harness_with(backend, true).await;

    let read = h.state.service.get_user_items(USER);
    assert!(read.entities.is_empty());

    let outcome = read.refreshed().await.expect("refresh was started");
    assert_eq!(assert_completed!(outcome).fetched, 1);
    assert_ids!(h.state.items.all(), ["i-1"]);
}

#[tokio::test]
async fn test_load_drops_vanished_ids_from_selection() {
    let backend = MockBackend::with_items(vec![item("a", "A"), item("b", "B")]);
    let h = harness_with(backend, true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;

    let mut selection = Selection::new();
    selection.select_all(["a", "b"]);
    h.backend.remove_item("b");

    let outcome = h.state.service.load_items(USER, Some(&mut selection)).await;

    assert!(outcome.is_completed());
    assert_eq!(selection.ids(), vec!["a".to_string()]);
    assert!(selection.is_active());
}

#[tokio::test]
async fn test_duplicate_outfit_gets_new_id() {
    let h = harness(true).await;
    let created = assert_ok!(
        h.state
            .service
            .create_outfit(
                USER,
                NewOutfit {
                    name: "Weekend".to_string(),
                    item_ids: vec!["i-1".to_string()],
                    image_uri: Some("file:///photos/weekend.jpg".to_string()),
                    ..Default::default()
                },
            )
            .await
    );

    let copy = assert_ok!(h.state.service.duplicate_outfit(&created.entity.id).await);

    assert_ne!(copy.entity.id, created.entity.id);
    assert_eq!(copy.entity.item_ids, created.entity.item_ids);
    assert_eq!(copy.confirmation, Confirmation::Confirmed);
    assert_eq!(h.backend.server_outfits().len(), 2);
    assert_eq!(h.state.outfits.len(), 2);
}

#[tokio::test]
async fn test_server_assigned_id_replaces_local_id() {
    let h = harness(true).await;
    h.backend.assign_ids(true);

    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Raincoat", "#ffd700")).await);

    assert_eq!(receipt.entity.id, "srv-0");
    assert_ids!(h.state.items.all(), ["srv-0"]);
}
