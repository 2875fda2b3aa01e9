//! Sync engine cycles, scheduling and the background loop

use crate::common::*;
use crate::{assert_completed, assert_ids, assert_ok};
use assert_matches::assert_matches;
use std::time::Duration;
use wardrobe_core::client::api::RemoteError;
use wardrobe_core::client::offline::Confirmation;
use wardrobe_core::client::sync::SyncOutcome;
use wardrobe_core::client::{SyncStatus, SyncTrigger};
use wardrobe_core::shared::wardrobe::ItemPatch;

fn unavailable() -> RemoteError {
    RemoteError::Server {
        status: 503,
        message: "unavailable".to_string(),
    }
}

/// Poll `check` until it holds or about a second has passed
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_concurrent_cycle_is_coalesced() {
    let h = harness_with(MockBackend::with_items(vec![item("i-1", "Chinos")]), true).await;
    let gate = h.backend.hold();

    let items = h.state.sync.items().clone();
    let running = tokio::spawn(async move { items.sync(USER, SyncTrigger::PullToRefresh).await });
    gate.entered.notified().await;

    let second = h.state.sync.items().sync(USER, SyncTrigger::PullToRefresh).await;
    assert_eq!(second, SyncOutcome::Coalesced);

    h.backend.open();
    let first = running.await.unwrap();
    assert_eq!(assert_completed!(first).fetched, 1);
    assert_eq!(h.backend.call_count("list:items"), 1);
    assert_eq!(h.state.sync.items().metrics().await.coalesced_triggers, 1);
}

#[tokio::test]
async fn test_offline_cycle_serves_cache() {
    let h = harness(false).await;

    let outcome = h.state.sync.trigger(SyncTrigger::Startup).await.expect("user is set");

    assert_eq!(outcome.items, SyncOutcome::Offline);
    assert_eq!(outcome.outfits, SyncOutcome::Offline);
    assert_eq!(h.state.items.sync_status(), SyncStatus::Offline);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_no_cycle_without_signed_in_user() {
    let h = harness(true).await;
    h.state.sync.clear_user().await;

    assert!(h.state.sync.trigger(SyncTrigger::Manual).await.is_none());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_screen_focus_skips_fresh_cache() {
    let h = harness_with(MockBackend::with_items(vec![item("i-1", "Chinos")]), true).await;

    let first = h.state.sync.items().sync(USER, SyncTrigger::ScreenFocus).await;
    assert!(first.is_completed());

    let second = h.state.sync.items().sync(USER, SyncTrigger::ScreenFocus).await;
    assert_eq!(second, SyncOutcome::Skipped);

    let forced = h.state.sync.items().sync(USER, SyncTrigger::PullToRefresh).await;
    assert!(forced.is_completed());
    assert_eq!(h.backend.call_count("list:items"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_schedules_backoff_retry() {
    let h = harness(true).await;
    h.backend.fail_list(unavailable());
    let items = h.state.sync.items();

    let outcome = items.sync(USER, SyncTrigger::Manual).await;
    match outcome {
        SyncOutcome::Failed { status, error } => {
            assert_eq!(status, SyncStatus::Error);
            assert_eq!(error, unavailable());
        }
        other => panic!("Expected a failed cycle, got: {:?}", other),
    }
    let state = items.state().await;
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_error.is_some());
    assert!(items.next_retry_at().await.is_some());
    assert_eq!(h.state.items.sync_status(), SyncStatus::Error);

    assert_eq!(items.sync(USER, SyncTrigger::Retry).await, SyncOutcome::Skipped);

    tokio::time::advance(Duration::from_millis(200)).await;
    h.backend.clear_failures();
    let retried = items.sync(USER, SyncTrigger::Retry).await;
    assert!(retried.is_completed());
    assert_eq!(items.state().await.consecutive_failures, 0);
    assert!(items.next_retry_at().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_after_max_attempts() {
    let h = harness(true).await;
    h.backend.fail_list(unavailable());
    let items = h.state.sync.items();

    for _ in 0..3 {
        let outcome = items.sync(USER, SyncTrigger::Manual).await;
        assert_matches!(outcome, SyncOutcome::Failed { .. });
    }

    assert_eq!(items.state().await.consecutive_failures, 3);
    assert!(items.next_retry_at().await.is_none());
}

#[tokio::test]
async fn test_flush_stops_at_transient_failure_and_keeps_order() {
    let h = harness(false).await;
    let first = assert_ok!(h.state.service.create_item(USER, new_item("Parka", "#222")).await);
    let second = assert_ok!(h.state.service.create_item(USER, new_item("Beanie", "#444")).await);
    h.backend.fail_id(&first.entity.id, RemoteError::Network("reset".to_string()));

    h.network.set_online(true);
    let outcome = h.state.sync.items().sync(USER, SyncTrigger::Reconnected).await;

    assert_matches!(outcome, SyncOutcome::Failed { status: SyncStatus::Error, .. });
    assert_eq!(h.state.service.items().queue().len().await, 2);
    assert!(h.backend.server_items().is_empty());
    let head = h.state.service.items().queue().front().await.unwrap();
    assert_eq!(head.mutation.entity_id(), first.entity.id);
    assert_eq!(head.attempts, 1);

    h.backend.clear_failures();
    let outcome = h.state.sync.items().sync(USER, SyncTrigger::Manual).await;
    assert_eq!(assert_completed!(outcome).flushed, 2);
    assert_ids!(h.backend.server_items(), [first.entity.id.as_str(), second.entity.id.as_str()]);
}

#[tokio::test]
async fn test_permanently_rejected_mutation_is_dropped() {
    let h = harness(false).await;
    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Odd Sock", "#abc")).await);
    h.backend.fail_id(
        &receipt.entity.id,
        RemoteError::Server {
            status: 400,
            message: "bad request".to_string(),
        },
    );

    h.network.set_online(true);
    let outcome = h.state.sync.items().sync(USER, SyncTrigger::Reconnected).await;

    let report = assert_completed!(outcome);
    assert_eq!(report.flushed, 0);
    assert_eq!(report.rejected, 1);
    assert!(h.state.service.items().queue().is_empty().await);
    assert!(h.state.items.is_empty());
}

#[tokio::test]
async fn test_queued_create_adopts_server_id() {
    let h = harness(false).await;
    h.backend.assign_ids(true);
    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Trench", "#c2b280")).await);
    let patch = wardrobe_core::shared::wardrobe::ItemPatch {
        brand: Some(Some("Acme".to_string())),
        ..Default::default()
    };
    assert_ok!(h.state.service.update_item(&receipt.entity.id, &patch).await);

    h.network.set_online(true);
    h.state.sync.trigger(SyncTrigger::Reconnected).await;

    assert_ids!(h.state.items.all(), ["srv-0"]);
    assert!(h.state.items.get(&receipt.entity.id).is_none());
    assert_eq!(h.backend.server_items()[0].brand.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_remote_changes_replace_cache() {
    let h = harness_with(MockBackend::with_items(vec![item("a", "A"), item("b", "B")]), true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;

    h.backend.remove_item("a");
    h.backend.put_item(item("c", "C"));
    h.state.sync.trigger(SyncTrigger::PullToRefresh).await;

    assert_ids!(h.state.items.all(), ["b", "c"]);
    assert!(h.state.items.last_synced_at().is_some());
}

#[tokio::test]
async fn test_background_loop_flushes_on_reconnect() {
    let h = harness(false).await;
    let receipt = assert_ok!(h.state.service.create_item(USER, new_item("Red Jacket", "#ff0000")).await);
    h.state.sync.start().await;
    assert!(h.state.sync.is_running().await);

    h.network.set_online(true);

    let backend = h.backend.clone();
    assert!(eventually(|| !backend.server_items().is_empty()).await);
    assert_ids!(h.backend.server_items(), [receipt.entity.id.as_str()]);

    h.state.sync.stop().await;
    assert!(!h.state.sync.is_running().await);
}

#[tokio::test]
async fn test_background_loop_retries_after_failure() {
    let h = harness(true).await;
    h.backend.put_item(item("i-1", "Loafers"));
    h.backend.fail_list(unavailable());
    h.state.sync.trigger(SyncTrigger::Startup).await;
    assert!(h.state.items.is_empty());

    h.state.sync.start().await;
    h.backend.clear_failures();

    let items = h.state.items.clone();
    assert!(eventually(|| items.len() == 1).await);
    h.state.sync.stop().await;
}

#[tokio::test]
async fn test_sign_in_runs_startup_cycle() {
    let h = harness_with(MockBackend::with_items(vec![item("i-1", "Loafers")]), true).await;

    let outcome = h.state.sign_in(USER).await.expect("user is set");

    assert!(outcome.items.is_completed());
    assert!(outcome.outfits.is_completed());
    assert_eq!(h.state.items.len(), 1);
    h.state.sign_out().await;
    assert!(h.state.sync.user().await.is_none());
}

#[tokio::test]
async fn test_refresh_during_in_flight_create_keeps_optimistic_item() {
    let h = harness(true).await;
    let gate = h.backend.hold_only("create");

    let service = h.state.service.clone();
    let pending = tokio::spawn(async move { service.create_item(USER, new_item("Silk Scarf", "#800080")).await });
    gate.entered.notified().await;

    let outcome = h.state.sync.items().sync(USER, SyncTrigger::PullToRefresh).await;
    assert_eq!(assert_completed!(outcome).fetched, 0);
    assert_eq!(h.state.items.len(), 1);

    h.backend.open();
    let receipt = assert_ok!(pending.await.unwrap());
    assert_eq!(receipt.confirmation, Confirmation::Confirmed);
    assert!(h.state.items.contains(&receipt.entity.id));
    assert_eq!(h.state.service.items().in_flight().await, 0);

    let outcome = h.state.sync.items().sync(USER, SyncTrigger::PullToRefresh).await;
    assert_eq!(assert_completed!(outcome).fetched, 1);
    assert_ids!(h.state.items.all(), [receipt.entity.id.as_str()]);
}

#[tokio::test]
async fn test_refresh_during_in_flight_update_keeps_local_edit() {
    let h = harness_with(MockBackend::with_items(vec![item("i-1", "Chinos")]), true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;
    let gate = h.backend.hold_only("update");

    let service = h.state.service.clone();
    let patch = ItemPatch {
        title: Some("Slim Chinos".to_string()),
        ..Default::default()
    };
    let pending = tokio::spawn(async move { service.update_item("i-1", &patch).await });
    gate.entered.notified().await;

    let outcome = h.state.sync.items().sync(USER, SyncTrigger::PullToRefresh).await;
    assert!(outcome.is_completed());
    assert_eq!(h.state.items.get("i-1").unwrap().title, "Slim Chinos");

    h.backend.open();
    assert_ok!(pending.await.unwrap());
    assert_eq!(h.state.items.get("i-1").unwrap().title, "Slim Chinos");
    assert_eq!(h.backend.server_items()[0].title, "Slim Chinos");
}

#[tokio::test]
async fn test_refresh_during_in_flight_delete_keeps_item_removed() {
    let h = harness_with(MockBackend::with_items(vec![item("a", "A"), item("b", "B")]), true).await;
    h.state.sync.trigger(SyncTrigger::Startup).await;
    let gate = h.backend.hold_only("delete");

    let service = h.state.service.clone();
    let pending = tokio::spawn(async move { service.delete_item("a").await });
    gate.entered.notified().await;

    let outcome = h.state.sync.items().sync(USER, SyncTrigger::PullToRefresh).await;
    assert_eq!(assert_completed!(outcome).fetched, 2);
    assert_ids!(h.state.items.all(), ["b"]);

    h.backend.open();
    assert_eq!(assert_ok!(pending.await.unwrap()), Confirmation::Confirmed);
    assert_ids!(h.state.items.all(), ["b"]);
}
