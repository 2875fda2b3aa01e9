//! Capture pipeline: scans, stale results, gallery and cart

use crate::assert_ok;
use crate::common::*;
use assert_matches::assert_matches;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use wardrobe_core::client::capture::{CaptureController, CropRect, EmptyReason, PageBridge, ScanEvent, ScanState, Screenshot};

fn detected_message(scan_id: u64, urls: &[(&str, &str)]) -> String {
    let images: Vec<_> = urls
        .iter()
        .map(|(id, url)| serde_json::json!({ "id": id, "url": url, "width": 600, "height": 800 }))
        .collect();
    serde_json::json!({ "type": "IMAGES_DETECTED", "scanId": scan_id, "images": images }).to_string()
}

struct StaticPage(String);

#[async_trait]
impl PageBridge for StaticPage {
    async fn detect(&self, _scan_id: u64) -> Result<String, String> {
        Ok(self.0.clone())
    }
}

struct BrokenPage;

#[async_trait]
impl PageBridge for BrokenPage {
    async fn detect(&self, _scan_id: u64) -> Result<String, String> {
        Err("script injection failed".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_ends_scan_and_late_result_is_ignored() {
    let h = harness(true).await;
    let capture: Arc<CaptureController> = h.state.capture.clone();

    let generation = capture.begin_scan();
    let timer = capture.arm_timeout(generation);
    tokio::time::advance(Duration::from_millis(600)).await;

    assert!(timer.await.unwrap());
    assert_eq!(capture.state(), ScanState::Empty(EmptyReason::TimedOut));

    let late = capture.on_page_message(&detected_message(generation, &[("img_1", "https://cdn.example/1.jpg")]));
    assert_eq!(late, ScanEvent::Ignored);
    assert!(capture.detected_images().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timer_of_finished_scan_has_no_effect() {
    let h = harness(true).await;
    let capture = h.state.capture.clone();

    let generation = capture.begin_scan();
    let timer = capture.arm_timeout(generation);
    capture.on_page_message(&detected_message(generation, &[("img_1", "https://cdn.example/1.jpg")]));
    tokio::time::advance(Duration::from_millis(600)).await;

    assert!(!timer.await.unwrap());
    assert_eq!(capture.state(), ScanState::Detected);
}

#[tokio::test]
async fn test_result_of_superseded_scan_is_ignored() {
    let h = harness(true).await;
    let capture = &h.state.capture;

    let first = capture.begin_scan();
    let second = capture.begin_scan();

    assert_eq!(
        capture.on_page_message(&detected_message(first, &[("img_old", "https://cdn.example/old.jpg")])),
        ScanEvent::Ignored
    );
    assert_eq!(
        capture.on_page_message(&detected_message(second, &[("img_new", "https://cdn.example/new.jpg")])),
        ScanEvent::Detected { count: 1 }
    );
    assert_eq!(capture.detected_images()[0].id, "img_new");
}

#[tokio::test]
async fn test_images_sharing_a_url_are_shown_once() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    capture.navigate("https://shop.example/p/1", Some("Shop".to_string()));

    let generation = capture.begin_scan();
    let event = capture.on_page_message(&detected_message(
        generation,
        &[
            ("img_1", "https://cdn.example/coat.jpg"),
            ("img_2", "https://cdn.example/coat.jpg"),
            ("img_3", "https://cdn.example/scarf.jpg"),
        ],
    ));

    assert_eq!(event, ScanEvent::Detected { count: 2 });
    let ids: Vec<_> = capture.detected_images().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["img_1".to_string(), "img_3".to_string()]);
    assert!(capture.with_session(|s| s.is_gallery_open()));
}

#[tokio::test]
async fn test_navigation_interrupts_running_scan() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    assert!(!capture.navigate("https://shop.example/p/1", None));

    let generation = capture.begin_scan();
    assert!(!capture.navigate("https://shop.example/p/1#reviews", None));
    assert!(capture.navigate("https://shop.example/p/2", None));

    assert_eq!(capture.state(), ScanState::Empty(EmptyReason::Interrupted));
    assert_eq!(
        capture.on_page_message(&detected_message(generation, &[("img_1", "https://cdn.example/1.jpg")])),
        ScanEvent::Ignored
    );
}

#[tokio::test]
async fn test_run_scan_applies_heuristics_to_candidates() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    let page = StaticPage(
        serde_json::json!({
            "type": "IMAGE_CANDIDATES",
            "candidates": [
                { "src": "https://cdn.example/wool-coat.jpg", "width": 600, "height": 800, "alt": "Wool coat" },
                { "src": "https://cdn.example/logo.png", "width": 300, "height": 300 },
                { "src": "https://cdn.example/tiny.jpg", "width": 40, "height": 40 }
            ]
        })
        .to_string(),
    );

    let event = capture.run_scan(&page).await;

    assert_eq!(event, ScanEvent::Detected { count: 1 });
    let image = &capture.detected_images()[0];
    assert_eq!(image.url, "https://cdn.example/wool-coat.jpg");
    assert_eq!(image.category.as_deref(), Some("outerwear"));
}

#[tokio::test]
async fn test_bridge_failure_ends_scan_empty() {
    let h = harness(true).await;

    let event = h.state.capture.run_scan(&BrokenPage).await;

    assert_eq!(
        event,
        ScanEvent::Empty(EmptyReason::Failed("script injection failed".to_string()))
    );
}

#[tokio::test]
async fn test_malformed_message_is_treated_as_no_images() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    capture.begin_scan();

    let event = capture.on_page_message("{ this is not json");

    assert_matches!(event, ScanEvent::Empty(EmptyReason::Failed(_)));
}

#[tokio::test]
async fn test_selection_goes_to_cart_in_detection_order() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    capture.navigate("https://shop.example/p/1", Some("Shop".to_string()));
    let generation = capture.begin_scan();
    capture.on_page_message(&detected_message(
        generation,
        &[
            ("img_1", "https://cdn.example/1.jpg"),
            ("img_2", "https://cdn.example/2.jpg"),
            ("img_3", "https://cdn.example/3.jpg"),
        ],
    ));

    assert!(capture.toggle_selection("img_3"));
    assert!(capture.toggle_selection("img_1"));
    assert!(!capture.toggle_selection("img_missing"));
    let added = assert_ok!(capture.add_to_cart().await);

    let urls: Vec<_> = added.iter().map(|entry| entry.image.url.as_str()).collect();
    assert_eq!(urls, vec!["https://cdn.example/1.jpg", "https://cdn.example/3.jpg"]);
    assert_eq!(h.state.cart.len().await, 2);
    assert_eq!(added[0].source_name.as_deref(), Some("Shop"));
    assert!(!capture.with_session(|s| s.is_gallery_open()));
}

#[tokio::test]
async fn test_add_now_starts_a_batch_outside_the_cart() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    capture.navigate("https://shop.example/p/1", None);
    let generation = capture.begin_scan();
    capture.on_page_message(&detected_message(
        generation,
        &[("img_1", "https://cdn.example/1.jpg"), ("img_2", "https://cdn.example/2.jpg")],
    ));
    capture.select_all();

    assert_eq!(h.state.add_selection_now().await, 2);
    assert!(!h.state.batch.from_cart().await);
    assert!(h.state.cart.is_empty().await);
}

#[tokio::test]
async fn test_manual_crop_produces_draft() {
    let h = harness(true).await;
    let capture = &h.state.capture;
    capture.navigate("https://shop.example/p/9", Some("Shop".to_string()));

    assert_ok!(capture.start_manual_crop(Screenshot {
        uri: "file:///tmp/shot.png".to_string(),
        width: 1080,
        height: 1920,
    }));
    assert_eq!(capture.state(), ScanState::ManualCrop);
    assert_ok!(capture.set_crop_rect(CropRect::new(100, 200, 400, 600)));

    let draft = assert_ok!(capture.finish_crop());
    assert_eq!(draft.image_uri, "file:///tmp/shot.png");
    assert_eq!(draft.crop, Some(CropRect::new(100, 200, 400, 600)));
    assert_eq!(capture.state(), ScanState::Idle);
}
