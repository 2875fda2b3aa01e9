//! # Shopping Capture Pipeline
//!
//! Finds product photos on an embedded shopping page and hands the user's
//! pick to the cart or the batch ingestion queue.
//!
//! ```text
//! page script -> PageMessage -> CaptureSession -> Gallery -> { add now | cart }
//!                                              \-> manual crop
//! ```
//!
//! The page runs in a separate context; the only thing crossing the boundary
//! is a JSON message, parsed by [`PageMessage::parse`]. A scan that gets no
//! answer within the detection timeout ends as "zero results".
//!
//! ## Key Components
//!
//! - `scan.rs`: session state machine with the scan generation counter
//! - `heuristics.rs`: product-photo acceptance rules and image ids
//! - `gallery.rs`: deduplicated results and selection
//! - `cart.rs`: persisted cart
//! - `crop.rs`: manual crop fallback

pub mod cart;
pub mod crop;
pub mod gallery;
pub mod heuristics;
pub mod scan;

pub use cart::{Cart, CartItem};
pub use crop::{CropError, CropRect, ManualCrop, Screenshot};
pub use gallery::{dedup_images, Gallery};
pub use heuristics::{image_id, CandidateHeuristics, Verdict};
pub use scan::{same_page, CaptureSession, EmptyReason, ScanEvent, ScanState};

use crate::client::local_db::StorageError;
use crate::shared::capture::{DetectedImage, PageMessage};
use crate::shared::wardrobe::{Color, ItemMetadata, ItemSource, NewItem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Page an image was captured from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePage {
    pub url: String,
    pub name: Option<String>,
}

impl SourcePage {
    pub fn new(url: impl Into<String>, name: Option<impl Into<String>>) -> Self {
        Self {
            url: url.into(),
            name: name.map(Into::into),
        }
    }
}

/// Prefilled input for the Add-Item workflow
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub image_uri: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub source: ItemSource,
    /// Region of `image_uri` to keep, when cropped by hand
    pub crop: Option<CropRect>,
}

impl ItemDraft {
    /// Complete the draft with the colors the user picked
    pub fn into_new_item(self, colors: Vec<Color>) -> NewItem {
        let mut metadata = ItemMetadata {
            source: Some(self.source),
            ..ItemMetadata::default()
        };
        if let Some(crop) = self.crop {
            if let Ok(value) = serde_json::to_value(crop) {
                metadata.extra.insert("crop".to_string(), value);
            }
        }
        NewItem {
            title: self.title.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            colors,
            image_uri: Some(self.image_uri),
            metadata,
            ..NewItem::default()
        }
    }
}

/// Channel to the embedded page
#[async_trait]
pub trait PageBridge: Send + Sync {
    /// Inject the detection script for scan `scan_id` and return the raw
    /// message the page posts back
    async fn detect(&self, scan_id: u64) -> Result<String, String>;
}

/// Async driver around [`CaptureSession`]
pub struct CaptureController {
    session: Mutex<CaptureSession>,
    cart: Arc<Cart>,
    detection_timeout: Duration,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("detection_timeout", &self.detection_timeout)
            .finish_non_exhaustive()
    }
}

impl CaptureController {
    pub fn new(cart: Arc<Cart>, detection_timeout: Duration) -> Self {
        Self::with_heuristics(cart, detection_timeout, CandidateHeuristics::default())
    }

    pub fn with_heuristics(cart: Arc<Cart>, detection_timeout: Duration, heuristics: CandidateHeuristics) -> Self {
        Self {
            session: Mutex::new(CaptureSession::new(heuristics)),
            cart,
            detection_timeout,
        }
    }

    fn session(&self) -> MutexGuard<'_, CaptureSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the session under its lock
    pub fn with_session<R>(&self, f: impl FnOnce(&CaptureSession) -> R) -> R {
        f(&self.session())
    }

    pub fn state(&self) -> ScanState {
        self.session().state().clone()
    }

    pub fn detected_images(&self) -> Vec<DetectedImage> {
        self.session().detected_images().to_vec()
    }

    pub fn cart(&self) -> &Arc<Cart> {
        &self.cart
    }

    pub fn detection_timeout(&self) -> Duration {
        self.detection_timeout
    }

    pub fn begin_scan(&self) -> u64 {
        self.session().begin_scan()
    }

    /// Raw message posted by the page
    pub fn on_page_message(&self, raw: &str) -> ScanEvent {
        self.session().on_message(PageMessage::parse(raw))
    }

    pub fn on_timeout(&self, generation: u64) -> bool {
        self.session().on_timeout(generation)
    }

    /// Fire the safety timeout for `generation` after the detection timeout
    pub fn arm_timeout(self: &Arc<Self>, generation: u64) -> JoinHandle<bool> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(controller.detection_timeout).await;
            controller.on_timeout(generation)
        })
    }

    /// Run one detection pass through `bridge`, racing the page against the
    /// detection timeout
    pub async fn run_scan(&self, bridge: &dyn PageBridge) -> ScanEvent {
        let generation = self.begin_scan();
        match tokio::time::timeout(self.detection_timeout, bridge.detect(generation)).await {
            Ok(Ok(raw)) => self.session().apply(generation, PageMessage::parse(&raw)),
            Ok(Err(e)) => self.session().apply(generation, PageMessage::empty(e)),
            Err(_) => {
                if self.on_timeout(generation) {
                    ScanEvent::Empty(EmptyReason::TimedOut)
                } else {
                    ScanEvent::Ignored
                }
            }
        }
    }

    pub fn navigate(&self, url: &str, name: Option<String>) -> bool {
        self.session().navigate(url, name)
    }

    pub fn open_gallery(&self) -> bool {
        self.session().open_gallery()
    }

    pub fn close_gallery(&self) {
        self.session().close_gallery()
    }

    pub fn toggle_selection(&self, id: &str) -> bool {
        self.session().toggle_selection(id)
    }

    pub fn select_all(&self) {
        self.session().select_all()
    }

    pub fn clear_selection(&self) {
        self.session().clear_selection()
    }

    /// Selected images as batch entries; the gallery closes
    pub fn add_now(&self) -> Vec<CartItem> {
        self.session().add_now()
    }

    /// Put the selected images in the cart; the gallery closes
    pub async fn add_to_cart(&self) -> Result<Vec<CartItem>, StorageError> {
        let (images, page) = self.session().take_selection();
        if images.is_empty() {
            return Ok(Vec::new());
        }
        self.cart.add(images, &page).await
    }

    pub fn start_manual_crop(&self, screenshot: Screenshot) -> Result<(), CropError> {
        self.session().start_manual_crop(screenshot)
    }

    pub fn set_crop_rect(&self, rect: CropRect) -> Result<CropRect, CropError> {
        self.session().set_crop_rect(rect)
    }

    pub fn finish_crop(&self) -> Result<ItemDraft, CropError> {
        self.session().finish_crop()
    }

    pub fn cancel_crop(&self) {
        self.session().cancel_crop()
    }
}
