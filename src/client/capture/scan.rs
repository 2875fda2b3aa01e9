//! Scan state machine.
//!
//! ```text
//! Idle -> Scanning -> { Detected | Empty } ; any -> ManualCrop
//! ```
//!
//! Every scan, reset and crop bumps the generation counter. A detection
//! message or timeout carrying an older generation is ignored, so a scan
//! resolves exactly once no matter how the page reply and the safety timer
//! interleave.

use super::cart::CartItem;
use super::crop::{CropError, CropRect, ManualCrop, Screenshot};
use super::gallery::Gallery;
use super::heuristics::CandidateHeuristics;
use super::{ItemDraft, SourcePage};
use crate::shared::capture::{DetectedImage, DetectionStats, PageMessage};
use chrono::Utc;
use reqwest::Url;

/// Why a scan produced nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    NoCandidates,
    /// The page did not answer within the safety window
    TimedOut,
    /// Navigation away from the page
    Interrupted,
    /// The page reported an error or sent something unreadable
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning { generation: u64 },
    Detected,
    Empty(EmptyReason),
    ManualCrop,
}

/// Effect of a page message on the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Detected { count: usize },
    Empty(EmptyReason),
    /// Stale or unexpected; nothing changed
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    state: ScanState,
    generation: u64,
    page: Option<SourcePage>,
    heuristics: CandidateHeuristics,
    gallery: Gallery,
    gallery_open: bool,
    crop: Option<ManualCrop>,
    stats: DetectionStats,
}

impl CaptureSession {
    pub fn new(heuristics: CandidateHeuristics) -> Self {
        Self {
            heuristics,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning { .. })
    }

    pub fn page(&self) -> Option<&SourcePage> {
        self.page.as_ref()
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn detected_images(&self) -> &[DetectedImage] {
        self.gallery.images()
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    pub fn is_gallery_open(&self) -> bool {
        self.gallery_open
    }

    /// Start a new detection pass; previous results are dropped
    pub fn begin_scan(&mut self) -> u64 {
        self.generation += 1;
        self.gallery = Gallery::default();
        self.gallery_open = false;
        self.crop = None;
        self.stats = DetectionStats::default();
        self.state = ScanState::Scanning {
            generation: self.generation,
        };
        tracing::debug!("Scan {} started", self.generation);
        self.generation
    }

    /// Apply a page message. Messages without a scan id are attributed to
    /// the current scan.
    pub fn on_message(&mut self, message: PageMessage) -> ScanEvent {
        let generation = message.scan_id().unwrap_or(self.generation);
        self.apply(generation, message)
    }

    /// Apply a page message produced for scan `generation`
    pub fn apply(&mut self, generation: u64, message: PageMessage) -> ScanEvent {
        if self.state != (ScanState::Scanning { generation }) {
            tracing::debug!(
                "Ignoring detection result for scan {} (current {}, {:?})",
                generation,
                self.generation,
                self.state
            );
            return ScanEvent::Ignored;
        }

        match message {
            PageMessage::ImagesDetected {
                images,
                stats,
                error,
                ..
            } => {
                self.stats = stats;
                match error {
                    Some(error) if images.is_empty() => {
                        tracing::warn!("Detection failed: {}", error);
                        self.finish_empty(EmptyReason::Failed(error))
                    }
                    _ => self.set_detected_images(images),
                }
            }
            PageMessage::ImageCandidates { candidates, .. } => {
                let mut counter = 0;
                let images = self.heuristics.detect(&candidates, &mut counter);
                self.stats = DetectionStats {
                    total_images: candidates.len() as u32,
                    candidates: candidates.len() as u32,
                    accepted: images.len() as u32,
                    duration_ms: None,
                };
                self.set_detected_images(images)
            }
        }
    }

    /// Replace the detected set with `images`, deduplicated by id and url
    pub fn set_detected_images(&mut self, images: Vec<DetectedImage>) -> ScanEvent {
        self.gallery = Gallery::new(images);
        if self.gallery.is_empty() {
            return self.finish_empty(EmptyReason::NoCandidates);
        }
        let count = self.gallery.images().len();
        tracing::info!("Detected {} product images", count);
        self.state = ScanState::Detected;
        self.gallery_open = true;
        ScanEvent::Detected { count }
    }

    fn finish_empty(&mut self, reason: EmptyReason) -> ScanEvent {
        self.gallery_open = false;
        self.state = ScanState::Empty(reason.clone());
        ScanEvent::Empty(reason)
    }

    /// Safety timer for scan `generation` fired. Returns whether it took effect.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        if self.state != (ScanState::Scanning { generation }) {
            return false;
        }
        tracing::info!("Scan {} timed out; offering manual crop", generation);
        self.finish_empty(EmptyReason::TimedOut);
        true
    }

    /// The embedded page navigated to `url`. Returns whether the scan state
    /// was reset. An open gallery and same-page navigations keep the results.
    pub fn navigate(&mut self, url: &str, name: Option<String>) -> bool {
        let same = self
            .page
            .as_ref()
            .is_some_and(|page| same_page(&page.url, url));
        if same {
            return false;
        }
        if self.gallery_open {
            tracing::debug!("Gallery open; keeping results across navigation");
            return false;
        }

        let previous = self.page.replace(SourcePage {
            url: url.to_string(),
            name,
        });
        if previous.is_none() {
            return false;
        }

        self.generation += 1;
        self.gallery = Gallery::default();
        self.crop = None;
        self.stats = DetectionStats::default();
        self.state = if self.is_scanning() {
            tracing::debug!("Navigation interrupted a scan");
            ScanState::Empty(EmptyReason::Interrupted)
        } else {
            ScanState::Idle
        };
        true
    }

    pub fn open_gallery(&mut self) -> bool {
        self.gallery_open = !self.gallery.is_empty();
        self.gallery_open
    }

    pub fn close_gallery(&mut self) {
        self.gallery_open = false;
    }

    pub fn toggle_selection(&mut self, id: &str) -> bool {
        self.gallery.toggle(id)
    }

    pub fn select_all(&mut self) {
        self.gallery.select_all();
    }

    pub fn clear_selection(&mut self) {
        self.gallery.clear_selection();
    }

    /// Take the selected images (detection order) and close the gallery
    pub fn take_selection(&mut self) -> (Vec<DetectedImage>, SourcePage) {
        let images = self.gallery.selected();
        self.gallery.clear_selection();
        self.gallery_open = false;
        (images, self.page.clone().unwrap_or_default())
    }

    /// Selected images as batch entries, in detection order
    pub fn add_now(&mut self) -> Vec<CartItem> {
        let (images, page) = self.take_selection();
        let now = Utc::now();
        images
            .into_iter()
            .map(|image| CartItem::new(image, &page, now))
            .collect()
    }

    /// Switch to framing a region of `screenshot` by hand
    pub fn start_manual_crop(&mut self, screenshot: Screenshot) -> Result<(), CropError> {
        let crop = ManualCrop::new(screenshot, self.page.clone().unwrap_or_default())?;
        self.generation += 1;
        self.gallery_open = false;
        self.crop = Some(crop);
        self.state = ScanState::ManualCrop;
        Ok(())
    }

    pub fn set_crop_rect(&mut self, rect: CropRect) -> Result<CropRect, CropError> {
        self.crop.as_mut().ok_or(CropError::NoRegion)?.set_rect(rect)
    }

    /// Finish the crop and return to idle
    pub fn finish_crop(&mut self) -> Result<ItemDraft, CropError> {
        let draft = self.crop.as_ref().ok_or(CropError::NoRegion)?.finish()?;
        self.crop = None;
        self.state = ScanState::Idle;
        Ok(draft)
    }

    pub fn cancel_crop(&mut self) {
        if self.crop.take().is_some() {
            self.state = ScanState::Idle;
        }
    }
}

/// Same page when scheme, host, port and path match; query, fragment and a
/// trailing slash are ignored
pub fn same_page(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
                && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
        }
        _ => strip_location(a) == strip_location(b),
    }
}

fn strip_location(url: &str) -> &str {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/')
}
