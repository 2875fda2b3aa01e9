//! Capture Boundary Messages
//!
//! The embedded shopping page runs in a separate execution context and talks
//! to the core only through serialized JSON messages. This module defines the
//! strict schema for those messages and parses them defensively: a malformed
//! message becomes "no images detected", and a malformed entry inside an
//! otherwise valid message is dropped on its own.
//!
//! Two message shapes are understood:
//!
//! - `IMAGES_DETECTED` - the page already applied its own heuristics
//! - `IMAGE_CANDIDATES` - raw `<img>` facts; the core applies
//!   [`CandidateHeuristics`](crate::client::capture::CandidateHeuristics)

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A candidate product image found on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedImage {
    /// Stable within one detection pass only
    pub id: String,
    pub url: String,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub width: u32,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
}

/// Raw facts about one `<img>` element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCandidate {
    pub src: String,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub width: u32,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub height: u32,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    /// Closest enclosing link, if any
    #[serde(default)]
    pub product_url: Option<String>,
}

/// Counters reported by the page script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionStats {
    pub total_images: u32,
    pub candidates: u32,
    pub accepted: u32,
    pub duration_ms: Option<u64>,
}

/// A validated message from the embedded page
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    ImagesDetected {
        images: Vec<DetectedImage>,
        stats: DetectionStats,
        error: Option<String>,
        scan_id: Option<u64>,
    },
    ImageCandidates {
        candidates: Vec<ImageCandidate>,
        page_url: Option<String>,
        scan_id: Option<u64>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireMessage {
    #[serde(rename_all = "camelCase")]
    ImagesDetected {
        #[serde(default)]
        images: Vec<Value>,
        #[serde(default)]
        stats: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        scan_id: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    ImageCandidates {
        #[serde(default)]
        candidates: Vec<Value>,
        #[serde(default)]
        page_url: Option<String>,
        #[serde(default)]
        scan_id: Option<u64>,
    },
}

impl PageMessage {
    /// Parse a raw message. Never fails: anything unreadable is reported as
    /// an empty detection carrying an error description.
    pub fn parse(raw: &str) -> PageMessage {
        match serde_json::from_str::<WireMessage>(raw) {
            Ok(WireMessage::ImagesDetected {
                images,
                stats,
                error,
                scan_id,
            }) => PageMessage::ImagesDetected {
                images: parse_entries(images, "image"),
                stats: stats
                    .and_then(|s| serde_json::from_value(s).ok())
                    .unwrap_or_default(),
                error,
                scan_id,
            },
            Ok(WireMessage::ImageCandidates {
                candidates,
                page_url,
                scan_id,
            }) => PageMessage::ImageCandidates {
                candidates: parse_entries(candidates, "candidate"),
                page_url,
                scan_id,
            },
            Err(e) => {
                tracing::warn!("Discarding malformed page message: {}", e);
                PageMessage::empty(format!("malformed message: {}", e))
            }
        }
    }

    /// Empty detection result with an error description
    pub fn empty(error: impl Into<String>) -> PageMessage {
        PageMessage::ImagesDetected {
            images: Vec::new(),
            stats: DetectionStats::default(),
            error: Some(error.into()),
            scan_id: None,
        }
    }

    pub fn scan_id(&self) -> Option<u64> {
        match self {
            PageMessage::ImagesDetected { scan_id, .. } => *scan_id,
            PageMessage::ImageCandidates { scan_id, .. } => *scan_id,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PageMessage::ImagesDetected { error, .. } => error.as_deref(),
            PageMessage::ImageCandidates { .. } => None,
        }
    }
}

fn parse_entries<T: for<'de> Deserialize<'de>>(values: Vec<Value>, what: &str) -> Vec<T> {
    let total = values.len();
    let parsed: Vec<T> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if parsed.len() != total {
        tracing::debug!("Dropped {} malformed {} entries", total - parsed.len(), what);
    }
    parsed
}

/// Accept integer or float pixel sizes; anything else becomes 0
fn lenient_dimension<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round().min(u32::MAX as f64) as u32)
        .unwrap_or(0))
}
