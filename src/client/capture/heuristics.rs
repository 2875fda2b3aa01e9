//! Acceptance test for "this looks like a clothing product photo".
//!
//! Applied to raw `IMAGE_CANDIDATES` reports. Pages that send
//! `IMAGES_DETECTED` have already filtered their images and are only
//! deduplicated.

use crate::shared::capture::{DetectedImage, ImageCandidate};
use xxhash_rust::xxh3::xxh3_64;

const NEGATIVE_KEYWORDS: &[&str] = &[
    "logo",
    "icon",
    "sprite",
    "banner",
    "avatar",
    "badge",
    "payment",
    "placeholder",
    "spinner",
    "loader",
    "pixel",
    "tracking",
    "social",
    "flag",
    "rating",
    "arrow",
];

/// Keyword found in url/alt/class and the category it suggests
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("tee", "tops"),
    ("shirt", "tops"),
    ("blouse", "tops"),
    ("sweater", "tops"),
    ("hoodie", "tops"),
    ("top", "tops"),
    ("dress", "dresses"),
    ("jean", "bottoms"),
    ("trouser", "bottoms"),
    ("pant", "bottoms"),
    ("skirt", "bottoms"),
    ("short", "bottoms"),
    ("jacket", "outerwear"),
    ("coat", "outerwear"),
    ("blazer", "outerwear"),
    ("parka", "outerwear"),
    ("sneaker", "shoes"),
    ("shoe", "shoes"),
    ("boot", "shoes"),
    ("sandal", "shoes"),
    ("backpack", "bags"),
    ("bag", "bags"),
    ("tote", "bags"),
    ("scarf", "accessories"),
    ("hat", "accessories"),
    ("belt", "accessories"),
    ("necklace", "accessories"),
];

const GENERIC_KEYWORDS: &[&str] = &["product", "clothing", "apparel", "fashion", "model", "look"];

/// Outcome of accepting a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub confidence: f32,
    pub category: Option<String>,
}

/// Size, shape and keyword rules for product images
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateHeuristics {
    pub min_width: u32,
    pub min_height: u32,
    /// width / height
    pub min_aspect: f64,
    pub max_aspect: f64,
}

impl Default for CandidateHeuristics {
    fn default() -> Self {
        Self {
            min_width: 150,
            min_height: 150,
            min_aspect: 0.4,
            max_aspect: 2.5,
        }
    }
}

impl CandidateHeuristics {
    /// `None` when the candidate is rejected
    pub fn evaluate(&self, candidate: &ImageCandidate) -> Option<Verdict> {
        let src = candidate.src.trim();
        if src.is_empty() || src.starts_with("data:") {
            return None;
        }
        let path = src.split(['?', '#']).next().unwrap_or(src).to_ascii_lowercase();
        if path.ends_with(".svg") || path.ends_with(".gif") {
            return None;
        }

        if candidate.width < self.min_width || candidate.height < self.min_height {
            return None;
        }
        let aspect = f64::from(candidate.width) / f64::from(candidate.height);
        if aspect < self.min_aspect || aspect > self.max_aspect {
            return None;
        }

        let words = words(&format!(
            "{} {} {}",
            path,
            candidate.alt.as_deref().unwrap_or_default(),
            candidate.class_name.as_deref().unwrap_or_default()
        ));
        if NEGATIVE_KEYWORDS.iter().any(|k| has_word(&words, k)) {
            return None;
        }

        let category = CATEGORY_KEYWORDS
            .iter()
            .find(|(k, _)| has_word(&words, k))
            .map(|(_, category)| category.to_string());
        let hits = GENERIC_KEYWORDS.iter().filter(|k| has_word(&words, k)).count()
            + usize::from(category.is_some());

        let mut confidence = 0.5 + 0.1 * hits as f32;
        if candidate.width >= 400 && candidate.height >= 400 {
            confidence += 0.1;
        }
        Some(Verdict {
            confidence: confidence.min(1.0),
            category,
        })
    }

    /// Accepted candidates as detected images, in page order. `counter` is
    /// the id counter of the current pass and is advanced per accepted image.
    pub fn detect(&self, candidates: &[ImageCandidate], counter: &mut usize) -> Vec<DetectedImage> {
        candidates
            .iter()
            .filter_map(|candidate| {
                let verdict = self.evaluate(candidate)?;
                let id = image_id(&candidate.src, *counter);
                *counter += 1;
                Some(DetectedImage {
                    id,
                    url: candidate.src.trim().to_string(),
                    width: candidate.width,
                    height: candidate.height,
                    alt: candidate.alt.clone().filter(|a| !a.trim().is_empty()),
                    category: verdict.category,
                    confidence: Some(verdict.confidence),
                    product_url: candidate.product_url.clone(),
                })
            })
            .collect()
    }
}

/// Lowercase alphanumeric words of `text`
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `keyword` as a whole word, plural included
fn has_word(words: &[String], keyword: &str) -> bool {
    words
        .iter()
        .any(|w| w.strip_prefix(keyword).is_some_and(|rest| matches!(rest, "" | "s" | "es")))
}

/// `img_<xxh3 of url>_<counter>`; stable within one pass only
pub fn image_id(url: &str, counter: usize) -> String {
    format!("img_{:016x}_{}", xxh3_64(url.as_bytes()), counter)
}
