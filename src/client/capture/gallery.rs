//! Detected images of the current pass and the user's pick among them.

use crate::client::store::Selection;
use crate::shared::capture::DetectedImage;
use std::collections::HashSet;

/// Drop images whose id or url was already seen; the first occurrence wins
pub fn dedup_images(images: Vec<DetectedImage>) -> Vec<DetectedImage> {
    let mut ids = HashSet::new();
    let mut urls = HashSet::new();
    let total = images.len();
    let unique: Vec<DetectedImage> = images
        .into_iter()
        .filter(|image| {
            let fresh_id = !ids.contains(&image.id);
            let fresh_url = !urls.contains(&image.url);
            if fresh_id && fresh_url {
                ids.insert(image.id.clone());
                urls.insert(image.url.clone());
                true
            } else {
                false
            }
        })
        .collect();
    if unique.len() != total {
        tracing::debug!("Dropped {} duplicate detected images", total - unique.len());
    }
    unique
}

/// Results sheet over one detection pass
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    images: Vec<DetectedImage>,
    selection: Selection,
}

impl Gallery {
    pub fn new(images: Vec<DetectedImage>) -> Self {
        Self {
            images: dedup_images(images),
            selection: Selection::new(),
        }
    }

    pub fn images(&self) -> &[DetectedImage] {
        &self.images
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Unknown ids are ignored
    pub fn toggle(&mut self, id: &str) -> bool {
        if !self.images.iter().any(|i| i.id == id) {
            return false;
        }
        self.selection.toggle(id)
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(self.images.iter().map(|i| i.id.clone()));
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Selected images in detection order
    pub fn selected(&self) -> Vec<DetectedImage> {
        self.images
            .iter()
            .filter(|i| self.selection.contains(&i.id))
            .cloned()
            .collect()
    }
}
