//! Manual crop fallback: the user frames a region of a full-page screenshot.
//! Pixel work happens on the platform side; this only validates the frame.

use super::{ItemDraft, SourcePage};
use crate::shared::wardrobe::ItemSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted crop side, in screenshot pixels
pub const MIN_CROP_SIDE: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip to a `width` x `height` image. `None` when nothing usable is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<CropRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clamped = CropRect {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (clamped.width >= MIN_CROP_SIDE && clamped.height >= MIN_CROP_SIDE).then_some(clamped)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CropError {
    #[error("screenshot has no pixels")]
    EmptyScreenshot,
    #[error("no crop region selected")]
    NoRegion,
    #[error("crop region {0:?} lies outside the screenshot")]
    OutOfBounds(CropRect),
}

/// In-progress manual crop
#[derive(Debug, Clone, PartialEq)]
pub struct ManualCrop {
    screenshot: Screenshot,
    page: SourcePage,
    rect: Option<CropRect>,
}

impl ManualCrop {
    pub fn new(screenshot: Screenshot, page: SourcePage) -> Result<Self, CropError> {
        if screenshot.width == 0 || screenshot.height == 0 {
            return Err(CropError::EmptyScreenshot);
        }
        Ok(Self {
            screenshot,
            page,
            rect: None,
        })
    }

    pub fn screenshot(&self) -> &Screenshot {
        &self.screenshot
    }

    pub fn rect(&self) -> Option<CropRect> {
        self.rect
    }

    /// Set the frame, clipped to the screenshot. Returns the stored frame.
    pub fn set_rect(&mut self, rect: CropRect) -> Result<CropRect, CropError> {
        let clamped = rect
            .clamp_to(self.screenshot.width, self.screenshot.height)
            .ok_or(CropError::OutOfBounds(rect))?;
        self.rect = Some(clamped);
        Ok(clamped)
    }

    /// Draft for the Add-Item workflow
    pub fn finish(&self) -> Result<ItemDraft, CropError> {
        let rect = self.rect.ok_or(CropError::NoRegion)?;
        Ok(ItemDraft {
            image_uri: self.screenshot.uri.clone(),
            title: None,
            category: None,
            source: ItemSource::WebCapture {
                page_url: self.page.url.clone(),
                page_name: self.page.name.clone(),
            },
            crop: Some(rect),
        })
    }
}
