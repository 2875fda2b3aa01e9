//! Persisted shopping cart of captured images.
//!
//! Cart entries outlive the detection pass that produced them and the
//! browser session; they are removed only when ingested or deleted.

use super::{ItemDraft, SourcePage};
use crate::client::local_db::{self, KeyValueStore, StorageError};
use crate::shared::capture::DetectedImage;
use crate::shared::wardrobe::ItemSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const CART_KEY: &str = "capture.cart";

/// A captured image waiting to be added to the wardrobe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub image: DetectedImage,
    pub source_url: String,
    #[serde(default)]
    pub source_name: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(image: DetectedImage, page: &SourcePage, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image,
            source_url: page.url.clone(),
            source_name: page.name.clone(),
            added_at: now,
        }
    }

    /// Prefilled Add-Item draft
    pub fn draft(&self) -> ItemDraft {
        ItemDraft {
            image_uri: self.image.url.clone(),
            title: self.image.alt.clone(),
            category: self.image.category.clone(),
            source: ItemSource::WebCapture {
                page_url: self.source_url.clone(),
                page_name: self.source_name.clone(),
            },
            crop: None,
        }
    }
}

pub struct Cart {
    items: RwLock<Vec<CartItem>>,
    storage: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart").finish_non_exhaustive()
    }
}

impl Cart {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            storage,
        }
    }

    /// Restore the persisted cart. A corrupt cart is discarded.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let restored = match local_db::load_json::<Vec<CartItem>>(self.storage.as_ref(), CART_KEY).await {
            Ok(restored) => restored.unwrap_or_default(),
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Discarding corrupt cart: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let mut items = self.items.write().await;
        *items = restored;
        Ok(items.len())
    }

    async fn persist(&self, items: &[CartItem]) -> Result<(), StorageError> {
        local_db::save_json(self.storage.as_ref(), CART_KEY, &items).await
    }

    /// Add images captured on `page`. Images whose url is already in the cart
    /// are skipped. Returns the newly added entries.
    pub async fn add(&self, images: Vec<DetectedImage>, page: &SourcePage) -> Result<Vec<CartItem>, StorageError> {
        let now = Utc::now();
        let mut items = self.items.write().await;
        let mut added = Vec::new();
        for image in images {
            if items.iter().any(|i| i.image.url == image.url) {
                continue;
            }
            let item = CartItem::new(image, page, now);
            items.push(item.clone());
            added.push(item);
        }
        if !added.is_empty() {
            tracing::info!("Added {} images to the cart", added.len());
            self.persist(&items).await?;
        }
        Ok(added)
    }

    pub async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        self.remove_many(&[id.to_string()]).await.map(|removed| removed > 0)
    }

    pub async fn remove_many(&self, ids: &[String]) -> Result<usize, StorageError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| !ids.contains(&i.id));
        let removed = before - items.len();
        if removed > 0 {
            self.persist(&items).await?;
        }
        Ok(removed)
    }

    pub async fn items(&self) -> Vec<CartItem> {
        self.items.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<CartItem> {
        self.items.read().await.iter().find(|i| i.id == id).cloned()
    }

    pub async fn contains_url(&self, url: &str) -> bool {
        self.items.read().await.iter().any(|i| i.image.url == url)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut items = self.items.write().await;
        items.clear();
        self.persist(&items).await
    }
}
