//! Wardrobe Domain Types
//!
//! Items and outfits are the two entity kinds cached locally and mirrored on
//! the backend. Both implement [`Entity`], which is what the generic store,
//! pending queue and sync engine operate on.

pub mod filter;
pub mod item;
pub mod outfit;

pub use filter::{ItemFilter, OutfitFilter, SortDirection, SortField, SortOptions, SortValue};
pub use item::{Color, ItemMetadata, ItemPatch, ItemSource, NewItem, WardrobeItem};
pub use outfit::{NewOutfit, Outfit, OutfitPatch};

use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// The two collections mirrored between device and backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Outfit,
}

impl EntityKind {
    /// REST resource segment
    pub fn resource(self) -> &'static str {
        match self {
            EntityKind::Item => "items",
            EntityKind::Outfit => "outfits",
        }
    }

    /// Key of the persisted collection snapshot
    pub fn store_key(self) -> &'static str {
        match self {
            EntityKind::Item => "store.items",
            EntityKind::Outfit => "store.outfits",
        }
    }

    /// Key of the persisted pending-mutation queue
    pub fn queue_key(self) -> &'static str {
        match self {
            EntityKind::Item => "queue.items",
            EntityKind::Outfit => "queue.outfits",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource())
    }
}

/// Image reference. The local cache path wins over the remote URL so that
/// already-seen entities render without a network round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl ImageRef {
    /// Build from a single URI, routing `http(s)://` to the remote slot
    pub fn from_uri(uri: &str) -> Self {
        let uri = uri.trim();
        if uri.starts_with("http://") || uri.starts_with("https://") {
            Self {
                local_path: None,
                remote_url: Some(uri.to_string()),
            }
        } else {
            Self {
                local_path: Some(uri.to_string()),
                remote_url: None,
            }
        }
    }

    /// The reference to display, local first
    pub fn resolve(&self) -> Option<&str> {
        non_blank(self.local_path.as_deref()).or_else(|| non_blank(self.remote_url.as_deref()))
    }

    pub fn is_resolvable(&self) -> bool {
        self.resolve().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Common behaviour of cached, syncable records
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Query type understood by [`Entity::matches`]
    type Filter: Default + Clone + Debug + Send + Sync;
    /// Partial update type
    type Patch: Clone + Debug + Send + Sync;

    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
    /// Stamp `updated_at`
    fn touch(&mut self, now: DateTime<Utc>);
    fn is_favorite(&self) -> bool;
    fn set_favorite(&mut self, favorite: bool);
    fn matches(&self, filter: &Self::Filter) -> bool;
    fn apply_patch(&mut self, patch: &Self::Patch);
    fn sort_value(&self, field: SortField) -> SortValue;
    /// Local preconditions checked before any write
    fn validate(&self) -> Result<(), SharedError>;
}
