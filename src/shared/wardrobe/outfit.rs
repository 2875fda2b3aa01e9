//! Outfit records: a named combination of wardrobe items.

use super::filter::{any_matches, field_matches, search_matches, OutfitFilter, SortField, SortValue};
use super::{Entity, EntityKind, ImageRef};
use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outfit {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub occasion: Option<String>,
    #[serde(default)]
    pub seasons: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub image: ImageRef,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outfit {
    /// Copy under a new id; the copy starts un-favorited
    pub fn duplicate(&self, now: DateTime<Utc>) -> Outfit {
        Outfit {
            id: Uuid::new_v4().to_string(),
            name: format!("{} (copy)", self.name),
            is_favorite: false,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

impl Entity for Outfit {
    type Filter = OutfitFilter;
    type Patch = OutfitPatch;

    const KIND: EntityKind = EntityKind::Outfit;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    fn set_favorite(&mut self, favorite: bool) {
        self.is_favorite = favorite;
    }

    fn matches(&self, filter: &OutfitFilter) -> bool {
        if filter.favorites_only && !self.is_favorite {
            return false;
        }
        if let Some(item_id) = filter.contains_item.as_deref().filter(|id| !id.is_empty()) {
            if !self.item_ids.iter().any(|id| id == item_id) {
                return false;
            }
        }
        field_matches(self.occasion.as_deref(), filter.occasion.as_deref())
            && any_matches(self.seasons.iter().map(String::as_str), &filter.seasons)
            && any_matches(self.styles.iter().map(String::as_str), &filter.styles)
            && search_matches(
                std::iter::once(self.name.as_str())
                    .chain(self.occasion.as_deref())
                    .chain(self.notes.as_deref()),
                filter.search.as_deref(),
            )
    }

    fn apply_patch(&mut self, patch: &OutfitPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(item_ids) = &patch.item_ids {
            self.item_ids = item_ids.clone();
        }
        if let Some(occasion) = &patch.occasion {
            self.occasion = occasion.clone();
        }
        if let Some(seasons) = &patch.seasons {
            self.seasons = seasons.clone();
        }
        if let Some(styles) = &patch.styles {
            self.styles = styles.clone();
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if let Some(image) = &patch.image {
            self.image = image.clone();
        }
    }

    fn sort_value(&self, field: SortField) -> SortValue {
        match field {
            SortField::CreatedAt => SortValue::Date(self.created_at),
            SortField::UpdatedAt => SortValue::Date(self.updated_at),
            SortField::Title => SortValue::Text(Some(self.name.clone())),
            SortField::Category => SortValue::Text(self.occasion.clone()),
            SortField::Brand => SortValue::Text(None),
            SortField::Price => SortValue::Number(None),
        }
    }

    fn validate(&self) -> Result<(), SharedError> {
        if self.item_ids.is_empty() {
            return Err(SharedError::validation("itemIds", "An outfit needs at least one item"));
        }
        if !self.image.is_resolvable() {
            return Err(SharedError::validation("image", "An image is required"));
        }
        Ok(())
    }
}

/// Draft for a new outfit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewOutfit {
    pub name: String,
    pub item_ids: Vec<String>,
    pub occasion: Option<String>,
    pub seasons: Vec<String>,
    pub styles: Vec<String>,
    pub notes: Option<String>,
    pub image_uri: Option<String>,
}

impl NewOutfit {
    pub fn into_outfit(self, user_id: &str, now: DateTime<Utc>) -> Outfit {
        Outfit {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: self.name.trim().to_string(),
            item_ids: self.item_ids,
            occasion: self.occasion,
            seasons: self.seasons,
            styles: self.styles,
            notes: self.notes,
            image: self
                .image_uri
                .as_deref()
                .map(ImageRef::from_uri)
                .unwrap_or_default(),
            is_favorite: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutfitPatch {
    pub name: Option<String>,
    pub item_ids: Option<Vec<String>>,
    pub occasion: Option<Option<String>>,
    pub seasons: Option<Vec<String>>,
    pub styles: Option<Vec<String>>,
    pub notes: Option<Option<String>>,
    pub image: Option<ImageRef>,
}
