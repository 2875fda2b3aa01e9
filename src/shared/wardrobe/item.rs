//! Wardrobe item records and the drafts/patches that produce them.

use super::filter::{any_matches, field_matches, parse_price, search_matches, ItemFilter, SortField, SortValue};
use super::{Entity, EntityKind, ImageRef};
use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A color swatch attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Color {
    /// `#RGB` or `#RRGGBB`
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Color {
    pub fn new(hex: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            name: None,
        }
    }

    pub fn named(hex: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            name: Some(name.into()),
        }
    }

    pub fn validate(&self) -> Result<(), SharedError> {
        let digits = match self.hex.strip_prefix('#') {
            Some(digits) => digits,
            None => return Err(SharedError::validation("colors", format!("'{}' is not a hex color", self.hex))),
        };
        if !(digits.len() == 3 || digits.len() == 6) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SharedError::validation("colors", format!("'{}' is not a hex color", self.hex)));
        }
        Ok(())
    }
}

/// How an item entered the wardrobe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemSource {
    Camera,
    Gallery,
    WebCapture {
        page_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_name: Option<String>,
    },
    WebUrl {
        url: String,
    },
}

/// Optional metadata bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ItemSource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A wardrobe item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardrobeItem {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub colors: Vec<Color>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub seasons: Vec<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub image: ImageRef,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

impl Entity for WardrobeItem {
    type Filter = ItemFilter;
    type Patch = ItemPatch;

    const KIND: EntityKind = EntityKind::Item;

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

    fn matches(&self, filter: &ItemFilter) -> bool {
        if filter.favorites_only && !self.is_favorite {
            return false;
        }
        let color_keys = self
            .colors
            .iter()
            .flat_map(|c| std::iter::once(c.hex.as_str()).chain(c.name.as_deref()));

        field_matches(Some(&self.category), filter.category.as_deref())
            && any_matches(color_keys, &filter.colors)
            && any_matches(self.styles.iter().map(String::as_str), &filter.styles)
            && any_matches(self.seasons.iter().map(String::as_str), &filter.seasons)
            && search_matches(
                [self.title.as_str(), self.category.as_str()]
                    .into_iter()
                    .chain(self.brand.as_deref())
                    .chain(self.notes.as_deref())
                    .chain(self.styles.iter().map(String::as_str)),
                filter.search.as_deref(),
            )
    }

    fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(colors) = &patch.colors {
            self.colors = colors.clone();
        }
        if let Some(styles) = &patch.styles {
            self.styles = styles.clone();
        }
        if let Some(seasons) = &patch.seasons {
            self.seasons = seasons.clone();
        }
        if let Some(brand) = &patch.brand {
            self.brand = brand.clone();
        }
        if let Some(size) = &patch.size {
            self.size = size.clone();
        }
        if let Some(price) = &patch.price {
            self.price = price.clone();
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
            SortField::Title => SortValue::Text(Some(self.title.clone())),
            SortField::Brand => SortValue::Text(self.brand.clone()),
            SortField::Category => SortValue::Text(Some(self.category.clone())),
            SortField::Price => SortValue::Number(self.price.as_deref().and_then(parse_price)),
        }
    }

    fn validate(&self) -> Result<(), SharedError> {
        if self.colors.is_empty() {
            return Err(SharedError::validation("colors", "Select at least one color"));
        }
        for color in &self.colors {
            color.validate()?;
        }
        if !self.image.is_resolvable() {
            return Err(SharedError::validation("image", "An image is required"));
        }
        Ok(())
    }
}

/// Draft submitted by the Add-Item workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewItem {
    pub title: String,
    pub category: String,
    pub colors: Vec<Color>,
    pub styles: Vec<String>,
    pub seasons: Vec<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub price: Option<String>,
    pub notes: Option<String>,
    /// Local file path or remote URL
    pub image_uri: Option<String>,
    pub metadata: ItemMetadata,
}

impl NewItem {
    /// Materialise the draft with a fresh local id
    pub fn into_item(self, user_id: &str, now: DateTime<Utc>) -> WardrobeItem {
        WardrobeItem {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: self.title.trim().to_string(),
            category: self.category.trim().to_string(),
            colors: self.colors,
            styles: self.styles,
            seasons: self.seasons,
            brand: self.brand,
            size: self.size,
            price: self.price,
            notes: self.notes,
            image: self
                .image_uri
                .as_deref()
                .map(ImageRef::from_uri)
                .unwrap_or_default(),
            is_favorite: false,
            created_at: now,
            updated_at: now,
            metadata: self.metadata,
        }
    }
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub category: Option<String>,
    pub colors: Option<Vec<Color>>,
    pub styles: Option<Vec<String>>,
    pub seasons: Option<Vec<String>>,
    pub brand: Option<Option<String>>,
    pub size: Option<Option<String>>,
    pub price: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub image: Option<ImageRef>,
}
