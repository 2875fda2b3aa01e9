//! Filter and sort options for cached collections.
//!
//! Filters are conjunctive across fields. An unset or empty field is never a
//! constraint; inside a multi-valued field an entity matches when it shares
//! any one of the requested values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Query over wardrobe items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemFilter {
    pub category: Option<String>,
    /// Hex codes or color names
    pub colors: Vec<String>,
    pub styles: Vec<String>,
    pub seasons: Vec<String>,
    pub favorites_only: bool,
    pub search: Option<String>,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.colors.push(color.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.styles.push(style.into());
        self
    }

    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.seasons.push(season.into());
        self
    }

    pub fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// True when no field constrains the result
    pub fn is_empty(&self) -> bool {
        blank(self.category.as_deref())
            && self.colors.iter().all(|c| c.trim().is_empty())
            && self.styles.iter().all(|s| s.trim().is_empty())
            && self.seasons.iter().all(|s| s.trim().is_empty())
            && !self.favorites_only
            && blank(self.search.as_deref())
    }
}

/// Query over outfits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutfitFilter {
    pub occasion: Option<String>,
    pub seasons: Vec<String>,
    pub styles: Vec<String>,
    pub favorites_only: bool,
    /// Only outfits containing this item id
    pub contains_item: Option<String>,
    pub search: Option<String>,
}

/// Sortable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Title,
    Brand,
    Category,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortOptions {
    /// Newest first
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Descending,
        }
    }
}

impl SortOptions {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Value extracted from an entity for one sort field
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Date(DateTime<Utc>),
    Number(Option<f64>),
    Text(Option<String>),
}

impl SortValue {
    fn is_missing(&self) -> bool {
        match self {
            SortValue::Date(_) => false,
            SortValue::Number(n) => n.is_none(),
            SortValue::Text(t) => t.as_deref().map_or(true, |t| t.trim().is_empty()),
        }
    }

    /// Compare two values; missing values always sort last regardless of
    /// direction.
    pub fn compare(&self, other: &SortValue, direction: SortDirection) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        let ordering = match (self, other) {
            (SortValue::Date(a), SortValue::Date(b)) => a.cmp(b),
            (SortValue::Number(Some(a)), SortValue::Number(Some(b))) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (SortValue::Text(Some(a)), SortValue::Text(Some(b))) => compare_text(a, b),
            _ => Ordering::Equal,
        };

        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Case-insensitive comparison with a case-sensitive tie-break
pub fn compare_text(a: &str, b: &str) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded == Ordering::Equal {
        a.cmp(b)
    } else {
        folded
    }
}

/// Parse a free-text price such as `"$1,299.99"` or `"49 EUR"`
pub fn parse_price(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    // "12,50" and "1.299,99": a final comma with two digits after it is the decimal point
    let decimal_comma = kept.rfind(',').is_some_and(|i| {
        let tail = &kept[i + 1..];
        tail.len() == 2 && tail.chars().all(|c| c.is_ascii_digit())
    });
    let cleaned: String = if decimal_comma {
        kept.chars()
            .filter(|c| *c != '.')
            .map(|c| if c == ',' { '.' } else { c })
            .collect()
    } else {
        kept.chars().filter(|c| *c != ',').collect()
    };
    cleaned.parse().ok()
}

pub(crate) fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Single-valued field check; blank wanted value is no constraint
pub(crate) fn field_matches(actual: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted.map(str::trim).filter(|w| !w.is_empty()) {
        None => true,
        Some(wanted) => actual.map_or(false, |a| a.trim().eq_ignore_ascii_case(wanted)),
    }
}

/// Multi-valued field check: any shared value; no wanted values means no constraint
pub(crate) fn any_matches<'a>(actual: impl IntoIterator<Item = &'a str>, wanted: &[String]) -> bool {
    let wanted: Vec<&str> = wanted
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect();
    if wanted.is_empty() {
        return true;
    }
    actual
        .into_iter()
        .any(|a| wanted.iter().any(|w| a.trim().eq_ignore_ascii_case(w)))
}

/// Free-text search over several fields; blank search is no constraint
pub(crate) fn search_matches<'a>(haystacks: impl IntoIterator<Item = &'a str>, search: Option<&str>) -> bool {
    let needle = match search.map(str::trim).filter(|s| !s.is_empty()) {
        None => return true,
        Some(needle) => needle.to_lowercase(),
    };
    haystacks
        .into_iter()
        .any(|h| h.to_lowercase().contains(&needle))
}
