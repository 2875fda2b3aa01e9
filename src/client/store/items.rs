//! Item-specific queries over the cached wardrobe.

use super::ItemStore;
use crate::shared::wardrobe::filter::compare_text;

impl ItemStore {
    /// Distinct categories in use, sorted case-insensitively
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for item in self.read().entities.iter() {
            let category = item.category.trim();
            if category.is_empty() {
                continue;
            }
            if !categories.iter().any(|c| c.eq_ignore_ascii_case(category)) {
                categories.push(category.to_string());
            }
        }
        categories.sort_by(|a, b| compare_text(a, b));
        categories
    }

    pub fn favorite_count(&self) -> usize {
        self.read().entities.iter().filter(|i| i.is_favorite).count()
    }
}
