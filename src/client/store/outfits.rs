//! Outfit-specific queries.

use super::OutfitStore;
use crate::shared::wardrobe::Outfit;

impl OutfitStore {
    /// Outfits that reference `item_id`
    pub fn containing_item(&self, item_id: &str) -> Vec<Outfit> {
        self.read()
            .entities
            .iter()
            .filter(|o| o.item_ids.iter().any(|id| id == item_id))
            .cloned()
            .collect()
    }
}
