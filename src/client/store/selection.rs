//! Multi-select state shared by the wardrobe grid and the capture gallery.

use std::collections::HashSet;

/// Set of selected ids plus the "selection mode" flag the UI renders from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: HashSet<String>,
    active: bool,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn enter(&mut self) {
        self.active = true;
    }

    /// Leave selection mode, dropping the selected ids
    pub fn exit(&mut self) {
        self.active = false;
        self.ids.clear();
    }

    /// Flip `id`; returns whether it is now selected. Entering selection mode
    /// is implied.
    pub fn toggle(&mut self, id: &str) -> bool {
        self.active = true;
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn select_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active = true;
        self.ids.extend(ids.into_iter().map(Into::into));
    }

    /// Drop the selected ids; selection mode is left as is
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Replace the selection with exactly `ids` and re-enter selection mode
    pub fn restore<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
        self.active = true;
    }

    /// Keep only ids for which `keep` holds
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.ids.retain(|id| keep(id));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in no particular order
    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}
