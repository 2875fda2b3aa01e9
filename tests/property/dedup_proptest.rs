//! Property-based tests for detected image deduplication

use proptest::prelude::*;
use std::collections::HashSet;
use wardrobe_core::client::capture::{dedup_images, Gallery};
use wardrobe_core::shared::capture::DetectedImage;

fn arb_image() -> impl Strategy<Value = DetectedImage> {
    (0u8..6, 0u8..6).prop_map(|(id, url)| DetectedImage {
        id: format!("img_{}", id),
        url: format!("https://cdn.example/{}.jpg", url),
        width: 500,
        height: 600,
        alt: None,
        category: None,
        confidence: None,
        product_url: None,
    })
}

proptest! {
    #[test]
    fn test_dedup_leaves_unique_ids_and_urls(images in prop::collection::vec(arb_image(), 0..20)) {
        let unique = dedup_images(images);

        let ids: HashSet<_> = unique.iter().map(|i| i.id.clone()).collect();
        let urls: HashSet<_> = unique.iter().map(|i| i.url.clone()).collect();
        prop_assert_eq!(ids.len(), unique.len());
        prop_assert_eq!(urls.len(), unique.len());
    }

    #[test]
    fn test_dedup_keeps_first_occurrences_in_order(images in prop::collection::vec(arb_image(), 0..20)) {
        let unique = dedup_images(images.clone());

        let mut rest = images.iter();
        for kept in &unique {
            prop_assert!(rest.any(|i| i == kept), "output is not a subsequence of the input");
        }
        if let Some(first) = images.first() {
            prop_assert_eq!(&unique[0], first);
        }
        prop_assert_eq!(dedup_images(unique.clone()), unique);
    }

    #[test]
    fn test_gallery_selection_stays_within_images(
        images in prop::collection::vec(arb_image(), 0..20),
        toggles in prop::collection::vec(0u8..8, 0..20),
    ) {
        let mut gallery = Gallery::new(images);
        for t in toggles {
            gallery.toggle(&format!("img_{}", t));
        }

        let known: HashSet<_> = gallery.images().iter().map(|i| i.id.clone()).collect();
        prop_assert!(gallery.selection().iter().all(|id| known.contains(id)));
        prop_assert_eq!(gallery.selected().len(), gallery.selection().len());
    }
}
