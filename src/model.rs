// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Search result items.

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

use crate::scope::MediaKind;

/// Stable identifier of a store item (`trackId` / `collectionId`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decoded artwork thumbnail. Cloning shares the pixel buffer.
#[derive(Clone, Debug)]
pub struct Artwork {
    pub url: String,
    pub image: Arc<DynamicImage>,
}

impl Artwork {
    pub fn same_pixels(&self, other: &Artwork) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

#[derive(Clone, Debug)]
pub struct StoreItem {
    pub id: ItemId,
    pub name: String,
    pub artist: String,
    /// Raw result kind, e.g. `feature-movie` or `song`.
    pub kind: String,
    pub artwork_url: Option<String>,
    /// Scope the item was fetched for; set when merged.
    pub origin: Option<MediaKind>,
    /// Loaded artwork; `None` means the placeholder is shown.
    pub artwork: Option<Artwork>,
}

impl StoreItem {
    pub fn new(id: u64, name: impl Into<String>, artist: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: ItemId(id),
            name: name.into(),
            artist: artist.into(),
            kind: kind.into(),
            artwork_url: None,
            origin: None,
            artwork: None,
        }
    }

    #[cfg(test)]
    pub fn with_artwork_url(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }

    /// Section this item is grouped under.
    pub fn media_kind(&self) -> Option<MediaKind> {
        MediaKind::from_result_kind(&self.kind).or(self.origin)
    }
}

/// Fields replaced by `ResultStore::patch_single_item`. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub artist: Option<String>,
    pub artwork: Option<Artwork>,
}

impl ItemPatch {
    pub fn artwork(artwork: Artwork) -> Self {
        Self {
            artwork: Some(artwork),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.artist.is_none() && self.artwork.is_none()
    }

    pub fn apply(self, item: &mut StoreItem) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(artist) = self.artist {
            item.artist = artist;
        }
        if let Some(artwork) = self.artwork {
            item.artwork = Some(artwork);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_prefers_result_kind() {
        let mut item = StoreItem::new(1, "Alien", "Ridley Scott", "feature-movie");
        item.origin = Some(MediaKind::Books);
        assert_eq!(item.media_kind(), Some(MediaKind::Movies));
    }

    #[test]
    fn test_media_kind_falls_back_to_origin() {
        let mut item = StoreItem::new(1, "Pod", "Host", "podcast");
        assert_eq!(item.media_kind(), None);
        item.origin = Some(MediaKind::Music);
        assert_eq!(item.media_kind(), Some(MediaKind::Music));
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut item = StoreItem::new(7, "Old", "Artist", "song");
        let patch = ItemPatch {
            name: Some("New".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut item);
        assert_eq!(item.name, "New");
        assert_eq!(item.artist, "Artist");
        assert!(item.artwork.is_none());
    }
}
