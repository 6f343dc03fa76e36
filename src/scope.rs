// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Search scopes and the media buckets results are grouped into.

/// One of the four concrete media categories the search endpoint understands.
///
/// The declaration order is the fixed section order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Movies,
    Music,
    Apps,
    Books,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Movies,
        MediaKind::Music,
        MediaKind::Apps,
        MediaKind::Books,
    ];

    /// Value sent as the `media` query parameter.
    pub fn media_tag(self) -> &'static str {
        match self {
            MediaKind::Movies => "movie",
            MediaKind::Music => "music",
            MediaKind::Apps => "software",
            MediaKind::Books => "ebook",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MediaKind::Movies => "Movies",
            MediaKind::Music => "Music",
            MediaKind::Apps => "Apps",
            MediaKind::Books => "Books",
        }
    }

    /// Map a result `kind` string (e.g. `feature-movie`, `song`) to its bucket.
    pub fn from_result_kind(kind: &str) -> Option<Self> {
        let normalized = kind.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "feature_movie" | "movie" | "tv_episode" => Some(MediaKind::Movies),
            "song" | "album" | "music_video" => Some(MediaKind::Music),
            "software" | "mac_software" => Some(MediaKind::Apps),
            "ebook" | "book" | "audiobook" => Some(MediaKind::Books),
            _ => None,
        }
    }
}

/// Scope selected in the scope bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SearchScope {
    #[default]
    All,
    Movies,
    Music,
    Apps,
    Books,
}

impl SearchScope {
    pub const ALL: [SearchScope; 5] = [
        SearchScope::All,
        SearchScope::Movies,
        SearchScope::Music,
        SearchScope::Apps,
        SearchScope::Books,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SearchScope::All => "All",
            other => other.media().map(MediaKind::title).unwrap_or("All"),
        }
    }

    /// The concrete media kind, or `None` for `All`.
    pub fn media(self) -> Option<MediaKind> {
        match self {
            SearchScope::All => None,
            SearchScope::Movies => Some(MediaKind::Movies),
            SearchScope::Music => Some(MediaKind::Music),
            SearchScope::Apps => Some(MediaKind::Apps),
            SearchScope::Books => Some(MediaKind::Books),
        }
    }

    /// Media kinds a search in this scope fans out to.
    pub fn kinds(self) -> Vec<MediaKind> {
        match self.media() {
            Some(kind) => vec![kind],
            None => MediaKind::ALL.to_vec(),
        }
    }

    /// Whether results fetched for `kind` are still wanted under this scope.
    pub fn accepts(self, kind: MediaKind) -> bool {
        self.media().is_none_or(|m| m == kind)
    }

    pub fn next(self) -> Self {
        let idx = self.index();
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = self.index();
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Parse a scope name as typed on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|scope| {
            scope.title().eq_ignore_ascii_case(s)
                || scope.media().is_some_and(|m| m.media_tag().eq_ignore_ascii_case(s))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_to_four_kinds() {
        assert_eq!(SearchScope::All.kinds(), MediaKind::ALL.to_vec());
        assert_eq!(SearchScope::Music.kinds(), vec![MediaKind::Music]);
    }

    #[test]
    fn test_media_tags() {
        let tags: Vec<_> = MediaKind::ALL.iter().map(|k| k.media_tag()).collect();
        assert_eq!(tags, vec!["movie", "music", "software", "ebook"]);
    }

    #[test]
    fn test_result_kind_mapping() {
        assert_eq!(MediaKind::from_result_kind("feature-movie"), Some(MediaKind::Movies));
        assert_eq!(MediaKind::from_result_kind("feature_movie"), Some(MediaKind::Movies));
        assert_eq!(MediaKind::from_result_kind("song"), Some(MediaKind::Music));
        assert_eq!(MediaKind::from_result_kind("software"), Some(MediaKind::Apps));
        assert_eq!(MediaKind::from_result_kind("ebook"), Some(MediaKind::Books));
        assert_eq!(MediaKind::from_result_kind("podcast"), None);
    }

    #[test]
    fn test_accepts() {
        assert!(SearchScope::All.accepts(MediaKind::Books));
        assert!(SearchScope::Movies.accepts(MediaKind::Movies));
        assert!(!SearchScope::Movies.accepts(MediaKind::Music));
    }

    #[test]
    fn test_next_and_prev_cycle() {
        assert_eq!(SearchScope::All.next(), SearchScope::Movies);
        assert_eq!(SearchScope::Books.next(), SearchScope::All);
        assert_eq!(SearchScope::All.prev(), SearchScope::Books);
    }

    #[test]
    fn test_parse() {
        assert_eq!(SearchScope::parse("movies"), Some(SearchScope::Movies));
        assert_eq!(SearchScope::parse("software"), Some(SearchScope::Apps));
        assert_eq!(SearchScope::parse("ALL"), Some(SearchScope::All));
        assert_eq!(SearchScope::parse("podcasts"), None);
    }
}
