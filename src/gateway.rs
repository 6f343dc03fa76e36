// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Network gateways.
//!
//! `SearchGateway` performs one scoped search, `ImageSource` fetches raw
//! artwork bytes. `ItunesClient` implements both over blocking reqwest.
//! Calls block the calling thread; callers run them on worker pools.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::model::StoreItem;
use crate::scope::MediaKind;

/// Language parameter sent with every search.
pub const SEARCH_LANG: &str = "en_us";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("decode failure: {0}")]
    Decode(String),
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// One scoped search request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub media: MediaKind,
    pub lang: &'static str,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>, media: MediaKind, limit: u32) -> Self {
        Self {
            term: term.into(),
            media,
            lang: SEARCH_LANG,
            limit,
        }
    }

    /// Query string parameters as plain key/value pairs.
    pub fn pairs(&self) -> [(&'static str, String); 4] {
        [
            ("term", self.term.clone()),
            ("media", self.media.media_tag().to_string()),
            ("lang", self.lang.to_string()),
            ("limit", self.limit.to_string()),
        ]
    }
}

pub trait SearchGateway: Send + Sync {
    fn fetch_items(&self, query: &SearchQuery) -> Result<Vec<StoreItem>, FetchError>;
}

pub trait ImageSource: Send + Sync {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ResultEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultEntry {
    track_id: Option<u64>,
    collection_id: Option<u64>,
    track_name: Option<String>,
    collection_name: Option<String>,
    artist_name: Option<String>,
    kind: Option<String>,
    wrapper_type: Option<String>,
    artwork_url100: Option<String>,
}

impl ResultEntry {
    fn into_item(self) -> Option<StoreItem> {
        let id = self.track_id.or(self.collection_id)?;
        let name = self
            .track_name
            .or(self.collection_name)
            .unwrap_or_default();
        let kind = self.kind.or(self.wrapper_type).unwrap_or_default();
        let mut item = StoreItem::new(id, name, self.artist_name.unwrap_or_default(), kind);
        item.artwork_url = self.artwork_url100.filter(|u| !u.is_empty());
        Some(item)
    }
}

/// Decode a search endpoint response body. Entries without an id are dropped.
pub fn parse_search_response(body: &[u8]) -> Result<Vec<StoreItem>, FetchError> {
    let response: SearchResponse = serde_json::from_slice(body)?;
    Ok(response
        .results
        .into_iter()
        .filter_map(ResultEntry::into_item)
        .collect())
}

pub struct ItunesClient {
    client: Client,
    endpoint: String,
}

impl ItunesClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tunescope/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl SearchGateway for ItunesClient {
    fn fetch_items(&self, query: &SearchQuery) -> Result<Vec<StoreItem>, FetchError> {
        let body = self
            .client
            .get(&self.endpoint)
            .query(&query.pairs())
            .send()?
            .error_for_status()?
            .bytes()?;
        parse_search_response(&body)
    }
}

impl ImageSource for ItunesClient {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self.client.get(url).send()?.error_for_status()?.bytes()?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "resultCount": 3,
        "results": [
            {"wrapperType": "track", "kind": "feature-movie", "trackId": 11,
             "artistName": "Director", "trackName": "Cat Movie",
             "artworkUrl100": "https://example.com/11.jpg"},
            {"wrapperType": "collection", "collectionId": 12,
             "collectionName": "Cat Album", "artistName": "Band"},
            {"wrapperType": "artist", "artistName": "Nobody"}
        ]
    }"#;

    #[test]
    fn test_query_pairs() {
        let q = SearchQuery::new("cat", MediaKind::Apps, 20);
        let pairs = q.pairs();
        assert_eq!(pairs[0], ("term", "cat".to_string()));
        assert_eq!(pairs[1], ("media", "software".to_string()));
        assert_eq!(pairs[2], ("lang", "en_us".to_string()));
        assert_eq!(pairs[3], ("limit", "20".to_string()));
    }

    #[test]
    fn test_parse_search_response() {
        let items = parse_search_response(SAMPLE.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].id.0, 11);
        assert_eq!(items[0].name, "Cat Movie");
        assert_eq!(items[0].artist, "Director");
        assert_eq!(items[0].kind, "feature-movie");
        assert_eq!(items[0].artwork_url.as_deref(), Some("https://example.com/11.jpg"));

        assert_eq!(items[1].id.0, 12);
        assert_eq!(items[1].name, "Cat Album");
        assert_eq!(items[1].kind, "collection");
        assert!(items[1].artwork_url.is_none());
    }

    #[test]
    fn test_parse_invalid_body_is_decode_failure() {
        let err = parse_search_response(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_parse_missing_results_is_empty() {
        let items = parse_search_response(br#"{"resultCount": 0}"#).unwrap();
        assert!(items.is_empty());
    }
}
