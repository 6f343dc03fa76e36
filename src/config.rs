// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Configuration management.
//!
//! Config values are loaded with the following priority (highest to lowest):
//! 1. Environment variables (TUNESCOPE_*)
//! 2. Config file (~/.config/tunescope/config.toml)
//! 3. Default values

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debounce_ms: u64,
    pub result_limit: u32,
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub search_threads: usize,
    pub image_threads: usize,
    pub artwork_cache_size: usize,
    pub thumbnail_size: u32,
    pub resize_filter: String,
    pub grid_columns: usize,
    pub grid_cell_rows: u16,
    pub log_file: Option<PathBuf>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            result_limit: 50,
            endpoint: "https://itunes.apple.com/search".to_string(),
            request_timeout_secs: 15,
            search_threads: 4,
            image_threads: 4,
            artwork_cache_size: 200,
            thumbnail_size: 256,
            resize_filter: "triangle".to_string(),
            grid_columns: 3,
            grid_cell_rows: 10,
            log_file: None,
            debug: false,
        }
    }
}

/// Parse filter type string to image::imageops::FilterType.
/// Returns Triangle as fallback for invalid values.
pub fn parse_filter_type(s: &str) -> image::imageops::FilterType {
    use image::imageops::FilterType;

    match s.trim().to_ascii_lowercase().as_str() {
        "nearest" => FilterType::Nearest,
        "catmullrom" | "catmull-rom" => FilterType::CatmullRom,
        "gaussian" => FilterType::Gaussian,
        "lanczos3" | "lanczos" => FilterType::Lanczos3,
        _ => FilterType::Triangle,
    }
}

impl Config {
    /// Load config with priority: env vars > config file > defaults
    pub fn load() -> Self {
        let mut config = Self::load_from_file().unwrap_or_default();
        config.apply_env_overrides();
        config.clamp_values();
        config
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tunescope").join("config.toml"))
    }

    fn load_from_file() -> Option<Self> {
        let path = Self::config_path()?;
        let content = std::fs::read_to_string(path).ok()?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Option<Self> {
        toml::from_str(content).ok()
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = Self::parse_env::<u64>("TUNESCOPE_DEBOUNCE_MS") {
            self.debounce_ms = v;
        }
        if let Some(v) = Self::parse_env::<u32>("TUNESCOPE_RESULT_LIMIT") {
            self.result_limit = v;
        }
        if let Ok(v) = std::env::var("TUNESCOPE_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = Self::parse_env::<u64>("TUNESCOPE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
        if let Some(v) = Self::parse_env::<usize>("TUNESCOPE_SEARCH_THREADS") {
            self.search_threads = v;
        }
        if let Some(v) = Self::parse_env::<usize>("TUNESCOPE_IMAGE_THREADS") {
            self.image_threads = v;
        }
        if let Some(v) = Self::parse_env::<usize>("TUNESCOPE_ARTWORK_CACHE_SIZE") {
            self.artwork_cache_size = v;
        }
        if let Some(v) = Self::parse_env::<u32>("TUNESCOPE_THUMBNAIL_SIZE") {
            self.thumbnail_size = v;
        }
        if let Ok(v) = std::env::var("TUNESCOPE_RESIZE_FILTER") {
            self.resize_filter = v;
        }
        if let Some(v) = Self::parse_env::<usize>("TUNESCOPE_GRID_COLUMNS") {
            self.grid_columns = v;
        }
        if let Some(v) = Self::parse_env::<u16>("TUNESCOPE_GRID_CELL_ROWS") {
            self.grid_cell_rows = v;
        }
        if let Some(v) = std::env::var_os("TUNESCOPE_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if std::env::var_os("TUNESCOPE_DEBUG").is_some() {
            self.debug = true;
        }
    }

    fn clamp_values(&mut self) {
        const MAX_DEBOUNCE_MS: u64 = 5_000;

        self.debounce_ms = self.debounce_ms.min(MAX_DEBOUNCE_MS);
        self.result_limit = self.result_limit.clamp(1, 200);
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 120);
        self.search_threads = self.search_threads.clamp(1, 8);
        self.image_threads = self.image_threads.clamp(1, 8);
        self.artwork_cache_size = self.artwork_cache_size.clamp(1, 1_000);
        self.thumbnail_size = self.thumbnail_size.clamp(16, 1_024);
        self.grid_columns = self.grid_columns.clamp(1, 8);
        self.grid_cell_rows = self.grid_cell_rows.clamp(4, 40);
    }

    fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok()?.parse().ok()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn filter(&self) -> image::imageops::FilterType {
        parse_filter_type(&self.resize_filter)
    }

    /// Explicit log file, or `<cache_dir>/tunescope/tunescope.log`.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| dirs::cache_dir().map(|p| p.join("tunescope").join("tunescope.log")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::imageops::FilterType;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.result_limit, 50);
        assert_eq!(config.endpoint, "https://itunes.apple.com/search");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.artwork_cache_size, 200);
        assert_eq!(config.grid_columns, 3);
        assert!(config.log_file.is_none());
        assert!(!config.debug);
    }

    #[test]
    fn test_clamp_values() {
        let mut config = Config {
            debounce_ms: 60_000,
            result_limit: 0,
            request_timeout_secs: 1_000,
            search_threads: 0,
            image_threads: 64,
            artwork_cache_size: 0,
            thumbnail_size: 4,
            grid_columns: 20,
            grid_cell_rows: 1,
            ..Default::default()
        };
        config.clamp_values();
        assert_eq!(config.debounce_ms, 5_000);
        assert_eq!(config.result_limit, 1);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.search_threads, 1);
        assert_eq!(config.image_threads, 8);
        assert_eq!(config.artwork_cache_size, 1);
        assert_eq!(config.thumbnail_size, 16);
        assert_eq!(config.grid_columns, 8);
        assert_eq!(config.grid_cell_rows, 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("debounce_ms = 120\nresize_filter = \"lanczos\"\n").unwrap();
        assert_eq!(config.debounce_ms, 120);
        assert_eq!(config.filter(), FilterType::Lanczos3);
        assert_eq!(config.result_limit, 50);
    }

    #[test]
    fn test_parse_filter_type() {
        assert_eq!(parse_filter_type("Nearest"), FilterType::Nearest);
        assert_eq!(parse_filter_type(" catmull-rom "), FilterType::CatmullRom);
        assert_eq!(parse_filter_type("gaussian"), FilterType::Gaussian);
        assert_eq!(parse_filter_type("bogus"), FilterType::Triangle);
    }

    #[test]
    fn test_explicit_log_file_wins() {
        let config = Config {
            log_file: Some(PathBuf::from("/tmp/tunescope-test.log")),
            ..Default::default()
        };
        assert_eq!(config.log_path(), Some(PathBuf::from("/tmp/tunescope-test.log")));
    }
}
