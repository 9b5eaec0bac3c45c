//! Configuration file parser for ~/.config/geekdaily/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::resolver::{ScanWindow, DEFAULT_SCAN_MAX_PAGES, DEFAULT_SCAN_PAGE_SIZE};

/// Environment variable overriding `api_base_url`.
pub const API_ENDPOINT_ENV: &str = "GEEKDAILY_API_ENDPOINT";

const DEFAULT_API_BASE_URL: &str = "http://101.33.75.240:1337/api/v1/geekdailies";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("HOME environment variable not set")]
    NoHome,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration. Any subset of keys may be given.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream endpoint (or a proxy that forwards the same query parameters).
    pub api_base_url: String,

    /// Items per page in the list view.
    pub page_size: u32,

    /// How long a fetched page may be served from memory. 0 disables caching.
    pub cache_ttl_secs: u64,

    /// Maximum number of cached pages.
    pub cache_capacity: usize,

    pub request_timeout_secs: u64,

    /// Bookmark resolution scan window.
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_SCAN_PAGE_SIZE,
            max_pages: DEFAULT_SCAN_MAX_PAGES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: 25,
            cache_ttl_secs: 300,
            cache_capacity: 64,
            request_timeout_secs: 20,
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "api_base_url",
        "page_size",
        "cache_ttl_secs",
        "cache_capacity",
        "request_timeout_secs",
        "scan",
    ];

    /// Directory holding the config file and the bookmark database.
    pub fn dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".config").join("geekdaily"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), api = %config.api_base_url, "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides (currently only the API endpoint).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var(API_ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                tracing::info!(api = %endpoint, "Using API endpoint from environment");
                self.api_base_url = endpoint.trim().to_string();
            }
        }
        self
    }

    /// Parsed and validated upstream URL. Only http and https are accepted.
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.api_base_url.clone(),
            reason,
        };
        let url = Url::parse(&self.api_base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn scan_window(&self) -> ScanWindow {
        ScanWindow {
            page_size: self.scan.page_size.max(1),
            max_pages: self.scan.max_pages.max(1),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
