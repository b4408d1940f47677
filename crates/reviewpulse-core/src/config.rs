use reviewpulse_api::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::source::{TrendingQuery, DEFAULT_PAGE_SIZE, DEFAULT_WINDOW_HOURS};

/// Environment variable that overrides the configured HTTP password
pub const PASSWORD_ENV: &str = "REVIEWPULSE_GERRIT_PASSWORD";

/// Main configuration structure
///
/// Loaded from `config.toml` in the platform config directory. Missing
/// sections fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gerrit: GerritConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub trending: TrendingConfig,
}

impl Config {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)
                .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))?
        } else {
            Self::default()
        };

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                config.gerrit.http_password = Some(password);
            }
        }

        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> crate::Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> crate::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("reviewpulse");

        Ok(config_dir.join("config.toml"))
    }

    /// Where cache entries live when `cache.dir` is not set
    pub fn cache_dir(&self) -> crate::Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::cache_dir()
                .ok_or_else(|| crate::Error::ConfigError("Could not find cache directory".into()))?
                .join("reviewpulse")),
        }
    }

    pub fn trending_query(&self) -> TrendingQuery {
        TrendingQuery {
            window_hours: self.trending.window_hours,
            page_size: self.trending.page_size.max(1),
        }
    }

    /// Backoff policy for Gerrit requests
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.gerrit.max_retries,
            ..RetryConfig::default()
        }
    }

    /// Per-account preferences, once the account id is known
    pub fn preferences(&self, account: String) -> Preferences {
        Preferences {
            account,
            max_items: self.account.max_items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GerritConfig {
    /// Base URL of the Gerrit instance
    #[serde(default = "default_gerrit_url")]
    pub url: String,

    pub username: Option<String>,

    /// HTTP password from Settings > HTTP Credentials
    pub http_password: Option<String>,

    /// Retries per request on 5xx, 429 and connection errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_gerrit_url() -> String {
    "https://gerrit-review.googlesource.com".to_string()
}

impl Default for GerritConfig {
    fn default() -> Self {
        Self {
            url: default_gerrit_url(),
            username: None,
            http_password: None,
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Identifier the cache is keyed by; derived from the server when unset
    pub id: Option<String>,

    /// How many trending changes to show
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_max_items() -> usize {
    25
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: None,
            max_items: default_max_items(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Cache directory (defaults to the platform cache dir)
    pub dir: Option<PathBuf>,

    /// Cached trending sets older than this are recomputed
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,
}

fn default_max_age_minutes() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: None,
            max_age_minutes: default_max_age_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingConfig {
    /// Only changes updated within this many hours are candidates
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_window_hours() -> u32 {
    DEFAULT_WINDOW_HOURS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            page_size: default_page_size(),
        }
    }
}

/// What the trending list needs to know about the active account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub account: String,
    pub max_items: usize,
}
