//! Application configuration management.
//!
//! The configuration holds the API base URL, cookie lifetime, read
//! consistency policy and the simulated frame the host runs in. It is stored
//! at `~/.config/clinic-session/config.json`; `VITE_API_BASE_URL` in the
//! environment overrides the stored base URL.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{EmbeddingDetector, StaticFrame};
use crate::cookies::{JarPolicy, MAX_COOKIE_DAYS};
use crate::session::{ConsistencyPolicy, COOKIE_EXPIRY_DAYS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "clinic-session";

const CONFIG_FILE: &str = "config.json";
const COOKIE_JAR_FILE: &str = "cookies.json";
const LOCAL_STORAGE_FILE: &str = "local_storage.json";

/// Environment variable naming the backend base URL.
pub const API_BASE_URL_ENV: &str = "VITE_API_BASE_URL";

const DEFAULT_LOCATION: &str = "https://app.clinic.local/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("Could not find cache directory")]
    NoCacheDir,

    #[error("No API base URL configured; set VITE_API_BASE_URL or api_base_url in the config file")]
    MissingBaseUrl,

    #[error("cookie_expiry_days must be between 1 and {max}, got {0}", max = MAX_COOKIE_DAYS)]
    InvalidCookieExpiry(i64),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The page the session lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// href of the application page.
    pub location: String,
    /// href of the embedding page; `None` for a top-level page.
    pub parent: Option<String>,
    /// Simulate a browser that refuses all third-party cookies.
    pub block_third_party_cookies: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            parent: None,
            block_third_party_cookies: false,
        }
    }
}

impl FrameConfig {
    pub fn view(&self) -> StaticFrame {
        match self.parent {
            Some(ref parent) => StaticFrame::framed(&self.location, parent),
            None => StaticFrame::top_level(&self.location),
        }
    }

    /// Cookie rules of a browser showing this frame.
    pub fn jar_policy(&self, detector: &EmbeddingDetector) -> JarPolicy {
        JarPolicy {
            secure_origin: detector.is_https(),
            third_party: detector.is_in_cross_origin_iframe(),
            block_third_party: self.block_third_party_cookies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub cookie_expiry_days: i64,
    pub consistency: ConsistencyPolicy,
    pub frame: FrameConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            cookie_expiry_days: COOKIE_EXPIRY_DAYS,
            consistency: ConsistencyPolicy::default(),
            frame: FrameConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_COOKIE_DAYS).contains(&self.cookie_expiry_days) {
            return Err(ConfigError::InvalidCookieExpiry(self.cookie_expiry_days));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        let cache_dir = dirs::cache_dir().ok_or(ConfigError::NoCacheDir)?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cookie_jar_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.cache_dir()?.join(COOKIE_JAR_FILE))
    }

    pub fn local_storage_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.cache_dir()?.join(LOCAL_STORAGE_FILE))
    }

    /// The base URL, preferring the environment over the config file.
    pub fn api_base_url(&self) -> Result<String, ConfigError> {
        Self::resolve_base_url(std::env::var(API_BASE_URL_ENV).ok(), self.api_base_url.as_deref())
    }

    fn resolve_base_url(env: Option<String>, file: Option<&str>) -> Result<String, ConfigError> {
        env.filter(|url| !url.trim().is_empty())
            .or_else(|| file.filter(|url| !url.trim().is_empty()).map(str::to_string))
            .ok_or(ConfigError::MissingBaseUrl)
    }
}
