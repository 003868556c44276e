use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::web::WebStorage;
use crate::context::EmbeddingDetector;
use crate::cookies::{CookieJar, CookieOptions, Cookies};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum StorageLocation {
    Cookie,
    FallbackSession,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookie => f.write_str("cookie"),
            Self::FallbackSession => f.write_str("session storage"),
        }
    }
}

/// A key/value store for session fields. Implementations swallow their own
/// failures: a failed write is a no-op, a failed read is `None`.
pub trait SessionStore: Send + Sync {
    fn location(&self) -> StorageLocation;

    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Write, then read back. Returns whether the value actually persisted.
    fn set_verified(&self, key: &str, value: &str) -> bool {
        self.set(key, value);
        self.get(key).as_deref() == Some(value)
    }
}

/// Session fields stored as cookies, with attributes chosen from the current
/// embedding context on every write.
pub struct CookieBackend {
    cookies: Cookies,
    detector: EmbeddingDetector,
    expiry_days: i64,
}

impl CookieBackend {
    pub fn new(jar: Arc<dyn CookieJar>, detector: EmbeddingDetector, expiry_days: i64) -> Self {
        Self {
            cookies: Cookies::new(jar),
            detector,
            expiry_days,
        }
    }

    pub fn detector(&self) -> &EmbeddingDetector {
        &self.detector
    }

    fn options(&self) -> CookieOptions {
        CookieOptions::with_settings(Some(self.expiry_days), self.detector.cookie_settings())
    }
}

impl SessionStore for CookieBackend {
    fn location(&self) -> StorageLocation {
        StorageLocation::Cookie
    }

    fn get(&self, key: &str) -> Option<String> {
        self.cookies.get(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.cookies.set(key, value, &self.options());
    }

    fn remove(&self, key: &str) {
        self.cookies.remove(key, self.detector.cookie_settings());
    }
}

/// Session fields mirrored into session-scoped web storage.
pub struct EphemeralBackend {
    storage: Arc<dyn WebStorage>,
}

impl EphemeralBackend {
    pub fn new(storage: Arc<dyn WebStorage>) -> Self {
        Self { storage }
    }
}

impl SessionStore for EphemeralBackend {
    fn location(&self) -> StorageLocation {
        StorageLocation::FallbackSession
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Fallback storage read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set_item(key, value) {
            warn!(key, error = %e, "Fallback storage write failed");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(key) {
            warn!(key, error = %e, "Fallback storage remove failed");
        }
    }
}
