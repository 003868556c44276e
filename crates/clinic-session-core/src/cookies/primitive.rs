use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::jar::{format_cookie_date, CookieJar};
use crate::context::{CookieSettings, SameSite};

/// Default lifetime of a cookie written without explicit options.
const DEFAULT_COOKIE_DAYS: i64 = 7;

/// Longest lifetime browsers honor; longer `expires` values are capped to it.
pub const MAX_COOKIE_DAYS: i64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieOptions {
    /// Lifetime in days. `None` writes a session cookie with no `expires`;
    /// a negative value deletes the cookie.
    pub days: Option<i64>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            days: Some(DEFAULT_COOKIE_DAYS),
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    pub fn with_settings(days: Option<i64>, settings: CookieSettings) -> Self {
        Self {
            days,
            secure: settings.secure,
            same_site: settings.same_site,
        }
    }
}

/// Build the `document.cookie` assignment for one cookie.
pub fn build_assignment(name: &str, value: &str, options: &CookieOptions, now: DateTime<Utc>) -> String {
    let mut cookie = format!("{}={}", urlencoding::encode(name), urlencoding::encode(value));
    if let Some(days) = options.days {
        let clamped = days.clamp(-MAX_COOKIE_DAYS, MAX_COOKIE_DAYS);
        if clamped != days {
            warn!(cookie = name, days, clamped, "Cookie lifetime out of range, clamping");
        }
        let expires = now + Duration::days(clamped);
        cookie.push_str(&format!("; expires={}", format_cookie_date(expires)));
    }
    cookie.push_str("; path=/");
    if options.secure {
        cookie.push_str("; secure");
    }
    cookie.push_str(&format!("; samesite={}", options.same_site.as_str()));
    cookie
}

/// Single-cookie read/write over a jar. Jar failures are logged and absorbed:
/// writes become no-ops and reads come back empty.
#[derive(Clone)]
pub struct Cookies {
    jar: Arc<dyn CookieJar>,
}

impl Cookies {
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self { jar }
    }

    pub fn set(&self, name: &str, value: &str, options: &CookieOptions) {
        let assignment = build_assignment(name, value, options, Utc::now());
        if let Err(e) = self.jar.write(&assignment) {
            warn!(cookie = name, error = %e, "Failed to write cookie");
        }
    }

    /// Write and immediately read back. Returns whether the jar kept the value.
    pub fn set_verified(&self, name: &str, value: &str, options: &CookieOptions) -> bool {
        self.set(name, value, options);
        self.get(name).as_deref() == Some(value)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let header = match self.jar.read() {
            Ok(header) => header,
            Err(e) => {
                warn!(cookie = name, error = %e, "Failed to read cookies");
                return None;
            }
        };

        let prefix = format!("{}=", urlencoding::encode(name));
        header
            .split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(prefix.as_str()))
            .and_then(|raw| match urlencoding::decode(raw) {
                Ok(decoded) => Some(decoded.into_owned()),
                Err(e) => {
                    warn!(cookie = name, error = %e, "Cookie value is not valid percent-encoding");
                    None
                }
            })
    }

    /// Delete by writing an already-expired cookie. The attributes must match
    /// the context the cookie was written in, or a third-party jar refuses
    /// the deletion too.
    pub fn remove(&self, name: &str, settings: CookieSettings) {
        self.set(name, "", &CookieOptions::with_settings(Some(-1), settings));
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}
