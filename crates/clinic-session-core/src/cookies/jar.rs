//! Cookie jars: the `document.cookie` side of the cookie primitive.
//!
//! A jar accepts one `Set-Cookie`-style assignment per write and returns the
//! `name=value; name2=value2` header on read. Writes that the browser would
//! refuse are dropped silently, exactly as a browser does: the write call
//! succeeds and the cookie simply never shows up on the next read.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::SameSite;
use crate::storage::web::write_json_atomic;
use crate::storage::StorageError;

/// Format used by `Date.prototype.toUTCString`, which is what the `expires`
/// attribute carries.
const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub fn format_cookie_date(date: DateTime<Utc>) -> String {
    date.format(COOKIE_DATE_FORMAT).to_string()
}

pub fn parse_cookie_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), COOKIE_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub trait CookieJar: Send + Sync {
    /// Equivalent of reading `document.cookie`.
    fn read(&self) -> Result<String, StorageError>;

    /// Equivalent of assigning to `document.cookie`.
    fn write(&self, assignment: &str) -> Result<(), StorageError>;
}

/// What the simulated browser knows about the page writing cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JarPolicy {
    /// The page is served over HTTPS; `Secure` cookies are accepted.
    pub secure_origin: bool,
    /// The page runs in a cross-origin frame, so its cookies are third-party.
    pub third_party: bool,
    /// Refuse every third-party cookie, even `SameSite=None; Secure` ones.
    pub block_third_party: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    /// `None` for a session cookie.
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at <= now).unwrap_or(false)
    }
}

/// What happened to an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    Deleted,
    Dropped(&'static str),
}

/// Cookie jar contents and the rules for applying assignments to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieStore {
    cookies: Vec<StoredCookie>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    pub fn apply(&mut self, assignment: &str, policy: JarPolicy, now: DateTime<Utc>) -> WriteOutcome {
        let cookie = match parse_assignment(assignment, now) {
            Some(cookie) => cookie,
            None => return WriteOutcome::Dropped("malformed assignment"),
        };

        if cookie.same_site == SameSite::None && !cookie.secure {
            return WriteOutcome::Dropped("SameSite=None requires Secure");
        }
        if cookie.secure && !policy.secure_origin {
            return WriteOutcome::Dropped("Secure cookie from insecure origin");
        }
        if policy.third_party {
            if policy.block_third_party {
                return WriteOutcome::Dropped("third-party cookies blocked");
            }
            if cookie.same_site != SameSite::None {
                return WriteOutcome::Dropped("third-party context requires SameSite=None");
            }
        }

        self.cookies
            .retain(|c| !(c.name == cookie.name && c.path == cookie.path));

        if cookie.is_expired(now) {
            return WriteOutcome::Deleted;
        }

        self.cookies.push(cookie);
        WriteOutcome::Stored
    }

    /// The `name=value; ...` header of every live cookie.
    pub fn header(&self, now: DateTime<Utc>) -> String {
        self.cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.cookies.retain(|c| !c.is_expired(now));
    }
}

fn parse_assignment(assignment: &str, now: DateTime<Utc>) -> Option<StoredCookie> {
    let mut parts = assignment.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = StoredCookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        path: "/".to_string(),
        expires: None,
        secure: false,
        same_site: SameSite::Lax,
    };
    let mut max_age: Option<DateTime<Utc>> = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
            None => (attr.trim().to_ascii_lowercase(), ""),
        };
        match key.as_str() {
            "expires" => cookie.expires = parse_cookie_date(val),
            "max-age" => {
                if let Ok(secs) = val.parse::<i64>() {
                    max_age = Some(now + Duration::seconds(secs));
                }
            }
            "path" if !val.is_empty() => cookie.path = val.to_string(),
            "secure" => cookie.secure = true,
            "samesite" => cookie.same_site = SameSite::parse(val).unwrap_or_default(),
            _ => {}
        }
    }

    // Max-Age wins over Expires.
    if max_age.is_some() {
        cookie.expires = max_age;
    }
    Some(cookie)
}

/// In-memory jar. The policy can be changed between calls to simulate moving
/// the page into a different frame.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    store: Mutex<CookieStore>,
    policy: Mutex<JarPolicy>,
    failing: Mutex<bool>,
}

impl MemoryCookieJar {
    pub fn new(policy: JarPolicy) -> Self {
        Self {
            policy: Mutex::new(policy),
            ..Self::default()
        }
    }

    pub fn set_policy(&self, policy: JarPolicy) {
        if let Ok(mut guard) = self.policy.lock() {
            *guard = policy;
        }
    }

    /// Make every subsequent call fail, as if cookie access were disabled.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut guard) = self.failing.lock() {
            *guard = failing;
        }
    }

    pub fn snapshot(&self) -> Vec<StoredCookie> {
        self.store
            .lock()
            .map(|store| store.cookies().to_vec())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if *self.failing.lock().map_err(|_| StorageError::Poisoned)? {
            return Err(StorageError::Unavailable("cookies are disabled".to_string()));
        }
        Ok(())
    }
}

impl CookieJar for MemoryCookieJar {
    fn read(&self) -> Result<String, StorageError> {
        self.check_available()?;
        let store = self.store.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(store.header(Utc::now()))
    }

    fn write(&self, assignment: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let policy = *self.policy.lock().map_err(|_| StorageError::Poisoned)?;
        let mut store = self.store.lock().map_err(|_| StorageError::Poisoned)?;
        let outcome = store.apply(assignment, policy, Utc::now());
        debug!(?outcome, "Applied cookie assignment");
        Ok(())
    }
}

/// Jar persisted as JSON so cookies outlive the process, the way a browser
/// profile keeps them between page loads.
#[derive(Debug)]
pub struct FileCookieJar {
    path: PathBuf,
    policy: Mutex<JarPolicy>,
    lock: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>, policy: JarPolicy) -> Self {
        Self {
            path: path.into(),
            policy: Mutex::new(policy),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_policy(&self, policy: JarPolicy) {
        if let Ok(mut guard) = self.policy.lock() {
            *guard = policy;
        }
    }

    fn load(&self) -> Result<CookieStore, StorageError> {
        if !self.path.exists() {
            return Ok(CookieStore::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl CookieJar for FileCookieJar {
    fn read(&self) -> Result<String, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.load()?.header(Utc::now()))
    }

    fn write(&self, assignment: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let policy = *self.policy.lock().map_err(|_| StorageError::Poisoned)?;
        let now = Utc::now();

        let mut store = self.load()?;
        let outcome = store.apply(assignment, policy, now);
        debug!(?outcome, path = %self.path.display(), "Applied cookie assignment");
        if !matches!(outcome, WriteOutcome::Dropped(_)) {
            store.purge_expired(now);
            write_json_atomic(&self.path, &store)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_party() -> JarPolicy {
        JarPolicy {
            secure_origin: true,
            ..JarPolicy::default()
        }
    }

    #[test]
    fn test_cookie_date_round_trip() {
        let date = parse_cookie_date("Tue, 19 Oct 2027 06:00:00 GMT").unwrap();
        assert_eq!(format_cookie_date(date), "Tue, 19 Oct 2027 06:00:00 GMT");
        assert!(parse_cookie_date("yesterday").is_none());
    }

    #[test]
    fn test_apply_and_header() {
        let now = Utc::now();
        let mut store = CookieStore::new();
        assert_eq!(store.apply("a=1; path=/; samesite=lax", first_party(), now), WriteOutcome::Stored);
        assert_eq!(store.apply("b=2; path=/", first_party(), now), WriteOutcome::Stored);
        assert_eq!(store.header(now), "a=1; b=2");

        // Overwrite keeps a single entry.
        store.apply("a=3; path=/", first_party(), now);
        assert_eq!(store.header(now), "b=2; a=3");
    }

    #[test]
    fn test_past_expiry_deletes() {
        let now = Utc::now();
        let mut store = CookieStore::new();
        store.apply("a=1; path=/", first_party(), now);

        let past = format_cookie_date(now - Duration::days(1));
        let outcome = store.apply(&format!("a=; expires={}; path=/", past), first_party(), now);
        assert_eq!(outcome, WriteOutcome::Deleted);
        assert_eq!(store.header(now), "");
    }

    #[test]
    fn test_max_age_zero_deletes() {
        let now = Utc::now();
        let mut store = CookieStore::new();
        store.apply("a=1", first_party(), now);
        assert_eq!(store.apply("a=; max-age=0", first_party(), now), WriteOutcome::Deleted);
        assert!(store.cookies().is_empty());
    }

    #[test]
    fn test_session_cookie_has_no_expiry() {
        let now = Utc::now();
        let mut store = CookieStore::new();
        store.apply("a=1; path=/", first_party(), now);
        assert_eq!(store.cookies()[0].expires, None);
    }

    #[test]
    fn test_secure_rejected_on_insecure_origin() {
        let now = Utc::now();
        let mut store = CookieStore::new();
        let outcome = store.apply("a=1; secure", JarPolicy::default(), now);
        assert!(matches!(outcome, WriteOutcome::Dropped(_)));
    }

    #[test]
    fn test_same_site_none_requires_secure() {
        let now = Utc::now();
        let mut store = CookieStore::new();
        let outcome = store.apply("a=1; samesite=none", first_party(), now);
        assert!(matches!(outcome, WriteOutcome::Dropped(_)));
    }

    #[test]
    fn test_third_party_needs_same_site_none() {
        let now = Utc::now();
        let policy = JarPolicy {
            secure_origin: true,
            third_party: true,
            block_third_party: false,
        };
        let mut store = CookieStore::new();
        assert!(matches!(store.apply("a=1; secure; samesite=lax", policy, now), WriteOutcome::Dropped(_)));
        assert_eq!(store.apply("a=1; secure; samesite=none", policy, now), WriteOutcome::Stored);
    }

    #[test]
    fn test_third_party_blocked_entirely() {
        let now = Utc::now();
        let policy = JarPolicy {
            secure_origin: true,
            third_party: true,
            block_third_party: true,
        };
        let mut store = CookieStore::new();
        assert!(matches!(store.apply("a=1; secure; samesite=none", policy, now), WriteOutcome::Dropped(_)));
        assert!(store.cookies().is_empty());
    }

    #[test]
    fn test_memory_jar_failing() {
        let jar = MemoryCookieJar::new(first_party());
        jar.set_failing(true);
        assert!(jar.write("a=1").is_err());
        assert!(jar.read().is_err());
        jar.set_failing(false);
        jar.write("a=1").unwrap();
        assert_eq!(jar.read().unwrap(), "a=1");
    }

    #[test]
    fn test_file_jar_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let jar = FileCookieJar::new(&path, first_party());
        jar.write("clinic_token=a.b.c; path=/; samesite=lax").unwrap();

        let reopened = FileCookieJar::new(&path, first_party());
        assert_eq!(reopened.read().unwrap(), "clinic_token=a.b.c");
    }
}
