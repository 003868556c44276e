use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::diagnostics::{StorageDiagnostics, StorePresence};
use super::token::{is_token_shape_valid, SessionCredential};
use crate::context::EmbeddingDetector;
use crate::cookies::CookieJar;
use crate::storage::{CookieBackend, EphemeralBackend, SessionStore, StorageLocation, WebStorage};

/// Storage key (cookie name and web storage key) of the selected clinic.
pub const CLINIC_ID_KEY: &str = "selected_clinic_id";

/// Storage key (cookie name and web storage key) of the bearer token.
pub const CLINIC_TOKEN_KEY: &str = "clinic_token";

/// Lifetime of session cookies.
pub const COOKIE_EXPIRY_DAYS: i64 = 30;

/// How reads pick between stores when they disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyPolicy {
    /// Each field comes from the first store that has it, so the clinic id
    /// and the token can come from different stores.
    #[default]
    Lenient,
    /// Both fields come from one store: the first holding both, otherwise the
    /// first holding a token.
    SameStore,
}

/// Per-store result of a verified write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub cookie: bool,
    pub fallback: bool,
}

impl WriteReport {
    pub fn any(&self) -> bool {
        self.cookie || self.fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationOutcome {
    /// Legacy values were copied and the legacy keys deleted.
    Migrated,
    /// The session stores already hold a credential; legacy keys untouched.
    AlreadyPresent,
    /// No complete legacy credential was found.
    NothingToMigrate,
    /// No legacy storage is attached.
    NoLegacyStorage,
}

/// The clinic session, stored redundantly in cookies and session storage.
///
/// Every method is infallible. Storage failures are logged by the backends
/// and show up here only as missing values.
pub struct ClinicSession {
    cookies: Arc<dyn SessionStore>,
    fallback: Arc<dyn SessionStore>,
    detector: EmbeddingDetector,
    legacy: Option<Arc<dyn WebStorage>>,
    consistency: ConsistencyPolicy,
}

impl ClinicSession {
    pub fn new(
        cookies: Arc<dyn SessionStore>,
        fallback: Arc<dyn SessionStore>,
        detector: EmbeddingDetector,
    ) -> Self {
        Self {
            cookies,
            fallback,
            detector,
            legacy: None,
            consistency: ConsistencyPolicy::default(),
        }
    }

    /// Wire the usual browser backends: a cookie jar and session storage.
    pub fn from_parts(
        jar: Arc<dyn CookieJar>,
        session_storage: Arc<dyn WebStorage>,
        detector: EmbeddingDetector,
    ) -> Self {
        let cookies = CookieBackend::new(jar, detector.clone(), COOKIE_EXPIRY_DAYS);
        let fallback = EphemeralBackend::new(session_storage);
        Self::new(Arc::new(cookies), Arc::new(fallback), detector)
    }

    /// Attach the pre-cookie `localStorage` for [`Self::migrate_from_local_storage`].
    pub fn with_legacy_storage(mut self, legacy: Arc<dyn WebStorage>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyPolicy) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn consistency(&self) -> ConsistencyPolicy {
        self.consistency
    }

    pub fn detector(&self) -> &EmbeddingDetector {
        &self.detector
    }

    /// Stores in read-priority order.
    fn stores(&self) -> [&dyn SessionStore; 2] {
        [self.cookies.as_ref(), self.fallback.as_ref()]
    }

    // ===== Writes =====

    /// Store both fields in cookies, then in session storage.
    pub fn set_clinic_data(&self, clinic_id: &str, token: &str) {
        for store in self.stores() {
            store.set(CLINIC_ID_KEY, clinic_id);
            store.set(CLINIC_TOKEN_KEY, token);
        }
        debug!(clinic_id, context = %self.detector.context(), "Stored clinic session");
    }

    /// Same as [`Self::set_clinic_data`], reading each value back to report
    /// which stores actually kept it.
    pub fn set_clinic_data_verified(&self, clinic_id: &str, token: &str) -> WriteReport {
        let write = |store: &dyn SessionStore| {
            let id_ok = store.set_verified(CLINIC_ID_KEY, clinic_id);
            let token_ok = store.set_verified(CLINIC_TOKEN_KEY, token);
            id_ok && token_ok
        };
        let report = WriteReport {
            cookie: write(self.cookies.as_ref()),
            fallback: write(self.fallback.as_ref()),
        };
        if !report.cookie {
            warn!(
                clinic_id,
                context = %self.detector.context(),
                "Cookie store did not retain the session; relying on session storage"
            );
        }
        if !report.any() {
            warn!(clinic_id, "No store retained the session");
        }
        report
    }

    /// Replace the token only, keeping the selected clinic.
    pub fn set_auth_token(&self, token: &str) {
        for store in self.stores() {
            store.set(CLINIC_TOKEN_KEY, token);
        }
        debug!("Stored auth token");
    }

    /// Remove both fields from every store.
    pub fn clear_clinic_data(&self) {
        for store in self.stores() {
            store.remove(CLINIC_ID_KEY);
            store.remove(CLINIC_TOKEN_KEY);
        }
        info!("Cleared clinic session");
    }

    // ===== Reads =====

    pub fn get_clinic_id(&self) -> Option<String> {
        self.read(CLINIC_ID_KEY)
    }

    pub fn get_clinic_token(&self) -> Option<String> {
        self.read(CLINIC_TOKEN_KEY)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.consistency {
            ConsistencyPolicy::Lenient => self.stores().into_iter().find_map(|store| store.get(key)),
            ConsistencyPolicy::SameStore => self.resolved_store().and_then(|store| store.get(key)),
        }
    }

    /// The store that serves the credential: the first holding both fields,
    /// otherwise the first holding a token.
    fn resolved_store(&self) -> Option<&dyn SessionStore> {
        let stores = self.stores();
        stores
            .into_iter()
            .find(|store| store.exists(CLINIC_ID_KEY) && store.exists(CLINIC_TOKEN_KEY))
            .or_else(|| stores.into_iter().find(|store| store.exists(CLINIC_TOKEN_KEY)))
    }

    pub fn resolved_location(&self) -> Option<StorageLocation> {
        self.resolved_store().map(|store| store.location())
    }

    /// The id/token pair, resolved under the configured consistency policy.
    pub fn credential(&self) -> Option<SessionCredential> {
        Some(SessionCredential::new(self.get_clinic_id()?, self.get_clinic_token()?))
    }

    /// True when some single store holds both fields. With
    /// [`ConsistencyPolicy::Lenient`] this does not guarantee that
    /// `get_clinic_id` and `get_clinic_token` come from that store.
    pub fn has_clinic_data(&self) -> bool {
        self.stores()
            .into_iter()
            .any(|store| store.exists(CLINIC_ID_KEY) && store.exists(CLINIC_TOKEN_KEY))
    }

    /// True when any store holds a token, with or without a clinic.
    pub fn has_auth_token(&self) -> bool {
        self.stores().into_iter().any(|store| store.exists(CLINIC_TOKEN_KEY))
    }

    /// JWT shape check of the current token.
    pub fn is_token_valid(&self) -> bool {
        is_token_shape_valid(self.get_clinic_token().as_deref())
    }

    pub fn storage_diagnostics(&self) -> StorageDiagnostics {
        let presence = |store: &dyn SessionStore| StorePresence {
            clinic_id: store.exists(CLINIC_ID_KEY),
            token: store.exists(CLINIC_TOKEN_KEY),
        };

        StorageDiagnostics {
            context: self.detector.context(),
            origin_check: self.detector.check_origin(),
            is_in_iframe: self.detector.is_in_iframe(),
            is_cross_origin: self.detector.is_in_cross_origin_iframe(),
            is_https: self.detector.is_https(),
            cookie_settings: self.detector.cookie_settings(),
            cookies: presence(self.cookies.as_ref()),
            fallback: presence(self.fallback.as_ref()),
            legacy: self.legacy.as_ref().map(|legacy| StorePresence {
                clinic_id: matches!(legacy.get_item(CLINIC_ID_KEY), Ok(Some(_))),
                token: matches!(legacy.get_item(CLINIC_TOKEN_KEY), Ok(Some(_))),
            }),
            resolved_location: self.resolved_location(),
            consistency: self.consistency,
        }
    }

    // ===== Legacy migration =====

    /// Move a credential from the legacy `localStorage` keys into the session
    /// stores, if the session stores are still empty. Repeat calls are no-ops.
    pub fn migrate_from_local_storage(&self) -> MigrationOutcome {
        let Some(legacy) = self.legacy.as_ref() else {
            return MigrationOutcome::NoLegacyStorage;
        };

        let read = |key: &str| match legacy.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read legacy storage");
                None
            }
        };

        let (Some(clinic_id), Some(token)) = (read(CLINIC_ID_KEY), read(CLINIC_TOKEN_KEY)) else {
            return MigrationOutcome::NothingToMigrate;
        };

        if self.has_clinic_data() {
            debug!("Session stores already populated; skipping legacy migration");
            return MigrationOutcome::AlreadyPresent;
        }

        self.set_clinic_data(&clinic_id, &token);
        for key in [CLINIC_ID_KEY, CLINIC_TOKEN_KEY] {
            if let Err(e) = legacy.remove_item(key) {
                warn!(key, error = %e, "Failed to remove legacy key");
            }
        }
        info!(clinic_id = %clinic_id, "Migrated clinic session from legacy storage");
        MigrationOutcome::Migrated
    }
}

impl fmt::Debug for ClinicSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClinicSession")
            .field("detector", &self.detector)
            .field("has_legacy", &self.legacy.is_some())
            .field("consistency", &self.consistency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EmbeddingContext, StaticFrame};
    use crate::cookies::{JarPolicy, MemoryCookieJar};
    use crate::storage::MemoryStorage;

    struct Harness {
        jar: Arc<MemoryCookieJar>,
        session_storage: Arc<MemoryStorage>,
        legacy: Arc<MemoryStorage>,
        session: ClinicSession,
    }

    fn harness(context: EmbeddingContext, policy: JarPolicy) -> Harness {
        let jar = Arc::new(MemoryCookieJar::new(policy));
        let session_storage = Arc::new(MemoryStorage::new());
        let legacy = Arc::new(MemoryStorage::new());
        let view = Arc::new(StaticFrame::top_level("https://app.example.com/"));
        let detector = EmbeddingDetector::forced(view, context);
        let session = ClinicSession::from_parts(jar.clone(), session_storage.clone(), detector)
            .with_legacy_storage(legacy.clone());
        Harness {
            jar,
            session_storage,
            legacy,
            session,
        }
    }

    fn top_level() -> Harness {
        harness(
            EmbeddingContext::TopLevel,
            JarPolicy {
                secure_origin: true,
                ..JarPolicy::default()
            },
        )
    }

    #[test]
    fn test_set_clinic_data_writes_both_stores() {
        let h = top_level();
        h.session.set_clinic_data("t1", "tok1");

        assert!(h.session.has_clinic_data());
        assert_eq!(h.session.get_clinic_id().as_deref(), Some("t1"));
        assert_eq!(h.session.get_clinic_token().as_deref(), Some("tok1"));
        assert_eq!(h.jar.snapshot().len(), 2);
        assert_eq!(h.session_storage.get_item(CLINIC_ID_KEY).unwrap().as_deref(), Some("t1"));
        assert_eq!(h.session.resolved_location(), Some(StorageLocation::Cookie));
    }

    #[test]
    fn test_set_auth_token_keeps_clinic() {
        let h = top_level();
        h.session.set_clinic_data("t1", "tok1");
        h.session.set_auth_token("tok2");

        assert_eq!(h.session.get_clinic_id().as_deref(), Some("t1"));
        assert_eq!(h.session.get_clinic_token().as_deref(), Some("tok2"));
        assert_eq!(h.session_storage.get_item(CLINIC_TOKEN_KEY).unwrap().as_deref(), Some("tok2"));
    }

    #[test]
    fn test_clear_is_total() {
        let h = top_level();
        h.session.set_clinic_data("t1", "tok1");
        h.session.clear_clinic_data();

        assert_eq!(h.session.get_clinic_id(), None);
        assert_eq!(h.session.get_clinic_token(), None);
        assert!(!h.session.has_clinic_data());
        assert!(!h.session.has_auth_token());
        assert!(h.session_storage.is_empty());
        assert!(h.jar.snapshot().is_empty());
    }

    #[test]
    fn test_token_without_clinic() {
        let h = top_level();
        h.session.set_auth_token("a.b.c");
        assert!(h.session.has_auth_token());
        assert!(!h.session.has_clinic_data());
        assert!(h.session.credential().is_none());
        assert!(h.session.is_token_valid());
    }

    #[test]
    fn test_is_token_valid_uses_current_token() {
        let h = top_level();
        assert!(!h.session.is_token_valid());
        h.session.set_clinic_data("t1", "not-a-jwt");
        assert!(!h.session.is_token_valid());
        h.session.set_auth_token("aaa.bbb.ccc");
        assert!(h.session.is_token_valid());
    }

    #[test]
    fn test_fallback_serves_reads_when_cookies_fail() {
        let h = top_level();
        h.jar.set_failing(true);
        h.session.set_clinic_data("t1", "tok1");

        assert_eq!(h.session.get_clinic_id().as_deref(), Some("t1"));
        assert_eq!(h.session.resolved_location(), Some(StorageLocation::FallbackSession));
    }

    #[test]
    fn test_cookies_serve_reads_when_session_storage_disabled() {
        let h = top_level();
        h.session_storage.set_disabled(true);
        h.session.set_clinic_data("t1", "tok1");

        assert_eq!(h.session.get_clinic_token().as_deref(), Some("tok1"));
        assert!(h.session.has_clinic_data());
    }

    #[test]
    fn test_verified_write_reports_dropped_cookie() {
        let h = harness(
            EmbeddingContext::CrossOriginFrame,
            JarPolicy {
                secure_origin: true,
                third_party: true,
                block_third_party: true,
            },
        );
        let report = h.session.set_clinic_data_verified("t1", "tok1");
        assert_eq!(report, WriteReport { cookie: false, fallback: true });
        assert!(report.any());
    }

    /// tenant id in cookies, both fields in session storage
    fn split_state(h: &Harness) {
        h.jar.write("selected_clinic_id=t-cookie; path=/").unwrap();
        h.session_storage.set_item(CLINIC_TOKEN_KEY, "tok-fallback").unwrap();
        h.session_storage.set_item(CLINIC_ID_KEY, "t-fallback").unwrap();
    }

    #[test]
    fn test_lenient_reads_mix_stores() {
        let h = top_level();
        split_state(&h);

        assert!(h.session.has_clinic_data());
        let credential = h.session.credential().unwrap();
        assert_eq!(credential.tenant_id, "t-cookie");
        assert_eq!(credential.auth_token, "tok-fallback");
    }

    #[test]
    fn test_same_store_reads_stay_together() {
        let mut h = top_level();
        h.session = h.session.with_consistency(ConsistencyPolicy::SameStore);
        split_state(&h);

        let credential = h.session.credential().unwrap();
        assert_eq!(credential.tenant_id, "t-fallback");
        assert_eq!(credential.auth_token, "tok-fallback");
        assert!(!h.session.storage_diagnostics().is_split());
    }

    /// tenant id only in cookies, token only in session storage
    fn disjoint_state(h: &Harness) {
        h.jar.write("selected_clinic_id=t-cookie; path=/").unwrap();
        h.session_storage.set_item(CLINIC_TOKEN_KEY, "tok-fallback").unwrap();
    }

    #[test]
    fn test_lenient_disjoint_stores_read_without_clinic_data() {
        let h = top_level();
        disjoint_state(&h);

        assert_eq!(h.session.get_clinic_id().as_deref(), Some("t-cookie"));
        assert_eq!(h.session.get_clinic_token().as_deref(), Some("tok-fallback"));
        assert!(!h.session.has_clinic_data());
        assert!(h.session.has_auth_token());
        assert!(h.session.credential().is_some());

        let diagnostics = h.session.storage_diagnostics();
        assert!(diagnostics.is_split());
        assert_eq!(diagnostics.resolved_location, Some(StorageLocation::FallbackSession));
    }

    #[test]
    fn test_same_store_disjoint_stores_yield_no_credential() {
        let mut h = top_level();
        h.session = h.session.with_consistency(ConsistencyPolicy::SameStore);
        disjoint_state(&h);

        assert_eq!(h.session.get_clinic_id(), None);
        assert_eq!(h.session.get_clinic_token().as_deref(), Some("tok-fallback"));
        assert!(h.session.credential().is_none());
        assert!(!h.session.has_clinic_data());
        assert_eq!(h.session.resolved_location(), Some(StorageLocation::FallbackSession));
        assert!(h.session.storage_diagnostics().is_split());
    }

    #[test]
    fn test_migration_is_one_shot() {
        let h = top_level();
        h.legacy.set_item(CLINIC_ID_KEY, "legacy-clinic").unwrap();
        h.legacy.set_item(CLINIC_TOKEN_KEY, "l.e.g").unwrap();

        assert_eq!(h.session.migrate_from_local_storage(), MigrationOutcome::Migrated);
        assert_eq!(h.session.get_clinic_id().as_deref(), Some("legacy-clinic"));
        assert_eq!(h.session.get_clinic_token().as_deref(), Some("l.e.g"));
        assert!(h.legacy.is_empty());

        assert_eq!(h.session.migrate_from_local_storage(), MigrationOutcome::NothingToMigrate);
        assert_eq!(h.session.get_clinic_id().as_deref(), Some("legacy-clinic"));
    }

    #[test]
    fn test_migration_does_not_overwrite_existing_session() {
        let h = top_level();
        h.session.set_clinic_data("current", "c.u.r");
        h.legacy.set_item(CLINIC_ID_KEY, "legacy-clinic").unwrap();
        h.legacy.set_item(CLINIC_TOKEN_KEY, "l.e.g").unwrap();

        assert_eq!(h.session.migrate_from_local_storage(), MigrationOutcome::AlreadyPresent);
        assert_eq!(h.session.get_clinic_id().as_deref(), Some("current"));
        assert_eq!(h.legacy.len(), 2);
    }

    #[test]
    fn test_migration_needs_both_legacy_keys() {
        let h = top_level();
        h.legacy.set_item(CLINIC_TOKEN_KEY, "l.e.g").unwrap();
        assert_eq!(h.session.migrate_from_local_storage(), MigrationOutcome::NothingToMigrate);
        assert!(!h.session.has_auth_token());
    }

    #[test]
    fn test_migration_without_legacy_storage() {
        let jar = Arc::new(MemoryCookieJar::default());
        let view = Arc::new(StaticFrame::top_level("http://localhost/"));
        let session = ClinicSession::from_parts(jar, Arc::new(MemoryStorage::new()), EmbeddingDetector::new(view));
        assert_eq!(session.migrate_from_local_storage(), MigrationOutcome::NoLegacyStorage);
        assert_eq!(session.storage_diagnostics().legacy, None);
    }

    #[test]
    fn test_diagnostics_report_presence() {
        let h = top_level();
        h.session.set_auth_token("a.b.c");
        let diagnostics = h.session.storage_diagnostics();

        assert_eq!(diagnostics.context, EmbeddingContext::TopLevel);
        assert!(!diagnostics.is_in_iframe);
        assert_eq!(diagnostics.cookies, StorePresence { clinic_id: false, token: true });
        assert_eq!(diagnostics.fallback, StorePresence { clinic_id: false, token: true });
        assert_eq!(diagnostics.legacy, Some(StorePresence::default()));
        assert_eq!(diagnostics.resolved_location, Some(StorageLocation::Cookie));
    }
}
