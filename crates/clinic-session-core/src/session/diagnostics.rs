use serde::{Deserialize, Serialize};

use super::facade::ConsistencyPolicy;
use crate::context::{CookieSettings, EmbeddingContext, OriginCheck};
use crate::storage::StorageLocation;

/// Which session fields a store currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StorePresence {
    pub clinic_id: bool,
    pub token: bool,
}

impl StorePresence {
    pub fn is_complete(&self) -> bool {
        self.clinic_id && self.token
    }

    pub fn is_empty(&self) -> bool {
        !self.clinic_id && !self.token
    }
}

/// Read-only snapshot of the embedding context and of what each store holds.
/// Contains no credential values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StorageDiagnostics {
    pub context: EmbeddingContext,
    pub origin_check: OriginCheck,
    pub is_in_iframe: bool,
    pub is_cross_origin: bool,
    pub is_https: bool,
    pub cookie_settings: CookieSettings,
    pub cookies: StorePresence,
    pub fallback: StorePresence,
    /// `None` when no legacy storage is attached.
    pub legacy: Option<StorePresence>,
    pub resolved_location: Option<StorageLocation>,
    pub consistency: ConsistencyPolicy,
}

impl StorageDiagnostics {
    /// Both fields exist somewhere, but no single store holds both.
    pub fn is_split(&self) -> bool {
        let id = self.cookies.clinic_id || self.fallback.clinic_id;
        let token = self.cookies.token || self.fallback.token;
        id && token && !self.cookies.is_complete() && !self.fallback.is_complete()
    }
}
