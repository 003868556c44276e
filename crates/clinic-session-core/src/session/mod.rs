//! The clinic session facade.
//!
//! A session credential is the pair of the selected clinic (tenant) id and
//! the bearer token. It is written to cookies and to session storage on
//! every update; reads prefer cookies and fall back to session storage.
//!
//! Token validity is only checked for JWT shape here. The backend decides
//! whether a token is actually good, and an HTTP 401 ends the session (see
//! [`crate::api`]).

pub mod diagnostics;
pub mod facade;
pub mod token;

pub use diagnostics::{StorageDiagnostics, StorePresence};
pub use facade::{
    ClinicSession, ConsistencyPolicy, MigrationOutcome, WriteReport, CLINIC_ID_KEY,
    CLINIC_TOKEN_KEY, COOKIE_EXPIRY_DAYS,
};
pub use token::{is_token_shape_valid, SessionCredential};
