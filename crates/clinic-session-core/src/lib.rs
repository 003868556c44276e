//! Core library for clinic-session.
//!
//! Resolves where a clinic tenant's session credential lives for a
//! browser-hosted application, and degrades gracefully when the embedding
//! context (top-level page, same-origin frame, cross-origin frame) prevents
//! cookies from being retained.
//!
//! - [`context`]: classifies the current frame and picks cookie attributes
//! - [`cookies`]: the cookie primitive and cookie jars
//! - [`storage`]: web storage and the injectable [`storage::SessionStore`] backends
//! - [`session`]: the [`session::ClinicSession`] facade consumed by API callers
//! - [`api`]: an HTTP client that attaches the session headers and ends the
//!   session on HTTP 401
//! - [`config`]: configuration and directory layout

pub mod api;
pub mod config;
pub mod context;
pub mod cookies;
pub mod session;
pub mod storage;

pub use api::{ApiClient, ApiError, Navigator};
pub use config::Config;
pub use context::{CookieSettings, EmbeddingContext, EmbeddingDetector, OriginCheck, SameSite};
pub use session::{ClinicSession, SessionCredential, StorageDiagnostics};
pub use storage::{SessionStore, StorageError, StorageLocation};
