//! Storage backends for the clinic session.
//!
//! [`SessionStore`] is the contract the session facade depends on. Two
//! implementations exist: [`CookieBackend`] writes through the cookie
//! primitive with context-derived attributes, and [`EphemeralBackend`] passes
//! through to session-scoped web storage. Neither ever fails from the
//! caller's point of view.

pub mod backend;
pub mod error;
pub mod web;

pub use backend::{CookieBackend, EphemeralBackend, SessionStore, StorageLocation};
pub use error::StorageError;
pub use web::{FileStorage, MemoryStorage, WebStorage};
