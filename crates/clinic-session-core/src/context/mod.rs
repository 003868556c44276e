//! Embedding context detection.
//!
//! Classifies the current frame as top-level, same-origin frame or
//! cross-origin frame without ever failing. A parent location that cannot be
//! read is treated as a positive cross-origin signal, and a frame whose
//! parent cannot be inspected at all resolves to the conservative "framed,
//! cross-origin" answer.
//!
//! The context decides which cookie attributes are written: a cross-origin
//! frame needs `SameSite=None; Secure` for the browser to keep the cookie.

pub mod detector;
pub mod frame;

pub use detector::{CookieSettings, EmbeddingContext, EmbeddingDetector, OriginCheck, SameSite};
pub use frame::{FrameLocation, FrameView, ParentAccess, StaticFrame};
