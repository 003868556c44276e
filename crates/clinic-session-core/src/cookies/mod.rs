//! Cookie primitive and cookie jars.
//!
//! [`Cookies`] reads and writes single named, percent-encoded cookies scoped to
//! path `/` on top of any [`CookieJar`].

pub mod jar;
pub mod primitive;

pub use jar::{CookieJar, CookieStore, FileCookieJar, JarPolicy, MemoryCookieJar, StoredCookie};
pub use primitive::{CookieOptions, Cookies, MAX_COOKIE_DAYS};
