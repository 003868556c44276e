//! REST API client for the clinic backend.
//!
//! Every request carries the session headers taken from the
//! [`ClinicSession`](crate::session::ClinicSession):
//! `Authorization: Bearer <token>` and `X-Clinic-Id: <clinic id>`.
//!
//! The backend is the only authority on token validity. An HTTP 401 clears
//! the session and sends the user to `/login`.

pub mod client;
pub mod error;

pub use client::{ApiClient, Navigator, CLINIC_ID_HEADER, LOGIN_PATH};
pub use reqwest::Method;
pub use error::ApiError;
