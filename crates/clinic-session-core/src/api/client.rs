//! API client for the clinic backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::ApiError;
use crate::config::{Config, ConfigError};
use crate::session::ClinicSession;

/// Header carrying the selected clinic (tenant) id, `X-Clinic-Id` on the wire.
pub const CLINIC_ID_HEADER: &str = "x-clinic-id";

/// Where the user is sent once the backend rejects the session.
pub const LOGIN_PATH: &str = "/login";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Performs the hard navigation that follows a rejected session.
pub trait Navigator: Send + Sync {
    fn hard_redirect(&self, path: &str);
}

/// Clone is cheap: reqwest::Client and the session are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<ClinicSession>,
    navigator: Arc<dyn Navigator>,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Arc<ClinicSession>, navigator: Arc<dyn Navigator>) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(ApiError::MissingBaseUrl.into());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            navigator,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Build a client against the configured base URL.
    pub fn from_config(config: &Config, session: Arc<ClinicSession>, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let base_url = config.api_base_url().map_err(|e| match e {
            ConfigError::MissingBaseUrl => anyhow::Error::from(ApiError::MissingBaseUrl),
            other => anyhow::Error::from(other),
        })?;
        Self::new(&base_url, session, navigator)
    }

    /// Override the first rate-limit backoff delay.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &ClinicSession {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Session headers for the next request. Each header is attached only
    /// when the session has the value.
    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.session.get_clinic_token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidHeader("Authorization"))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Some(clinic_id) = self.session.get_clinic_id() {
            let value = header::HeaderValue::from_str(&clinic_id)
                .map_err(|_| ApiError::InvalidHeader("X-Clinic-Id"))?;
            headers.insert(header::HeaderName::from_static(CLINIC_ID_HEADER), value);
        }
        Ok(headers)
    }

    /// End the session after the backend rejected it.
    fn end_session(&self) {
        info!("Backend rejected the session; clearing and redirecting to login");
        self.session.clear_clinic_data();
        self.navigator.hard_redirect(LOGIN_PATH);
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should
    /// retry), or Err for other errors. A 401 ends the session first.
    async fn check_response_for_retry(&self, response: Response) -> Result<Option<Response>> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response))
        } else if status.as_u16() == 429 {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);
            if error.is_unauthorized() {
                self.end_session();
            }
            Err(error.into())
        }
    }

    async fn send(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = build()
                .headers(self.auth_headers()?)
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send request to {}", url))?;

            match self.check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.send(&url, || self.client.get(&url)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self.send(&url, || self.client.post(&url).json(body)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        debug!(url = %url, "DELETE");
        self.send(&url, || self.client.delete(&url)).await?;
        Ok(())
    }

    /// Send an arbitrary request and return the body as JSON. An empty body
    /// yields `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let url = self.url(path);
        debug!(url = %url, %method, "Request");
        let response = self
            .send(&url, || {
                let request = self.client.request(method.clone(), &url);
                match body {
                    Some(body) => request.json(body),
                    None => request,
                }
            })
            .await?;

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()).into())
    }
}
