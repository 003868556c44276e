//! Wires the session facade the way a browser tab would: cookies in a
//! persistent jar, session storage in process memory, and the pre-cookie
//! `localStorage` on disk.

use std::sync::Arc;

use anyhow::{Context, Result};
use clinic_session_core::context::{EmbeddingContext, EmbeddingDetector, FrameView};
use clinic_session_core::cookies::FileCookieJar;
use clinic_session_core::storage::{CookieBackend, EphemeralBackend, FileStorage, MemoryStorage};
use clinic_session_core::{ApiClient, ClinicSession, Config, Navigator};
use tracing::debug;

pub struct Host {
    pub config: Config,
    pub session: Arc<ClinicSession>,
}

impl Host {
    /// `frame` pins the embedding context instead of deriving it from the
    /// configured locations.
    pub fn open(config: Config, frame: Option<EmbeddingContext>) -> Result<Self> {
        let view: Arc<dyn FrameView> = Arc::new(config.frame.view());
        let detector = match frame {
            Some(context) => EmbeddingDetector::forced(view, context),
            None => EmbeddingDetector::new(view),
        };

        let jar_path = config
            .cookie_jar_path()
            .context("Failed to locate cookie jar")?;
        let local_storage_path = config
            .local_storage_path()
            .context("Failed to locate local storage")?;
        debug!(jar = %jar_path.display(), context = %detector.context(), "Opening session host");

        let jar = Arc::new(FileCookieJar::new(jar_path, config.frame.jar_policy(&detector)));
        let cookies = CookieBackend::new(jar, detector.clone(), config.cookie_expiry_days);
        let fallback = EphemeralBackend::new(Arc::new(MemoryStorage::new()));

        let session = ClinicSession::new(Arc::new(cookies), Arc::new(fallback), detector)
            .with_legacy_storage(Arc::new(FileStorage::new(local_storage_path)))
            .with_consistency(config.consistency);

        Ok(Self {
            config,
            session: Arc::new(session),
        })
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::from_config(&self.config, self.session.clone(), Arc::new(TerminalNavigator))
            .context("Cannot send requests")
    }
}

/// There is no page to reload in a terminal; tell the user to log in again.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn hard_redirect(&self, path: &str) {
        eprintln!(
            "Session ended by the server (redirect to {}). Run `clinic-session login` to sign in again.",
            path
        );
    }
}
