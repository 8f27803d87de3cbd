//! Generation backend selection and the shared `generate` capability.

use crate::config::{BackendConfig, BackendMode, GenerationConfig};
use crate::conversation::{CONTINUE_DIRECTIVE, ConversationWindow};
use crate::error::{BackendError, Result};
use crate::llm::{LocalBackend, RemoteBackend};

use std::time::{Duration, Instant};

/// One generation call: a window plus an optional steering directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub window: ConversationWindow,
    pub directive: Option<String>,
}

impl GenerationRequest {
    /// A fresh reply to the window.
    pub fn reply(window: ConversationWindow) -> Self {
        Self {
            window,
            directive: None,
        }
    }

    /// A continuation of the window's last bot message.
    pub fn continuation(window: ConversationWindow) -> Self {
        Self {
            window,
            directive: Some(CONTINUE_DIRECTIVE.to_string()),
        }
    }

    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }
}

/// Anything that can produce text for a generation request.
pub trait Generator: Send + Sync + 'static {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl std::future::Future<Output = std::result::Result<String, BackendError>> + Send;
}

/// The backend variant chosen at startup.
pub enum GenerationBackend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

impl GenerationBackend {
    /// Build the configured backend. Local mode starts the inference server.
    pub async fn from_config(
        backend: &BackendConfig,
        generation: &GenerationConfig,
    ) -> Result<Self> {
        match backend {
            BackendConfig::Local(local) => {
                tracing::info!(model = %local.model_path.display(), "running model locally");
                Ok(Self::Local(LocalBackend::start(local, generation).await?))
            }
            BackendConfig::Remote(remote) => {
                tracing::info!(model = %remote.model, "running model through replicate");
                Ok(Self::Remote(RemoteBackend::new(remote, generation)?))
            }
        }
    }

    pub fn mode(&self) -> BackendMode {
        match self {
            GenerationBackend::Local(_) => BackendMode::Local,
            GenerationBackend::Remote(_) => BackendMode::Remote,
        }
    }

    /// Release backend resources (stops the local server).
    pub async fn shutdown(&self) {
        if let GenerationBackend::Local(local) = self {
            local.shutdown().await;
        }
    }
}

impl Generator for GenerationBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, BackendError> {
        let started = Instant::now();
        let result = match self {
            GenerationBackend::Local(local) => local.generate(request).await,
            GenerationBackend::Remote(remote) => remote.generate(request).await,
        };

        let mode = self.mode();
        match result {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    tracing::warn!(%mode, "backend returned an empty completion");
                    return Err(BackendError::Unavailable("empty completion".into()));
                }
                tracing::debug!(
                    %mode,
                    window = request.window.len(),
                    directive = request.directive.is_some(),
                    chars = text.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation complete"
                );
                Ok(text)
            }
            Err(error) => {
                tracing::warn!(%mode, %error, "generation failed");
                Err(error)
            }
        }
    }
}

/// HTTP client used by both transports.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// Map a transport failure onto the backend taxonomy.
pub(crate) fn classify_request_error(error: reqwest::Error, timeout: Duration) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout {
            secs: timeout.as_secs(),
        }
    } else {
        BackendError::Unavailable(error.to_string())
    }
}

/// Reject non-success responses, keeping the body for diagnostics.
pub(crate) async fn expect_success(
    response: reqwest::Response,
    timeout: Duration,
) -> std::result::Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|error| classify_request_error(error, timeout))?;
    Err(BackendError::Unavailable(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body.chars().take(512).collect::<String>()
    )))
}
