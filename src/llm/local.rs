//! Local backend: a llama.cpp server on this host.

use crate::config::{GenerationConfig, LocalBackendConfig};
use crate::conversation::render_prompt;
use crate::error::{BackendError, Result};
use crate::llm::backend::{GenerationRequest, classify_request_error, expect_success, http_client};
use crate::llm::process::LlamaServerProcess;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

/// How long the server may take to load the model.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between health checks during startup.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sequences that end a bot turn in the Llama-2 chat template.
const STOP_SEQUENCES: [&str; 2] = ["</s>", "[INST]"];

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    stop: &'a [&'a str],
    cache_prompt: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    content: String,
}

/// Generation through a llama.cpp server's `/completion` endpoint.
pub struct LocalBackend {
    http: reqwest::Client,
    base_url: String,
    generation: GenerationConfig,
    process: Option<Mutex<LlamaServerProcess>>,
}

impl LocalBackend {
    /// Spawn the server and wait until the model is loaded.
    pub async fn start(config: &LocalBackendConfig, generation: &GenerationConfig) -> Result<Self> {
        let mut process = LlamaServerProcess::spawn(config)?;
        let base_url = format!("http://127.0.0.1:{}", config.port);
        let backend = Self::new(base_url, None, generation.clone())?;

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        loop {
            if let Some(status) = process.try_wait() {
                let stderr = process.stderr_output().await;
                return Err(anyhow::anyhow!(
                    "llama.cpp server exited during startup ({status}): {}",
                    stderr.trim()
                )
                .into());
            }
            if backend.is_ready().await {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                process.kill().await;
                return Err(anyhow::anyhow!(
                    "llama.cpp server was not ready within {}s",
                    STARTUP_TIMEOUT.as_secs()
                )
                .into());
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }

        tracing::info!(base_url = %backend.base_url, "llama.cpp server ready");
        Ok(Self {
            process: Some(Mutex::new(process)),
            ..backend
        })
    }

    fn new(
        base_url: String,
        process: Option<Mutex<LlamaServerProcess>>,
        generation: GenerationConfig,
    ) -> Result<Self> {
        let http = http_client(generation.timeout).context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            generation,
            process,
        })
    }

    /// Whether the server reports the model as loaded.
    async fn is_ready(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, BackendError> {
        let timeout = self.generation.timeout;
        let prompt = render_prompt(
            &self.generation.system_prompt,
            &request.window,
            request.directive(),
        );
        let body = CompletionBody {
            prompt: &prompt,
            n_predict: self.generation.max_tokens,
            temperature: self.generation.temperature,
            stop: &STOP_SEQUENCES,
            cache_prompt: true,
        };

        let response = self
            .http
            .post(format!("{}/completion", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| classify_request_error(error, timeout))?;
        let response = expect_success(response, timeout).await?;
        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|error| classify_request_error(error, timeout))?;

        Ok(reply.content)
    }

    /// Stop the server if this backend owns one.
    pub async fn shutdown(&self) {
        if let Some(process) = &self.process {
            process.lock().await.kill().await;
        }
    }
}
