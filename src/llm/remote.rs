//! Remote backend: a model hosted on Replicate.

use crate::config::{GenerationConfig, RemoteBackendConfig};
use crate::conversation::render_prompt;
use crate::error::{BackendError, ConfigError, Result};
use crate::llm::backend::{GenerationRequest, classify_request_error, expect_success, http_client};

use anyhow::Context as _;
use serde::Deserialize;
use std::time::Duration;

/// Interval between prediction status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which Replicate endpoint a model reference resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReference {
    /// `owner/name`: the model's latest version.
    Model { owner: String, name: String },
    /// `owner/name:version`: a pinned version.
    Version { version: String },
}

impl ModelReference {
    pub fn parse(reference: &str) -> std::result::Result<Self, ConfigError> {
        let invalid = || {
            ConfigError::Invalid(format!(
                "REPLICATE_MODEL must be 'owner/name' or 'owner/name:version', got '{reference}'"
            ))
        };
        let (path, version) = match reference.trim().split_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (reference.trim(), None),
        };
        let (owner, name) = path.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        match version {
            Some(version) if version.is_empty() => Err(invalid()),
            Some(version) => Ok(Self::Version {
                version: version.to_string(),
            }),
            None => Ok(Self::Model {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn predictions_url(&self, api_base: &str) -> String {
        match self {
            ModelReference::Model { owner, name } => {
                format!("{api_base}/v1/models/{owner}/{name}/predictions")
            }
            ModelReference::Version { .. } => format!("{api_base}/v1/predictions"),
        }
    }

    fn request_body(&self, input: serde_json::Value) -> serde_json::Value {
        match self {
            ModelReference::Model { .. } => serde_json::json!({ "input": input }),
            ModelReference::Version { version } => {
                serde_json::json!({ "version": version, "input": input })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Aborted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

/// Language models on Replicate stream output as an array of fragments.
fn output_text(output: Option<serde_json::Value>) -> String {
    match output {
        Some(serde_json::Value::String(text)) => text,
        Some(serde_json::Value::Array(fragments)) => fragments
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Generation through Replicate's predictions API.
pub struct RemoteBackend {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    model: ModelReference,
    generation: GenerationConfig,
}

impl RemoteBackend {
    pub fn new(config: &RemoteBackendConfig, generation: &GenerationConfig) -> Result<Self> {
        let model = ModelReference::parse(&config.model)?;
        let http = http_client(generation.timeout).context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            api_token: config.api_token.clone(),
            model,
            generation: generation.clone(),
        })
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

        match tokio::time::timeout(timeout, self.run_prediction(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }

    fn input(&self, prompt: &str) -> serde_json::Value {
        // The prompt is already templated; stop the service from wrapping it again.
        serde_json::json!({
            "prompt": prompt,
            "prompt_template": "{prompt}",
            "system_prompt": self.generation.system_prompt,
            "max_new_tokens": self.generation.max_tokens,
            "temperature": self.generation.temperature,
        })
    }

    async fn run_prediction(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let timeout = self.generation.timeout;
        let response = self
            .http
            .post(self.model.predictions_url(&self.api_base))
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&self.model.request_body(self.input(prompt)))
            .send()
            .await
            .map_err(|error| classify_request_error(error, timeout))?;
        let mut prediction = self.read_prediction(response).await?;

        loop {
            match prediction.status {
                PredictionStatus::Succeeded => return Ok(output_text(prediction.output)),
                PredictionStatus::Failed
                | PredictionStatus::Canceled
                | PredictionStatus::Aborted => {
                    let reason = prediction
                        .error
                        .map(|error| match error {
                            serde_json::Value::String(text) => text,
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "no error reported".into());
                    return Err(BackendError::Unavailable(format!(
                        "prediction {} {:?}: {reason}",
                        prediction.id, prediction.status
                    )));
                }
                PredictionStatus::Starting
                | PredictionStatus::Processing
                | PredictionStatus::Unknown => {}
            }

            let Some(urls) = prediction.urls.as_ref() else {
                return Err(BackendError::Unavailable(format!(
                    "prediction {} is still running but has no status url",
                    prediction.id
                )));
            };

            tracing::debug!(
                prediction_id = %prediction.id,
                status = ?prediction.status,
                "polling prediction"
            );
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self
                .http
                .get(&urls.get)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|error| classify_request_error(error, timeout))?;
            prediction = self.read_prediction(response).await?;
        }
    }

    async fn read_prediction(
        &self,
        response: reqwest::Response,
    ) -> std::result::Result<Prediction, BackendError> {
        let timeout = self.generation.timeout;
        let response = expect_success(response, timeout).await?;
        response
            .json::<Prediction>()
            .await
            .map_err(|error| classify_request_error(error, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use tokio::net::TcpListener;

    fn remote_config(api_base: String) -> RemoteBackendConfig {
        RemoteBackendConfig {
            model: "meta/llama-2-70b-chat".into(),
            api_token: "r8_test".into(),
            api_base,
        }
    }

    #[test]
    fn parses_model_references() {
        assert_eq!(
            ModelReference::parse("meta/llama-2-70b-chat").expect("valid"),
            ModelReference::Model {
                owner: "meta".into(),
                name: "llama-2-70b-chat".into()
            }
        );
        assert_eq!(
            ModelReference::parse("a16z-infra/llama13b-v2-chat:df7690").expect("valid"),
            ModelReference::Version {
                version: "df7690".into()
            }
        );
        for invalid in ["llama", "/name", "owner/", "owner/name:", "a/b/c"] {
            assert!(ModelReference::parse(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn builds_endpoint_and_body_per_reference_kind() {
        let base = "https://api.replicate.com";
        let model = ModelReference::parse("meta/llama-2-70b-chat").expect("valid");
        assert_eq!(
            model.predictions_url(base),
            "https://api.replicate.com/v1/models/meta/llama-2-70b-chat/predictions"
        );
        let body = model.request_body(serde_json::json!({"prompt": "hi"}));
        assert!(body.get("version").is_none());

        let pinned = ModelReference::parse("meta/llama-2-70b-chat:abc123").expect("valid");
        assert_eq!(pinned.predictions_url(base), "https://api.replicate.com/v1/predictions");
        let body = pinned.request_body(serde_json::json!({"prompt": "hi"}));
        assert_eq!(body["version"], "abc123");
        assert_eq!(body["input"]["prompt"], "hi");
    }

    #[test]
    fn joins_streamed_output_fragments() {
        assert_eq!(
            output_text(Some(serde_json::json!(["Hel", "lo", " there"]))),
            "Hello there"
        );
        assert_eq!(output_text(Some(serde_json::json!("whole"))), "whole");
        assert_eq!(output_text(None), "");
    }

    #[test]
    fn parses_prediction_payloads() {
        let prediction: Prediction = serde_json::from_str(
            r#"{
                "id": "ufawqhfynnddngldkgtslldrkq",
                "status": "processing",
                "output": null,
                "urls": {
                    "get": "https://api.replicate.com/v1/predictions/ufawq",
                    "cancel": "https://api.replicate.com/v1/predictions/ufawq/cancel"
                }
            }"#,
        )
        .expect("prediction parses");
        assert_eq!(prediction.status, PredictionStatus::Processing);
        assert!(prediction.urls.is_some());

        let prediction: Prediction =
            serde_json::from_str(r#"{"id": "x", "status": "queued"}"#).expect("prediction parses");
        assert_eq!(prediction.status, PredictionStatus::Unknown);
    }

    #[test]
    fn input_keeps_the_rendered_prompt_verbatim() {
        let backend = RemoteBackend::new(
            &remote_config("https://api.replicate.com".into()),
            &GenerationConfig::default(),
        )
        .expect("backend builds");
        let input = backend.input("<s>[INST] hi [/INST]");
        assert_eq!(input["prompt"], "<s>[INST] hi [/INST]");
        assert_eq!(input["prompt_template"], "{prompt}");
        assert_eq!(input["max_new_tokens"], 512);
    }

    #[tokio::test]
    async fn silent_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        let _accepting = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let generation = GenerationConfig {
            timeout: Duration::from_millis(200),
            ..GenerationConfig::default()
        };
        let backend = RemoteBackend::new(&remote_config(format!("http://{address}")), &generation)
            .expect("backend builds");

        let request = GenerationRequest::reply(vec![Message::user("hi")].into());
        let error = backend.generate(&request).await.unwrap_err();
        assert!(matches!(error, BackendError::Timeout { .. }), "{error:?}");
    }
}
