//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// System instruction prepended to every conversation window.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, respectful and honest assistant.";

/// Number of channel messages included in a window.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Upper bound on the window limit. One history read must cover limit + skip.
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Relaybot configuration.
#[derive(Clone)]
pub struct Config {
    /// Chat platform credential.
    pub discord_token: String,

    /// Generation backend selection and its settings.
    pub backend: BackendConfig,

    /// Settings shared by both backends.
    pub generation: GenerationConfig,

    /// Conversation window settings.
    pub channel: ChannelConfig,

    /// Tracked response retention.
    pub tracker: TrackerConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[redacted]")
            .field("backend", &self.backend)
            .field("generation", &self.generation)
            .field("channel", &self.channel)
            .field("tracker", &self.tracker)
            .finish()
    }
}

/// Which generation backend variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Local,
    Remote,
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(BackendMode::Local),
            "remote" | "replicate" => Ok(BackendMode::Remote),
            _ => Err(ConfigError::InvalidMode(value.to_string())),
        }
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Local => write!(f, "local"),
            BackendMode::Remote => write!(f, "remote"),
        }
    }
}

/// Backend-specific configuration. Chosen once at startup.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Local(LocalBackendConfig),
    Remote(RemoteBackendConfig),
}

impl BackendConfig {
    pub fn mode(&self) -> BackendMode {
        match self {
            BackendConfig::Local(_) => BackendMode::Local,
            BackendConfig::Remote(_) => BackendMode::Remote,
        }
    }
}

/// llama.cpp server launched on the local host.
#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
    /// Model artifact passed to the server.
    pub model_path: PathBuf,

    /// Server binary, resolved through PATH when not absolute.
    pub server_binary: String,

    /// Port the server binds on 127.0.0.1.
    pub port: u16,

    /// Context size in tokens.
    pub context_size: u32,
}

/// Replicate-hosted model.
#[derive(Clone)]
pub struct RemoteBackendConfig {
    /// `owner/name` or `owner/name:version`.
    pub model: String,

    pub api_token: String,

    pub api_base: String,
}

impl std::fmt::Debug for RemoteBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackendConfig")
            .field("model", &self.model)
            .field("api_token", &"[redacted]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Generation settings applied by both backends.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Deadline for a single generation call.
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_tokens: 512,
            temperature: 0.75,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Conversation window configuration.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Maximum messages per window.
    pub history_limit: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// How long posted responses stay eligible for continue/rewrite.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub capacity: u64,
    pub idle: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            idle: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingKey(key.into()));

        let mode: BackendMode = require("MODE")?.parse()?;
        let discord_token = require("DISCORD_API_TOKEN")?;

        let backend = match mode {
            BackendMode::Local => {
                let model_path = PathBuf::from(require("LOCAL_MODEL_PATH")?);
                if !model_path.exists() {
                    return Err(ConfigError::ModelNotFound {
                        path: model_path.display().to_string(),
                    }
                    .into());
                }
                BackendConfig::Local(LocalBackendConfig {
                    model_path,
                    server_binary: get("LLAMA_SERVER_BIN").unwrap_or_else(|| "llama-server".into()),
                    port: parse_or(&get, "LLAMA_SERVER_PORT", 8089)?,
                    context_size: parse_or(&get, "LLAMA_CONTEXT_SIZE", 4096)?,
                })
            }
            BackendMode::Remote => BackendConfig::Remote(RemoteBackendConfig {
                model: require("REPLICATE_MODEL")?,
                api_token: require("REPLICATE_API_TOKEN")?,
                api_base: get("REPLICATE_API_BASE")
                    .unwrap_or_else(|| "https://api.replicate.com".into())
                    .trim_end_matches('/')
                    .to_string(),
            }),
        };

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            system_prompt: get("RELAY_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            max_tokens: parse_or(&get, "RELAY_MAX_TOKENS", defaults.max_tokens)?,
            temperature: parse_or(&get, "RELAY_TEMPERATURE", defaults.temperature)?,
            timeout: Duration::from_secs(parse_or(
                &get,
                "RELAY_GENERATION_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        };
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "RELAY_TEMPERATURE must be between 0 and 2, got {}",
                generation.temperature
            ))
            .into());
        }
        if generation.timeout.is_zero() {
            let message = "RELAY_GENERATION_TIMEOUT_SECS must be positive";
            return Err(ConfigError::Invalid(message.into()).into());
        }

        let channel = ChannelConfig {
            history_limit: parse_or(&get, "RELAY_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
        };
        if !(1..=MAX_HISTORY_LIMIT).contains(&channel.history_limit) {
            return Err(ConfigError::Invalid(format!(
                "RELAY_HISTORY_LIMIT must be between 1 and {MAX_HISTORY_LIMIT}, got {}",
                channel.history_limit
            ))
            .into());
        }

        let tracker_defaults = TrackerConfig::default();
        let tracker = TrackerConfig {
            capacity: parse_or(&get, "RELAY_TRACKED_CAPACITY", tracker_defaults.capacity)?,
            idle: Duration::from_secs(parse_or(
                &get,
                "RELAY_TRACKED_IDLE_SECS",
                tracker_defaults.idle.as_secs(),
            )?),
        };

        Ok(Self {
            discord_token,
            backend,
            generation,
            channel,
            tracker,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> std::result::Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
