//! Top-level error types for Relaybot.

use crate::{MessageId, Notice};

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid mode: {0}. Must be 'local' or 'remote' (alias 'replicate')")]
    InvalidMode(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("local model not found at {path}")]
    ModelNotFound { path: String },
}

/// Generation backend failures. Surfaced to the user, never retried.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("generation backend timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Response lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("response {message_id} is no longer the latest message in its channel")]
    ConsistencyConflict { message_id: MessageId },

    #[error("response {message_id} is not tracked")]
    UntrackedResponse { message_id: MessageId },
}

/// Chat platform request failures.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("discord request failed: {0}")]
    Discord(#[from] serenity::Error),

    #[error("chat platform unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification used for logging and user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    BackendUnavailable,
    BackendTimeout,
    ConsistencyConflict,
    UntrackedResponse,
    Unclassified,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::BackendTimeout => "backend_timeout",
            ErrorKind::ConsistencyConflict => "consistency_conflict",
            ErrorKind::UntrackedResponse => "untracked_response",
            ErrorKind::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::Backend(BackendError::Unavailable(_)) => ErrorKind::BackendUnavailable,
            Error::Backend(BackendError::Timeout { .. }) => ErrorKind::BackendTimeout,
            Error::Lifecycle(LifecycleError::ConsistencyConflict { .. }) => {
                ErrorKind::ConsistencyConflict
            }
            Error::Lifecycle(LifecycleError::UntrackedResponse { .. }) => {
                ErrorKind::UntrackedResponse
            }
            Error::Platform(_) | Error::Other(_) => ErrorKind::Unclassified,
        }
    }

    /// The requester-only notice for this error, if it is user-visible.
    pub fn notice(&self) -> Option<Notice> {
        let description = match self.kind() {
            ErrorKind::ConsistencyConflict => {
                "There have been messages after this one. You cannot continue the response."
            }
            ErrorKind::BackendUnavailable => {
                "The model could not generate a response right now. Please try again."
            }
            ErrorKind::BackendTimeout => "The model took too long to respond. Please try again.",
            ErrorKind::UntrackedResponse => {
                "This response is no longer tracked, so it cannot be continued or rewritten."
            }
            ErrorKind::Configuration | ErrorKind::Unclassified => return None,
        };
        Some(Notice::error(description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_wrapped_error() {
        let timeout: Error = BackendError::Timeout { secs: 30 }.into();
        assert_eq!(timeout.kind(), ErrorKind::BackendTimeout);

        let conflict: Error = LifecycleError::ConsistencyConflict { message_id: 7 }.into();
        assert_eq!(conflict.kind(), ErrorKind::ConsistencyConflict);

        let other: Error = anyhow::anyhow!("boom").into();
        assert_eq!(other.kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn only_user_visible_kinds_produce_notices() {
        let conflict: Error = LifecycleError::ConsistencyConflict { message_id: 7 }.into();
        let notice = conflict.notice().expect("conflicts are user-visible");
        assert_eq!(notice.title, "Error");
        assert!(notice.description.contains("messages after this one"));

        let platform: Error = PlatformError::Unavailable("gone".into()).into();
        assert!(platform.notice().is_none());

        let config: Error = ConfigError::MissingKey("MODE".into()).into();
        assert!(config.notice().is_none());
    }
}
