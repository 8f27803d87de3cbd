//! Tracked responses: what the relay posted and where each one stands.

use crate::config::TrackerConfig;
use crate::error::{LifecycleError, Result};
use crate::{ChannelId, ChannelMessage, MessageId};

use moka::sync::Cache;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where a tracked response is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Posted,
    Continuing,
    Rewriting,
    /// The channel moved on. Continue is refused from here on.
    Stale,
}

impl std::fmt::Display for ResponseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseState::Posted => write!(f, "posted"),
            ResponseState::Continuing => write!(f, "continuing"),
            ResponseState::Rewriting => write!(f, "rewriting"),
            ResponseState::Stale => write!(f, "stale"),
        }
    }
}

/// A response being generated. Becomes tracked only once it is posted.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    channel_id: ChannelId,
    origin: String,
}

impl PendingResponse {
    pub fn new(channel_id: ChannelId, origin: impl Into<String>) -> Self {
        Self {
            channel_id,
            origin: origin.into(),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Record the message the platform stored for this response.
    pub fn posted(self, message: ChannelMessage) -> TrackedResponse {
        TrackedResponse {
            channel_id: self.channel_id,
            message_id: message.id,
            content: message.content,
            origin: self.origin,
            state: ResponseState::Posted,
        }
    }
}

/// A response the relay posted and may later continue or rewrite.
#[derive(Debug, Clone)]
pub struct TrackedResponse {
    channel_id: ChannelId,
    message_id: MessageId,
    content: String,
    origin: String,
    state: ResponseState,
}

impl TrackedResponse {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Content as currently displayed in the channel.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content of the message this response answered.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ResponseState) {
        self.state = state;
    }

    pub(crate) fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }
}

/// A tracked response behind its own lock. Held for a whole transition.
pub type SharedResponse = Arc<Mutex<TrackedResponse>>;

/// Bounded registry of tracked responses keyed by posted message id.
#[derive(Clone)]
pub struct ResponseTracker {
    responses: Cache<MessageId, SharedResponse>,
}

impl ResponseTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        let responses = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_idle(config.idle)
            .build();
        Self { responses }
    }

    /// Start tracking a posted response.
    pub fn register(&self, response: TrackedResponse) -> SharedResponse {
        let message_id = response.message_id;
        let channel_id = response.channel_id;
        let shared = Arc::new(Mutex::new(response));
        self.responses.insert(message_id, shared.clone());
        tracing::debug!(channel_id, message_id, "response tracked");
        shared
    }

    pub fn get(&self, message_id: MessageId) -> Option<SharedResponse> {
        self.responses.get(&message_id)
    }

    /// Look up a response an interaction was invoked on.
    pub fn resolve(&self, message_id: MessageId) -> Result<SharedResponse> {
        self.get(message_id)
            .ok_or_else(|| LifecycleError::UntrackedResponse { message_id }.into())
    }

    /// Approximate number of tracked responses.
    pub fn len(&self) -> u64 {
        self.responses.run_pending_tasks();
        self.responses.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use std::time::Duration;

    fn posted(id: MessageId, content: &str) -> ChannelMessage {
        ChannelMessage {
            id,
            channel_id: 10,
            author_id: 1,
            content: content.into(),
        }
    }

    #[test]
    fn pending_becomes_posted_with_the_stored_content() {
        let pending = PendingResponse::new(10, "hi");
        assert_eq!(pending.channel_id(), 10);

        let tracked = pending.posted(posted(500, "hello"));
        assert_eq!(tracked.message_id(), 500);
        assert_eq!(tracked.content(), "hello");
        assert_eq!(tracked.origin(), "hi");
        assert_eq!(tracked.state(), ResponseState::Posted);
    }

    #[test]
    fn resolves_registered_responses_by_message_id() {
        let tracker = ResponseTracker::new(&TrackerConfig::default());
        tracker.register(PendingResponse::new(10, "hi").posted(posted(500, "hello")));

        let shared = tracker.resolve(500).expect("response is tracked");
        let response = tokio_test::block_on(shared.lock());
        assert_eq!(response.content(), "hello");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn unknown_responses_are_untracked() {
        let tracker = ResponseTracker::new(&TrackerConfig::default());
        assert!(tracker.is_empty());

        let error: Error = tracker.resolve(404).err().expect("nothing is tracked");
        assert_eq!(error.kind(), ErrorKind::UntrackedResponse);
    }

    #[test]
    fn capacity_bounds_the_registry() {
        let tracker = ResponseTracker::new(&TrackerConfig {
            capacity: 2,
            idle: Duration::from_secs(60),
        });
        for id in 0..10 {
            tracker.register(PendingResponse::new(10, "hi").posted(posted(id, "hello")));
        }
        assert!(tracker.len() <= 2);
    }
}
