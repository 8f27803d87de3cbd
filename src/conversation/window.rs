//! History window builder: raw channel history to a bounded, role-tagged window.

use crate::error::Result;
use crate::messaging::ChatPlatform;
use crate::{BotIdentity, ChannelId, ChannelMessage, Message, Role};

/// How much of a channel's history goes into a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Maximum messages in the window.
    pub limit: usize,
    /// Most recent raw messages to drop before windowing.
    pub skip: usize,
}

impl WindowSpec {
    pub fn new(limit: usize) -> Self {
        Self { limit, skip: 0 }
    }

    pub fn skipping(self, skip: usize) -> Self {
        Self { skip, ..self }
    }

    /// Raw messages a history read must cover.
    pub fn depth(&self) -> usize {
        self.limit + self.skip
    }
}

/// Ordered slice of conversation history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationWindow {
    messages: Vec<Message>,
}

impl ConversationWindow {
    /// Build a window from history given newest first.
    pub fn from_history<'a>(
        history: impl IntoIterator<Item = &'a ChannelMessage>,
        identity: BotIdentity,
        spec: WindowSpec,
    ) -> Self {
        let mut messages: Vec<Message> = history
            .into_iter()
            .skip(spec.skip)
            .take(spec.limit)
            .map(|raw| {
                let role = if identity.authored(raw) {
                    Role::Bot
                } else {
                    Role::User
                };
                Message::new(role, raw.content.clone())
            })
            .collect();

        // Newest-first traversal, chronological output.
        messages.reverse();

        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message in the window.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl From<Vec<Message>> for ConversationWindow {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// One history read, newest first.
///
/// Continue checks the latest message and builds its window from the same
/// snapshot so both see the same channel state.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    messages: Vec<ChannelMessage>,
}

impl ChannelSnapshot {
    pub async fn read<P: ChatPlatform>(
        platform: &P,
        channel_id: ChannelId,
        depth: usize,
    ) -> Result<Self> {
        let messages = platform.history(channel_id, depth).await?;
        tracing::debug!(
            channel_id,
            depth,
            read = messages.len(),
            "channel history read"
        );
        Ok(Self { messages })
    }

    /// The most recent message in the channel, if any.
    pub fn latest(&self) -> Option<&ChannelMessage> {
        self.messages.first()
    }

    pub fn window(&self, identity: BotIdentity, spec: WindowSpec) -> ConversationWindow {
        ConversationWindow::from_history(&self.messages, identity, spec)
    }
}

/// Read a channel and build a window from it.
pub async fn build_window<P: ChatPlatform>(
    platform: &P,
    channel_id: ChannelId,
    identity: BotIdentity,
    spec: WindowSpec,
) -> Result<ConversationWindow> {
    let snapshot = ChannelSnapshot::read(platform, channel_id, spec.depth()).await?;
    Ok(snapshot.window(identity, spec))
}
