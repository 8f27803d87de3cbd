//! Relaybot: a chat relay that answers channel conversations through a text-generation backend.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod messaging;

pub use error::{Error, Result};

/// Channel identifier type.
pub type ChannelId = u64;

/// Message identifier type.
pub type MessageId = u64;

/// User identifier type.
pub type UserId = u64;

/// Interaction identifier type.
pub type InteractionId = u64;

/// The relay's own identity on the chat platform.
///
/// Resolved once at startup and passed to everything that needs to tell the
/// bot's messages apart from everyone else's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BotIdentity {
    pub user_id: UserId,
}

impl BotIdentity {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    /// Whether the given message was authored by the relay itself.
    pub fn authored(&self, message: &ChannelMessage) -> bool {
        message.author_id == self.user_id
    }
}

/// Who produced a message in a conversation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Bot,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Bot => write!(f, "bot"),
        }
    }
}

/// A role-tagged conversational unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Role::Bot, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A raw message as read from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
}

/// What a user asked the relay to do with one of its posted responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionAction {
    Continue,
    Rewrite,
}

impl InteractionAction {
    /// Component id attached to the button that triggers this action.
    pub fn custom_id(&self) -> &'static str {
        match self {
            InteractionAction::Continue => "continue_response",
            InteractionAction::Rewrite => "rewrite_response",
        }
    }

    /// Button label shown next to a posted response.
    pub fn label(&self) -> &'static str {
        match self {
            InteractionAction::Continue => "Continue Response",
            InteractionAction::Rewrite => "Rewrite Response",
        }
    }

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            "continue_response" => Some(InteractionAction::Continue),
            "rewrite_response" => Some(InteractionAction::Rewrite),
            _ => None,
        }
    }

    pub const ALL: [InteractionAction; 2] =
        [InteractionAction::Continue, InteractionAction::Rewrite];
}

impl std::fmt::Display for InteractionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionAction::Continue => write!(f, "continue"),
            InteractionAction::Rewrite => write!(f, "rewrite"),
        }
    }
}

/// A user pressing one of the action buttons on a posted response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub id: InteractionId,
    /// Platform token used to acknowledge and follow up on the interaction.
    pub token: String,
    pub channel_id: ChannelId,
    /// The posted response the action was invoked on.
    pub message_id: MessageId,
    pub user_id: UserId,
    pub action: InteractionAction,
}

/// Inbound event from the chat platform.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    MessageCreated(ChannelMessage),
    InteractionInvoked(Interaction),
}

/// An error report shown only to the user who triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".into(),
            description: description.into(),
        }
    }
}
