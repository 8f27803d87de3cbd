//! Conversation windows and prompt rendering.

pub mod prompt;
pub mod window;

pub use prompt::{CONTINUE_DIRECTIVE, render_prompt};
pub use window::{ChannelSnapshot, ConversationWindow, WindowSpec, build_window};
