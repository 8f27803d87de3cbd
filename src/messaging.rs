//! Chat platform adapters.

pub mod discord;
#[cfg(test)]
pub mod mock;
pub mod traits;

pub use discord::DiscordAdapter;
pub use traits::{ChatPlatform, InboundStream};
