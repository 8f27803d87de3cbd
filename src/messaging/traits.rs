//! Chat platform trait consumed by the relay core.

use crate::error::Result;
use crate::{ChannelId, ChannelMessage, InboundEvent, Interaction, MessageId, Notice};
use futures::Stream;
use std::pin::Pin;

/// Inbound event stream type.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Capabilities the relay needs from a chat platform.
///
/// Every posted or appended response carries the Continue/Rewrite actions.
pub trait ChatPlatform: Send + Sync + 'static {
    /// Guard that keeps the "working" indicator visible until dropped.
    type Typing: Send + 'static;

    /// Unique name for this platform.
    fn name(&self) -> &str;

    /// Connect and return the inbound event stream.
    fn start(&self) -> impl std::future::Future<Output = Result<InboundStream>> + Send;

    /// Read up to `depth` messages from a channel, newest first.
    fn history(
        &self,
        channel_id: ChannelId,
        depth: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ChannelMessage>>> + Send;

    /// Post a response with its action buttons. Returns the message as stored.
    fn post(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> impl std::future::Future<Output = Result<ChannelMessage>> + Send;

    /// Replace the content of a posted message. Returns the message as stored.
    fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> impl std::future::Future<Output = Result<ChannelMessage>> + Send;

    /// Acknowledge an interaction so the platform stops waiting on it.
    fn acknowledge(
        &self,
        interaction: &Interaction,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Append new content in reply to an interaction, with action buttons.
    fn follow_up(
        &self,
        interaction: &Interaction,
        content: &str,
    ) -> impl std::future::Future<Output = Result<ChannelMessage>> + Send;

    /// Show a notice only to the user who triggered the interaction.
    fn notify(
        &self,
        interaction: &Interaction,
        notice: &Notice,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Start the typing indicator in a channel.
    fn start_typing(&self, channel_id: ChannelId) -> Self::Typing;

    /// Graceful shutdown.
    fn shutdown(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}
