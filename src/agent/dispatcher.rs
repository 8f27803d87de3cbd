//! Event dispatcher: one task per inbound event.

use crate::agent::lifecycle::ResponseLifecycle;
use crate::agent::tracker::{PendingResponse, ResponseTracker, TrackedResponse};
use crate::conversation::{WindowSpec, build_window};
use crate::error::{Error, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::messaging::{ChatPlatform, InboundStream};
use crate::{BotIdentity, ChannelMessage, InboundEvent, Interaction};

use futures::StreamExt as _;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Routes inbound events to reply generation and response transitions.
pub struct Dispatcher<P, G> {
    platform: Arc<P>,
    generator: Arc<G>,
    tracker: ResponseTracker,
    lifecycle: ResponseLifecycle<P, G>,
    identity: BotIdentity,
    history_limit: usize,
}

impl<P: ChatPlatform, G: Generator> Dispatcher<P, G> {
    pub fn new(
        platform: Arc<P>,
        generator: Arc<G>,
        tracker: ResponseTracker,
        identity: BotIdentity,
        history_limit: usize,
    ) -> Self {
        let lifecycle = ResponseLifecycle::new(
            platform.clone(),
            generator.clone(),
            tracker.clone(),
            identity,
            history_limit,
        );
        Self {
            platform,
            generator,
            tracker,
            lifecycle,
            identity,
            history_limit,
        }
    }

    /// Consume the stream until it ends, then wait for in-flight handlers.
    pub async fn run(self: Arc<Self>, mut events: InboundStream) {
        let mut handlers = JoinSet::new();

        while let Some(event) = events.next().await {
            let dispatcher = self.clone();
            handlers.spawn(async move { dispatcher.handle(event).await });

            while let Some(finished) = handlers.try_join_next() {
                log_join(finished);
            }
        }

        tracing::info!(
            platform = self.platform.name(),
            in_flight = handlers.len(),
            "inbound stream ended"
        );
        while let Some(finished) = handlers.join_next().await {
            log_join(finished);
        }
    }

    /// Handle one event. Errors are logged and reported, never propagated.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::MessageCreated(message) => {
                let channel_id = message.channel_id;
                let message_id = message.id;
                if let Err(error) = self.on_message(message).await {
                    tracing::error!(
                        channel_id,
                        message_id,
                        error_kind = %error.kind(),
                        %error,
                        "failed to reply to message"
                    );
                }
            }
            InboundEvent::InteractionInvoked(interaction) => {
                if let Err(error) = self.on_interaction(&interaction).await {
                    tracing::error!(
                        channel_id = interaction.channel_id,
                        message_id = interaction.message_id,
                        action = %interaction.action,
                        error_kind = %error.kind(),
                        %error,
                        "interaction failed"
                    );
                    self.report(&interaction, &error).await;
                }
            }
        }
    }

    /// Reply to a channel message. Returns `None` for ignored messages.
    pub async fn on_message(&self, message: ChannelMessage) -> Result<Option<TrackedResponse>> {
        if self.identity.authored(&message) || message.content.trim().is_empty() {
            return Ok(None);
        }

        let pending = PendingResponse::new(message.channel_id, message.content);
        let text = {
            let _typing = self.platform.start_typing(pending.channel_id());
            let window = build_window(
                &*self.platform,
                pending.channel_id(),
                self.identity,
                WindowSpec::new(self.history_limit),
            )
            .await?;
            self.generator
                .generate(&GenerationRequest::reply(window))
                .await?
        };

        let posted = self.platform.post(pending.channel_id(), &text).await?;
        let response = pending.posted(posted);
        tracing::info!(
            channel_id = response.channel_id(),
            message_id = response.message_id(),
            "reply posted"
        );
        self.tracker.register(response.clone());
        Ok(Some(response))
    }

    /// Acknowledge an interaction and run the transition it asks for.
    pub async fn on_interaction(&self, interaction: &Interaction) -> Result<ChannelMessage> {
        self.platform.acknowledge(interaction).await?;
        self.lifecycle.apply(interaction).await
    }

    async fn report(&self, interaction: &Interaction, error: &Error) {
        let Some(notice) = error.notice() else {
            return;
        };
        if let Err(error) = self.platform.notify(interaction, &notice).await {
            tracing::warn!(
                channel_id = interaction.channel_id,
                %error,
                "failed to deliver error notice"
            );
        }
    }
}

fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        tracing::error!(%error, "event handler panicked");
    }
}
