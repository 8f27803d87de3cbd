//! Continue and Rewrite transitions on tracked responses.

use crate::agent::tracker::{PendingResponse, ResponseState, ResponseTracker, TrackedResponse};
use crate::conversation::{ChannelSnapshot, WindowSpec};
use crate::error::{LifecycleError, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::messaging::ChatPlatform;
use crate::{BotIdentity, ChannelMessage, Interaction, InteractionAction};

use std::sync::Arc;

/// Drives user-requested transitions on posted responses.
pub struct ResponseLifecycle<P, G> {
    platform: Arc<P>,
    generator: Arc<G>,
    tracker: ResponseTracker,
    identity: BotIdentity,
    history_limit: usize,
}

impl<P: ChatPlatform, G: Generator> ResponseLifecycle<P, G> {
    pub fn new(
        platform: Arc<P>,
        generator: Arc<G>,
        tracker: ResponseTracker,
        identity: BotIdentity,
        history_limit: usize,
    ) -> Self {
        Self {
            platform,
            generator,
            tracker,
            identity,
            history_limit,
        }
    }

    pub fn tracker(&self) -> &ResponseTracker {
        &self.tracker
    }

    /// Run the transition an interaction asks for.
    pub async fn apply(&self, interaction: &Interaction) -> Result<ChannelMessage> {
        match interaction.action {
            InteractionAction::Continue => self.continue_response(interaction).await,
            InteractionAction::Rewrite => self.rewrite(interaction).await,
        }
    }

    /// Append a continuation, provided the response is still the latest message.
    ///
    /// The appended message is tracked as a new response.
    pub async fn continue_response(&self, interaction: &Interaction) -> Result<ChannelMessage> {
        let shared = self.tracker.resolve(interaction.message_id)?;
        let mut response = shared.lock().await;

        let conflict = LifecycleError::ConsistencyConflict {
            message_id: response.message_id(),
        };
        if response.state() == ResponseState::Stale {
            return Err(conflict.into());
        }

        let spec = WindowSpec::new(self.history_limit);
        let snapshot =
            ChannelSnapshot::read(&*self.platform, response.channel_id(), spec.depth()).await?;
        let still_latest = snapshot
            .latest()
            .is_some_and(|latest| latest.content == response.content());
        if !still_latest {
            response.set_state(ResponseState::Stale);
            tracing::info!(
                channel_id = response.channel_id(),
                message_id = response.message_id(),
                "channel moved on, response is stale"
            );
            return Err(conflict.into());
        }

        let previous = response.state();
        response.set_state(ResponseState::Continuing);

        let request = GenerationRequest::continuation(snapshot.window(self.identity, spec));
        let result = self.append(interaction, &request).await;
        response.set_state(previous);

        let message = result?;
        let continuation = PendingResponse::new(response.channel_id(), response.content());
        self.tracker.register(continuation.posted(message.clone()));
        tracing::info!(
            channel_id = response.channel_id(),
            message_id = response.message_id(),
            continuation_id = message.id,
            "response continued"
        );
        Ok(message)
    }

    /// Regenerate a response and replace it in place.
    ///
    /// No staleness check: replacing in place is allowed even after newer
    /// messages, and a stale response stays stale.
    pub async fn rewrite(&self, interaction: &Interaction) -> Result<ChannelMessage> {
        let shared = self.tracker.resolve(interaction.message_id)?;
        let mut response = shared.lock().await;

        let previous = response.state();
        response.set_state(ResponseState::Rewriting);
        let result = self.replace(&response).await;
        response.set_state(previous);

        let message = result?;
        response.set_content(message.content.clone());
        tracing::info!(
            channel_id = response.channel_id(),
            message_id = response.message_id(),
            state = %response.state(),
            "response rewritten"
        );
        Ok(message)
    }

    async fn append(
        &self,
        interaction: &Interaction,
        request: &GenerationRequest,
    ) -> Result<ChannelMessage> {
        let text = {
            let _typing = self.platform.start_typing(interaction.channel_id);
            self.generator.generate(request).await?
        };
        self.platform.follow_up(interaction, &text).await
    }

    async fn replace(&self, response: &TrackedResponse) -> Result<ChannelMessage> {
        // The newest raw message is assumed to be the response itself.
        let spec = WindowSpec::new(self.history_limit).skipping(1);
        let text = {
            let _typing = self.platform.start_typing(response.channel_id());
            let snapshot =
                ChannelSnapshot::read(&*self.platform, response.channel_id(), spec.depth()).await?;
            let request = GenerationRequest::reply(snapshot.window(self.identity, spec));
            self.generator.generate(&request).await?
        };
        self.platform
            .edit(response.channel_id(), response.message_id(), &text)
            .await
    }
}
