//! Discord messaging adapter using serenity.

use crate::error::{PlatformError, Result};
use crate::messaging::traits::{ChatPlatform, InboundStream};
use crate::{
    BotIdentity, ChannelId, ChannelMessage, InboundEvent, Interaction, InteractionAction,
    MessageId, Notice,
};

use serenity::builder::{
    CreateActionRow, CreateButton, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateMessage, EditMessage, GetMessages,
};
use serenity::client::{Client, Context, EventHandler};
use serenity::gateway::ShardManager;
use serenity::http::{Http, Typing};
use serenity::model::Colour;
use serenity::model::application::{ButtonStyle, Interaction as DiscordInteraction};
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{
    ChannelId as DiscordChannelId, InteractionId as DiscordInteractionId,
    MessageId as DiscordMessageId,
};

use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

/// Discord messages are limited to 2000 characters.
const MAX_MESSAGE_LENGTH: usize = 2000;

/// Discord returns at most 100 messages per history request.
const MAX_HISTORY_DEPTH: usize = 100;

/// Discord adapter state.
pub struct DiscordAdapter {
    token: String,
    http: Arc<Http>,
    identity: BotIdentity,
    shard_manager: Arc<RwLock<Option<Arc<ShardManager>>>>,
}

impl DiscordAdapter {
    /// Validate the token and resolve the bot's own user id.
    pub async fn connect(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let http = Arc::new(Http::new(&token));
        let user = http
            .get_current_user()
            .await
            .map_err(PlatformError::from)?;

        tracing::info!(user_id = user.id.get(), name = %user.name, "discord identity resolved");

        Ok(Self {
            token,
            http,
            identity: BotIdentity::new(user.id.get()),
            shard_manager: Arc::new(RwLock::new(None)),
        })
    }

    pub fn identity(&self) -> BotIdentity {
        self.identity
    }
}

/// Continue/Rewrite buttons attached to every posted response.
fn action_buttons() -> Vec<CreateActionRow> {
    let buttons = InteractionAction::ALL
        .iter()
        .map(|action| {
            let style = match action {
                InteractionAction::Continue => ButtonStyle::Primary,
                InteractionAction::Rewrite => ButtonStyle::Secondary,
            };
            CreateButton::new(action.custom_id())
                .label(action.label())
                .style(style)
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}

/// Cut content at the last character boundary Discord accepts.
fn truncate_message(content: &str) -> &str {
    match content.char_indices().nth(MAX_MESSAGE_LENGTH) {
        Some((index, _)) => &content[..index],
        None => content,
    }
}

fn channel_message(message: &DiscordMessage) -> ChannelMessage {
    ChannelMessage {
        id: message.id.get(),
        channel_id: message.channel_id.get(),
        author_id: message.author.id.get(),
        content: message.content.clone(),
    }
}

/// Forwards gateway events into the inbound stream.
struct Handler {
    inbound_tx: mpsc::Sender<InboundEvent>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, message: DiscordMessage) {
        let event = InboundEvent::MessageCreated(channel_message(&message));
        if let Err(error) = self.inbound_tx.send(event).await {
            tracing::warn!(%error, "failed to forward discord message (receiver dropped)");
        }
    }

    async fn interaction_create(&self, _ctx: Context, interaction: DiscordInteraction) {
        let DiscordInteraction::Component(component) = interaction else {
            return;
        };
        let Some(action) = InteractionAction::from_custom_id(&component.data.custom_id) else {
            tracing::debug!(custom_id = %component.data.custom_id, "ignoring unknown component");
            return;
        };

        let event = InboundEvent::InteractionInvoked(Interaction {
            id: component.id.get(),
            token: component.token.clone(),
            channel_id: component.channel_id.get(),
            message_id: component.message.id.get(),
            user_id: component.user.id.get(),
            action,
        });
        if let Err(error) = self.inbound_tx.send(event).await {
            tracing::warn!(%error, "failed to forward discord interaction (receiver dropped)");
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord gateway ready"
        );
    }
}

impl ChatPlatform for DiscordAdapter {
    type Typing = Typing;

    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let mut client = Client::builder(&self.token, intents)
            .event_handler(Handler { inbound_tx })
            .await
            .map_err(PlatformError::from)?;

        *self.shard_manager.write().await = Some(client.shard_manager.clone());

        tokio::spawn(async move {
            if let Err(error) = client.start().await {
                tracing::error!(%error, "discord gateway stopped");
            }
        });

        tracing::info!("discord connected");

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn history(&self, channel_id: ChannelId, depth: usize) -> Result<Vec<ChannelMessage>> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let limit = depth.min(MAX_HISTORY_DEPTH) as u8;
        let messages = DiscordChannelId::new(channel_id)
            .messages(&*self.http, GetMessages::new().limit(limit))
            .await
            .map_err(PlatformError::from)?;

        Ok(messages.iter().map(channel_message).collect())
    }

    async fn post(&self, channel_id: ChannelId, content: &str) -> Result<ChannelMessage> {
        let builder = CreateMessage::new()
            .content(truncate_message(content))
            .components(action_buttons());
        let message = DiscordChannelId::new(channel_id)
            .send_message(&*self.http, builder)
            .await
            .map_err(PlatformError::from)?;

        Ok(channel_message(&message))
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<ChannelMessage> {
        let builder = EditMessage::new().content(truncate_message(content));
        let message = DiscordChannelId::new(channel_id)
            .edit_message(&*self.http, DiscordMessageId::new(message_id), builder)
            .await
            .map_err(PlatformError::from)?;

        Ok(channel_message(&message))
    }

    async fn acknowledge(&self, interaction: &Interaction) -> Result<()> {
        self.http
            .create_interaction_response(
                DiscordInteractionId::new(interaction.id),
                &interaction.token,
                &CreateInteractionResponse::Acknowledge,
                Vec::new(),
            )
            .await
            .map_err(PlatformError::from)?;
        Ok(())
    }

    async fn follow_up(&self, interaction: &Interaction, content: &str) -> Result<ChannelMessage> {
        let builder = CreateInteractionResponseFollowup::new()
            .content(truncate_message(content))
            .components(action_buttons());
        let message = self
            .http
            .create_followup_message(&interaction.token, &builder, Vec::new())
            .await
            .map_err(PlatformError::from)?;

        Ok(channel_message(&message))
    }

    async fn notify(&self, interaction: &Interaction, notice: &Notice) -> Result<()> {
        let embed = CreateEmbed::new()
            .title(&notice.title)
            .description(&notice.description)
            .colour(Colour::RED);
        let builder = CreateInteractionResponseFollowup::new()
            .embed(embed)
            .ephemeral(true);
        self.http
            .create_followup_message(&interaction.token, &builder, Vec::new())
            .await
            .map_err(PlatformError::from)?;
        Ok(())
    }

    fn start_typing(&self, channel_id: ChannelId) -> Typing {
        DiscordChannelId::new(channel_id).start_typing(&self.http)
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(shard_manager) = self.shard_manager.write().await.take() {
            shard_manager.shutdown_all().await;
        }
        tracing::info!("discord adapter shut down");
        Ok(())
    }
}
