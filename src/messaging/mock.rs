//! In-memory chat platform and scripted generator for tests.

use crate::error::{BackendError, PlatformError, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::messaging::traits::{ChatPlatform, InboundStream};
use crate::{
    BotIdentity, ChannelId, ChannelMessage, InboundEvent, Interaction, InteractionAction,
    InteractionId, MessageId, Notice, UserId,
};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct MockState {
    next_id: u64,
    /// Oldest first, per channel.
    channels: HashMap<ChannelId, Vec<ChannelMessage>>,
    history_depths: Vec<usize>,
    posts: Vec<ChannelMessage>,
    edits: Vec<ChannelMessage>,
    follow_ups: Vec<ChannelMessage>,
    acknowledged: Vec<InteractionId>,
    notices: Vec<(InteractionId, Notice)>,
    fail_history: bool,
    inbound: Vec<InboundEvent>,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn append(
        &mut self,
        channel_id: ChannelId,
        author_id: UserId,
        content: &str,
    ) -> ChannelMessage {
        let message = ChannelMessage {
            id: self.next_id(),
            channel_id,
            author_id,
            content: content.to_string(),
        };
        self.channels
            .entry(channel_id)
            .or_default()
            .push(message.clone());
        message
    }
}

/// A chat platform that keeps channels in memory and records every call.
pub struct MockPlatform {
    identity: BotIdentity,
    state: Mutex<MockState>,
    typing_active: Arc<AtomicUsize>,
    typing_started: AtomicUsize,
}

impl MockPlatform {
    pub fn new(identity: BotIdentity) -> Self {
        Self {
            identity,
            state: Mutex::new(MockState::default()),
            typing_active: Arc::new(AtomicUsize::new(0)),
            typing_started: AtomicUsize::new(0),
        }
    }

    /// Append a message to a channel as if `author_id` had sent it.
    pub fn seed(&self, channel_id: ChannelId, author_id: UserId, content: &str) -> ChannelMessage {
        self.state.lock().append(channel_id, author_id, content)
    }

    /// Queue events returned by `start`.
    pub fn queue_inbound(&self, event: InboundEvent) {
        self.state.lock().inbound.push(event);
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.lock().fail_history = fail;
    }

    /// Channel contents, oldest first.
    pub fn channel(&self, channel_id: ChannelId) -> Vec<ChannelMessage> {
        self.state
            .lock()
            .channels
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn history_depths(&self) -> Vec<usize> {
        self.state.lock().history_depths.clone()
    }

    pub fn posts(&self) -> Vec<ChannelMessage> {
        self.state.lock().posts.clone()
    }

    pub fn edits(&self) -> Vec<ChannelMessage> {
        self.state.lock().edits.clone()
    }

    pub fn follow_ups(&self) -> Vec<ChannelMessage> {
        self.state.lock().follow_ups.clone()
    }

    pub fn acknowledged(&self) -> Vec<InteractionId> {
        self.state.lock().acknowledged.clone()
    }

    pub fn notices(&self) -> Vec<(InteractionId, Notice)> {
        self.state.lock().notices.clone()
    }

    /// Typing guards currently alive.
    pub fn typing_active(&self) -> usize {
        self.typing_active.load(Ordering::SeqCst)
    }

    /// Typing guards created so far.
    pub fn typing_started(&self) -> usize {
        self.typing_started.load(Ordering::SeqCst)
    }

    /// An interaction on `message_id` as a user would trigger it.
    pub fn interaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        action: InteractionAction,
    ) -> Interaction {
        let id = self.state.lock().next_id();
        Interaction {
            id,
            token: format!("token-{id}"),
            channel_id,
            message_id,
            user_id: 42,
            action,
        }
    }
}

/// Typing guard that counts itself while alive.
pub struct MockTyping {
    active: Arc<AtomicUsize>,
}

impl Drop for MockTyping {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChatPlatform for MockPlatform {
    type Typing = MockTyping;

    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> Result<InboundStream> {
        let events = std::mem::take(&mut self.state.lock().inbound);
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn history(&self, channel_id: ChannelId, depth: usize) -> Result<Vec<ChannelMessage>> {
        let mut state = self.state.lock();
        state.history_depths.push(depth);
        if state.fail_history {
            return Err(PlatformError::Unavailable("history read failed".into()).into());
        }
        Ok(state
            .channels
            .get(&channel_id)
            .map(|messages| messages.iter().rev().take(depth).cloned().collect())
            .unwrap_or_default())
    }

    async fn post(&self, channel_id: ChannelId, content: &str) -> Result<ChannelMessage> {
        let mut state = self.state.lock();
        let message = state.append(channel_id, self.identity.user_id, content);
        state.posts.push(message.clone());
        Ok(message)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<ChannelMessage> {
        let mut state = self.state.lock();
        let message = state
            .channels
            .get_mut(&channel_id)
            .and_then(|messages| messages.iter_mut().find(|message| message.id == message_id))
            .ok_or_else(|| PlatformError::Unavailable(format!("unknown message {message_id}")))?;
        message.content = content.to_string();
        let edited = message.clone();
        state.edits.push(edited.clone());
        Ok(edited)
    }

    async fn acknowledge(&self, interaction: &Interaction) -> Result<()> {
        self.state.lock().acknowledged.push(interaction.id);
        Ok(())
    }

    async fn follow_up(&self, interaction: &Interaction, content: &str) -> Result<ChannelMessage> {
        let mut state = self.state.lock();
        let message = state.append(interaction.channel_id, self.identity.user_id, content);
        state.follow_ups.push(message.clone());
        Ok(message)
    }

    async fn notify(&self, interaction: &Interaction, notice: &Notice) -> Result<()> {
        self.state
            .lock()
            .notices
            .push((interaction.id, notice.clone()));
        Ok(())
    }

    fn start_typing(&self, _channel_id: ChannelId) -> MockTyping {
        self.typing_started.fetch_add(1, Ordering::SeqCst);
        self.typing_active.fetch_add(1, Ordering::SeqCst);
        MockTyping {
            active: self.typing_active.clone(),
        }
    }
}

/// A generator that replays queued results and records every request.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<std::result::Result<String, BackendError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: BackendError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, BackendError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Unavailable("no scripted reply".into())))
    }
}
