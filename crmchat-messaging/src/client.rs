//! Client-side sync state. No I/O: a UI drives this with responses from the
//! HTTP API and a timer firing every [`POLL_INTERVAL`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crmchat_shared::UserId;

use crate::services::messages::{MessageView, ReadBy, ReceiptView};
use crate::services::sync::{OpenConversation, PollResponse};
use crate::services::typing::Typist;

pub const POLL_INTERVAL: Duration = Duration::from_millis(3_500);
/// Input inactivity after which a typing-false is emitted.
pub const TYPING_IDLE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct OpenState {
    conversation_id: i64,
    after_id: i64,
    messages: BTreeMap<i64, MessageView>,
    typing: Vec<Typist>,
}

/// One browser tab's view of the open conversation.
#[derive(Debug, Default)]
pub struct ChatSession {
    open: Option<OpenState>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any open conversation with `view`.
    pub fn open(&mut self, view: OpenConversation) {
        let messages = view.messages.into_iter().map(|m| (m.id, m)).collect();
        self.open = Some(OpenState {
            conversation_id: view.conversation.id,
            after_id: view.last_message_id,
            messages,
            typing: view.typing,
        });
    }

    /// Stops polling. Responses still in flight are ignored afterwards.
    pub fn close(&mut self) {
        self.open = None;
    }

    pub fn conversation_id(&self) -> Option<i64> {
        self.open.as_ref().map(|s| s.conversation_id)
    }

    /// `(conversation_id, after_id)` for the next poll, if one is due at all.
    pub fn poll_params(&self) -> Option<(i64, i64)> {
        self.open.as_ref().map(|s| (s.conversation_id, s.after_id))
    }

    /// Merges a poll response. Returns the ids of messages not seen before.
    pub fn apply_poll(&mut self, conversation_id: i64, response: PollResponse) -> Vec<i64> {
        let Some(state) = self.open.as_mut().filter(|s| s.conversation_id == conversation_id) else {
            return Vec::new();
        };

        let mut fresh = Vec::new();
        for message in response.messages {
            if !state.messages.contains_key(&message.id) {
                fresh.push(message.id);
            }
            state.messages.insert(message.id, message);
        }
        for receipt in response.reads {
            merge_receipt(&mut state.messages, receipt);
        }
        state.typing = response.typing;
        state.after_id = state.after_id.max(response.last_message_id);
        fresh
    }

    /// Shows a just-sent message without moving the poll cursor, so messages
    /// from others that landed before it are still fetched.
    pub fn apply_sent(&mut self, conversation_id: i64, message: MessageView) {
        if let Some(state) = self.open.as_mut().filter(|s| s.conversation_id == conversation_id) {
            state.messages.insert(message.id, message);
        }
    }

    /// Buffered messages in id order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageView> {
        self.open.iter().flat_map(|s| s.messages.values())
    }

    pub fn typing(&self) -> &[Typist] {
        self.open.as_ref().map(|s| s.typing.as_slice()).unwrap_or_default()
    }

    /// Highest buffered id, the value to acknowledge with mark-read.
    pub fn latest_id(&self) -> Option<i64> {
        self.open.as_ref().and_then(|s| s.messages.keys().next_back().copied())
    }
}

fn merge_receipt(messages: &mut BTreeMap<i64, MessageView>, receipt: ReceiptView) {
    let Some(message) = messages.get_mut(&receipt.message_id) else {
        return;
    };
    if message.read_by.iter().any(|r| r.user_id == receipt.user_id) {
        return;
    }
    message.read_by.push(ReadBy {
        user_id: receipt.user_id,
        name: receipt.name,
        read_at: receipt.read_at,
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Turns raw keystrokes into the minimal typing-true/typing-false traffic.
#[derive(Debug)]
pub struct TypingDebounce {
    idle: Duration,
    last_keystroke: Option<Instant>,
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(TYPING_IDLE)
    }
}

impl TypingDebounce {
    pub fn new(idle: Duration) -> Self {
        Self { idle, last_keystroke: None }
    }

    pub fn on_keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let was_idle = self.last_keystroke.is_none();
        self.last_keystroke = Some(now);
        was_idle.then_some(TypingSignal::Start)
    }

    /// Call periodically; emits `Stop` once input has been idle long enough.
    pub fn tick(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.last_keystroke {
            Some(last) if now.saturating_duration_since(last) >= self.idle => {
                self.last_keystroke = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    pub fn on_send(&mut self) -> Option<TypingSignal> {
        self.last_keystroke.take().map(|_| TypingSignal::Stop)
    }
}
