use serde::Serialize;

use crate::tool::{FunctionCall, ProposedAction};

pub const GREETING: &str =
    "Hi! I am your AI coaching assistant. How can I help you with your performance today?";
pub const STREAM_FAILED: &str = "Sorry, I encountered an error. Please try again.";
pub const CANCELLED: &str = "Okay, I've cancelled the request.";
pub const SAVING: &str = "Roger that! Saving your PR...";
pub const NARRATION_FALLBACK_SAVED: &str =
    "I've saved your PR, but had a little trouble getting a final response from the AI.";
pub const NARRATION_FALLBACK_FAILED: &str =
    "I couldn't save your PR, and had a little trouble getting a final response from the AI.";
pub const PROPOSAL_UNUSABLE: &str =
    "Sorry, I couldn't prepare that record from your message. Could you rephrase it with the movement and the result?";

pub fn movement_not_found(name: &str) -> String {
    format!(
        "I couldn't find the movement \"{name}\". You can add it with `prtracker movement add` and try again."
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A proposal waiting for the user's explicit confirm or cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolConfirmation {
    pub call: FunctionCall,
    pub action: ProposedAction,
    pub prompt: String,
}

impl PendingToolConfirmation {
    pub fn new(call: FunctionCall, action: ProposedAction) -> Self {
        let prompt = action.confirmation_prompt();
        Self {
            call,
            action,
            prompt,
        }
    }
}

/// One entry of the transient, in-memory conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Assigned by [`Conversation::push`]; increases monotonically.
    pub id: u64,
    pub role: Role,
    pub text: String,
    pub pending: Option<PendingToolConfirmation>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            role: Role::User,
            text: text.into(),
            pending: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            role: Role::Assistant,
            text: text.into(),
            pending: None,
        }
    }
}

/// Ordered message list. Holds at most one pending confirmation at any time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn push(&mut self, mut message: ChatMessage) {
        self.next_id += 1;
        message.id = self.next_id;
        self.messages.push(message);
    }

    /// Messages committed after the one with id `after`.
    pub fn since(&self, after: u64) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(move |m| m.id > after)
    }

    pub fn pending(&self) -> Option<&PendingToolConfirmation> {
        self.messages.iter().find_map(|m| m.pending.as_ref())
    }

    /// Attach a confirmation to `message` and append it, dropping any stale one first.
    pub fn push_with_pending(&mut self, mut message: ChatMessage, pending: PendingToolConfirmation) {
        self.clear_pending();
        message.pending = Some(pending);
        self.push(message);
    }

    /// Remove the pending confirmation; a message that only carried the prompt goes with it.
    pub fn clear_pending(&mut self) {
        self.messages
            .retain(|m| m.pending.is_none() || !m.text.is_empty());
        for message in &mut self.messages {
            message.pending = None;
        }
    }
}

/// One incremental piece of an assistant response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentChunk {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

impl AgentChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
        }
    }

    pub fn call(call: FunctionCall) -> Self {
        Self {
            text: None,
            function_calls: vec![call],
        }
    }
}

/// Accumulates one in-flight assistant turn. Text only ever grows; the turn is
/// committed to the conversation in one step when the stream finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnAccumulator {
    text: String,
    call: Option<FunctionCall>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, chunk: AgentChunk) {
        if let Some(text) = chunk.text {
            self.text.push_str(&text);
        }
        // The last chunk carrying calls wins; within it, the first call.
        if let Some(call) = chunk.function_calls.into_iter().next() {
            self.call = Some(call);
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn call(&self) -> Option<&FunctionCall> {
        self.call.as_ref()
    }

    pub fn finish(self) -> (String, Option<FunctionCall>) {
        (self.text, self.call)
    }
}
