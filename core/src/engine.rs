//! Tool-call confirmation engine.
//!
//! A pure transition function over [`EngineState`]. Nothing here performs I/O:
//! each step returns the [`Effect`]s the caller must carry out and report back
//! as further [`EngineEvent`]s. The only way to obtain an [`Effect::InsertRecord`]
//! is to confirm a pending proposal, and its [`ConfirmedInsert`] payload cannot
//! be cloned or built elsewhere, so every agent-initiated write has passed
//! through an explicit confirmation exactly once.

use std::fmt;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::chat::{
    self, AgentChunk, ChatMessage, Conversation, PendingToolConfirmation, TurnAccumulator,
};
use crate::models::{Movement, NewPersonalRecord, parse_date};
use crate::snapshot::find_movement_by_name;
use crate::tool::{FunctionResponse, ProposedAction, ToolCallError, ToolOutcome};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    /// A turn is streaming in. `held` keeps a proposal that was pending when
    /// the user sent another message; only confirm/cancel clears it.
    Streaming {
        turn: TurnAccumulator,
        held: Option<PendingToolConfirmation>,
    },
    AwaitingConfirmation(PendingToolConfirmation),
    Executing {
        call_name: String,
    },
    Narrating {
        turn: TurnAccumulator,
        outcome: ToolOutcome,
    },
}

impl EngineState {
    pub fn phase(&self) -> Phase {
        match self {
            EngineState::Idle => Phase::Idle,
            EngineState::Streaming { .. } => Phase::Streaming,
            EngineState::AwaitingConfirmation(_) => Phase::AwaitingConfirmation,
            EngineState::Executing { .. } => Phase::Executing,
            EngineState::Narrating { .. } => Phase::Narrating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Streaming,
    AwaitingConfirmation,
    Executing,
    Narrating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Streaming => "streaming",
            Phase::AwaitingConfirmation => "awaiting confirmation",
            Phase::Executing => "executing",
            Phase::Narrating => "narrating",
        };
        f.write_str(label)
    }
}

/// A write the user has approved. Only produced by confirming a proposal.
#[derive(Debug, PartialEq)]
pub struct ConfirmedInsert {
    record: NewPersonalRecord,
    movement_name: String,
}

impl ConfirmedInsert {
    pub fn record(&self) -> &NewPersonalRecord {
        &self.record
    }

    /// Catalog spelling of the resolved movement.
    pub fn movement_name(&self) -> &str {
        &self.movement_name
    }
}

#[derive(Debug)]
pub enum EngineEvent<'a> {
    UserMessage(String),
    Chunk(AgentChunk),
    StreamEnded,
    StreamFailed(String),
    Confirm {
        catalog: &'a [Movement],
        user_id: Uuid,
        today: NaiveDate,
    },
    Cancel,
    InsertCompleted(Result<(), String>),
}

impl EngineEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::UserMessage(_) => "user message",
            EngineEvent::Chunk(_) => "stream chunk",
            EngineEvent::StreamEnded => "stream end",
            EngineEvent::StreamFailed(_) => "stream failure",
            EngineEvent::Confirm { .. } => "confirm",
            EngineEvent::Cancel => "cancel",
            EngineEvent::InsertCompleted(_) => "insert result",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Start a streamed turn with the user's text.
    SendMessage(String),
    InsertRecord(ConfirmedInsert),
    /// Re-fetch the full snapshot.
    RefreshSnapshot,
    /// Start a streamed narration turn with the action's outcome.
    SendToolResult(FunctionResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("cannot handle {event} while {phase}")]
    IllegalTransition { phase: Phase, event: &'static str },
}

type Step = Result<(EngineState, Vec<Effect>), (EngineState, EngineError)>;

/// Engine state plus the conversation it writes into.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEngine {
    state: EngineState,
    conversation: Conversation,
}

impl Default for ChatEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEngine {
    pub fn new() -> Self {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::assistant(chat::GREETING));
        Self {
            state: EngineState::Idle,
            conversation,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The turn currently streaming in, if any.
    pub fn in_flight(&self) -> Option<&TurnAccumulator> {
        match &self.state {
            EngineState::Streaming { turn, .. } | EngineState::Narrating { turn, .. } => Some(turn),
            _ => None,
        }
    }

    /// Apply one event. On error the state and conversation are left untouched.
    pub fn step(&mut self, event: EngineEvent<'_>) -> Result<Vec<Effect>, EngineError> {
        let state = std::mem::take(&mut self.state);
        match transition(state, &mut self.conversation, event) {
            Ok((next, effects)) => {
                self.state = next;
                Ok(effects)
            }
            Err((previous, err)) => {
                self.state = previous;
                Err(err)
            }
        }
    }
}

/// The transition function. `conversation` is only written on success.
pub fn transition(state: EngineState, conversation: &mut Conversation, event: EngineEvent<'_>) -> Step {
    match (state, event) {
        (EngineState::Idle, EngineEvent::UserMessage(text)) => start_turn(text, None, conversation),
        (EngineState::AwaitingConfirmation(pending), EngineEvent::UserMessage(text)) => {
            start_turn(text, Some(pending), conversation)
        }

        (EngineState::Streaming { mut turn, held }, EngineEvent::Chunk(chunk)) => {
            turn.absorb(chunk);
            Ok((EngineState::Streaming { turn, held }, Vec::new()))
        }
        (EngineState::Streaming { turn, held }, EngineEvent::StreamEnded) => {
            Ok((finish_turn(turn, held, conversation), Vec::new()))
        }
        (EngineState::Streaming { held, .. }, EngineEvent::StreamFailed(_)) => {
            conversation.push(ChatMessage::assistant(chat::STREAM_FAILED));
            Ok((resume(held), Vec::new()))
        }

        (EngineState::AwaitingConfirmation(_), EngineEvent::Cancel) => {
            conversation.clear_pending();
            conversation.push(ChatMessage::assistant(chat::CANCELLED));
            Ok((EngineState::Idle, Vec::new()))
        }
        (
            EngineState::AwaitingConfirmation(pending),
            EngineEvent::Confirm {
                catalog,
                user_id,
                today,
            },
        ) => Ok(confirm(pending, catalog, user_id, today, conversation)),

        (EngineState::Executing { call_name }, EngineEvent::InsertCompleted(result)) => {
            let (outcome, mut effects) = match result {
                Ok(()) => (ToolOutcome::saved(), vec![Effect::RefreshSnapshot]),
                Err(error) => (ToolOutcome::failed(error), Vec::new()),
            };
            effects.push(Effect::SendToolResult(outcome.clone().into_response(&call_name)));
            Ok((
                EngineState::Narrating {
                    turn: TurnAccumulator::new(),
                    outcome,
                },
                effects,
            ))
        }

        (EngineState::Narrating { mut turn, outcome }, EngineEvent::Chunk(chunk)) => {
            // narration is text only; a second proposal here is not acted on
            turn.absorb(AgentChunk {
                text: chunk.text,
                function_calls: Vec::new(),
            });
            Ok((EngineState::Narrating { turn, outcome }, Vec::new()))
        }
        (EngineState::Narrating { turn, outcome }, EngineEvent::StreamEnded) => {
            let (text, _) = turn.finish();
            if text.trim().is_empty() {
                conversation.push(ChatMessage::assistant(narration_fallback(&outcome)));
            } else {
                conversation.push(ChatMessage::assistant(text));
            }
            Ok((EngineState::Idle, Vec::new()))
        }
        (EngineState::Narrating { outcome, .. }, EngineEvent::StreamFailed(_)) => {
            conversation.push(ChatMessage::assistant(narration_fallback(&outcome)));
            Ok((EngineState::Idle, Vec::new()))
        }

        (state, event) => {
            let err = EngineError::IllegalTransition {
                phase: state.phase(),
                event: event.name(),
            };
            Err((state, err))
        }
    }
}

fn start_turn(
    text: String,
    held: Option<PendingToolConfirmation>,
    conversation: &mut Conversation,
) -> Step {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err((resume(held), EngineError::EmptyMessage));
    }
    conversation.push(ChatMessage::user(text.clone()));
    Ok((
        EngineState::Streaming {
            turn: TurnAccumulator::new(),
            held,
        },
        vec![Effect::SendMessage(text)],
    ))
}

fn finish_turn(
    turn: TurnAccumulator,
    held: Option<PendingToolConfirmation>,
    conversation: &mut Conversation,
) -> EngineState {
    let (text, call) = turn.finish();
    let mut unusable = false;
    let proposal = call.and_then(|call| match ProposedAction::from_call(&call) {
        Ok(action) => Some(PendingToolConfirmation::new(call, action)),
        Err(ToolCallError::UnknownFunction(_)) => None,
        Err(ToolCallError::InvalidArguments { .. }) => {
            unusable = true;
            None
        }
    });

    match proposal {
        // a fresh proposal replaces whatever was pending
        Some(pending) => {
            conversation.push_with_pending(ChatMessage::assistant(text), pending.clone());
            EngineState::AwaitingConfirmation(pending)
        }
        None => {
            if !text.is_empty() {
                conversation.push(ChatMessage::assistant(text));
            }
            if unusable {
                conversation.push(ChatMessage::assistant(chat::PROPOSAL_UNUSABLE));
            }
            resume(held)
        }
    }
}

fn confirm(
    pending: PendingToolConfirmation,
    catalog: &[Movement],
    user_id: Uuid,
    today: NaiveDate,
    conversation: &mut Conversation,
) -> (EngineState, Vec<Effect>) {
    conversation.clear_pending();
    let ProposedAction::AddPersonalRecord(args) = &pending.action;

    let Some(movement) = find_movement_by_name(catalog, &args.movement_name) else {
        conversation.push(ChatMessage::assistant(chat::movement_not_found(
            args.movement_name.trim(),
        )));
        return (EngineState::Idle, Vec::new());
    };

    let date = match args
        .date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("today"))
    {
        Some(raw) => parse_date(raw),
        None => Ok(today),
    };
    let record = date.and_then(|date| {
        NewPersonalRecord::new(user_id, movement.id, &args.value, date, args.notes.as_deref())
    });

    match record {
        Ok(record) => {
            conversation.push(ChatMessage::assistant(chat::SAVING));
            let insert = ConfirmedInsert {
                record,
                movement_name: movement.name.clone(),
            };
            (
                EngineState::Executing {
                    call_name: pending.call.name.clone(),
                },
                vec![Effect::InsertRecord(insert)],
            )
        }
        Err(err) => {
            let outcome = ToolOutcome::failed(err.to_string());
            let response = outcome.clone().into_response(&pending.call.name);
            (
                EngineState::Narrating {
                    turn: TurnAccumulator::new(),
                    outcome,
                },
                vec![Effect::SendToolResult(response)],
            )
        }
    }
}

fn resume(held: Option<PendingToolConfirmation>) -> EngineState {
    held.map_or(EngineState::Idle, EngineState::AwaitingConfirmation)
}

fn narration_fallback(outcome: &ToolOutcome) -> &'static str {
    if outcome.is_success() {
        chat::NARRATION_FALLBACK_SAVED
    } else {
        chat::NARRATION_FALLBACK_FAILED
    }
}
