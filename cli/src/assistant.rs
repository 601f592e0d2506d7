//! Async driver for the confirmation engine.
//!
//! The engine decides, this module performs: it pumps agent streams into the
//! engine, runs the effects the engine hands back (in order) and reports every
//! outcome as another engine event. Remote failures never escape as errors;
//! they become conversation messages.

use std::collections::VecDeque;

use chrono::NaiveDate;
use futures_util::StreamExt;

use prtracker_core::chat::{ChatMessage, Conversation};
use prtracker_core::engine::{ChatEngine, Effect, EngineError, EngineEvent, Phase};

use crate::agent::{AgentInput, ConversationalAgent};
use crate::session::SessionState;
use crate::store::RecordStore;

/// Presentation hooks for a running conversation.
pub trait ChatView {
    /// Raw text of the turn currently streaming in.
    fn on_delta(&mut self, delta: &str);

    /// A message committed to the conversation. `streamed` is true when its
    /// text already went through [`ChatView::on_delta`].
    fn on_message(&mut self, message: &ChatMessage, streamed: bool);
}

pub struct Assistant<A> {
    agent: A,
    engine: ChatEngine,
    /// Id of the last message handed to the view.
    shown: u64,
}

impl<A: ConversationalAgent> Assistant<A> {
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            engine: ChatEngine::new(),
            shown: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.engine.phase()
    }

    pub fn conversation(&self) -> &Conversation {
        self.engine.conversation()
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Hand the greeting (and anything else not yet shown) to the view.
    pub fn show_pending(&mut self, view: &mut impl ChatView) {
        self.flush(view, None);
    }

    /// Send a user message and run the resulting turn to completion.
    pub async fn send<S: RecordStore>(
        &mut self,
        session: &mut SessionState<S>,
        text: &str,
        view: &mut impl ChatView,
    ) -> Result<(), EngineError> {
        let effects = self.engine.step(EngineEvent::UserMessage(text.to_string()))?;
        self.flush(view, None);
        self.run(session, effects, view).await
    }

    /// Confirm or cancel the pending proposal.
    pub async fn resolve<S: RecordStore>(
        &mut self,
        session: &mut SessionState<S>,
        confirmed: bool,
        today: NaiveDate,
        view: &mut impl ChatView,
    ) -> Result<(), EngineError> {
        let effects = if confirmed {
            self.engine.step(EngineEvent::Confirm {
                catalog: &session.snapshot().movements,
                user_id: session.user().id,
                today,
            })?
        } else {
            self.engine.step(EngineEvent::Cancel)?
        };
        self.flush(view, None);
        self.run(session, effects, view).await
    }

    async fn run<S: RecordStore>(
        &mut self,
        session: &mut SessionState<S>,
        effects: Vec<Effect>,
        view: &mut impl ChatView,
    ) -> Result<(), EngineError> {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            let next = match effect {
                Effect::SendMessage(text) => self.pump(AgentInput::Text(text), view).await?,
                Effect::SendToolResult(response) => self.pump(AgentInput::FunctionResult(response), view).await?,
                Effect::InsertRecord(insert) => {
                    tracing::info!(
                        movement = insert.movement_name(),
                        value = %insert.record().value,
                        date = %insert.record().date,
                        "writing confirmed personal record"
                    );
                    let result = session
                        .store()
                        .insert_personal_record(insert.record())
                        .await
                        .map_err(|e| {
                            tracing::warn!(error = %e, "confirmed insert failed");
                            e.to_string()
                        });
                    let next = self.engine.step(EngineEvent::InsertCompleted(result))?;
                    self.flush(view, None);
                    next
                }
                Effect::RefreshSnapshot => {
                    if let Err(e) = session.refresh().await {
                        tracing::warn!(error = %e, "snapshot refresh after insert failed");
                    }
                    Vec::new()
                }
            };
            queue.extend(next);
        }
        Ok(())
    }

    /// Stream one agent turn through the engine.
    async fn pump(&mut self, input: AgentInput, view: &mut impl ChatView) -> Result<Vec<Effect>, EngineError> {
        let mut stream = match self.agent.stream_turn(input).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "assistant stream could not start");
                return self.fail(e.to_string(), view);
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(text) = chunk.text.as_deref() {
                        view.on_delta(text);
                    }
                    self.engine.step(EngineEvent::Chunk(chunk))?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "assistant stream failed");
                    return self.fail(e.to_string(), view);
                }
            }
        }

        let streamed = match self.engine.in_flight() {
            Some(turn) => {
                self.agent.complete_turn(turn.text(), turn.call());
                turn.text().to_string()
            }
            None => String::new(),
        };
        let effects = self.engine.step(EngineEvent::StreamEnded)?;
        self.flush(view, Some(&streamed));
        Ok(effects)
    }

    fn fail(&mut self, reason: String, view: &mut impl ChatView) -> Result<Vec<Effect>, EngineError> {
        let effects = self.engine.step(EngineEvent::StreamFailed(reason))?;
        self.flush(view, None);
        Ok(effects)
    }

    fn flush(&mut self, view: &mut impl ChatView, streamed: Option<&str>) {
        for message in self.engine.conversation().since(self.shown) {
            let was_streamed = streamed.is_some_and(|text| !text.is_empty() && text == message.text);
            view.on_message(message, was_streamed);
            self.shown = message.id;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;
    use uuid::Uuid;

    use prtracker_core::chat::{self, AgentChunk, Role};
    use prtracker_core::tool::{ADD_PERSONAL_RECORD, FunctionCall};

    use super::*;
    use crate::agent::{AgentError, AgentStream};
    use crate::auth::AuthUser;
    use crate::store::memory::MemoryStore;

    type Script = Result<Vec<Result<AgentChunk, AgentError>>, AgentError>;

    /// Plays back one scripted turn per `stream_turn` call.
    #[derive(Default)]
    struct ScriptedAgent {
        turns: VecDeque<Script>,
        inputs: Vec<AgentInput>,
        completed: Vec<(String, Option<FunctionCall>)>,
    }

    impl ScriptedAgent {
        fn with(turns: Vec<Script>) -> Self {
            Self {
                turns: turns.into(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ConversationalAgent for ScriptedAgent {
        async fn stream_turn(&mut self, input: AgentInput) -> Result<AgentStream, AgentError> {
            self.inputs.push(input);
            let chunks = self.turns.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
            Ok(Box::pin(stream::iter(chunks)))
        }

        fn complete_turn(&mut self, text: &str, call: Option<&FunctionCall>) {
            self.completed.push((text.to_string(), call.cloned()));
        }
    }

    #[derive(Default)]
    struct RecordingView {
        deltas: String,
        messages: Vec<(String, bool)>,
        prompts: Vec<String>,
    }

    impl ChatView for RecordingView {
        fn on_delta(&mut self, delta: &str) {
            self.deltas.push_str(delta);
        }

        fn on_message(&mut self, message: &ChatMessage, streamed: bool) {
            if message.role == Role::Assistant {
                self.messages.push((message.text.clone(), streamed));
            }
            if let Some(pending) = &message.pending {
                self.prompts.push(pending.prompt.clone());
            }
        }
    }

    fn propose(movement: &str, value: &str) -> Script {
        Ok(vec![Ok(AgentChunk::call(FunctionCall {
            name: ADD_PERSONAL_RECORD.to_string(),
            args: json!({"movementName": movement, "value": value, "date": "2024-05-01"}),
        }))])
    }

    fn say(text: &str) -> Script {
        Ok(vec![Ok(AgentChunk::text(text))])
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    async fn session() -> SessionState<MemoryStore> {
        let user = AuthUser {
            id: Uuid::from_u128(42),
            email: None,
        };
        SessionState::load(MemoryStore::with_movements(&["Back Squat", "Deadlift"]), user)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn confirmed_proposal_is_written_once_and_narrated() {
        let mut session = session().await;
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![
            propose("deadlift", "200kg"),
            say("Huge lift!"),
        ]));
        let mut view = RecordingView::default();

        assistant.send(&mut session, "log 200kg deadlift", &mut view).await.unwrap();
        assert_eq!(assistant.phase(), Phase::AwaitingConfirmation);
        assert_eq!(session.store().inserts(), 0);
        assert!(view.prompts[0].contains("- **Movement:** deadlift"));

        assistant.resolve(&mut session, true, today(), &mut view).await.unwrap();

        assert_eq!(assistant.phase(), Phase::Idle);
        assert_eq!(session.store().inserts(), 1);
        let records = &session.snapshot().records;
        assert_eq!(records.len(), 1, "refetched snapshot holds the new record exactly once");
        assert_eq!(records[0].movement_name(), Some("Deadlift"));

        let inputs = &assistant.agent().inputs;
        assert_eq!(inputs.len(), 2);
        match &inputs[1] {
            AgentInput::FunctionResult(response) => {
                assert_eq!(response.response["success"], json!(true));
            }
            other => panic!("expected a function result, got {other:?}"),
        }
        let texts: Vec<&str> = view.messages.iter().map(|(t, _)| t.as_str()).collect();
        assert!(texts.contains(&chat::SAVING));
        assert_eq!(view.messages.last(), Some(&("Huge lift!".to_string(), true)));
        assert_eq!(view.deltas, "Huge lift!");
    }

    #[tokio::test]
    async fn unknown_movement_touches_nothing() {
        let mut session = session().await;
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![propose("Snatch", "90kg")]));
        let mut view = RecordingView::default();

        assistant.send(&mut session, "log a 90kg snatch", &mut view).await.unwrap();
        let calls_before = session.store().calls();
        assistant.resolve(&mut session, true, today(), &mut view).await.unwrap();

        assert_eq!(session.store().calls(), calls_before);
        assert_eq!(assistant.agent().inputs.len(), 1);
        assert_eq!(assistant.phase(), Phase::Idle);
        assert_eq!(
            assistant.conversation().last().map(|m| m.text.clone()),
            Some(chat::movement_not_found("Snatch"))
        );
    }

    #[tokio::test]
    async fn cancel_discards_the_proposal() {
        let mut session = session().await;
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![propose("Deadlift", "200kg")]));
        let mut view = RecordingView::default();

        assistant.send(&mut session, "log 200kg deadlift", &mut view).await.unwrap();
        assistant.resolve(&mut session, false, today(), &mut view).await.unwrap();

        assert_eq!(session.store().inserts(), 0);
        assert!(assistant.conversation().pending().is_none());
        assert_eq!(view.messages.last().map(|(t, _)| t.as_str()), Some(chat::CANCELLED));
        assert!(matches!(
            assistant.resolve(&mut session, true, today(), &mut view).await,
            Err(EngineError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn identical_confirmations_create_distinct_records() {
        let mut session = session().await;
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![
            propose("Deadlift", "200kg"),
            say("Saved."),
            propose("Deadlift", "200kg"),
            say("Saved again."),
        ]));
        let mut view = RecordingView::default();

        for _ in 0..2 {
            assistant.send(&mut session, "log 200kg deadlift", &mut view).await.unwrap();
            assistant.resolve(&mut session, true, today(), &mut view).await.unwrap();
        }

        let ids: Vec<i64> = session.snapshot().records.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn rejected_insert_is_narrated_without_refresh() {
        let mut session = session().await;
        session.store().reject_inserts("new row violates row-level security policy");
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![
            propose("Deadlift", "200kg"),
            say("That didn't work."),
        ]));
        let mut view = RecordingView::default();

        assistant.send(&mut session, "log it", &mut view).await.unwrap();
        let calls_before = session.store().calls();
        assistant.resolve(&mut session, true, today(), &mut view).await.unwrap();

        // only the insert itself, no refetch
        assert_eq!(session.store().calls(), calls_before + 1);
        match &assistant.agent().inputs[1] {
            AgentInput::FunctionResult(response) => {
                assert_eq!(response.response["success"], json!(false));
                assert_eq!(
                    response.response["error"],
                    json!("new row violates row-level security policy")
                );
            }
            other => panic!("expected a function result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_failure_discards_partial_text_and_recovers() {
        let mut session = session().await;
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![
            Ok(vec![
                Ok(AgentChunk::text("Your best squat is")),
                Err(AgentError::Decode("connection reset".to_string())),
            ]),
            say("Your best squat is 150kg."),
        ]));
        let mut view = RecordingView::default();

        assistant.send(&mut session, "best squat?", &mut view).await.unwrap();
        assert_eq!(assistant.phase(), Phase::Idle);
        assert_eq!(
            assistant.conversation().last().map(|m| m.text.as_str()),
            Some(chat::STREAM_FAILED)
        );
        assert!(assistant.agent().completed.is_empty());

        assistant.send(&mut session, "best squat?", &mut view).await.unwrap();
        assert_eq!(assistant.agent().completed.len(), 1);
        assert_eq!(view.messages.last(), Some(&("Your best squat is 150kg.".to_string(), true)));
    }

    #[tokio::test]
    async fn failed_start_is_reported_in_the_conversation() {
        let mut session = session().await;
        let mut assistant = Assistant::new(ScriptedAgent::with(vec![Err(AgentError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })]));
        let mut view = RecordingView::default();
        assistant.show_pending(&mut view);
        assert_eq!(view.messages[0].0, chat::GREETING);

        assistant.send(&mut session, "hi", &mut view).await.unwrap();
        assert_eq!(view.messages.last().map(|(t, _)| t.as_str()), Some(chat::STREAM_FAILED));
        assert_eq!(assistant.phase(), Phase::Idle);
    }
}
