//! Conversational Agent boundary and its Gemini implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use prtracker_core::chat::AgentChunk;
use prtracker_core::tool::{FunctionCall, FunctionDeclaration, FunctionResponse, add_personal_record_declaration};

use crate::config::AgentConfig;
use crate::sse::{EventStream, event_stream};
use crate::util::{backend_message, client};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("assistant request failed ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("could not reach the assistant: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unreadable assistant response: {0}")]
    Decode(String),
    #[error("invalid assistant endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

pub type AgentStream = EventStream<AgentChunk, AgentError>;

/// What starts a streamed turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    Text(String),
    FunctionResult(FunctionResponse),
}

#[async_trait]
pub trait ConversationalAgent: Send {
    /// Start a streamed turn. The input stays pending until [`Self::complete_turn`].
    async fn stream_turn(&mut self, input: AgentInput) -> Result<AgentStream, AgentError>;

    /// Commit the pending input together with the model's finished reply.
    /// A turn that failed is never completed, so history skips it.
    fn complete_turn(&mut self, text: &str, call: Option<&FunctionCall>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    /// Part kinds we neither send nor act on
    Other(serde_json::Value),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: Vec<&'a Content>,
    tools: &'a [Tool],
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}

/// One payload of the `alt=sse` stream. An `error` object mid-stream ends the turn.
fn parse_event(data: &str) -> Option<Result<AgentChunk, AgentError>> {
    let response: StreamResponse = match serde_json::from_str(data) {
        Ok(response) => response,
        Err(e) => return Some(Err(AgentError::Decode(e.to_string()))),
    };
    if let Some(error) = response.error {
        return Some(Err(AgentError::Api {
            status: error.code.unwrap_or(500),
            message: error.message,
        }));
    }

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();
    let mut chunk = AgentChunk::default();
    for part in parts {
        match part {
            Part::Text { text } => chunk.text.get_or_insert_with(String::new).push_str(&text),
            Part::FunctionCall { function_call } => chunk.function_calls.push(function_call),
            Part::FunctionResponse { .. } | Part::Other(_) => {}
        }
    }
    if chunk.text.is_none() && chunk.function_calls.is_empty() {
        None
    } else {
        Some(Ok(chunk))
    }
}

/// Gemini chat session. Holds the system instruction fixed at creation and
/// the history of completed turns.
pub struct GeminiAgent {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: Url,
    system_instruction: String,
    tools: Vec<Tool>,
    history: Vec<Content>,
    pending: Option<Content>,
}

impl GeminiAgent {
    pub fn new(config: &AgentConfig, system_instruction: String) -> Self {
        Self {
            http: client(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            system_instruction,
            tools: vec![Tool {
                function_declarations: vec![add_personal_record_declaration()],
            }],
            history: Vec::new(),
            pending: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> Result<Url, AgentError> {
        Ok(self
            .base_url
            .join(&format!("models/{}:streamGenerateContent", self.model))?)
    }
}

#[async_trait]
impl ConversationalAgent for GeminiAgent {
    async fn stream_turn(&mut self, input: AgentInput) -> Result<AgentStream, AgentError> {
        let parts = match input {
            AgentInput::Text(text) => vec![Part::Text { text }],
            AgentInput::FunctionResult(function_response) => vec![Part::FunctionResponse { function_response }],
        };
        self.pending = Some(Content::new("user", parts));

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: self.system_instruction.clone(),
                }],
            },
            contents: self.history.iter().chain(self.pending.iter()).collect(),
            tools: &self.tools,
        };

        tracing::debug!(model = %self.model, turns = request.contents.len(), "starting assistant stream");
        let response = self
            .http
            .post(self.stream_url()?)
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: backend_message(status.as_u16(), &body),
            });
        }

        Ok(event_stream(response.bytes_stream(), parse_event))
    }

    fn complete_turn(&mut self, text: &str, call: Option<&FunctionCall>) {
        let Some(input) = self.pending.take() else {
            return;
        };
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(Part::Text { text: text.to_string() });
        }
        if let Some(call) = call {
            parts.push(Part::FunctionCall {
                function_call: call.clone(),
            });
        }
        self.history.push(input);
        if !parts.is_empty() {
            self.history.push(Content::new("model", parts));
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::config::base_url;

    fn agent_for(server: &mockito::Server) -> GeminiAgent {
        let config = AgentConfig {
            api_key: "g-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: base_url("GEMINI_BASE_URL", &format!("{}/v1beta", server.url())).unwrap(),
        };
        GeminiAgent::new(&config, "You are a coach.".to_string())
    }

    fn sse(events: &[serde_json::Value]) -> String {
        events.iter().map(|e| format!("data: {e}\r\n\r\n")).collect()
    }

    #[test]
    fn parses_text_and_function_call_parts() {
        let chunk = parse_event(
            &json!({"candidates": [{"content": {"role": "model", "parts": [
                {"text": "Logging "},
                {"text": "it."},
                {"functionCall": {"name": "addPersonalRecord", "args": {"movementName": "Deadlift", "value": "200kg"}}}
            ]}}]})
            .to_string(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.text.as_deref(), Some("Logging it."));
        assert_eq!(chunk.function_calls[0].args["value"], "200kg");
    }

    #[test]
    fn metadata_only_payloads_are_skipped_and_errors_surface() {
        assert!(parse_event(r#"{"usageMetadata":{"totalTokenCount":12}}"#).is_none());
        assert!(matches!(
            parse_event(r#"{"error":{"code":429,"message":"quota exceeded"}}"#),
            Some(Err(AgentError::Api { status: 429, .. }))
        ));
        assert!(matches!(parse_event("{not json"), Some(Err(AgentError::Decode(_)))));
    }

    #[tokio::test]
    async fn streams_a_turn_and_commits_history_on_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
            .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
            .match_header("x-goog-api-key", "g-key")
            .match_body(Matcher::PartialJson(json!({
                "systemInstruction": {"parts": [{"text": "You are a coach."}]},
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "tools": [{"functionDeclarations": [{"name": "addPersonalRecord"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse(&[
                json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}]}}]}),
                json!({"candidates": [{"content": {"role": "model", "parts": [{"text": " there"}]}}]}),
            ]))
            .create_async()
            .await;

        let mut agent = agent_for(&server);
        let stream = agent.stream_turn(AgentInput::Text("hi".to_string())).await.unwrap();
        let chunks: Vec<AgentChunk> = stream.map(|c| c.unwrap()).collect().await;
        mock.assert_async().await;

        let text: String = chunks.iter().filter_map(|c| c.text.clone()).collect();
        assert_eq!(text, "Hello there");

        assert!(agent.history.is_empty());
        agent.complete_turn(&text, None);
        assert_eq!(agent.history.len(), 2);
        assert_eq!(agent.history[1].role.as_deref(), Some("model"));
    }

    #[tokio::test]
    async fn failed_turns_leave_history_untouched() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let mut agent = agent_for(&server);
        let err = match agent.stream_turn(AgentInput::Text("hi".to_string())).await {
            Err(err) => err,
            Ok(_) => panic!("expected the request to be rejected"),
        };
        assert!(matches!(err, AgentError::Api { status: 400, ref message } if message == "API key not valid"));

        // the next turn starts over from an empty history
        assert!(agent.history.is_empty());
    }

    #[tokio::test]
    async fn function_results_are_sent_as_function_responses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "log 200kg deadlift"}]},
                    {"role": "model", "parts": [{"functionCall": {"name": "addPersonalRecord"}}]},
                    {"role": "user", "parts": [{"functionResponse": {"name": "addPersonalRecord", "response": {"success": true}}}]}
                ]
            })))
            .with_status(200)
            .with_body(sse(&[json!({"candidates": [{"content": {"parts": [{"text": "Saved!"}]}}]})]))
            .create_async()
            .await;

        let mut agent = agent_for(&server);
        agent.pending = Some(Content::new(
            "user",
            vec![Part::Text {
                text: "log 200kg deadlift".to_string(),
            }],
        ));
        let call = FunctionCall {
            name: "addPersonalRecord".to_string(),
            args: json!({"movementName": "Deadlift", "value": "200kg"}),
        };
        agent.complete_turn("", Some(&call));

        let response = FunctionResponse {
            name: "addPersonalRecord".to_string(),
            response: json!({"success": true, "message": "The PR was successfully saved."}),
        };
        let stream = agent.stream_turn(AgentInput::FunctionResult(response)).await.unwrap();
        let chunks: Vec<_> = stream.collect().await;
        mock.assert_async().await;
        assert_eq!(chunks.len(), 1);
    }
}
