use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The one write action the assistant may propose.
pub const ADD_PERSONAL_RECORD: &str = "addPersonalRecord";

/// A structured action proposal emitted by the assistant instead of free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Result of an executed action, sent back so the assistant can narrate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// Tool schema advertised to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub fn add_personal_record_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: ADD_PERSONAL_RECORD.to_string(),
        description: "Adds a new personal record for a specific movement.".to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "movementName": {
                    "type": "STRING",
                    "description": "The name of the movement, e.g., \"Back Squat\" or \"Deadlift\"."
                },
                "value": {
                    "type": "STRING",
                    "description": "The result achieved, e.g., \"150kg\" or \"5:21\"."
                },
                "date": {
                    "type": "STRING",
                    "description": "The date the PR was achieved, in YYYY-MM-DD format. Defaults to today if not provided."
                },
                "notes": {
                    "type": "STRING",
                    "description": "Any additional notes about the record."
                }
            },
            "required": ["movementName", "value"]
        }),
    }
}

/// Arguments of an `addPersonalRecord` proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPersonalRecordArgs {
    pub movement_name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },
}

/// A typed, validated proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedAction {
    AddPersonalRecord(AddPersonalRecordArgs),
}

impl ProposedAction {
    pub fn from_call(call: &FunctionCall) -> Result<Self, ToolCallError> {
        match call.name.as_str() {
            ADD_PERSONAL_RECORD => {
                let args: AddPersonalRecordArgs = serde_json::from_value(call.args.clone())
                    .map_err(|e| ToolCallError::InvalidArguments {
                        name: call.name.clone(),
                        reason: e.to_string(),
                    })?;
                for (field, value) in [("movementName", &args.movement_name), ("value", &args.value)] {
                    if value.trim().is_empty() {
                        return Err(ToolCallError::InvalidArguments {
                            name: call.name.clone(),
                            reason: format!("{field} is blank"),
                        });
                    }
                }
                Ok(ProposedAction::AddPersonalRecord(args))
            }
            other => Err(ToolCallError::UnknownFunction(other.to_string())),
        }
    }

    /// Human-readable prompt shown before anything is written.
    pub fn confirmation_prompt(&self) -> String {
        match self {
            ProposedAction::AddPersonalRecord(args) => {
                let date = args
                    .date
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or("Today");
                let notes = args
                    .notes
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or("None");
                format!(
                    "I'm ready to add this PR:\n\
                     - **Movement:** {}\n\
                     - **Value:** {}\n\
                     - **Date:** {date}\n\
                     - **Notes:** {notes}\n\
                     \n\
                     Shall I proceed?",
                    args.movement_name, args.value
                )
            }
        }
    }
}

/// Outcome of executing a confirmed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Success { success: bool, message: String },
    Failure { success: bool, error: String },
}

impl ToolOutcome {
    pub fn saved() -> Self {
        ToolOutcome::Success {
            success: true,
            message: "The PR was successfully saved.".to_string(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            success: false,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    pub fn into_response(self, name: &str) -> FunctionResponse {
        FunctionResponse {
            name: name.to_string(),
            response: serde_json::to_value(&self).unwrap_or(Value::Null),
        }
    }
}
