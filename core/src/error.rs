use serde::Serialize;

/// Structured error report printed by the CLI on failure.
/// Carries a stable machine code next to the human message so scripts can
/// branch on `error` without parsing prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which input field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Hint about what to do next
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ErrorReport {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            field: None,
            docs_hint: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.docs_hint = Some(hint.into());
        self
    }
}

/// Error codes used across the CLI
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const BACKEND_REJECTED: &str = "backend_rejected";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const CONFIG_ERROR: &str = "config_error";
    pub const CLI_ERROR: &str = "cli_error";
}

/// Missing or malformed form input. Recovered locally; the operation is not attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("unknown movement category '{0}' (expected one of: Weightlifting, Gymnastics, Cardio, Other)")]
    UnknownCategory(String),
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField { field } => field,
            ValidationError::UnknownCategory(_) => "category",
            ValidationError::InvalidDate(_) => "date",
        }
    }
}

impl From<&ValidationError> for ErrorReport {
    fn from(err: &ValidationError) -> Self {
        ErrorReport::new(codes::VALIDATION_FAILED, err.to_string()).with_field(err.field())
    }
}
