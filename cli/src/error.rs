use prtracker_core::calculator::CalculatorError;
use prtracker_core::error::{ErrorReport, ValidationError, codes};

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::store::StoreError;

/// Every failure a command can end with.
///
/// Exit codes: 0=success, 1=validation or not found, 2=backend rejection,
///             3=connection error, 4=configuration or usage error
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Calculator(#[from] CalculatorError),
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },
    #[error("{0}")]
    Usage(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn not_found(what: &'static str, name: impl ToString) -> Self {
        AppError::NotFound {
            what,
            name: name.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) | AppError::Calculator(_) | AppError::NotFound { .. } => 1,
            AppError::Auth(AuthError::NotSignedIn) => 1,
            AppError::Auth(AuthError::Rejected { .. }) | AppError::Store(StoreError::Rejected { .. }) => 2,
            AppError::Auth(AuthError::Decode(_)) | AppError::Store(StoreError::Decode(_)) => 2,
            AppError::Auth(AuthError::Transport(_)) | AppError::Store(StoreError::Transport(_)) => 3,
            AppError::Auth(AuthError::Endpoint(_)) | AppError::Store(StoreError::Endpoint(_)) => 4,
            AppError::Config(_) | AppError::Usage(_) | AppError::Io(_) => 4,
        }
    }

    pub fn report(&self) -> ErrorReport {
        let message = self.to_string();
        match self {
            AppError::Validation(err) => ErrorReport::from(err),
            AppError::Calculator(_) => ErrorReport::new(codes::VALIDATION_FAILED, message),
            AppError::NotFound { .. } => ErrorReport::new(codes::NOT_FOUND, message),
            AppError::Auth(AuthError::NotSignedIn) => ErrorReport::new(codes::UNAUTHORIZED, message)
                .with_hint("Run `prtracker login` (or `prtracker signup`) first."),
            AppError::Auth(AuthError::Rejected { status: 400 | 401, .. })
            | AppError::Store(StoreError::Rejected { status: 401, .. }) => {
                ErrorReport::new(codes::UNAUTHORIZED, message).with_hint("Run `prtracker login` again.")
            }
            AppError::Auth(AuthError::Rejected { .. } | AuthError::Decode(_))
            | AppError::Store(StoreError::Rejected { .. } | StoreError::Decode(_)) => {
                ErrorReport::new(codes::BACKEND_REJECTED, message)
            }
            AppError::Auth(AuthError::Transport(_)) | AppError::Store(StoreError::Transport(_)) => {
                ErrorReport::new(codes::CONNECTION_ERROR, message).with_hint("Is SUPABASE_URL reachable?")
            }
            AppError::Config(_) | AppError::Auth(AuthError::Endpoint(_)) | AppError::Store(StoreError::Endpoint(_)) => {
                ErrorReport::new(codes::CONFIG_ERROR, message)
                    .with_hint("Set SUPABASE_URL and SUPABASE_ANON_KEY in the environment or a .env file.")
            }
            AppError::Usage(_) | AppError::Io(_) => ErrorReport::new(codes::CLI_ERROR, message),
        }
    }
}
