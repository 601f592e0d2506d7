use serde_json::json;

use crate::auth::{AuthClient, CONFIRMATION_REQUIRED, SignUpOutcome};
use crate::commands::signed_in;
use crate::config::Config;
use crate::error::AppError;
use crate::util::{self, print_json};

fn password_or_prompt(password: Option<String>) -> Result<String, AppError> {
    match password {
        Some(password) => Ok(password),
        None => Ok(util::prompt("Password: ")?),
    }
}

pub async fn login(config: &Config, email: &str, password: Option<String>) -> Result<(), AppError> {
    let password = password_or_prompt(password)?;
    let auth = AuthClient::new(&config.backend);
    let session = auth.sign_in(email.trim(), &password).await?;
    util::save_session(&session)?;

    print_json(&json!({
        "status": "authenticated",
        "user_id": session.user.id,
        "email": session.user.email,
        "expires_at": session.expires_at,
        "session_path": util::session_path().display().to_string(),
    }))
}

pub async fn signup(config: &Config, email: &str, password: Option<String>) -> Result<(), AppError> {
    let password = password_or_prompt(password)?;
    let auth = AuthClient::new(&config.backend);
    match auth.sign_up(email.trim(), &password).await? {
        SignUpOutcome::ConfirmationRequired { email } => print_json(&json!({
            "status": "confirmation_required",
            "email": email,
            "message": CONFIRMATION_REQUIRED,
        })),
        SignUpOutcome::SignedIn(session) => {
            util::save_session(&session)?;
            print_json(&json!({
                "status": "authenticated",
                "user_id": session.user.id,
                "email": session.user.email,
                "expires_at": session.expires_at,
            }))
        }
    }
}

pub async fn logout(config: &Config) -> Result<(), AppError> {
    if let Some(stored) = util::load_session() {
        let auth = AuthClient::new(&config.backend);
        auth.restore(stored);
        auth.sign_out().await?;
    }
    util::clear_session()?;
    print_json(&json!({ "status": "logged_out" }))
}

pub async fn whoami(config: &Config) -> Result<(), AppError> {
    let auth = AuthClient::new(&config.backend);
    let session = signed_in(&auth).await?;
    print_json(&json!({
        "user_id": session.user.id,
        "email": session.user.email,
        "expires_at": session.expires_at,
    }))
}
