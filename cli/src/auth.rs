//! GoTrue client.
//!
//! Every change of the signed-in session (sign-in, refresh, sign-out) is
//! published on a `watch` channel so long-running surfaces such as the shell
//! can react to it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::util::{backend_message, client};

/// Sessions this close to expiry are refreshed before use.
const REFRESH_MARGIN_MINUTES: i64 = 5;

pub const CONFIRMATION_REQUIRED: &str = "Check your email for the confirmation link!";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("could not reach the auth service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected auth response: {0}")]
    Decode(String),
    #[error("invalid auth endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(REFRESH_MARGIN_MINUTES) >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    /// The project requires e-mail confirmation before the first sign-in.
    ConfirmationRequired { email: String },
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

pub type SessionWatcher = watch::Receiver<Option<AuthSession>>;

pub struct AuthClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    current: watch::Sender<Option<AuthSession>>,
}

impl AuthClient {
    pub fn new(config: &BackendConfig) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            http: client(),
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            current,
        }
    }

    pub fn subscribe(&self) -> SessionWatcher {
        self.current.subscribe()
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.current.borrow().clone()
    }

    /// Adopt a session loaded from disk.
    pub fn restore(&self, session: AuthSession) {
        self.publish(Some(session));
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/token")?)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = read_body(response).await?;
        let session = decode_token(&body)?.into_session(Utc::now());
        tracing::info!(user_id = %session.user.id, "signed in");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/signup")?)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = read_body(response).await?;

        // Without auto-confirm GoTrue answers with the bare user and no tokens.
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))?;
        if value.get("access_token").is_none() {
            tracing::info!(email, "sign-up awaiting e-mail confirmation");
            return Ok(SignUpOutcome::ConfirmationRequired {
                email: email.to_string(),
            });
        }
        let session = decode_token(&body)?.into_session(Utc::now());
        tracing::info!(user_id = %session.user.id, "signed up");
        self.publish(Some(session.clone()));
        Ok(SignUpOutcome::SignedIn(session))
    }

    pub async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/token")?)
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": session.refresh_token }))
            .send()
            .await?;
        let body = read_body(response).await?;
        let refreshed = decode_token(&body)?.into_session(Utc::now());
        tracing::debug!(user_id = %refreshed.user.id, "session refreshed");
        self.publish(Some(refreshed.clone()));
        Ok(refreshed)
    }

    /// The current session, refreshed first when it is about to expire.
    pub async fn ensure_fresh(&self) -> Result<AuthSession, AuthError> {
        let session = self.current().ok_or(AuthError::NotSignedIn)?;
        if session.needs_refresh(Utc::now()) {
            return self.refresh(&session).await;
        }
        Ok(session)
    }

    /// Revoke the session remotely and drop it locally. A failed remote
    /// revocation is logged; the local session is dropped regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.current() else {
            return Ok(());
        };
        let result = self
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = response.status().as_u16(), "remote sign-out rejected");
            }
            Err(e) => tracing::warn!(error = %e, "remote sign-out failed"),
            Ok(_) => {}
        }
        tracing::info!(user_id = %session.user.id, "signed out");
        self.publish(None);
        Ok(())
    }

    fn publish(&self, session: Option<AuthSession>) {
        self.current.send_replace(session);
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.base_url.join(path)?)
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, AuthError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            message: backend_message(status.as_u16(), &body),
        });
    }
    Ok(body)
}

fn decode_token(body: &str) -> Result<TokenResponse, AuthError> {
    serde_json::from_str(body).map_err(|e| AuthError::Decode(e.to_string()))
}
