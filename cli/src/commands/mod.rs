pub mod account;
pub mod calc;
pub mod movement;
pub mod pr;
pub mod shell;
pub mod wod;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use prtracker_core::models::{PersonalRecord, RecordId};

use crate::auth::{AuthClient, AuthError, AuthSession};
use crate::config::Config;
use crate::error::AppError;
use crate::session::SessionState;
use crate::store::PostgrestStore;
use crate::util;

/// Restore the stored session, refreshing it (and re-saving) when it is about to expire.
pub async fn signed_in(auth: &AuthClient) -> Result<AuthSession, AppError> {
    let stored = util::load_session().ok_or(AuthError::NotSignedIn)?;
    let previous_token = stored.access_token.clone();
    auth.restore(stored);
    let session = auth.ensure_fresh().await?;
    if session.access_token != previous_token {
        util::save_session(&session)?;
    }
    Ok(session)
}

/// Authenticate and fetch the initial snapshot.
pub async fn open_session(config: &Config) -> Result<(AuthClient, SessionState<PostgrestStore>), AppError> {
    let auth = AuthClient::new(&config.backend);
    let session = signed_in(&auth).await?;
    let store = PostgrestStore::new(&config.backend, session.access_token.as_str())?;
    let state = SessionState::load(store, session.user.clone()).await?;
    Ok((auth, state))
}

/// Local calendar date, used wherever a date defaults to "today".
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// A personal record as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct RecordRow<'a> {
    pub id: RecordId,
    pub movement: Option<&'a str>,
    pub value: &'a str,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
}

impl<'a> From<&'a PersonalRecord> for RecordRow<'a> {
    fn from(record: &'a PersonalRecord) -> Self {
        Self {
            id: record.id,
            movement: record.movement_name(),
            value: &record.value,
            date: record.date,
            notes: record.notes.as_deref(),
        }
    }
}

/// Ask before deleting unless the caller passed `--yes`.
pub fn confirm_delete(yes: bool) -> Result<bool, AppError> {
    if yes {
        return Ok(true);
    }
    Ok(util::confirm("Are you sure you want to delete this record?")?)
}
