use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

pub type MovementId = i64;
pub type RecordId = i64;

/// Movement categories offered when adding to the catalog.
pub const MOVEMENT_CATEGORIES: [&str; 4] = ["Weightlifting", "Gymnastics", "Cardio", "Other"];

/// An entry in the shared movement catalog. Not user-scoped; duplicates by name are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub name: String,
    /// Stored as `type` in the backend
    #[serde(rename = "type", default)]
    pub category: String,
}

/// The `movements(name, type)` join embedded in each personal record row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub category: String,
}

/// One logged attempt at a movement. `value` is free text ("100kg", "5:30");
/// there is no numeric schema enforced at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    pub id: RecordId,
    pub user_id: Uuid,
    pub movement_id: MovementId,
    pub value: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "movements", default)]
    pub movement: Option<MovementRef>,
}

impl PersonalRecord {
    pub fn movement_name(&self) -> Option<&str> {
        self.movement.as_ref().map(|m| m.name.as_str())
    }
}

/// A benchmark workout result, keyed by workout name instead of movement id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutScore {
    pub id: RecordId,
    pub user_id: Uuid,
    #[serde(rename = "wod_name")]
    pub workout_name: String,
    pub score: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the movement catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMovement {
    pub name: String,
    #[serde(rename = "type")]
    pub category: String,
}

impl NewMovement {
    pub fn new(name: &str, category: Option<&str>) -> Result<Self, ValidationError> {
        let name = required("name", name)?;
        let category = match category {
            Some(raw) => canonical_category(raw)?,
            None => MOVEMENT_CATEGORIES[0].to_string(),
        };
        Ok(Self { name, category })
    }
}

/// Insert payload for a personal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPersonalRecord {
    pub user_id: Uuid,
    pub movement_id: MovementId,
    pub value: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewPersonalRecord {
    pub fn new(
        user_id: Uuid,
        movement_id: MovementId,
        value: &str,
        date: NaiveDate,
        notes: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            user_id,
            movement_id,
            value: required("value", value)?,
            date,
            notes: optional(notes),
        })
    }
}

/// Insert payload for a benchmark workout score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewWorkoutScore {
    pub user_id: Uuid,
    #[serde(rename = "wod_name")]
    pub workout_name: String,
    pub score: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewWorkoutScore {
    pub fn new(
        user_id: Uuid,
        workout_name: &str,
        score: &str,
        date: NaiveDate,
        notes: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            user_id,
            workout_name: required("workout", workout_name)?,
            score: required("score", score)?,
            date,
            notes: optional(notes),
        })
    }
}

/// Parse a `YYYY-MM-DD` date as entered in a form or proposed by the assistant.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field: "date" });
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(trimmed.to_string()))
}

fn canonical_category(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    MOVEMENT_CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(trimmed))
        .map(|c| c.to_string())
        .ok_or_else(|| ValidationError::UnknownCategory(trimmed.to_string()))
}

fn required(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField { field })
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
