//! Session State: the signed-in user, their snapshot and the current view.

use chrono::NaiveDate;
use serde_json::json;

use prtracker_core::benchmarks::find_benchmark;
use prtracker_core::models::{
    Movement, MovementId, NewMovement, NewPersonalRecord, NewWorkoutScore, RecordId, parse_date,
};
use prtracker_core::snapshot::Snapshot;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::store::{RecordStore, StoreError};

/// What the shell is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Prs,
    History(MovementId),
    Calculator,
    Add,
    Wods,
}

impl View {
    pub fn label(&self) -> &'static str {
        match self {
            View::Prs => "prs",
            View::History(_) => "history",
            View::Calculator => "calculator",
            View::Add => "add",
            View::Wods => "wods",
        }
    }
}

pub struct SessionState<S> {
    store: S,
    user: AuthUser,
    snapshot: Snapshot,
    view: View,
}

impl<S: RecordStore> SessionState<S> {
    /// Fetch the initial snapshot for `user`.
    pub async fn load(store: S, user: AuthUser) -> Result<Self, StoreError> {
        let mut session = Self {
            store,
            user,
            snapshot: Snapshot::default(),
            view: View::default(),
        };
        session.refresh().await?;
        Ok(session)
    }

    /// Re-fetch catalog, records and scores concurrently and replace the
    /// snapshot wholesale. On failure the previous snapshot stays.
    pub async fn refresh(&mut self) -> Result<(), StoreError> {
        let user_id = self.user.id;
        let (movements, records, scores) = tokio::try_join!(
            self.store.list_movements(),
            self.store.list_personal_records(user_id),
            self.store.list_workout_scores(user_id),
        )?;
        tracing::debug!(
            movements = movements.len(),
            records = records.len(),
            scores = scores.len(),
            "snapshot refreshed"
        );
        self.snapshot = Snapshot::new(movements, records, scores);
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn navigate(&mut self, view: View) {
        self.view = view;
    }

    /// Look a movement up by id or by exact (case-insensitive) name.
    pub fn resolve_movement(&self, key: &str) -> Result<&Movement, AppError> {
        let key = key.trim();
        let found = match key.parse::<MovementId>() {
            Ok(id) => self.snapshot.movement(id),
            Err(_) => self.snapshot.find_movement_by_name(key),
        };
        found.ok_or_else(|| AppError::not_found("movement", key))
    }

    /// Add to the shared catalog and return the row as stored.
    pub async fn add_movement(&mut self, name: &str, category: Option<&str>) -> Result<Movement, AppError> {
        let movement = NewMovement::new(name, category)?;
        let created = self.store.insert_movement(&movement).await?;
        tracing::info!(id = created.id, name = %created.name, category = %created.category, "movement added");
        self.refresh().await?;
        Ok(created)
    }

    pub async fn add_record(
        &mut self,
        movement: &str,
        value: &str,
        date: Option<&str>,
        notes: Option<&str>,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let movement_id = self.resolve_movement(movement)?.id;
        let date = resolve_date(date, today)?;
        let record = NewPersonalRecord::new(self.user.id, movement_id, value, date, notes)?;
        self.store.insert_personal_record(&record).await?;
        tracing::info!(movement_id, value = %record.value, %date, "personal record added");
        self.refresh().await?;
        Ok(())
    }

    pub async fn delete_record(&mut self, id: RecordId) -> Result<(), AppError> {
        if self.store.delete_personal_record(self.user.id, id).await? == 0 {
            return Err(AppError::not_found("personal record", id));
        }
        tracing::info!(id, "personal record deleted");
        self.refresh().await?;
        Ok(())
    }

    /// Log a benchmark score. The workout must be a catalog benchmark; its
    /// canonical spelling is what gets stored.
    pub async fn add_workout_score(
        &mut self,
        workout: &str,
        score: &str,
        date: Option<&str>,
        notes: Option<&str>,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let benchmark = find_benchmark(workout).ok_or_else(|| AppError::not_found("benchmark", workout.trim()))?;
        let date = resolve_date(date, today)?;
        let entry = NewWorkoutScore::new(self.user.id, benchmark.name, score, date, notes)?;
        self.store.insert_workout_score(&entry).await?;
        tracing::info!(workout = benchmark.name, score = %entry.score, %date, "workout score added");
        self.refresh().await?;
        Ok(())
    }

    pub async fn delete_workout_score(&mut self, id: RecordId) -> Result<(), AppError> {
        if self.store.delete_workout_score(self.user.id, id).await? == 0 {
            return Err(AppError::not_found("workout score", id));
        }
        tracing::info!(id, "workout score deleted");
        self.refresh().await?;
        Ok(())
    }

    /// Instruction given to the assistant when a chat starts. It embeds the
    /// records and scores as they are right now and is not updated later.
    pub fn system_instruction(&self) -> String {
        let records: Vec<_> = self
            .snapshot
            .records
            .iter()
            .map(|r| {
                json!({
                    "movement": r.movement_name(),
                    "value": r.value,
                    "date": r.date,
                    "notes": r.notes,
                })
            })
            .collect();
        let scores: Vec<_> = self
            .snapshot
            .scores
            .iter()
            .map(|s| {
                json!({
                    "wod": s.workout_name,
                    "score": s.score,
                    "date": s.date,
                    "notes": s.notes,
                })
            })
            .collect();

        format!(
            "You are a helpful and encouraging CrossFit coaching assistant. Use the information below to \
             answer the user's questions about their performance and how to use the app. Always be positive \
             and motivational. Keep answers concise.\n\
             \n\
             Application Functionality Guide:\n\
             - **PRs (`/prs`):** Users see their latest personal record for each movement, can search by \
             movement name, and open the full history of one movement with `/history`.\n\
             - **Calculator (`/calc`):** Calculates weight percentages from saved, weight-based PRs, for \
             planning training sessions.\n\
             - **Add PR (`/add`):** Logs a new PR for an existing movement; new movements are added to the \
             catalog with `prtracker movement add`.\n\
             - **WODs (`/wods`):** Lists benchmark WODs (like Murph and Fran) with their details, and the \
             user's logged scores.\n\
             - **Your Role:** Besides answering questions, you can add new PRs for the user with the \
             'addPersonalRecord' function when they ask you to. The user confirms every PR before it is saved.\n\
             \n\
             User's PR Data:\n{}\n\
             \n\
             User's WOD Score Data:\n{}\n",
            serde_json::Value::Array(records),
            serde_json::Value::Array(scores),
        )
    }
}

fn resolve_date(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate, AppError> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(today),
        Some(raw) => Ok(parse_date(raw)?),
    }
}

#[cfg(test)]
mod tests {
    use prtracker_core::error::ValidationError;
    use uuid::Uuid;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::from_u128(7),
            email: Some("ath@example.com".to_string()),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn load_fetches_all_three_collections() {
        let session = SessionState::load(MemoryStore::with_movements(&["Deadlift"]), user())
            .await
            .unwrap();
        assert_eq!(session.store().calls(), 3);
        assert_eq!(session.snapshot().movements.len(), 1);
        assert_eq!(session.view(), View::Prs);
    }

    #[tokio::test]
    async fn add_record_validates_then_refreshes() {
        let mut session = SessionState::load(MemoryStore::with_movements(&["Deadlift"]), user())
            .await
            .unwrap();

        let err = session
            .add_record("deadlift", "  ", None, None, today())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::MissingField { field: "value" })));
        assert_eq!(session.store().inserts(), 0);

        let err = session
            .add_record("Snatch", "80kg", None, None, today())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { what: "movement", .. }));

        session
            .add_record("deadlift", "200kg", None, Some("  "), today())
            .await
            .unwrap();
        let records = &session.snapshot().records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, today());
        assert_eq!(records[0].notes, None);
    }

    #[tokio::test]
    async fn duplicate_movement_names_return_the_new_row() {
        let mut session = SessionState::load(MemoryStore::with_movements(&["Row"]), user())
            .await
            .unwrap();
        let existing = session.snapshot().movements[0].id;

        let created = session.add_movement("row", Some("Cardio")).await.unwrap();
        assert_ne!(created.id, existing);
        assert_eq!(created.name, "row");
        assert_eq!(created.category, "Cardio");
        assert_eq!(session.snapshot().movements.len(), 2);
        assert!(session.snapshot().movement(created.id).is_some());
    }

    #[tokio::test]
    async fn delete_reports_unknown_ids() {
        let mut session = SessionState::load(MemoryStore::with_movements(&["Deadlift"]), user())
            .await
            .unwrap();
        session
            .add_record("Deadlift", "200kg", Some("2024-04-01"), None, today())
            .await
            .unwrap();
        let id = session.snapshot().records[0].id;

        assert!(matches!(session.delete_record(id + 100).await, Err(AppError::NotFound { .. })));
        session.delete_record(id).await.unwrap();
        assert!(session.snapshot().records.is_empty());
    }

    #[tokio::test]
    async fn workout_scores_use_the_benchmark_spelling() {
        let mut session = SessionState::load(MemoryStore::default(), user()).await.unwrap();
        session
            .add_workout_score("fran", "4:32", None, None, today())
            .await
            .unwrap();
        assert_eq!(session.snapshot().scores[0].workout_name, "Fran");

        let err = session
            .add_workout_score("Frann", "4:32", None, None, today())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { what: "benchmark", .. }));
    }

    #[tokio::test]
    async fn system_instruction_embeds_records_and_scores() {
        let mut session = SessionState::load(MemoryStore::with_movements(&["Back Squat"]), user())
            .await
            .unwrap();
        session
            .add_record("Back Squat", "150kg", Some("2024-04-20"), None, today())
            .await
            .unwrap();
        session
            .add_workout_score("Murph", "42:10", Some("2024-04-21"), Some("vest"), today())
            .await
            .unwrap();

        let instruction = session.system_instruction();
        assert!(instruction.contains(r#""movement":"Back Squat""#));
        assert!(instruction.contains(r#""value":"150kg""#));
        assert!(instruction.contains(r#""wod":"Murph""#));
        assert!(instruction.contains("addPersonalRecord"));
    }
}
