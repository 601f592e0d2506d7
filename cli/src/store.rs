//! Record Store boundary: the movement catalog plus per-user personal records
//! and benchmark scores, served by Supabase PostgREST.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use prtracker_core::models::{
    Movement, NewMovement, NewPersonalRecord, NewWorkoutScore, PersonalRecord, RecordId, WorkoutScore,
};

use crate::config::BackendConfig;
use crate::util::{backend_message, client};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend answered with a non-success status.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("could not reach the record store: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected record store response: {0}")]
    Decode(String),
    #[error("invalid record store endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_movements(&self) -> Result<Vec<Movement>, StoreError>;
    async fn list_personal_records(&self, user_id: Uuid) -> Result<Vec<PersonalRecord>, StoreError>;
    async fn list_workout_scores(&self, user_id: Uuid) -> Result<Vec<WorkoutScore>, StoreError>;
    /// Returns the created row; names are not unique, so callers cannot look it up by name.
    async fn insert_movement(&self, movement: &NewMovement) -> Result<Movement, StoreError>;
    async fn insert_personal_record(&self, record: &NewPersonalRecord) -> Result<(), StoreError>;
    async fn insert_workout_score(&self, score: &NewWorkoutScore) -> Result<(), StoreError>;
    /// Returns the number of rows removed; zero when `id` is not the user's.
    async fn delete_personal_record(&self, user_id: Uuid, id: RecordId) -> Result<usize, StoreError>;
    async fn delete_workout_score(&self, user_id: Uuid, id: RecordId) -> Result<usize, StoreError>;
}

const MOVEMENTS: &str = "movements";
const PERSONAL_RECORDS: &str = "personal_records";
const WOD_RECORDS: &str = "wod_records";

pub struct PostgrestStore {
    http: reqwest::Client,
    rest_url: Url,
    anon_key: String,
    access_token: RwLock<String>,
}

impl PostgrestStore {
    pub fn new(config: &BackendConfig, access_token: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            http: client(),
            rest_url: config.url.join("rest/v1/")?,
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(access_token.into()),
        })
    }

    /// Switch to a refreshed access token for subsequent requests.
    pub fn set_access_token(&self, token: &str) {
        let mut current = self.access_token.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = token.to_string();
    }

    fn request(&self, method: Method, table: &str) -> Result<reqwest::RequestBuilder, StoreError> {
        let url = self.rest_url.join(table)?;
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, StoreError> {
        let response = self.request(Method::GET, table)?.query(query).send().await?;
        let body = read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("{table}: {e}")))
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)?
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        read_body(response).await?;
        tracing::debug!(table, "row inserted");
        Ok(())
    }

    /// Insert one row and read it back as stored.
    async fn insert_returning<T: Serialize + Sync, R: DeserializeOwned>(&self, table: &str, row: &T) -> Result<R, StoreError> {
        let response = self
            .request(Method::POST, table)?
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let body = read_body(response).await?;
        let mut rows: Vec<R> =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("{table}: {e}")))?;
        if rows.len() != 1 {
            return Err(StoreError::Decode(format!("{table}: expected one inserted row, got {}", rows.len())));
        }
        tracing::debug!(table, "row inserted");
        Ok(rows.remove(0))
    }

    async fn delete(&self, table: &str, user_id: Uuid, id: RecordId) -> Result<usize, StoreError> {
        let response = self
            .request(Method::DELETE, table)?
            .query(&[("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let body = read_body(response).await?;
        let removed: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("{table}: {e}")))?;
        tracing::debug!(table, id, removed = removed.len(), "delete finished");
        Ok(removed.len())
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn list_movements(&self) -> Result<Vec<Movement>, StoreError> {
        self.select(MOVEMENTS, &[("select", "*".to_string()), ("order", "name.asc".to_string())])
            .await
    }

    async fn list_personal_records(&self, user_id: Uuid) -> Result<Vec<PersonalRecord>, StoreError> {
        self.select(
            PERSONAL_RECORDS,
            &[
                ("select", "*,movements(name,type)".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "date.desc".to_string()),
            ],
        )
        .await
    }

    async fn list_workout_scores(&self, user_id: Uuid) -> Result<Vec<WorkoutScore>, StoreError> {
        self.select(
            WOD_RECORDS,
            &[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "date.desc".to_string()),
            ],
        )
        .await
    }

    async fn insert_movement(&self, movement: &NewMovement) -> Result<Movement, StoreError> {
        self.insert_returning(MOVEMENTS, movement).await
    }

    async fn insert_personal_record(&self, record: &NewPersonalRecord) -> Result<(), StoreError> {
        self.insert(PERSONAL_RECORDS, record).await
    }

    async fn insert_workout_score(&self, score: &NewWorkoutScore) -> Result<(), StoreError> {
        self.insert(WOD_RECORDS, score).await
    }

    async fn delete_personal_record(&self, user_id: Uuid, id: RecordId) -> Result<usize, StoreError> {
        self.delete(PERSONAL_RECORDS, user_id, id).await
    }

    async fn delete_workout_score(&self, user_id: Uuid, id: RecordId) -> Result<usize, StoreError> {
        self.delete(WOD_RECORDS, user_id, id).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, StoreError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = backend_message(status.as_u16(), &body);
        tracing::warn!(status = status.as_u16(), %message, "record store rejected request");
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    Ok(body)
}


#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::config::base_url;

    const USER_ID: &str = "6f1c2b1e-3f7e-4c1a-9a55-0d6c1a2f9b10";

    fn store_for(server: &mockito::Server) -> PostgrestStore {
        let config = BackendConfig {
            url: base_url("SUPABASE_URL", &server.url()).unwrap(),
            anon_key: "anon".to_string(),
        };
        PostgrestStore::new(&config, "token-1").unwrap()
    }

    #[tokio::test]
    async fn lists_records_with_embedded_movement() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/personal_records")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*,movements(name,type)".into()),
                Matcher::UrlEncoded("user_id".into(), format!("eq.{USER_ID}")),
                Matcher::UrlEncoded("order".into(), "date.desc".into()),
            ]))
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer token-1")
            .with_status(200)
            .with_body(
                json!([{
                    "id": 7,
                    "user_id": USER_ID,
                    "movement_id": 3,
                    "value": "150kg",
                    "date": "2024-05-01",
                    "notes": null,
                    "created_at": "2024-05-01T10:00:00+00:00",
                    "movements": { "name": "Back Squat", "type": "Weightlifting" }
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let records = store_for(&server)
            .list_personal_records(USER_ID.parse().unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].movement_name(), Some("Back Squat"));
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[tokio::test]
    async fn insert_sends_the_row_and_surfaces_rejections() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/personal_records")
            .match_header("prefer", "return=minimal")
            .match_body(Matcher::PartialJson(json!({"movement_id": 3, "value": "150kg"})))
            .with_status(403)
            .with_body(r#"{"code":"42501","message":"new row violates row-level security policy"}"#)
            .create_async()
            .await;

        let record = NewPersonalRecord::new(
            USER_ID.parse().unwrap(),
            3,
            "150kg",
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            None,
        )
        .unwrap();
        let err = store_for(&server).insert_personal_record(&record).await.unwrap_err();
        match err {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "new row violates row-level security policy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn movement_insert_returns_the_created_row() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/movements")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::Json(json!({"name": "Row", "type": "Cardio"})))
            .with_status(201)
            .with_body(r#"[{"id": 2, "name": "Row", "type": "Cardio"}]"#)
            .create_async()
            .await;

        let movement = NewMovement::new("Row", Some("cardio")).unwrap();
        let created = store_for(&server).insert_movement(&movement).await.unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, 2);
        assert_eq!(created.category, "Cardio");
    }

    #[tokio::test]
    async fn delete_is_scoped_to_the_owner() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/rest/v1/wod_records")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.12".into()),
                Matcher::UrlEncoded("user_id".into(), format!("eq.{USER_ID}")),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let removed = store_for(&server)
            .delete_workout_score(USER_ID.parse().unwrap(), 12)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let config = BackendConfig {
            url: base_url("SUPABASE_URL", "http://127.0.0.1:9").unwrap(),
            anon_key: "anon".to_string(),
        };
        let store = PostgrestStore::new(&config, "token").unwrap();
        assert!(matches!(store.list_movements().await, Err(StoreError::Transport(_))));
    }
}
