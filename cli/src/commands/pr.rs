use clap::Subcommand;
use serde_json::json;

use prtracker_core::models::RecordId;

use crate::commands::{RecordRow, confirm_delete, open_session, today};
use crate::config::Config;
use crate::error::AppError;
use crate::util::print_json;

#[derive(Subcommand)]
pub enum PrCommands {
    /// Latest personal record per movement
    List {
        /// Only movements whose name contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Every record for one movement, newest first
    History {
        /// Movement name or id
        #[arg(long)]
        movement: String,
    },
    /// Log a new personal record
    Add {
        /// Movement name or id (must exist in the catalog)
        #[arg(long)]
        movement: String,
        /// Result, e.g. "150kg", "5:21" or "12 reps"
        #[arg(long)]
        value: String,
        /// Date achieved (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete one of your personal records
    Delete {
        #[arg(long)]
        id: RecordId,
        /// Skip the confirmation question
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn run(config: &Config, command: PrCommands) -> Result<(), AppError> {
    let (_auth, mut session) = open_session(config).await?;
    match command {
        PrCommands::List { search } => {
            let snapshot = session.snapshot();
            let latest = snapshot.search_latest(search.as_deref().unwrap_or_default());
            let rows: Vec<RecordRow> = latest.into_iter().map(RecordRow::from).collect();
            print_json(&rows)
        }
        PrCommands::History { movement } => {
            let movement = session.resolve_movement(&movement)?;
            let rows: Vec<RecordRow> = session
                .snapshot()
                .history(movement.id)
                .into_iter()
                .map(RecordRow::from)
                .collect();
            print_json(&json!({
                "movement": movement,
                "records": rows,
            }))
        }
        PrCommands::Add {
            movement,
            value,
            date,
            notes,
        } => {
            session
                .add_record(&movement, &value, date.as_deref(), notes.as_deref(), today())
                .await?;
            print_json(&json!({ "status": "created" }))
        }
        PrCommands::Delete { id, yes } => {
            if !confirm_delete(yes)? {
                return print_json(&json!({ "status": "cancelled" }));
            }
            session.delete_record(id).await?;
            print_json(&json!({ "status": "deleted", "id": id }))
        }
    }
}
