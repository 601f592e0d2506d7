use clap::Subcommand;
use serde_json::json;

use prtracker_core::benchmarks::{BENCHMARKS, find_benchmark};
use prtracker_core::models::RecordId;

use crate::commands::{confirm_delete, open_session, today};
use crate::config::Config;
use crate::error::AppError;
use crate::util::print_json;

#[derive(Subcommand)]
pub enum WodCommands {
    /// Benchmark workouts with how often you logged each
    List,
    /// One benchmark with its description and your scores
    Show {
        /// Benchmark name, e.g. "Fran"
        name: String,
    },
    /// Log a score for a benchmark workout
    Add {
        /// Benchmark name, e.g. "Murph"
        #[arg(long)]
        workout: String,
        /// Time ("4:32") or rounds/reps ("18 rounds")
        #[arg(long)]
        score: String,
        /// Date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete one of your workout scores
    Delete {
        #[arg(long)]
        id: RecordId,
        /// Skip the confirmation question
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn run(config: &Config, command: WodCommands) -> Result<(), AppError> {
    let (_auth, mut session) = open_session(config).await?;
    match command {
        WodCommands::List => {
            let rows: Vec<_> = BENCHMARKS
                .iter()
                .map(|b| {
                    let scores = session.snapshot().scores_for(b.name);
                    json!({
                        "name": b.name,
                        "kind": b.kind,
                        "logged": scores.len(),
                        "latest": scores.first().map(|s| &s.score),
                    })
                })
                .collect();
            print_json(&rows)
        }
        WodCommands::Show { name } => {
            let benchmark = find_benchmark(&name).ok_or_else(|| AppError::not_found("benchmark", name.trim()))?;
            print_json(&json!({
                "benchmark": benchmark,
                "scores": session.snapshot().scores_for(benchmark.name),
            }))
        }
        WodCommands::Add {
            workout,
            score,
            date,
            notes,
        } => {
            session
                .add_workout_score(&workout, &score, date.as_deref(), notes.as_deref(), today())
                .await?;
            print_json(&json!({ "status": "created" }))
        }
        WodCommands::Delete { id, yes } => {
            if !confirm_delete(yes)? {
                return print_json(&json!({ "status": "cancelled" }));
            }
            session.delete_workout_score(id).await?;
            print_json(&json!({ "status": "deleted", "id": id }))
        }
    }
}
