use clap::Args;
use serde_json::json;

use prtracker_core::calculator::{Percentage, percentage_of, weight_based};
use prtracker_core::models::{MovementId, PersonalRecord, RecordId};
use prtracker_core::snapshot::Snapshot;

use crate::commands::{RecordRow, open_session};
use crate::config::Config;
use crate::error::AppError;
use crate::util::print_json;

#[derive(Args)]
pub struct CalcArgs {
    /// Base the calculation on this record id
    #[arg(long, conflicts_with = "movement")]
    pub record: Option<RecordId>,
    /// Base the calculation on the latest record of this movement
    #[arg(long)]
    pub movement: Option<String>,
    /// Percentage to take (default: 80)
    #[arg(long, short = 'p', default_value_t = Percentage::default().value())]
    pub percentage: f64,
}

pub async fn run(config: &Config, args: CalcArgs) -> Result<(), AppError> {
    let (_auth, session) = open_session(config).await?;
    let snapshot = session.snapshot();
    let percentage = Percentage::new(args.percentage)?;

    let record = match (args.record, args.movement.as_deref()) {
        (Some(id), _) => snapshot
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::not_found("personal record", id))?,
        (None, Some(movement)) => {
            let movement = session.resolve_movement(movement)?;
            latest_for(snapshot, movement.id).ok_or_else(|| AppError::not_found("personal record for", &movement.name))?
        }
        (None, None) => {
            // Nothing picked: list what the calculator can work with.
            let rows: Vec<RecordRow> = weight_based(&snapshot.records)
                .into_iter()
                .map(RecordRow::from)
                .collect();
            return print_json(&rows);
        }
    };

    let result = percentage_of(&record.value, percentage)?;
    print_json(&json!({
        "record": RecordRow::from(record),
        "percentage": result.percentage,
        "amount": result.amount,
        "unit": result.unit,
        "display": result.to_string(),
    }))
}

fn latest_for(snapshot: &Snapshot, movement_id: MovementId) -> Option<&PersonalRecord> {
    snapshot.history(movement_id).into_iter().next()
}
