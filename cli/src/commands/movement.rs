use clap::Subcommand;
use serde_json::json;

use crate::commands::open_session;
use crate::config::Config;
use crate::error::AppError;
use crate::util::print_json;

#[derive(Subcommand)]
pub enum MovementCommands {
    /// List the movement catalog grouped by category
    List,
    /// Add a movement to the shared catalog
    Add {
        /// Movement name (e.g. "Back Squat")
        #[arg(long)]
        name: String,
        /// Category: Weightlifting, Gymnastics, Cardio or Other (default: Weightlifting)
        #[arg(long = "type", value_name = "CATEGORY")]
        category: Option<String>,
    },
}

pub async fn run(config: &Config, command: MovementCommands) -> Result<(), AppError> {
    let (_auth, mut session) = open_session(config).await?;
    match command {
        MovementCommands::List => print_json(&session.snapshot().movements_by_category()),
        MovementCommands::Add { name, category } => {
            let added = session.add_movement(&name, category.as_deref()).await?;
            print_json(&json!({
                "status": "created",
                "movement": added,
            }))
        }
    }
}
