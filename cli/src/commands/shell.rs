//! Interactive shell: slash commands for the views, free text for the assistant.

use std::io::{IsTerminal, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use prtracker_core::benchmarks::{BENCHMARKS, BenchmarkKind, find_benchmark};
use prtracker_core::calculator::{Percentage, percentage_of, weight_based};
use prtracker_core::chat::{ChatMessage, Role};
use prtracker_core::engine::EngineError;
use prtracker_core::models::{PersonalRecord, RecordId};

use crate::agent::GeminiAgent;
use crate::assistant::{Assistant, ChatView};
use crate::auth::{AuthClient, SessionWatcher};
use crate::commands::{open_session, today};
use crate::config::Config;
use crate::error::AppError;
use crate::render::{format_date, render_markdown};
use crate::session::{SessionState, View};
use crate::store::{PostgrestStore, RecordStore};
use crate::util;

const HELP: &str = "\
Commands:
  /prs [search]                      latest record per movement
  /history <movement>                every record for one movement
  /calc [record-id] [percentage]     percentage of a weight-based record (default 80%)
  /add <movement> | <value> [| <date>] [| <notes>]
  /wods [name]                       benchmark workouts and your scores
  /refresh                           re-fetch everything
  /confirm, /cancel                  answer the assistant's pending proposal
  /logout, /quit
Anything else is sent to the assistant.";

const AI_UNAVAILABLE: &str = "AI not available. Set GEMINI_API_KEY to enable the assistant.";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Help,
    Prs(Option<String>),
    History(String),
    Calc {
        record: Option<RecordId>,
        percentage: Option<String>,
    },
    Add {
        movement: String,
        value: String,
        date: Option<String>,
        notes: Option<String>,
    },
    Wods(Option<String>),
    Refresh,
    Confirm,
    Cancel,
    Logout,
    Quit,
    Chat(String),
    Empty,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ShellCommand::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(ShellCommand::Chat(line.to_string()));
        };
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        let argument = (!argument.is_empty()).then(|| argument.to_string());

        match name.to_ascii_lowercase().as_str() {
            "help" | "?" => Ok(ShellCommand::Help),
            "prs" => Ok(ShellCommand::Prs(argument)),
            "history" => argument
                .map(ShellCommand::History)
                .ok_or_else(|| "usage: /history <movement>".to_string()),
            "calc" => {
                let mut words = argument.as_deref().unwrap_or_default().split_whitespace();
                let record = match words.next() {
                    Some(raw) => Some(raw.parse().map_err(|_| format!("'{raw}' is not a record id"))?),
                    None => None,
                };
                Ok(ShellCommand::Calc {
                    record,
                    percentage: words.next().map(String::from),
                })
            }
            "add" => {
                let raw = argument.unwrap_or_default();
                let mut fields = raw.split('|').map(str::trim);
                let usage = || "usage: /add <movement> | <value> [| <date>] [| <notes>]".to_string();
                let movement = fields.next().filter(|f| !f.is_empty()).ok_or_else(usage)?;
                let value = fields.next().filter(|f| !f.is_empty()).ok_or_else(usage)?;
                let date = fields.next().filter(|f| !f.is_empty()).map(String::from);
                let notes = fields.next().filter(|f| !f.is_empty()).map(String::from);
                Ok(ShellCommand::Add {
                    movement: movement.to_string(),
                    value: value.to_string(),
                    date,
                    notes,
                })
            }
            "wods" => Ok(ShellCommand::Wods(argument)),
            "refresh" => Ok(ShellCommand::Refresh),
            "confirm" | "yes" => Ok(ShellCommand::Confirm),
            "cancel" | "no" => Ok(ShellCommand::Cancel),
            "logout" => Ok(ShellCommand::Logout),
            "quit" | "exit" => Ok(ShellCommand::Quit),
            other => Err(format!("unknown command '/{other}', try /help")),
        }
    }
}

/// Streams assistant text straight to stdout.
struct TerminalView {
    ansi: bool,
    mid_stream: bool,
}

impl TerminalView {
    fn end_stream(&mut self) {
        if self.mid_stream {
            println!();
            self.mid_stream = false;
        }
    }
}

impl ChatView for TerminalView {
    fn on_delta(&mut self, delta: &str) {
        if !self.mid_stream {
            print!("assistant> ");
            self.mid_stream = true;
        }
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }

    fn on_message(&mut self, message: &ChatMessage, streamed: bool) {
        self.end_stream();
        if message.role == Role::User {
            return;
        }
        if !streamed && !message.text.is_empty() {
            println!("assistant> {}", render_markdown(&message.text, self.ansi));
        }
        if let Some(pending) = &message.pending {
            println!("{}", render_markdown(&pending.prompt, self.ansi));
            println!("(type /confirm to save it or /cancel to discard it)");
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run(config: &Config) -> Result<(), AppError> {
    let (auth, mut session) = open_session(config).await?;
    let mut watcher = auth.subscribe();
    let ansi = std::io::stdout().is_terminal();
    let mut view = TerminalView {
        ansi,
        mid_stream: false,
    };

    let mut assistant = config.agent.as_ref().map(|agent| {
        tracing::info!(model = %agent.model, "assistant enabled");
        Assistant::new(GeminiAgent::new(agent, session.system_instruction()))
    });
    if assistant.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; the assistant is disabled");
    }

    println!(
        "Signed in as {}. Type /help for commands.",
        session.user().email.as_deref().unwrap_or("unknown user")
    );
    print_prs(&session, None, ansi);
    match assistant.as_mut() {
        Some(assistant) => assistant.show_pending(&mut view),
        None => println!("{AI_UNAVAILABLE}"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("[{}]> ", session.view().label());
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };

        if let Err(e) = auth.ensure_fresh().await {
            tracing::warn!(error = %e, "session refresh failed");
        }
        if !follow_session(&mut watcher, session.store())? {
            println!("Signed out.");
            break;
        }

        let command = match ShellCommand::parse(&line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };
        match handle(command, &auth, &mut session, assistant.as_mut(), &mut view, ansi).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => println!("error: {e}"),
        }

        if !follow_session(&mut watcher, session.store())? {
            println!("Signed out.");
            break;
        }
    }

    if let Some(assistant) = assistant {
        tracing::debug!(
            messages = assistant.conversation().messages().len(),
            model = assistant.agent().model(),
            "shell closed"
        );
    }
    Ok(())
}

/// Apply a session change: persist refreshed tokens and hand them to the
/// store. Returns `false` once the user is signed out.
fn follow_session(watcher: &mut SessionWatcher, store: &PostgrestStore) -> Result<bool, AppError> {
    if !watcher.has_changed().unwrap_or(false) {
        return Ok(true);
    }
    let current = watcher.borrow_and_update().clone();
    match current {
        Some(fresh) => {
            store.set_access_token(&fresh.access_token);
            util::save_session(&fresh)?;
            Ok(true)
        }
        None => {
            util::clear_session()?;
            Ok(false)
        }
    }
}

async fn handle(
    command: ShellCommand,
    auth: &AuthClient,
    session: &mut SessionState<PostgrestStore>,
    assistant: Option<&mut Assistant<GeminiAgent>>,
    view: &mut TerminalView,
    ansi: bool,
) -> Result<Flow, AppError> {
    match command {
        ShellCommand::Empty => {}
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit => return Ok(Flow::Quit),
        ShellCommand::Prs(search) => {
            session.navigate(View::Prs);
            print_prs(session, search.as_deref(), ansi);
        }
        ShellCommand::History(movement) => {
            let movement = session.resolve_movement(&movement)?.clone();
            session.navigate(View::History(movement.id));
            println!("{}", emphasize(&format!("History for {}", movement.name), ansi));
            let history = session.snapshot().history(movement.id);
            if history.is_empty() {
                println!("No records yet.");
            }
            for record in history {
                print_record(record);
            }
        }
        ShellCommand::Calc { record, percentage } => {
            session.navigate(View::Calculator);
            let percentage = match percentage {
                Some(raw) => raw.parse::<Percentage>()?,
                None => Percentage::default(),
            };
            match record {
                None => {
                    println!("Weight-based records:");
                    for record in weight_based(&session.snapshot().records) {
                        print_record(record);
                    }
                }
                Some(id) => {
                    let record = session
                        .snapshot()
                        .records
                        .iter()
                        .find(|r| r.id == id)
                        .ok_or_else(|| AppError::not_found("personal record", id))?;
                    let result = percentage_of(&record.value, percentage)?;
                    println!(
                        "{}% of {} ({}) = {}",
                        result.percentage,
                        record.value,
                        record.movement_name().unwrap_or("unknown movement"),
                        emphasize(&result.to_string(), ansi)
                    );
                }
            }
        }
        ShellCommand::Add {
            movement,
            value,
            date,
            notes,
        } => {
            session.navigate(View::Add);
            session
                .add_record(&movement, &value, date.as_deref(), notes.as_deref(), today())
                .await?;
            println!("Saved.");
            session.navigate(View::Prs);
        }
        ShellCommand::Wods(name) => {
            session.navigate(View::Wods);
            print_wods(session, name.as_deref(), ansi)?;
        }
        ShellCommand::Refresh => {
            session.refresh().await?;
            println!("Up to date.");
        }
        // the session watcher sees the sign-out and ends the loop
        ShellCommand::Logout => auth.sign_out().await?,
        ShellCommand::Confirm | ShellCommand::Cancel | ShellCommand::Chat(_) => {
            let Some(assistant) = assistant else {
                println!("{AI_UNAVAILABLE}");
                return Ok(Flow::Continue);
            };
            let result = match command {
                ShellCommand::Chat(text) => assistant.send(session, &text, view).await,
                ShellCommand::Confirm => assistant.resolve(session, true, today(), view).await,
                _ => assistant.resolve(session, false, today(), view).await,
            };
            match result {
                Ok(()) => {}
                Err(EngineError::IllegalTransition { .. }) => println!("There is nothing to confirm or cancel."),
                Err(e) => println!("{e}"),
            }
        }
    }
    Ok(Flow::Continue)
}

fn emphasize(text: &str, ansi: bool) -> String {
    render_markdown(&format!("**{text}**"), ansi)
}

fn print_record(record: &PersonalRecord) {
    let notes = record.notes.as_deref().map(|n| format!("  ({n})")).unwrap_or_default();
    println!(
        "  #{:<5} {:<24} {:<12} {}{notes}",
        record.id,
        record.movement_name().unwrap_or("?"),
        record.value,
        format_date(record.date)
    );
}

fn print_prs<S: RecordStore>(session: &SessionState<S>, search: Option<&str>, ansi: bool) {
    let latest = session.snapshot().search_latest(search.unwrap_or_default());
    println!("{}", emphasize("Latest personal records", ansi));
    if latest.is_empty() {
        println!("No records found.");
    }
    for record in latest {
        print_record(record);
    }
}

fn print_wods<S: RecordStore>(session: &SessionState<S>, name: Option<&str>, ansi: bool) -> Result<(), AppError> {
    let Some(name) = name else {
        for benchmark in BENCHMARKS {
            let logged = session.snapshot().scores_for(benchmark.name).len();
            println!("  {:<16} {:<10} logged {logged}x", benchmark.name, kind_label(benchmark.kind));
        }
        return Ok(());
    };

    let benchmark = find_benchmark(name).ok_or_else(|| AppError::not_found("benchmark", name))?;
    println!("{} ({})", emphasize(benchmark.name, ansi), kind_label(benchmark.kind));
    for line in benchmark.description {
        println!("  {line}");
    }
    if let Some(notes) = benchmark.notes {
        println!("  {notes}");
    }
    let scores = session.snapshot().scores_for(benchmark.name);
    if scores.is_empty() {
        println!("No scores logged yet.");
    }
    for score in scores {
        println!("  #{:<5} {:<12} {}", score.id, score.score, format_date(score.date));
    }
    Ok(())
}

fn kind_label(kind: BenchmarkKind) -> &'static str {
    match kind {
        BenchmarkKind::ForTime => "For Time",
        BenchmarkKind::Amrap => "AMRAP",
        BenchmarkKind::Other => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_goes_to_the_assistant() {
        assert_eq!(
            ShellCommand::parse("  I hit 200kg on deadlift today "),
            Ok(ShellCommand::Chat("I hit 200kg on deadlift today".to_string()))
        );
        assert_eq!(ShellCommand::parse("   "), Ok(ShellCommand::Empty));
    }

    #[test]
    fn parses_navigation_commands() {
        assert_eq!(ShellCommand::parse("/prs squat"), Ok(ShellCommand::Prs(Some("squat".to_string()))));
        assert_eq!(ShellCommand::parse("/PRS"), Ok(ShellCommand::Prs(None)));
        assert_eq!(
            ShellCommand::parse("/history Back Squat"),
            Ok(ShellCommand::History("Back Squat".to_string()))
        );
        assert!(ShellCommand::parse("/history").is_err());
        assert_eq!(
            ShellCommand::parse("/calc 12 85"),
            Ok(ShellCommand::Calc {
                record: Some(12),
                percentage: Some("85".to_string())
            })
        );
        assert!(ShellCommand::parse("/calc twelve").is_err());
        assert_eq!(ShellCommand::parse("/confirm"), Ok(ShellCommand::Confirm));
        assert!(ShellCommand::parse("/dance").is_err());
    }

    #[test]
    fn add_splits_on_pipes() {
        assert_eq!(
            ShellCommand::parse("/add Deadlift | 200kg | 2024-05-01"),
            Ok(ShellCommand::Add {
                movement: "Deadlift".to_string(),
                value: "200kg".to_string(),
                date: Some("2024-05-01".to_string()),
                notes: None,
            })
        );
        assert!(ShellCommand::parse("/add Deadlift").is_err());
        assert!(ShellCommand::parse("/add Deadlift |  ").is_err());
    }
}
