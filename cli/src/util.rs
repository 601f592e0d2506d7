use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthSession;
use crate::error::AppError;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Best human-readable message from a Supabase, PostgREST or Gemini error body.
pub fn backend_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error_description", "msg", "message"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
        match value.get("error") {
            Some(Value::String(text)) => return text.clone(),
            Some(Value::Object(inner)) => {
                if let Some(text) = inner.get("message").and_then(Value::as_str) {
                    return text.to_string();
                }
            }
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("request failed with status {status}")
    } else {
        trimmed.to_string()
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| AppError::Usage(e.to_string()))?;
    println!("{text}");
    Ok(())
}

/// Print the structured report for `err` to stderr and return its exit code.
pub fn report_error(err: &AppError) -> i32 {
    let report = err.report();
    match serde_json::to_string_pretty(&report) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{}: {}", report.error, report.message),
    }
    err.exit_code()
}

/// Ask a yes/no question on stderr; anything but y/yes is a no.
pub fn confirm(question: &str) -> std::io::Result<bool> {
    let answer = prompt(&format!("{question} [y/N] "))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub fn prompt(label: &str) -> std::io::Result<String> {
    eprint!("{label}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub fn session_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prtracker")
        .join("session.json")
}

pub fn load_session() -> Option<AuthSession> {
    let data = std::fs::read_to_string(session_path()).ok()?;
    match serde_json::from_str(&data) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable stored session");
            None
        }
    }
}

pub fn save_session(session: &AuthSession) -> std::io::Result<()> {
    let path = session_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(session)?;

    // Tokens on disk are readable by the owner only
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)?;
    file.write_all(data.as_bytes())?;
    tracing::debug!(path = %path.display(), "session stored");
    Ok(())
}

pub fn clear_session() -> std::io::Result<()> {
    match std::fs::remove_file(session_path()) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}
