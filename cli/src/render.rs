//! Terminal rendering for the assistant's lightweight markdown and for dates.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const RESET: &str = "\x1b[0m";

static STRONG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(?P<inner>[^*]+)\*\*").expect("valid regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^*])\*(?P<inner>[^*\s][^*]*)\*").expect("valid regex"));

/// `**bold**`, `*italic*` and `* `/`- ` bullet lines. `ansi = false` strips
/// the markers instead of styling them.
pub fn render_markdown(text: &str, ansi: bool) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let (bullet, body) = match trimmed.strip_prefix("* ").or_else(|| trimmed.strip_prefix("- ")) {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let styled = style_inline(body, ansi);
            if bullet { format!("  • {styled}") } else { styled }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn style_inline(text: &str, ansi: bool) -> String {
    let (bold_on, italic_on, off) = if ansi { (BOLD, ITALIC, RESET) } else { ("", "", "") };
    let bold = STRONG.replace_all(text, format!("{bold_on}${{inner}}{off}").as_str());
    EMPHASIS
        .replace_all(&bold, format!("${{1}}{italic_on}${{inner}}{off}").as_str())
        .into_owned()
}

/// "May 1, 2024"
pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}
