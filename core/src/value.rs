//! Grammar for the free-text `value` / `score` fields.
//!
//! ```text
//! value    := quantity | time
//! quantity := number [ws] [unit]
//! number   := digits [("." | ",") digits]
//! unit     := letters | "%"
//! time     := minutes ":" ss | hours ":" mm ":" ss
//! ```
//!
//! Anything outside the grammar is rejected with a [`ValueParseError`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>\d+(?:[.,]\d+)?)\s*(?P<unit>[A-Za-z]+|%)?$").expect("valid regex")
});

static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<first>\d+):(?P<second>[0-5]\d)(?::(?P<third>[0-5]\d))?$")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueParseError {
    #[error("value is empty")]
    Empty,
    #[error("'{0}' is not a valid time (expected m:ss or h:mm:ss)")]
    MalformedTime(String),
    #[error("'{0}' is not a number with an optional unit (e.g. 100kg)")]
    MalformedQuantity(String),
}

/// A parsed result value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceValue {
    /// A load, distance, rep count and so on: a number with an optional unit.
    Quantity { amount: f64, unit: Option<String> },
    /// A duration written with colons.
    Time { seconds: u32 },
}

impl PerformanceValue {
    pub fn is_quantity(&self) -> bool {
        matches!(self, PerformanceValue::Quantity { .. })
    }
}

impl FromStr for PerformanceValue {
    type Err = ValueParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(ValueParseError::Empty);
        }

        if input.contains(':') {
            let caps = TIME
                .captures(input)
                .ok_or_else(|| ValueParseError::MalformedTime(input.to_string()))?;
            let first = parse_component(&caps["first"], input)?;
            let second = parse_component(&caps["second"], input)?;
            let seconds = match caps.name("third") {
                Some(third) => {
                    let third = parse_component(third.as_str(), input)?;
                    first
                        .checked_mul(3600)
                        .and_then(|h| h.checked_add(second * 60 + third))
                }
                None => first.checked_mul(60).and_then(|m| m.checked_add(second)),
            }
            .ok_or_else(|| ValueParseError::MalformedTime(input.to_string()))?;
            return Ok(PerformanceValue::Time { seconds });
        }

        let caps = QUANTITY
            .captures(input)
            .ok_or_else(|| ValueParseError::MalformedQuantity(input.to_string()))?;
        let amount: f64 = caps["number"]
            .replace(',', ".")
            .parse()
            .map_err(|_| ValueParseError::MalformedQuantity(input.to_string()))?;
        if !amount.is_finite() {
            return Err(ValueParseError::MalformedQuantity(input.to_string()));
        }
        let unit = caps.name("unit").map(|u| u.as_str().to_string());
        Ok(PerformanceValue::Quantity { amount, unit })
    }
}

impl fmt::Display for PerformanceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceValue::Quantity { amount, unit } => match unit {
                Some(unit) => write!(f, "{amount}{unit}"),
                None => write!(f, "{amount}"),
            },
            PerformanceValue::Time { seconds } => {
                let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
                if h > 0 {
                    write!(f, "{h}:{m:02}:{s:02}")
                } else {
                    write!(f, "{m}:{s:02}")
                }
            }
        }
    }
}

fn parse_component(digits: &str, input: &str) -> Result<u32, ValueParseError> {
    digits
        .parse()
        .map_err(|_| ValueParseError::MalformedTime(input.to_string()))
}
