use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::models::PersonalRecord;
use crate::value::{PerformanceValue, ValueParseError};

pub const DEFAULT_PERCENTAGE: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculatorError {
    #[error("'{0}' is a time, percentages only apply to quantities like 100kg")]
    NotAQuantity(String),
    #[error("invalid percentage '{0}' (expected a non-negative number)")]
    InvalidPercentage(String),
    #[error(transparent)]
    Value(#[from] ValueParseError),
}

/// A finite, non-negative percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentage(f64);

impl Percentage {
    pub fn new(value: f64) -> Result<Self, CalculatorError> {
        if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(CalculatorError::InvalidPercentage(value.to_string()))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self(DEFAULT_PERCENTAGE)
    }
}

impl FromStr for Percentage {
    type Err = CalculatorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().trim_end_matches('%').trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| CalculatorError::InvalidPercentage(raw.trim().to_string()))?;
        Self::new(value).map_err(|_| CalculatorError::InvalidPercentage(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentageResult {
    pub base: f64,
    pub percentage: f64,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl fmt::Display for PercentageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{:.2} {unit}", self.amount),
            None => write!(f, "{:.2}", self.amount),
        }
    }
}

/// `percentage` percent of a free-text record value such as "100kg".
pub fn percentage_of(value: &str, percentage: Percentage) -> Result<PercentageResult, CalculatorError> {
    match value.parse::<PerformanceValue>()? {
        PerformanceValue::Quantity { amount, unit } => Ok(PercentageResult {
            base: amount,
            percentage: percentage.value(),
            amount: amount * percentage.value() / 100.0,
            unit,
        }),
        PerformanceValue::Time { .. } => Err(CalculatorError::NotAQuantity(value.trim().to_string())),
    }
}

/// Records the calculator can work with: those whose value parses as a quantity.
pub fn weight_based(records: &[PersonalRecord]) -> Vec<&PersonalRecord> {
    records
        .iter()
        .filter(|r| {
            r.value
                .parse::<PerformanceValue>()
                .is_ok_and(|v| v.is_quantity())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::*;

    fn record(id: i64, value: &str) -> PersonalRecord {
        PersonalRecord {
            id,
            user_id: Uuid::nil(),
            movement_id: id,
            value: value.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            notes: None,
            created_at: Utc::now(),
            movement: None,
        }
    }

    #[test]
    fn computes_percentage_with_unit() {
        let result = percentage_of("150kg", "80".parse().unwrap()).unwrap();
        assert_eq!(result.amount, 120.0);
        assert_eq!(result.to_string(), "120.00 kg");
    }

    #[test]
    fn unitless_values_render_without_suffix() {
        let result = percentage_of("95", Percentage::new(50.0).unwrap()).unwrap();
        assert_eq!(result.to_string(), "47.50");
    }

    #[test]
    fn rejects_times_and_garbage() {
        assert_eq!(
            percentage_of("5:30", Percentage::default()),
            Err(CalculatorError::NotAQuantity("5:30".to_string()))
        );
        assert!(matches!(
            percentage_of("heavy", Percentage::default()),
            Err(CalculatorError::Value(_))
        ));
    }

    #[test]
    fn oversized_values_never_yield_nan() {
        let huge = format!("{}kg", "9".repeat(400));
        assert!(matches!(
            percentage_of(&huge, Percentage::new(0.0).unwrap()),
            Err(CalculatorError::Value(ValueParseError::MalformedQuantity(_)))
        ));
        assert!(weight_based(&[record(1, &huge)]).is_empty());
    }

    #[test]
    fn percentage_parsing_is_strict() {
        assert_eq!("85%".parse::<Percentage>().unwrap().value(), 85.0);
        assert!("-5".parse::<Percentage>().is_err());
        assert!("NaN".parse::<Percentage>().is_err());
        assert!("eighty".parse::<Percentage>().is_err());
    }

    #[test]
    fn weight_based_excludes_times_and_text() {
        let records = vec![record(1, "100kg"), record(2, "5:30"), record(3, "max effort")];
        let ids: Vec<i64> = weight_based(&records).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    }
}
