use chrono::{Datelike, NaiveDate};

use crate::core::{AppError, Result};

const COUNTER_TOKEN: &str = "{COUNTER}";

/// Renders invoice numbers from the per-owner counter.
///
/// Supported placeholders: `{YYYY}`, `{YY}`, `{MM}`, `{DD}` (taken from the
/// issue date) and `{COUNTER}` (zero padded to `counter_width`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pattern: String,
    counter_width: usize,
}

impl NumberFormat {
    pub fn new(pattern: impl Into<String>, counter_width: usize) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.contains(COUNTER_TOKEN) {
            return Err(AppError::Configuration(format!(
                "Invoice number pattern '{}' must contain {}",
                pattern, COUNTER_TOKEN
            )));
        }
        if counter_width > 12 {
            return Err(AppError::Configuration(
                "Invoice counter width cannot exceed 12".to_string(),
            ));
        }
        Ok(Self {
            pattern,
            counter_width,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn render(&self, counter: i64, date: NaiveDate) -> String {
        self.pattern
            .replace("{YYYY}", &format!("{:04}", date.year()))
            .replace("{YY}", &format!("{:02}", date.year().rem_euclid(100)))
            .replace("{MM}", &format!("{:02}", date.month()))
            .replace("{DD}", &format!("{:02}", date.day()))
            .replace(
                COUNTER_TOKEN,
                &format!("{:0width$}", counter, width = self.counter_width),
            )
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            pattern: "{YYYY}-{COUNTER}".to_string(),
            counter_width: 4,
        }
    }
}
