//! Inbound research requests and their idempotency key

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StockError};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse the as-of date of a request
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYYMMDD`, `YYYY-MM-DDTHH:MM:SS` and
/// RFC 3339. Any time part is dropped.
pub fn parse_as_of_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT) {
        return Ok(datetime.date());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Ok(datetime.date_naive());
    }

    Err(StockError::InvalidDate(raw.to_string()))
}

/// Truncate a subject id to its first `prefix_len` characters
pub fn normalize_subject(raw: &str, prefix_len: usize) -> Result<String> {
    let subject: String = raw.trim().chars().take(prefix_len).collect();
    if subject.is_empty() {
        return Err(StockError::InvalidSymbol(raw.to_string()));
    }
    Ok(subject)
}

/// `(subject, as-of date, scenario)` triple a persisted result is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub subject_id: String,
    pub as_of_date: NaiveDate,
    pub scenario_type: i64,
}

/// A validated research request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    pub user_input: String,
    pub subject_id: String,
    pub as_of_date: NaiveDate,
}

impl ResearchRequest {
    /// Validate raw request fields
    pub fn parse(
        user_input: impl Into<String>,
        subject: &str,
        date: &str,
        prefix_len: usize,
    ) -> Result<Self> {
        Ok(Self {
            user_input: user_input.into(),
            subject_id: normalize_subject(subject, prefix_len)?,
            as_of_date: parse_as_of_date(date)?,
        })
    }

    pub fn key(&self, scenario_type: i64) -> IdempotencyKey {
        IdempotencyKey {
            subject_id: self.subject_id.clone(),
            as_of_date: self.as_of_date,
            scenario_type,
        }
    }
}
