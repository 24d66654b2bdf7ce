//! Local re-check of the API's date filter.
//!
//! The upstream `starttmp`/`endtmp` filter is inclusive and its exact day
//! boundary is not documented, so every document is dated here and kept only
//! if it falls inside `[start, end)` of the reporting window.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use super::local_midnight;
use crate::domain::{DatedDocument, RawDocument, TimeWindow};

/// Candidate date fields, highest priority first.
pub const DATE_FIELDS: [&str; 4] = ["date", "createdAt", "issuedOn", "updatedAt"];

/// Epoch values at or above this are taken as milliseconds (year 5138 in seconds).
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Documents split by where their date fell.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<DatedDocument>,
    /// Dated, but outside the window.
    pub outside: usize,
    /// No date field that could be parsed.
    pub undated: usize,
}

/// Keep the documents dated inside `window`, preserving input order.
pub fn filter_to_window(docs: Vec<RawDocument>, window: &TimeWindow) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for raw in docs {
        match document_date(&raw, window.tz) {
            Some(date) if window.contains(date) => outcome.kept.push(DatedDocument { date, raw }),
            Some(_) => outcome.outside += 1,
            None => outcome.undated += 1,
        }
    }
    outcome
}

/// First candidate field that parses as a date.
pub fn document_date(raw: &RawDocument, tz: Tz) -> Option<DateTime<Utc>> {
    DATE_FIELDS
        .iter()
        .filter_map(|field| raw.get(*field))
        .find_map(|value| parse_document_date(value, tz))
}

/// Parse one date-like JSON value.
///
/// Accepts epoch seconds or milliseconds (as numbers or digit strings),
/// RFC 3339 timestamps, and naive `YYYY-MM-DD[ HH:MM:SS]` values, which are
/// read as civil time in `tz`.
pub fn parse_document_date(value: &Value, tz: Tz) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
            from_epoch(secs)
        }
        Value::String(s) => parse_date_str(s.trim(), tz),
        _ => None,
    }
}

fn parse_date_str(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return from_epoch(s.parse().ok()?);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(local_midnight(date, tz));
    }
    None
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}
