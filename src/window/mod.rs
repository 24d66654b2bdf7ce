//! Reporting-day resolution.
//!
//! The report covers one *civil* day in a fixed zone. Boundaries are taken as
//! local midnights and only then converted to instants, which is what makes
//! DST days come out as 23h or 25h instead of a fixed 24h offset from UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub use crate::domain::{InstantRange, TimeWindow};

pub mod filter;

pub use filter::{FilterOutcome, filter_to_window, parse_document_date};

/// Step used to find the first valid local instant when midnight is skipped.
const GAP_STEP_MINUTES: i64 = 15;

impl TimeWindow {
    /// The full civil day before `now`, as seen in `tz`.
    pub fn previous_day(now: DateTime<Utc>, tz: Tz) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let date = today.pred_opt().unwrap_or(today);
        Self::for_date(date, tz)
    }

    /// The civil day `date` in `tz`.
    pub fn for_date(date: NaiveDate, tz: Tz) -> Self {
        let next = date.succ_opt().unwrap_or(date);
        Self {
            date,
            tz,
            start: local_midnight(date, tz),
            end: local_midnight(next, tz),
        }
    }

    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_epoch(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn range(&self) -> InstantRange {
        InstantRange {
            start: self.start,
            end: self.end,
        }
    }

    /// Inclusive at `start`, exclusive at `end`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Absolute length of the window (23h/24h/25h).
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Civil date as `DD/MM/YYYY`.
    pub fn label(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    /// An instant rendered in the window's zone as `YYYY-MM-DD HH:MM:SS`.
    pub fn local_timestamp(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

impl InstantRange {
    /// The `minutes` leading up to `now`.
    pub fn last_minutes(now: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start: now - Duration::minutes(i64::from(minutes)),
            end: now,
        }
    }

    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_epoch(&self) -> i64 {
        self.end.timestamp()
    }
}

/// First instant of the civil day `date` in `tz`.
///
/// Ambiguous midnights resolve to the earlier instant. Zones whose DST jump
/// skips midnight start the day at the first local time that exists.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    let mut local: NaiveDateTime = midnight;
    while local.date() == date {
        if let Some(dt) = tz.from_local_datetime(&local).earliest() {
            return dt.with_timezone(&Utc);
        }
        local += Duration::minutes(GAP_STEP_MINUTES);
    }
    // No valid local time on that day at all; fall back to UTC midnight.
    Utc.from_utc_datetime(&midnight)
}
