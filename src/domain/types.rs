//! Run-scoped data types.
//!
//! Everything here lives for a single run: documents come in from the API,
//! get dated and normalized, and end up in a `ReportResult` (daily digest) or
//! a reservation sheet that is handed to the notifier once.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;

/// The two document listings the report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Order,
    Invoice,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Order, DocumentKind::Invoice];

    /// Path segment of the list endpoint under the documents base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            DocumentKind::Order => "salesorder",
            DocumentKind::Invoice => "invoice",
        }
    }

    /// Section title, e.g. "Pedidos".
    pub fn title(self) -> &'static str {
        match self {
            DocumentKind::Order => "Pedidos",
            DocumentKind::Invoice => "Facturas",
        }
    }

    /// Lowercase plural used inside sentences, e.g. "pedidos".
    pub fn noun(self) -> &'static str {
        match self {
            DocumentKind::Order => "pedidos",
            DocumentKind::Invoice => "facturas",
        }
    }
}

/// One civil day in a fixed zone, as the half-open instant range `[start, end)`.
///
/// Construct with `TimeWindow::previous_day` or `TimeWindow::for_date`; the
/// boundaries are always local midnights, so `end - start` is 23h or 25h on
/// DST transition days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub date: NaiveDate,
    pub tz: Tz,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Half-open instant range `[start, end)` a listing is requested for.
///
/// The daily report uses a `TimeWindow`'s range; the reservation look-back
/// uses the last N minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Opaque document object as returned by the API.
pub type RawDocument = serde_json::Map<String, serde_json::Value>;

/// A raw document whose date has been resolved by the window filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedDocument {
    pub date: DateTime<Utc>,
    pub raw: RawDocument,
}

/// Display-ready view of one order or invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub identifier: String,
    pub customer_name: String,
    /// Rounded to the currency minor unit (2 dp).
    pub total_amount: Decimal,
    pub document_date: DateTime<Utc>,
    pub kind: DocumentKind,
}

/// What the report renderer hands to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportResult {
    pub order_count: usize,
    pub invoice_count: usize,
    pub order_total: Decimal,
    pub invoice_total: Decimal,
    pub subject_line: String,
    pub html_body: String,
    /// Plain-text rendering of the same content (mail alternative + console).
    pub text_body: String,
}
