//! Shared "report pipeline" logic.
//!
//! One parameterized flow per document kind, run twice:
//! fetch all pages -> keep documents inside the window -> normalize
//!
//! A failed listing only takes its own section down; the run fails as a whole
//! when neither listing could be fetched.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::data::{PageSource, fetch_documents};
use crate::domain::{DocumentKind, RawDocument, ReportResult, TimeWindow};
use crate::error::{AppError, EXIT_DEGRADED};
use crate::io::normalize::normalize;
use crate::io::{dump_path, write_raw_json};
use crate::notify::{Notifier, OutgoingReport};
use crate::report::{RenderOptions, Section, build_report};
use crate::window::filter_to_window;

/// Per-kind result of the fetch/filter/normalize steps.
#[derive(Debug, Clone)]
pub struct SectionRun {
    pub kind: DocumentKind,
    pub section: Section,
    /// Everything the API returned, before window filtering.
    pub fetched: Vec<RawDocument>,
    pub outside: usize,
    pub undated: usize,
}

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub window: TimeWindow,
    pub orders: SectionRun,
    pub invoices: SectionRun,
    pub report: ReportResult,
}

/// How a delivered run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    /// Delivered, but one listing failed.
    Degraded,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Complete => 0,
            RunStatus::Degraded => EXIT_DEGRADED,
        }
    }
}

impl RunOutput {
    pub fn status(&self) -> RunStatus {
        if self.orders.section.is_failed() || self.invoices.section.is_failed() {
            RunStatus::Degraded
        } else {
            RunStatus::Complete
        }
    }
}

/// Fetch, filter and normalize one document kind. Never fails: a fetch error
/// becomes a `Section::Failed`.
pub fn collect_section<S: PageSource + ?Sized>(source: &S, kind: DocumentKind, window: &TimeWindow) -> SectionRun {
    let fetched = match fetch_documents(source, kind, &window.range()) {
        Ok(docs) => docs,
        Err(err) => {
            warn!(kind = kind.endpoint(), error = %err, "listing failed; section will be marked unavailable");
            return SectionRun {
                kind,
                section: Section::Failed(err.message().to_string()),
                fetched: Vec::new(),
                outside: 0,
                undated: 0,
            };
        }
    };

    let outcome = filter_to_window(fetched.clone(), window);
    if outcome.undated > 0 {
        warn!(kind = kind.endpoint(), undated = outcome.undated, "documents without a usable date were left out");
    }
    if outcome.outside > 0 {
        info!(kind = kind.endpoint(), outside = outcome.outside, "documents outside the window were left out");
    }

    let records = outcome.kept.iter().map(|doc| normalize(doc, kind)).collect();
    SectionRun {
        kind,
        section: Section::Ready(records),
        fetched,
        outside: outcome.outside,
        undated: outcome.undated,
    }
}

/// Run both sections and render the report.
pub fn run_report<S: PageSource + ?Sized>(
    source: &S,
    window: &TimeWindow,
    options: &RenderOptions,
) -> Result<RunOutput, AppError> {
    let orders = collect_section(source, DocumentKind::Order, window);
    let invoices = collect_section(source, DocumentKind::Invoice, window);

    if let (Section::Failed(order_err), Section::Failed(invoice_err)) = (&orders.section, &invoices.section) {
        return Err(AppError::upstream(format!(
            "Both listings failed; no report sent. {order_err}; {invoice_err}"
        )));
    }

    let report = build_report(&orders.section, &invoices.section, window, options);
    info!(
        orders = report.order_count,
        invoices = report.invoice_count,
        subject = %report.subject_line,
        "report rendered"
    );

    Ok(RunOutput {
        window: window.clone(),
        orders,
        invoices,
        report,
    })
}

/// Hand the rendered report to the notifier.
pub fn deliver(output: &RunOutput, notifier: &dyn Notifier) -> Result<RunStatus, AppError> {
    notifier.send(&OutgoingReport::from(&output.report))?;
    Ok(output.status())
}

/// Write the raw listings of the sections that were fetched, one file per kind.
pub fn dump_sections(output: &RunOutput, base: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::new();
    for section in [&output.orders, &output.invoices] {
        if section.section.is_failed() {
            continue;
        }
        let path = dump_path(base, section.kind);
        write_raw_json(&path, &section.fetched)?;
        info!(path = %path.display(), documents = section.fetched.len(), "raw documents written");
        written.push(path);
    }
    Ok(written)
}

/// Deliver, then write the optional dumps. A failed dump never holds back
/// the report; it surfaces as an I/O error after delivery.
pub fn publish(output: &RunOutput, notifier: &dyn Notifier, dump_base: Option<&Path>) -> Result<RunStatus, AppError> {
    let status = deliver(output, notifier)?;
    if let Some(base) = dump_base {
        dump_sections(output, base)?;
    }
    Ok(status)
}
