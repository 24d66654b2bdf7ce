//! Report assembly: per-kind sections, totals and the mail subject.
//!
//! Rendering is a pure function of the two sections, the window and the
//! options, so re-running with the same upstream data produces byte-identical
//! output.

use rust_decimal::Decimal;

use crate::domain::{CanonicalRecord, DocumentKind, ReportResult, TimeWindow};

pub mod format;

pub use format::{escape_html, format_eur, format_eur_dp};

/// Renderer switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Show "no documents" text for empty sections instead of an empty table.
    pub empty_marker: bool,
    /// Caption the day as "AYER" (the default run) rather than by date only.
    pub yesterday: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            empty_marker: true,
            yesterday: true,
        }
    }
}

/// What one document kind contributes to the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Ready(Vec<CanonicalRecord>),
    /// The fetch failed; carries the error message.
    Failed(String),
}

impl Section {
    pub fn records(&self) -> &[CanonicalRecord] {
        match self {
            Section::Ready(records) => records,
            Section::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Section::Failed(_))
    }
}

/// Sum of record amounts.
pub fn total_amount(records: &[CanonicalRecord]) -> Decimal {
    records.iter().map(|r| r.total_amount).sum()
}

/// Stable sort by document date; same-instant rows keep fetch order.
pub fn sort_by_date(records: &mut [CanonicalRecord]) {
    records.sort_by_key(|r| r.document_date);
}

/// `Pedidos (n) y Facturas (m) — DD/MM/YYYY`
pub fn subject_line(order_count: usize, invoice_count: usize, window: &TimeWindow) -> String {
    format!(
        "{} ({order_count}) y {} ({invoice_count}) — {}",
        DocumentKind::Order.title(),
        DocumentKind::Invoice.title(),
        window.label()
    )
}

/// Render both sections into the final report.
pub fn build_report(
    orders: &Section,
    invoices: &Section,
    window: &TimeWindow,
    options: &RenderOptions,
) -> ReportResult {
    let mut order_rows = orders.records().to_vec();
    let mut invoice_rows = invoices.records().to_vec();
    sort_by_date(&mut order_rows);
    sort_by_date(&mut invoice_rows);

    let order_section = resolved(orders, order_rows);
    let invoice_section = resolved(invoices, invoice_rows);

    let html_body = [
        format::section_html(DocumentKind::Order, &order_section, window, options),
        format::section_html(DocumentKind::Invoice, &invoice_section, window, options),
    ]
    .join("<br><br>\n");

    let text_body = [
        format::section_text(DocumentKind::Order, &order_section, window, options),
        format::section_text(DocumentKind::Invoice, &invoice_section, window, options),
    ]
    .join("\n");

    let order_count = order_section.records().len();
    let invoice_count = invoice_section.records().len();

    ReportResult {
        order_count,
        invoice_count,
        order_total: total_amount(order_section.records()),
        invoice_total: total_amount(invoice_section.records()),
        subject_line: subject_line(order_count, invoice_count, window),
        html_body,
        text_body,
    }
}

fn resolved(section: &Section, sorted: Vec<CanonicalRecord>) -> Section {
    match section {
        Section::Ready(_) => Section::Ready(sorted),
        Section::Failed(msg) => Section::Failed(msg.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use chrono::{Duration, NaiveDate};
    use chrono_tz::Europe::Madrid;

    fn window() -> TimeWindow {
        TimeWindow::for_date(NaiveDate::from_ymd_opt(2025, 9, 14).unwrap(), Madrid)
    }

    fn record(id: &str, customer: &str, amount: &str, minutes: i64, kind: DocumentKind) -> CanonicalRecord {
        CanonicalRecord {
            identifier: id.to_string(),
            customer_name: customer.to_string(),
            total_amount: Decimal::from_str(amount).unwrap(),
            document_date: window().start + Duration::minutes(minutes),
            kind,
        }
    }

    #[test]
    fn two_orders_no_invoices() {
        let orders = Section::Ready(vec![
            record("SO-1", "Acme SL", "1000", 600, DocumentKind::Order),
            record("SO-2", "Solar Norte", "200", 700, DocumentKind::Order),
        ]);
        let invoices = Section::Ready(vec![]);

        let report = build_report(&orders, &invoices, &window(), &RenderOptions::default());

        assert_eq!(report.subject_line, "Pedidos (2) y Facturas (0) — 14/09/2025");
        assert_eq!(report.order_count, 2);
        assert_eq!(report.invoice_count, 0);
        assert_eq!(report.order_total, Decimal::from(1200));
        assert!(report.html_body.contains("Importe total: <b>1.200,00 €</b>"));
        assert!(report.html_body.contains("No hay facturas AYER (14/09/2025)."));
        assert_eq!(report.html_body.matches("<table").count(), 1);
    }

    #[test]
    fn empty_marker_can_be_disabled() {
        let options = RenderOptions {
            empty_marker: false,
            ..RenderOptions::default()
        };
        let report = build_report(&Section::Ready(vec![]), &Section::Ready(vec![]), &window(), &options);
        assert!(!report.html_body.contains("No hay"));
        assert_eq!(report.html_body.matches("<table").count(), 2);
        assert_eq!(report.html_body.matches("<tr>").count(), 2);
    }

    #[test]
    fn failed_section_is_flagged_not_empty() {
        let orders = Section::Failed("pedidos: request timed out (page 1)".to_string());
        let invoices = Section::Ready(vec![record("F-7", "Acme", "50", 30, DocumentKind::Invoice)]);

        let report = build_report(&orders, &invoices, &window(), &RenderOptions::default());

        assert_eq!(report.subject_line, "Pedidos (0) y Facturas (1) — 14/09/2025");
        assert!(report.html_body.contains("No se pudieron obtener los pedidos"));
        assert!(!report.html_body.contains("No hay pedidos"));
        assert!(report.html_body.contains("F-7"));
        assert!(report.text_body.contains("ERROR"));
    }

    #[test]
    fn rows_are_stably_sorted_by_date() {
        let orders = Section::Ready(vec![
            record("late", "A", "1", 900, DocumentKind::Order),
            record("tie-first", "B", "1", 60, DocumentKind::Order),
            record("tie-second", "C", "1", 60, DocumentKind::Order),
            record("early", "D", "1", 5, DocumentKind::Order),
        ]);
        let report = build_report(&orders, &Section::Ready(vec![]), &window(), &RenderOptions::default());
        let pos = |needle: &str| report.html_body.find(needle).unwrap();
        assert!(pos("early") < pos("tie-first"));
        assert!(pos("tie-first") < pos("tie-second"));
        assert!(pos("tie-second") < pos("late"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let orders = Section::Ready(vec![record("SO-1", "Acme <SL>", "12.5", 1, DocumentKind::Order)]);
        let invoices = Section::Ready(vec![record("F-1", "Pepa", "3", 2, DocumentKind::Invoice)]);
        let a = build_report(&orders, &invoices, &window(), &RenderOptions::default());
        let b = build_report(&orders, &invoices, &window(), &RenderOptions::default());
        assert_eq!(a, b);
        assert!(a.html_body.contains("Acme &lt;SL&gt;"));
    }

    #[test]
    fn explicit_date_caption() {
        let options = RenderOptions {
            yesterday: false,
            ..RenderOptions::default()
        };
        let report = build_report(&Section::Ready(vec![]), &Section::Ready(vec![]), &window(), &options);
        assert!(!report.html_body.contains("AYER"));
        assert!(report.html_body.contains("No hay pedidos el 14/09/2025."));
    }
}
