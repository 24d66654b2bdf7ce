//! Spanish money notation and the two renderings of a digest section.
//!
//! Every user-visible string of the daily digest is built here: headings,
//! empty and failure notices, table rows, and the console lines.

use rust_decimal::{Decimal, RoundingStrategy};

use super::{RenderOptions, Section, total_amount};
use crate::domain::{CanonicalRecord, DocumentKind, TimeWindow};

const FONT_STACK: &str = "system-ui,Segoe UI,Roboto,Arial,sans-serif";
const RULE_WIDTH: usize = 60;

/// Spanish euro notation: `1.200,00 €`, `-15,20 €`.
pub fn format_eur(amount: Decimal) -> String {
    format_eur_dp(amount, 2)
}

/// Same notation with `dp` decimals, e.g. `0,1523 €` for a price per watt.
pub fn format_eur_dp(amount: Decimal, dp: u32) -> String {
    let rounded = amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let plain = format!("{:.*}", dp as usize, rounded.abs());
    match plain.split_once('.') {
        Some((int_part, frac_part)) => format!("{sign}{},{frac_part} €", group_thousands(int_part)),
        None => format!("{sign}{} €", group_thousands(&plain)),
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Escape document-derived text for element content or quoted attributes.
pub fn escape_html(s: &str) -> String {
    handlebars::html_escape(s)
}

fn heading(kind: DocumentKind, window: &TimeWindow, options: &RenderOptions) -> String {
    if options.yesterday {
        format!("{} de AYER — {}", kind.title(), window.label())
    } else {
        format!("{} del {}", kind.title(), window.label())
    }
}

fn empty_marker(kind: DocumentKind, window: &TimeWindow, options: &RenderOptions) -> String {
    if options.yesterday {
        format!("No hay {} AYER ({}).", kind.noun(), window.label())
    } else {
        format!("No hay {} el {}.", kind.noun(), window.label())
    }
}

fn failure_notice(kind: DocumentKind, error: &str) -> String {
    format!("No se pudieron obtener los {}: {error}", kind.noun())
}

/// HTML block for one section.
pub fn section_html(kind: DocumentKind, section: &Section, window: &TimeWindow, options: &RenderOptions) -> String {
    let records = match section {
        Section::Failed(error) => {
            return format!(
                "<div style=\"font-family:{FONT_STACK}\">\n  <h3 style=\"margin:0 0 8px\">{}</h3>\n  <p style=\"margin:0;color:#b00020\"><b>{}</b></p>\n</div>",
                escape_html(&heading(kind, window, options)),
                escape_html(&failure_notice(kind, error)),
            );
        }
        Section::Ready(records) => records,
    };

    if records.is_empty() && options.empty_marker {
        return format!(
            "<div style=\"font-family:{FONT_STACK}\">\n  <p>{}</p>\n</div>",
            escape_html(&empty_marker(kind, window, options))
        );
    }

    let rows: Vec<String> = records.iter().map(|r| row_html(r, window)).collect();

    let mut out = String::new();
    out.push_str(&format!("<div style=\"font-family:{FONT_STACK}\">\n"));
    out.push_str(&format!(
        "  <h3 style=\"margin:0 0 8px\">{}</h3>\n",
        escape_html(&heading(kind, window, options))
    ));
    out.push_str(&format!(
        "  <p style=\"margin:0 0 12px\">Total {}: <b>{}</b> &nbsp;|&nbsp; Importe total: <b>{}</b></p>\n",
        kind.noun(),
        records.len(),
        format_eur(total_amount(records)),
    ));
    out.push_str("  <table border=\"1\" cellspacing=\"0\" cellpadding=\"6\" style=\"border-collapse:collapse\">\n");
    out.push_str("    <thead><tr><th>Nº</th><th>Cliente</th><th>Total</th><th>Fecha</th></tr></thead>\n");
    out.push_str("    <tbody>");
    if !rows.is_empty() {
        out.push('\n');
        out.push_str(&rows.join("\n"));
        out.push_str("\n    ");
    }
    out.push_str("</tbody>\n");
    out.push_str("  </table>\n");
    out.push_str("</div>");
    out
}

fn row_html(record: &CanonicalRecord, window: &TimeWindow) -> String {
    format!(
        "      <tr><td style=\"white-space:nowrap\">{}</td><td>{}</td><td style=\"text-align:right\">{}</td><td style=\"white-space:nowrap\">{}</td></tr>",
        escape_html(&record.identifier),
        escape_html(&record.customer_name),
        format_eur(record.total_amount),
        window.local_timestamp(record.document_date),
    )
}

/// Plain-text block for one section (console summary and mail alternative).
pub fn section_text(kind: DocumentKind, section: &Section, window: &TimeWindow, options: &RenderOptions) -> String {
    let title = if options.yesterday {
        format!("{} de AYER ({})", kind.title(), window.label())
    } else {
        format!("{} del {}", kind.title(), window.label())
    };

    let records = match section {
        Section::Failed(error) => return format!("{title}: ERROR\n{}\n", failure_notice(kind, error)),
        Section::Ready(records) => records,
    };

    let mut out = format!("{title}: {}\n\n", records.len());
    for r in records {
        out.push_str(&format!(
            "{:>12} | {} | {:>12} | {}\n",
            r.identifier,
            r.customer_name,
            format_eur(r.total_amount),
            window.local_timestamp(r.document_date),
        ));
    }
    let rule = "-".repeat(RULE_WIDTH);
    let day = if options.yesterday { "TOTAL del día (AYER)" } else { "TOTAL del día" };
    out.push_str(&format!("\n{rule}\n{day}: {}\n{rule}\n", format_eur(total_amount(records))));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn eur_uses_spanish_separators() {
        assert_eq!(format_eur(dec("1200")), "1.200,00 €");
        assert_eq!(format_eur(dec("0")), "0,00 €");
        assert_eq!(format_eur(dec("999.999")), "1.000,00 €");
        assert_eq!(format_eur(dec("1234567.8")), "1.234.567,80 €");
        assert_eq!(format_eur(dec("-15.2")), "-15,20 €");
        assert_eq!(format_eur(dec("-0.001")), "0,00 €");
        assert_eq!(format_eur(dec("100")), "100,00 €");
    }

    #[test]
    fn eur_round_trips_through_locale_punctuation() {
        for raw in ["0.01", "12.34", "1000", "98765.43", "-4321.09", "1000000.5"] {
            let value = dec(raw);
            let text = format_eur(value);
            let back = text.trim_end_matches(" €").replace('.', "").replace(',', ".");
            assert_eq!(dec(&back), value.round_dp(2), "{raw} -> {text}");
        }
    }

    #[test]
    fn eur_with_four_decimals() {
        assert_eq!(format_eur_dp(dec("0.15234"), 4), "0,1523 €");
        assert_eq!(format_eur_dp(dec("1234.5"), 4), "1.234,5000 €");
        assert_eq!(format_eur_dp(dec("7.4"), 0), "7 €");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("A & B <x> \"q\" 'y'"), "A &amp; B &lt;x&gt; &quot;q&quot; &#x27;y&#x27;");
    }
}
