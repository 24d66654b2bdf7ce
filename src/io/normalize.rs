//! Field extraction from heterogeneous API documents.
//!
//! Orders and invoices don't share a schema, and field names drift between API
//! versions and account configurations. Each display field is therefore read
//! from a prioritized list of candidate keys, with a fixed fallback when none
//! of them is present. Normalization never fails: the worst case is a row with
//! placeholders and a zero amount.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::domain::{CanonicalRecord, DatedDocument, DocumentKind, RawDocument};

/// Identifier candidates, highest priority first.
pub const IDENTIFIER_FIELDS: [&str; 6] = ["number", "docNumber", "code", "serial", "_id", "id"];

/// Customer name candidates; each entry is a path into nested objects.
pub const CUSTOMER_FIELDS: [&[&str]; 4] = [
    &["customer", "name"],
    &["contactName"],
    &["customerName"],
    &["contact", "name"],
];

/// Amount candidates, highest priority first.
pub const AMOUNT_FIELDS: [&str; 3] = ["total", "totalAmount", "amount"];

pub const MISSING_IDENTIFIER: &str = "—";
pub const MISSING_CUSTOMER: &str = "Sin nombre";

/// Euro minor unit.
pub const AMOUNT_SCALE: u32 = 2;

/// Map one dated document to its display record.
pub fn normalize(doc: &DatedDocument, kind: DocumentKind) -> CanonicalRecord {
    let raw = &doc.raw;
    CanonicalRecord {
        identifier: extract_identifier(raw),
        customer_name: extract_customer(raw),
        total_amount: extract_amount(raw),
        document_date: doc.date,
        kind,
    }
}

pub fn extract_identifier(raw: &RawDocument) -> String {
    IDENTIFIER_FIELDS
        .iter()
        .find_map(|key| raw.get(*key).and_then(text_value))
        .unwrap_or_else(|| MISSING_IDENTIFIER.to_string())
}

pub fn extract_customer(raw: &RawDocument) -> String {
    CUSTOMER_FIELDS
        .iter()
        .find_map(|path| lookup(raw, path).and_then(text_value))
        .unwrap_or_else(|| MISSING_CUSTOMER.to_string())
}

/// First candidate that coerces to a number, rounded to cents; zero otherwise.
pub fn extract_amount(raw: &RawDocument) -> Decimal {
    AMOUNT_FIELDS
        .iter()
        .find_map(|key| raw.get(*key).and_then(parse_amount))
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Coerce a JSON number or numeric string to a decimal.
///
/// Strings may carry a trailing `€` and may use Spanish (`1.200,50`) or
/// English (`1,200.50`) grouping as well as plain `1200.50`. Malformed
/// grouping such as `1,2.5` is rejected.
pub fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(Decimal::from(i));
            }
            Decimal::from_str(&n.to_string())
                .ok()
                .or_else(|| n.as_f64().and_then(Decimal::from_f64))
        }
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

fn parse_amount_str(s: &str) -> Option<Decimal> {
    let s = s.trim().trim_end_matches('€').trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = Decimal::from_str(s) {
        return Some(d);
    }

    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest.trim_start()),
        None => ("", s.strip_prefix('+').unwrap_or(s).trim_start()),
    };

    // With both separators the last one is the decimal point. A lone comma is
    // the Spanish decimal comma; a repeated one can only be grouping.
    let (decimal_sep, group_sep) = match (body.rfind(','), body.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => (Some(','), '.'),
        (Some(_), Some(_)) => (Some('.'), ','),
        (Some(_), None) if body.matches(',').count() == 1 => (Some(','), '.'),
        (Some(_), None) => (None, ','),
        (None, Some(_)) => (None, '.'),
        (None, None) => return None,
    };

    let (int_part, frac_part) = match decimal_sep {
        Some(sep) => body.rsplit_once(sep)?,
        None => (body, ""),
    };
    if decimal_sep.is_some() && !is_digits(frac_part) {
        return None;
    }
    let int_digits = ungroup(int_part, group_sep)?;

    let plain = if frac_part.is_empty() {
        format!("{sign}{int_digits}")
    } else {
        format!("{sign}{int_digits}.{frac_part}")
    };
    Decimal::from_str(&plain).ok()
}

/// Strip thousands separators, rejecting anything that isn't `d{1,3}(sep ddd)*`.
fn ungroup(int_part: &str, sep: char) -> Option<String> {
    if !int_part.contains(sep) {
        return is_digits(int_part).then(|| int_part.to_string());
    }
    let mut groups = int_part.split(sep);
    let head = groups.next()?;
    if !is_digits(head) || head.len() > 3 {
        return None;
    }
    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 || !is_digits(group) {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn lookup<'a>(raw: &'a RawDocument, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = raw.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn raw(value: Value) -> RawDocument {
        value.as_object().cloned().unwrap()
    }

    fn dated(value: Value) -> DatedDocument {
        DatedDocument {
            date: DateTime::<Utc>::from_timestamp(1_757_836_800, 0).unwrap(),
            raw: raw(value),
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn identifier_uses_doc_number_when_number_missing() {
        let record = normalize(&dated(json!({ "docNumber": "SO-0042", "code": "X" })), DocumentKind::Order);
        assert_eq!(record.identifier, "SO-0042");
    }

    #[test]
    fn identifier_walks_the_whole_candidate_list() {
        assert_eq!(extract_identifier(&raw(json!({ "number": "", "serial": "S-9" }))), "S-9");
        assert_eq!(extract_identifier(&raw(json!({ "number": null, "_id": "64ab" }))), "64ab");
        assert_eq!(extract_identifier(&raw(json!({ "id": 1234 }))), "1234");
        assert_eq!(extract_identifier(&raw(json!({ "number": ["odd"] }))), MISSING_IDENTIFIER);
        assert_eq!(extract_identifier(&raw(json!({}))), MISSING_IDENTIFIER);
    }

    #[test]
    fn customer_prefers_nested_name() {
        let doc = raw(json!({ "customer": { "name": "Acme SL" }, "contactName": "Other" }));
        assert_eq!(extract_customer(&doc), "Acme SL");
        let doc = raw(json!({ "customer": { "id": 1 }, "contactName": "Solar Norte" }));
        assert_eq!(extract_customer(&doc), "Solar Norte");
        let doc = raw(json!({ "customer": "not-an-object", "contact": { "name": "Pepa" } }));
        assert_eq!(extract_customer(&doc), "Pepa");
        assert_eq!(extract_customer(&raw(json!({}))), MISSING_CUSTOMER);
    }

    #[test]
    fn amounts_coerce_numbers_and_strings() {
        assert_eq!(extract_amount(&raw(json!({ "total": 1200 }))), dec("1200"));
        assert_eq!(extract_amount(&raw(json!({ "total": 99.995 }))), dec("100.00"));
        assert_eq!(extract_amount(&raw(json!({ "total": "1250.5" }))), dec("1250.50"));
        assert_eq!(extract_amount(&raw(json!({ "total": "1.200,50 €" }))), dec("1200.50"));
        assert_eq!(extract_amount(&raw(json!({ "total": "-15,2" }))), dec("-15.20"));
        assert_eq!(extract_amount(&raw(json!({ "totalAmount": 7.1 }))), dec("7.10"));
    }

    #[test]
    fn amounts_accept_either_grouping_convention() {
        assert_eq!(parse_amount(&json!("1,200.50")), Some(dec("1200.50")));
        assert_eq!(parse_amount(&json!("1.200,50")), Some(dec("1200.50")));
        assert_eq!(parse_amount(&json!("12,345,678.9")), Some(dec("12345678.9")));
        assert_eq!(parse_amount(&json!("12.345.678,9 €")), Some(dec("12345678.9")));
        assert_eq!(parse_amount(&json!("1.200.000")), Some(dec("1200000")));
        assert_eq!(parse_amount(&json!("- 1,200.50")), Some(dec("-1200.50")));
        assert_eq!(extract_amount(&raw(json!({ "total": "1,200.50" }))), dec("1200.50"));
    }

    #[test]
    fn malformed_grouping_is_not_an_amount() {
        assert_eq!(parse_amount(&json!("1,2.5")), None);
        assert_eq!(parse_amount(&json!("1.20,5.0")), None);
        assert_eq!(parse_amount(&json!("1234,567.8")), None);
        assert_eq!(parse_amount(&json!("12,")), None);
        assert_eq!(extract_amount(&raw(json!({ "total": "1,2.5" }))), Decimal::ZERO);
    }

    #[test]
    fn unparseable_amount_defaults_to_zero() {
        assert_eq!(extract_amount(&raw(json!({ "total": "n/a" }))), Decimal::ZERO);
        assert_eq!(extract_amount(&raw(json!({ "total": null }))), Decimal::ZERO);
        assert_eq!(extract_amount(&raw(json!({}))), Decimal::ZERO);
    }

    #[test]
    fn malformed_document_still_normalizes() {
        let record = normalize(
            &dated(json!({ "number": { "nested": true }, "customer": [], "total": {} })),
            DocumentKind::Invoice,
        );
        assert_eq!(record.identifier, MISSING_IDENTIFIER);
        assert_eq!(record.customer_name, MISSING_CUSTOMER);
        assert_eq!(record.total_amount, Decimal::ZERO);
        assert_eq!(record.kind, DocumentKind::Invoice);
    }
}
