//! Catalogue facts the reservation sheet needs per line: module power and
//! pallet size.
//!
//! Products carry these under inconsistent names, either flat on the product,
//! inside `attributes`, or inside `customFields` (a map, or a list of
//! `{ field, value }` entries). When no attribute is set, power is read from
//! the item name/SKU and pallet size is inferred from the ordered quantity.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use crate::domain::RawDocument;
use crate::io::normalize::parse_amount;

pub const POWER_FIELDS: [&str; 6] = ["power_w", "Potencia", "potencia_w", "power", "watt", "W"];

pub const UNITS_PER_PALLET_FIELDS: [&str; 6] = [
    "units_per_pallet",
    "unitsPerPallet",
    "pallet_units",
    "ud_pallet",
    "uds_pallet",
    "unitsPallet",
];

/// Plausible pallet sizes, in order of preference.
pub const PACK_SIZES: [u64; 5] = [36, 37, 35, 31, 30];

/// Pallet size used to break ties between several exact divisors.
const PREFERRED_PACK: u64 = 36;

/// Plausible module power range when reading it from free text.
const MIN_WATTS: u32 = 300;
const MAX_WATTS: u32 = 1000;

/// Known models whose pallet size is fixed.
static PACK_RULES: LazyLock<Vec<(Regex, u64)>> = LazyLock::new(|| {
    [(r"(?i)AIKO.*MAH72M", 36), (r"(?i)AIKO.*\b605\b", 36)]
        .into_iter()
        .map(|(pattern, size)| (Regex::new(pattern).expect("BUG: invalid pack rule regex literal"), size))
        .collect()
});

static WATTS_SUFFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*[Ww]").expect("BUG: invalid WATTS_SUFFIXED regex literal"));

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("BUG: invalid DIGIT_RUN regex literal"));

/// First non-empty value for any of `keys`, looking flat, then in
/// `attributes`, then in `customFields`.
pub fn product_field<'a>(product: &'a RawDocument, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let flat = product.get(*key);
        let attribute = product
            .get("attributes")
            .and_then(Value::as_object)
            .and_then(|attrs| attrs.get(*key));
        let custom = match product.get("customFields") {
            Some(Value::Object(fields)) => fields.get(*key),
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(Value::as_object)
                .find(|entry| entry.get("field").and_then(Value::as_str) == Some(*key))
                .and_then(|entry| entry.get("value")),
            _ => None,
        };
        [flat, attribute, custom].into_iter().flatten().find(|v| !is_blank(v))
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn product_text(product: &RawDocument, key: &str) -> String {
    match product_field(product, &[key]) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Module power in watts.
///
/// A power attribute wins; otherwise the largest `NNN W` figure in the item
/// name, item SKU, product name or product SKU; otherwise the largest bare
/// 3-4 digit number in the same texts. Text figures outside 300..=1000 W are
/// ignored.
pub fn power_watts(product: &RawDocument, item_name: &str, item_sku: &str) -> Option<Decimal> {
    if let Some(watts) = product_field(product, &POWER_FIELDS)
        .and_then(parse_amount)
        .filter(|w| *w > Decimal::ZERO)
    {
        return Some(watts);
    }

    let texts = [
        item_name.to_string(),
        item_sku.to_string(),
        product_text(product, "name"),
        product_text(product, "sku"),
    ];

    let suffixed = texts.iter().find_map(|text| {
        WATTS_SUFFIXED
            .captures_iter(text)
            .filter_map(|caps| plausible_watts(caps.get(1)?.as_str()))
            .max()
    });
    if let Some(watts) = suffixed {
        return Some(Decimal::from(watts));
    }

    texts
        .iter()
        .flat_map(|text| DIGIT_RUN.find_iter(text).filter_map(|m| plausible_watts(m.as_str())))
        .max()
        .map(Decimal::from)
}

fn plausible_watts(digits: &str) -> Option<u32> {
    if !(3..=4).contains(&digits.len()) {
        return None;
    }
    digits
        .parse::<u32>()
        .ok()
        .filter(|w| (MIN_WATTS..=MAX_WATTS).contains(w))
}

/// Where a pallet size came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackSource {
    Attribute,
    ModelRule,
    /// Exactly one plausible size divides the quantity.
    Divisible,
    /// Several sizes divide the quantity; the preferred one was taken.
    AmbiguousDivisible,
    /// Nothing divides; the size leaving the fewest units over was taken.
    Closest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletEstimate {
    pub units_per_pallet: u64,
    pub source: PackSource,
    /// Other sizes that would also have divided the quantity.
    pub alternatives: Vec<u64>,
    /// Units that don't fill a last pallet.
    pub leftover: u64,
}

impl PalletEstimate {
    fn new(units_per_pallet: u64, source: PackSource, qty: u64) -> Self {
        Self {
            units_per_pallet,
            source,
            alternatives: Vec::new(),
            leftover: qty % units_per_pallet,
        }
    }

    /// Pallets needed for `qty` units, counting a partial last pallet.
    pub fn pallets(&self, qty: u64) -> u64 {
        qty.div_ceil(self.units_per_pallet)
    }

    /// `"3"`, or `"3 (+12)"` when the last pallet is partial.
    pub fn display(&self, qty: u64) -> String {
        let pallets = self.pallets(qty);
        if self.leftover > 0 {
            format!("{pallets} (+{})", self.leftover)
        } else {
            pallets.to_string()
        }
    }
}

/// Units per pallet for a line of `qty` units, if it can be told.
pub fn infer_units_per_pallet(product: &RawDocument, name: &str, sku: &str, qty: u64) -> Option<PalletEstimate> {
    let attribute = product_field(product, &UNITS_PER_PALLET_FIELDS)
        .and_then(parse_amount)
        .and_then(|d| d.trunc().to_u64())
        .filter(|n| *n > 0);
    if let Some(size) = attribute {
        return Some(PalletEstimate::new(size, PackSource::Attribute, qty));
    }

    let text = [name.to_string(), sku.to_string(), product_text(product, "name"), product_text(product, "sku")].join(" ");
    if let Some((_, size)) = PACK_RULES.iter().find(|(re, _)| re.is_match(&text)) {
        return Some(PalletEstimate::new(*size, PackSource::ModelRule, qty));
    }

    if qty == 0 {
        return None;
    }

    let exact: Vec<u64> = PACK_SIZES.iter().copied().filter(|size| qty % size == 0).collect();
    match exact.as_slice() {
        [only] => return Some(PalletEstimate::new(*only, PackSource::Divisible, qty)),
        [] => {}
        several => {
            let preferred = if several.contains(&PREFERRED_PACK) {
                PREFERRED_PACK
            } else {
                several.iter().copied().max().unwrap_or(PREFERRED_PACK)
            };
            return Some(PalletEstimate {
                alternatives: several.iter().copied().filter(|s| *s != preferred).collect(),
                ..PalletEstimate::new(preferred, PackSource::AmbiguousDivisible, qty)
            });
        }
    }

    // Fewest units over; the bigger pallet on ties.
    PACK_SIZES
        .iter()
        .copied()
        .min_by_key(|size| (qty % size, std::cmp::Reverse(*size)))
        .map(|size| PalletEstimate::new(size, PackSource::Closest, qty))
}
