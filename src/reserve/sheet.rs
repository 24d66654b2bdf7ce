//! One sales order turned into a material reservation sheet.
//!
//! Every non-transport line of the order becomes a row with its module power,
//! pallet count and price per watt. Transport lines are summed separately and
//! shown once per order.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use handlebars::Handlebars;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use super::Catalog;
use super::product::{infer_units_per_pallet, power_watts};
use crate::data::DocumentLookup;
use crate::domain::RawDocument;
use crate::error::AppError;
use crate::io::normalize::{extract_customer, extract_identifier, parse_amount};
use crate::notify::OutgoingReport;
use crate::report::{format_eur, format_eur_dp};
use crate::window::filter::{DATE_FIELDS, document_date};

pub const HEADERS: [&str; 8] = [
    "Fecha reserva",
    "Material",
    "Potencia (W)",
    "Cantidad uds",
    "Nº Pallets",
    "Cliente",
    "Precio €/W",
    "Transporte",
];

const RIGHT_ALIGNED: [bool; 8] = [false, false, true, true, true, false, true, true];

const NOT_AVAILABLE: &str = "-";
const TRANSPORT: &str = "transporte";

/// Decimals shown for the price per watt.
const PRICE_PER_WATT_DP: u32 = 4;

const SHEET_TEMPLATE: &str = r#"<div style="font-family:system-ui,Segoe UI,Roboto,Arial,sans-serif">
  <h3 style="margin:0 0 8px">Reserva de material — Pedido {{number}}</h3>
  <p style="margin:0 0 10px">Cliente: <b>{{customer}}</b> &nbsp;|&nbsp; Fecha: <b>{{reserved_at}}</b> &nbsp;|&nbsp; Transporte: <b>{{transport}}</b></p>
  <table border="1" cellspacing="0" cellpadding="6" style="border-collapse:collapse">
    <thead><tr>{{#each headers}}<th>{{this}}</th>{{/each}}</tr></thead>
    <tbody>
{{#each rows}}      <tr>{{#each this}}<td{{#if right}} style="text-align:right"{{/if}}>{{text}}</td>{{/each}}</tr>
{{else}}      <tr><td colspan="8">Sin líneas</td></tr>
{{/each}}    </tbody>
  </table>
</div>"#;

/// One entry of the order's `products` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub name: String,
    pub sku: String,
    pub units: Decimal,
    pub price: Decimal,
    pub product_id: Option<String>,
    pub is_transport: bool,
}

impl OrderLine {
    pub fn amount(&self) -> Decimal {
        self.price * self.units
    }
}

/// Lines of an order, in document order. Non-object entries are skipped.
pub fn order_lines(doc: &RawDocument) -> Vec<OrderLine> {
    let Some(Value::Array(items)) = doc.get("products") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| {
            let name = text(item.get("name")).unwrap_or_default();
            let tagged = match item.get("tags") {
                Some(Value::Array(tags)) => tags
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|tag| tag.trim().eq_ignore_ascii_case(TRANSPORT)),
                _ => false,
            };
            OrderLine {
                is_transport: tagged || name.to_lowercase().contains(TRANSPORT),
                sku: text(item.get("sku")).unwrap_or_default(),
                units: item.get("units").and_then(parse_amount).unwrap_or(Decimal::ZERO),
                price: item.get("price").and_then(parse_amount).unwrap_or(Decimal::ZERO),
                product_id: text(item.get("productId")),
                name,
            }
        })
        .collect()
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Sum of the transport lines, `None` when the order has none.
pub fn transport_total(lines: &[OrderLine]) -> Option<Decimal> {
    let transport: Vec<&OrderLine> = lines.iter().filter(|l| l.is_transport).collect();
    (!transport.is_empty()).then(|| transport.iter().map(|l| l.amount()).sum())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRow {
    pub reserved_at: String,
    pub material: String,
    pub power_w: Option<Decimal>,
    pub units: Decimal,
    /// e.g. `"3 (+8)"`.
    pub pallets: Option<String>,
    pub customer: String,
    pub price_per_watt: Option<Decimal>,
    pub transport: Option<Decimal>,
}

impl ReservationRow {
    /// Display text per column, in `HEADERS` order.
    pub fn cells(&self) -> [String; 8] {
        [
            self.reserved_at.clone(),
            self.material.clone(),
            self.power_w
                .map(|w| w.trunc().to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            self.units.trunc().to_string(),
            self.pallets.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            self.customer.clone(),
            self.price_per_watt
                .map(|p| format_eur_dp(p, PRICE_PER_WATT_DP))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            money_or_dash(self.transport),
        ]
    }
}

fn money_or_dash(amount: Option<Decimal>) -> String {
    amount.map(format_eur).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationSheet {
    /// Internal document id (`_id`/`id`), used to name dumps.
    pub order_id: String,
    pub order_number: String,
    pub customer: String,
    pub reserved_at: String,
    pub transport: Option<Decimal>,
    pub rows: Vec<ReservationRow>,
}

/// Build the sheet for one order, looking products up through `catalog`.
pub fn build_sheet<S: DocumentLookup + ?Sized>(doc: &RawDocument, catalog: &mut Catalog<'_, S>, tz: Tz) -> ReservationSheet {
    let lines = order_lines(doc);
    let transport = transport_total(&lines);
    let customer = extract_customer(doc);
    let reserved_at = reservation_date(doc, tz);

    let rows = lines
        .iter()
        .filter(|line| !line.is_transport)
        .map(|line| {
            let product = match &line.product_id {
                Some(id) => catalog.product(id),
                None => RawDocument::new(),
            };
            let material = if line.name.is_empty() { NOT_AVAILABLE.to_string() } else { line.name.clone() };
            let power_w = power_watts(&product, &material, &line.sku);
            let whole_units = line.units.trunc().to_u64().unwrap_or(0);
            let pallets = (whole_units > 0)
                .then(|| infer_units_per_pallet(&product, &material, &line.sku, whole_units))
                .flatten()
                .map(|estimate| estimate.display(whole_units));
            let price_per_watt = power_w
                .map(|w| w * line.units)
                .filter(|watts| !watts.is_zero())
                .and_then(|watts| line.amount().checked_div(watts));

            ReservationRow {
                reserved_at: reserved_at.clone(),
                material,
                power_w,
                units: line.units,
                pallets,
                customer: customer.clone(),
                price_per_watt,
                transport,
            }
        })
        .collect();

    ReservationSheet {
        order_id: order_id(doc),
        order_number: extract_identifier(doc),
        customer,
        reserved_at,
        transport,
        rows,
    }
}

fn order_id(doc: &RawDocument) -> String {
    ["_id", "id"]
        .iter()
        .find_map(|key| text(doc.get(*key)))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Local `YYYY-MM-DD HH:MM:SS` of the order date, the raw value if it can't be
/// parsed, or `-`.
fn reservation_date(doc: &RawDocument, tz: Tz) -> String {
    if let Some(date) = document_date(doc, tz) {
        return local_timestamp(date, tz);
    }
    DATE_FIELDS
        .iter()
        .find_map(|field| text(doc.get(*field)))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn local_timestamp(date: DateTime<Utc>, tz: Tz) -> String {
    date.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

impl ReservationSheet {
    pub fn subject(&self) -> String {
        format!("Reserva de material — Pedido {}", self.order_number)
    }

    /// Mail body; every value is HTML-escaped by the template engine.
    pub fn render_html(&self) -> Result<String, AppError> {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let cells: Vec<Value> = row
                    .cells()
                    .into_iter()
                    .zip(RIGHT_ALIGNED)
                    .map(|(text, right)| json!({ "text": text, "right": right }))
                    .collect();
                Value::Array(cells)
            })
            .collect();
        let context = json!({
            "number": self.order_number,
            "customer": self.customer,
            "reserved_at": self.reserved_at,
            "transport": money_or_dash(self.transport),
            "headers": HEADERS,
            "rows": rows,
        });
        Handlebars::new()
            .render_template(SHEET_TEMPLATE, &context)
            .map_err(|e| AppError::io(format!("Failed to render reservation sheet: {e}")))
    }

    /// Console table.
    pub fn render_text(&self) -> String {
        let mut out = format!("=== Pedido {} (id: {}) ===\n", self.order_number, self.order_id);
        if self.rows.is_empty() {
            out.push_str("No hay líneas que mostrar.\n");
            return out;
        }

        let cells: Vec<[String; 8]> = self.rows.iter().map(ReservationRow::cells).collect();
        let widths: Vec<usize> = HEADERS
            .iter()
            .enumerate()
            .map(|(i, header)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |values: Vec<&str>| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(value, &width)| format!("{value:<width$}"))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        out.push_str(&line(HEADERS.to_vec()));
        out.push('\n');
        out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
        out.push('\n');
        for row in &cells {
            out.push_str(&line(row.iter().map(String::as_str).collect()));
            out.push('\n');
        }
        out
    }

    pub fn to_outgoing(&self) -> Result<OutgoingReport, AppError> {
        Ok(OutgoingReport {
            subject: self.subject(),
            html_body: self.render_html()?,
            text_body: self.render_text(),
        })
    }
}
