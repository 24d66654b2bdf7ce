//! Material reservation sheets (`digest reserve`).
//!
//! For one sales order (by id) or the latest orders of the last N minutes,
//! list the materials to reserve with power, pallet count and price per watt.
//! Each sheet is printed and can be mailed and dumped.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::cli::Selection;
use crate::data::{DocumentLookup, PageSource, fetch_documents};
use crate::domain::{DocumentKind, InstantRange, RawDocument};
use crate::error::AppError;
use crate::io::{document_dump_path, write_document_json};
use crate::notify::Notifier;
use crate::window::filter::document_date;

pub mod product;
pub mod sheet;

pub use sheet::{ReservationRow, ReservationSheet, build_sheet};

/// Product lookups for one run; each product is fetched at most once.
pub struct Catalog<'a, S: DocumentLookup + ?Sized> {
    source: &'a S,
    products: HashMap<String, RawDocument>,
}

impl<'a, S: DocumentLookup + ?Sized> Catalog<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            products: HashMap::new(),
        }
    }

    /// The product, or an empty document if it can't be fetched.
    pub fn product(&mut self, id: &str) -> RawDocument {
        if let Some(product) = self.products.get(id) {
            return product.clone();
        }
        let product = self.source.product(id).unwrap_or_else(|err| {
            warn!(product = id, error = %err, "product lookup failed; falling back to line text");
            RawDocument::new()
        });
        self.products.insert(id.to_string(), product.clone());
        product
    }
}

/// The orders a reservation run covers.
///
/// `Recent` lists the orders dated in the last `minutes` before `now` and
/// keeps the `limit` newest; undated orders sort last.
pub fn select_orders<S>(source: &S, selection: &Selection, tz: Tz, now: DateTime<Utc>) -> Result<Vec<RawDocument>, AppError>
where
    S: PageSource + DocumentLookup + ?Sized,
{
    match selection {
        Selection::ById(id) => Ok(vec![source.sales_order(id)?]),
        Selection::Recent { minutes, limit } => {
            let range = InstantRange::last_minutes(now, *minutes);
            let mut orders = fetch_documents(source, DocumentKind::Order, &range)?;
            orders.sort_by_key(|doc| std::cmp::Reverse(document_date(doc, tz)));
            orders.truncate(*limit);
            Ok(orders)
        }
    }
}

/// One sheet per order, sharing a product cache.
pub fn build_sheets<S: DocumentLookup + ?Sized>(source: &S, orders: &[RawDocument], tz: Tz) -> Vec<ReservationSheet> {
    let mut catalog = Catalog::new(source);
    orders.iter().map(|doc| build_sheet(doc, &mut catalog, tz)).collect()
}

/// Mail the sheet (when a notifier is given), then dump the raw order.
pub fn publish(
    sheet: &ReservationSheet,
    order: &RawDocument,
    notifier: Option<&dyn Notifier>,
    dump_base: Option<&Path>,
) -> Result<(), AppError> {
    if let Some(notifier) = notifier {
        notifier.send(&sheet.to_outgoing()?)?;
        info!(order = %sheet.order_number, lines = sheet.rows.len(), "reservation sheet sent");
    }
    if let Some(base) = dump_base {
        let path = document_dump_path(base, &sheet.order_id);
        write_document_json(&path, order)?;
        info!(path = %path.display(), "raw order written");
    }
    Ok(())
}
