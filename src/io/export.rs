//! Dump raw API documents to JSON.
//!
//! Useful when the report shows placeholders: the dump shows which field names
//! the account actually returns. The digest writes one array per document
//! kind; the reservation sheet writes one object per order.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::domain::{DocumentKind, RawDocument};
use crate::error::AppError;

/// Per-kind dump file next to `base`: `report.json` becomes `report_salesorder.json`.
pub fn dump_path(base: &Path, kind: DocumentKind) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "documents".to_string());
    base.with_file_name(format!("{stem}_{}.json", kind.endpoint()))
}

/// Per-order dump file next to `base`: `order.json` becomes `order_<id>.json`.
pub fn document_dump_path(base: &Path, id: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "order".to_string());
    let id: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    base.with_file_name(format!("{stem}_{id}.json"))
}

/// Write documents as a pretty-printed JSON array.
pub fn write_raw_json(path: &Path, docs: &[RawDocument]) -> Result<(), AppError> {
    let file = create(path)?;
    serde_json::to_writer_pretty(file, docs)
        .map_err(|e| AppError::io(format!("Failed to write JSON dump '{}': {e}", path.display())))
}

/// Write one document as a pretty-printed JSON object.
pub fn write_document_json(path: &Path, doc: &RawDocument) -> Result<(), AppError> {
    let file = create(path)?;
    serde_json::to_writer_pretty(file, doc)
        .map_err(|e| AppError::io(format!("Failed to write JSON dump '{}': {e}", path.display())))
}

fn create(path: &Path) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::io(format!("Failed to create JSON dump '{}': {e}", path.display())))
}
