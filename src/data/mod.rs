//! Upstream data access.

pub mod holded;

pub use holded::{AuthMode, DocumentLookup, HoldedClient, Page, PageSource, fetch_documents, parse_page};
