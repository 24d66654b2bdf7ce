//! Plain data passed between the fetch, filter, normalize and render steps:
//!
//! - the document selector (`DocumentKind`)
//! - the reporting day and look-back ranges (`TimeWindow`, `InstantRange`)
//! - raw and dated API documents (`RawDocument`, `DatedDocument`)
//! - normalized rows and the final report (`CanonicalRecord`, `ReportResult`)

pub mod types;

pub use types::*;
