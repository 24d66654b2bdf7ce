//! `sales-digest` library crate.
//!
//! `digest` only parses arguments and maps the outcome to an exit code; the
//! digest and reservation flows live here. The Holded API and the mailer are
//! reached through traits (`PageSource`, `DocumentLookup`, `Notifier`), which
//! the tests replace with in-memory fakes.

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod notify;
pub mod report;
pub mod reserve;
pub mod window;
