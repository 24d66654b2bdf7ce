//! Command-line parsing for the daily sales digest.
//!
//! A plain run takes no arguments: it reports yesterday and mails the result.
//! The flags exist for reruns and for checking a new account's data shape.
//! `digest reserve` builds the per-order material reservation sheet instead.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::error::AppError;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "digest",
    version,
    about = "Daily digest of sales orders and invoices (Holded), delivered by email"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Report this civil day instead of yesterday.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    /// Render and print the report without sending email (SMTP settings not required).
    #[arg(long)]
    pub dry_run: bool,

    /// Write the raw fetched documents next to PATH, one JSON file per document kind.
    #[arg(long = "dump-json", value_name = "PATH")]
    pub dump_json: Option<PathBuf>,

    /// Load settings from this file instead of `./.env`.
    #[arg(long, value_name = "PATH", global = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Material reservation sheet for one sales order, or for the latest ones.
    Reserve(ReserveArgs),
}

/// Which orders to build reservation sheets for, and what to do with them.
#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("selection").required(true).args(["doc_id", "minutes"])))]
pub struct ReserveArgs {
    /// Sales order id to fetch.
    #[arg(long, value_name = "ID")]
    pub doc_id: Option<String>,

    /// Take the orders dated within the last N minutes, newest first.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub minutes: Option<u32>,

    /// Maximum number of orders taken with `--minutes`.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Email each sheet (needs the SMTP settings).
    #[arg(long)]
    pub send_email: bool,

    /// Write each raw order next to PATH, suffixed with the order id.
    #[arg(long = "dump-json", value_name = "PATH")]
    pub dump_json: Option<PathBuf>,
}

impl ReserveArgs {
    pub fn selection(&self) -> Result<Selection, AppError> {
        match (&self.doc_id, self.minutes) {
            (Some(id), None) => Ok(Selection::ById(id.clone())),
            (None, Some(minutes)) => Ok(Selection::Recent {
                minutes,
                limit: self.limit,
            }),
            _ => Err(AppError::config("Pass exactly one of --doc-id or --minutes.")),
        }
    }
}

/// How `digest reserve` picks its orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    ById(String),
    Recent { minutes: u32, limit: usize },
}
