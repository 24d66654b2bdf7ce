//! Run orchestration behind the `digest` binary.
//!
//! Two entry paths share settings, the API client and the mailer:
//! - the daily digest (no subcommand): window, fetch, render, print, deliver, dump
//! - `digest reserve`: pick orders, build sheets, print, optionally mail and dump

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use crate::cli::{Cli, Command, ReserveArgs};
use crate::config::Settings;
use crate::data::HoldedClient;
use crate::domain::TimeWindow;
use crate::error::AppError;
use crate::notify::{Notifier, PreviewNotifier, SmtpNotifier};
use crate::report::RenderOptions;
use crate::reserve;

pub mod pipeline;

pub use pipeline::{RunOutput, RunStatus};

/// Entry point for the `digest` binary.
pub fn run() -> Result<RunStatus, AppError> {
    let cli = Cli::parse();
    match &cli.command {
        Some(Command::Reserve(args)) => run_reserve(&cli, args),
        None => run_digest(&cli),
    }
}

fn run_digest(cli: &Cli) -> Result<RunStatus, AppError> {
    let settings = Settings::from_env(cli.env_file.as_deref(), !cli.dry_run)?;

    let tz = settings.report.timezone;
    let window = match cli.date {
        Some(date) => TimeWindow::for_date(date, tz),
        None => TimeWindow::previous_day(Utc::now(), tz),
    };
    let options = RenderOptions {
        empty_marker: settings.report.empty_marker,
        yesterday: cli.date.is_none(),
    };

    // Built before any request so a bad address fails fast.
    let notifier = notifier_for(cli, &settings)?;
    let client = HoldedClient::new(&settings.api)?;

    info!(
        date = %window.date,
        tz = %window.tz,
        starttmp = window.start_epoch(),
        endtmp = window.end_epoch(),
        "reporting window"
    );

    let output = pipeline::run_report(&client, &window, &options)?;

    println!("{}", output.report.text_body);

    let status = pipeline::publish(&output, notifier.as_ref(), cli.dump_json.as_deref())?;
    match status {
        RunStatus::Complete => info!("report delivered"),
        RunStatus::Degraded => warn!("report delivered with a missing section"),
    }
    Ok(status)
}

fn notifier_for(cli: &Cli, settings: &Settings) -> Result<Box<dyn Notifier>, AppError> {
    if cli.dry_run {
        return Ok(Box::new(PreviewNotifier::stdout()));
    }
    let mail = settings
        .mail
        .clone()
        .ok_or_else(|| AppError::config("SMTP settings are required unless --dry-run is given."))?;
    Ok(Box::new(SmtpNotifier::new(mail)?))
}

fn run_reserve(cli: &Cli, args: &ReserveArgs) -> Result<RunStatus, AppError> {
    let selection = args.selection()?;
    let settings = Settings::from_env(cli.env_file.as_deref(), args.send_email)?;
    let tz = settings.report.timezone;

    let notifier = match (args.send_email, settings.mail.clone()) {
        (false, _) => None,
        (true, Some(mail)) => Some(SmtpNotifier::new(mail)?),
        (true, None) => return Err(AppError::config("SMTP settings are required with --send-email.")),
    };
    let client = HoldedClient::new(&settings.api)?;

    let orders = reserve::select_orders(&client, &selection, tz, Utc::now())?;
    if orders.is_empty() {
        println!("No se han encontrado documentos.");
        return Ok(RunStatus::Complete);
    }
    info!(orders = orders.len(), "building reservation sheets");

    let sheets = reserve::build_sheets(&client, &orders, tz);
    for (order, sheet) in orders.iter().zip(&sheets) {
        println!("{}", sheet.render_text());
        reserve::publish(
            sheet,
            order,
            notifier.as_ref().map(|n| n as &dyn Notifier),
            args.dump_json.as_deref(),
        )?;
    }
    Ok(RunStatus::Complete)
}
