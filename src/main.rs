use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the report summary.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match sales_digest::app::run() {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(err) => {
            tracing::error!(exit_code = err.exit_code(), "{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
