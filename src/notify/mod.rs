//! Report delivery.
//!
//! - `SmtpNotifier` sends the report through an authenticated SMTP session
//!   (implicit TLS on 465, STARTTLS otherwise)
//! - `PreviewNotifier` writes it to a terminal instead (dry runs)

use std::cell::RefCell;
use std::io::Write;

use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::MailSettings;
use crate::domain::ReportResult;
use crate::error::AppError;

/// The parts of a report that go into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReport {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl From<&ReportResult> for OutgoingReport {
    fn from(report: &ReportResult) -> Self {
        Self {
            subject: report.subject_line.clone(),
            html_body: report.html_body.clone(),
            text_body: report.text_body.clone(),
        }
    }
}

pub trait Notifier {
    fn send(&self, report: &OutgoingReport) -> Result<(), AppError>;
}

pub struct SmtpNotifier {
    settings: MailSettings,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    /// Validates the sender and recipient addresses up front.
    pub fn new(settings: MailSettings) -> Result<Self, AppError> {
        let from = parse_mailbox("MAIL_FROM", &settings.from)?;
        let to = settings
            .to
            .iter()
            .map(|addr| parse_mailbox("MAIL_TO", addr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { settings, from, to })
    }

    pub fn build_message(&self, report: &OutgoingReport) -> Result<Message, AppError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(report.subject.as_str());
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }
        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(report.text_body.clone()))
                    .singlepart(SinglePart::html(report.html_body.clone())),
            )
            .map_err(|e| AppError::delivery(format!("Failed to build report email: {e}")))
    }

    fn transport(&self) -> Result<SmtpTransport, AppError> {
        let host = self.settings.smtp_host.as_str();
        let builder = if self.settings.implicit_tls() {
            SmtpTransport::relay(host)
        } else {
            SmtpTransport::starttls_relay(host)
        }
        .map_err(|e| AppError::delivery(format!("SMTP relay error for '{host}': {e}")))?;

        Ok(builder
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.smtp_user.clone(),
                self.settings.smtp_pass.clone(),
            ))
            .timeout(Some(self.settings.timeout))
            .build())
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, report: &OutgoingReport) -> Result<(), AppError> {
        let message = self.build_message(report)?;
        let mailer = self.transport()?;
        mailer.send(&message).map_err(smtp_error)?;
        info!(
            host = %self.settings.smtp_host,
            port = self.settings.smtp_port,
            recipients = self.to.len(),
            "report email sent"
        );
        Ok(())
    }
}

fn parse_mailbox(key: &str, addr: &str) -> Result<Mailbox, AppError> {
    addr.parse()
        .map_err(|e| AppError::config(format!("Invalid address in {key} '{addr}': {e}")))
}

fn smtp_error(e: lettre::transport::smtp::Error) -> AppError {
    let auth_rejected = e.status().is_some_and(|code| code.to_string() == "535");
    if auth_rejected {
        AppError::delivery(
            "SMTP authentication failed (535). With Gmail use an app password and check that MAIL_FROM matches SMTP_USER.",
        )
    } else {
        AppError::delivery(format!("Failed to send report email: {e}"))
    }
}

/// Prints the report instead of sending it.
pub struct PreviewNotifier<W: Write> {
    out: RefCell<W>,
}

impl PreviewNotifier<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> PreviewNotifier<W> {
    pub fn new(out: W) -> Self {
        Self { out: RefCell::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> Notifier for PreviewNotifier<W> {
    fn send(&self, report: &OutgoingReport) -> Result<(), AppError> {
        let mut out = self.out.borrow_mut();
        writeln!(out, "Subject: {}\n\n{}", report.subject, report.html_body)
            .and_then(|_| out.flush())
            .map_err(|e| AppError::io(format!("Failed to write report preview: {e}")))
    }
}
