//! Run settings, resolved once from the environment.
//!
//! A `.env` file is loaded first when present (handy locally); in CI the same
//! variables come from the job's secrets. The resulting `Settings` is passed
//! by reference into the pipeline. Nothing reads the environment after this.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::data::AuthMode;
use crate::data::holded::{DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT, DEFAULT_PRODUCTS_URL};
use crate::error::AppError;

pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Port on which the mail server expects implicit TLS instead of STARTTLS.
pub const SMTPS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub report: ReportSettings,
    /// `None` only when mail delivery wasn't required (dry run) and the SMTP
    /// variables were incomplete.
    pub mail: Option<MailSettings>,
}

#[derive(Clone)]
pub struct ApiSettings {
    pub api_key: String,
    pub auth: AuthMode,
    pub base_url: String,
    pub products_url: String,
    pub page_limit: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub timezone: Tz,
    /// Render "no documents" text instead of an empty table.
    pub empty_marker: bool,
}

#[derive(Clone)]
pub struct MailSettings {
    pub from: String,
    pub to: Vec<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub timeout: Duration,
}

impl MailSettings {
    pub fn implicit_tls(&self) -> bool {
        self.smtp_port == SMTPS_PORT
    }
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("api_key", &"<redacted>")
            .field("auth", &self.auth)
            .field("base_url", &self.base_url)
            .field("products_url", &self.products_url)
            .field("page_limit", &self.page_limit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl std::fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSettings")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Settings {
    /// Load `.env` (or `env_file`) into the process environment, then resolve.
    pub fn from_env(env_file: Option<&Path>, require_mail: bool) -> Result<Self, AppError> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    AppError::config(format!("Failed to load env file '{}': {e}", path.display()))
                })?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok(), require_mail)
    }

    /// Resolve settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, require_mail: bool) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("HOLDED_API_KEY")
            .ok_or_else(|| AppError::config("Missing HOLDED_API_KEY in environment (.env)."))?;
        let auth = match get("HOLDED_USE_BEARER") {
            Some(raw) => {
                if parse_bool("HOLDED_USE_BEARER", &raw)? {
                    AuthMode::Bearer
                } else {
                    AuthMode::ApiKeyHeader
                }
            }
            None => AuthMode::ApiKeyHeader,
        };
        let page_limit = match get("HOLDED_PAGE_LIMIT") {
            Some(raw) => parse_number::<usize>("HOLDED_PAGE_LIMIT", &raw)?,
            None => DEFAULT_PAGE_LIMIT,
        };
        if page_limit == 0 {
            return Err(AppError::config("HOLDED_PAGE_LIMIT must be > 0."));
        }
        let timeout = Duration::from_secs(match get("HOLDED_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("HOLDED_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        });
        if timeout.is_zero() {
            return Err(AppError::config("HOLDED_TIMEOUT_SECS must be > 0."));
        }

        let api = ApiSettings {
            api_key,
            auth,
            base_url: get("HOLDED_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            products_url: get("HOLDED_PRODUCTS_URL").unwrap_or_else(|| DEFAULT_PRODUCTS_URL.to_string()),
            page_limit,
            timeout,
        };

        let tz_name = get("REPORT_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = Tz::from_str(&tz_name)
            .map_err(|_| AppError::config(format!("Unknown REPORT_TIMEZONE '{tz_name}'.")))?;
        let empty_marker = match get("REPORT_EMPTY_MARKER") {
            Some(raw) => parse_bool("REPORT_EMPTY_MARKER", &raw)?,
            None => true,
        };
        let report = ReportSettings {
            timezone,
            empty_marker,
        };

        let mail = resolve_mail(&get, timeout, require_mail)?;

        Ok(Self { api, report, mail })
    }
}

fn resolve_mail<G>(get: &G, timeout: Duration, require_mail: bool) -> Result<Option<MailSettings>, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    let required = ["MAIL_FROM", "MAIL_TO", "SMTP_HOST", "SMTP_USER", "SMTP_PASS"];
    let missing: Vec<&str> = required.iter().copied().filter(|&key| get(key).is_none()).collect();
    if !missing.is_empty() {
        if require_mail {
            return Err(AppError::config(format!(
                "Missing SMTP settings in environment: {}",
                missing.join(", ")
            )));
        }
        return Ok(None);
    }

    let to: Vec<String> = get("MAIL_TO")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if to.is_empty() {
        return Err(AppError::config("MAIL_TO has no recipients."));
    }

    let smtp_port = match get("SMTP_PORT") {
        Some(raw) => parse_number::<u16>("SMTP_PORT", &raw)?,
        None => DEFAULT_SMTP_PORT,
    };

    Ok(Some(MailSettings {
        from: get("MAIL_FROM").unwrap_or_default(),
        to,
        smtp_host: get("SMTP_HOST").unwrap_or_default(),
        smtp_port,
        smtp_user: get("SMTP_USER").unwrap_or_default(),
        smtp_pass: get("SMTP_PASS").unwrap_or_default(),
        timeout,
    }))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(format!("Invalid boolean for {key}: '{raw}'."))),
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::config(format!("Invalid number for {key}: '{raw}'.")))
}
