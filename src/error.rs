/// Failure categories a run can end in.
///
/// Each kind maps to a fixed process exit code so schedulers can tell a bad
/// configuration apart from an unreachable API or a mail server refusing us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required setting is missing or invalid. Raised before any network call.
    Configuration,
    /// The accounting API failed (status, timeout, malformed body).
    Upstream,
    /// The report could not be handed to the mail server.
    Delivery,
    /// Local file output failed.
    Io,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Configuration => 2,
            ErrorKind::Upstream => 4,
            ErrorKind::Delivery => 5,
            ErrorKind::Io => 6,
        }
    }
}

/// Exit code for a run that delivered a report with one section missing.
pub const EXIT_DEGRADED: u8 = 3;

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Delivery, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            ErrorKind::Configuration.exit_code(),
            ErrorKind::Upstream.exit_code(),
            ErrorKind::Delivery.exit_code(),
            ErrorKind::Io.exit_code(),
            EXIT_DEGRADED,
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn display_is_the_message() {
        let err = AppError::upstream("orders: HTTP 500");
        assert_eq!(err.to_string(), "orders: HTTP 500");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.exit_code(), 4);
    }
}
