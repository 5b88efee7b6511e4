//! Failure classification for the fetch pipeline.
//!
//! Every underlying transport failure is mapped onto exactly one
//! [`ErrorKind`] before it reaches a caller. The kind decides the retry
//! policy: transient transport faults are retried under backoff, while a
//! definitive server answer (status >= 400) or a pure parse failure of an
//! already-fetched body is not.

use std::time::Duration;

/// The single classification attached to every failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// TLS handshake or certificate problem.
    Ssl,
    /// The request exceeded its deadline.
    Timeout,
    /// TCP/DNS level connectivity failure.
    Connection,
    /// Any other client-side protocol fault, including unexpected faults
    /// caught at the pipeline boundary.
    ClientProtocol,
    /// The server answered with status >= 400.
    HttpStatus(u16),
    /// The body was fetched but could not be parsed as requested.
    Parse,
}

impl ErrorKind {
    /// Whether another attempt under backoff is worthwhile.
    ///
    /// An HTTP status is a definitive answer, not a transient fault, and
    /// parsing is a pure function of bytes already in hand.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Ssl | ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::ClientProtocol
        )
    }

    /// Stable machine-readable label, used in tool results and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Ssl => "ssl_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection_error",
            ErrorKind::ClientProtocol => "client_protocol_error",
            ErrorKind::HttpStatus(_) => "http_status",
            ErrorKind::Parse => "parse_error",
        }
    }

    /// The HTTP status code, when this kind carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ErrorKind::HttpStatus(code) => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::HttpStatus(code) => write!(f, "http_status({})", code),
            other => f.write_str(other.label()),
        }
    }
}

/// A classified, caller-facing fetch failure.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// The URL as originally requested, before any redirects.
    pub url: String,
    /// Time spent across all attempts before giving up.
    pub elapsed: Duration,
}

/// Map a reqwest error onto exactly one [`ErrorKind`].
///
/// TLS problems are checked before connection problems: rustls failures
/// surface wrapped in connect errors, and the certificate cause is what the
/// caller needs to see.
pub fn classify_reqwest(err: &reqwest::Error) -> ErrorKind {
    if has_tls_cause(err) {
        return ErrorKind::Ssl;
    }
    if err.is_timeout() {
        return ErrorKind::Timeout;
    }
    if err.is_connect() {
        return ErrorKind::Connection;
    }
    ErrorKind::ClientProtocol
}

fn has_tls_cause(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Ssl.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Connection.is_retryable());
        assert!(ErrorKind::ClientProtocol.is_retryable());
    }

    #[test]
    fn test_non_retryable_kinds() {
        assert!(!ErrorKind::HttpStatus(500).is_retryable());
        assert!(!ErrorKind::HttpStatus(404).is_retryable());
        assert!(!ErrorKind::Parse.is_retryable());
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(ErrorKind::Ssl.label(), "ssl_error");
        assert_eq!(ErrorKind::HttpStatus(503).label(), "http_status");
        assert_eq!(ErrorKind::HttpStatus(503).status(), Some(503));
        assert_eq!(ErrorKind::Timeout.status(), None);
    }

    #[test]
    fn test_display_includes_status() {
        assert_eq!(ErrorKind::HttpStatus(500).to_string(), "http_status(500)");
        assert_eq!(ErrorKind::Connection.to_string(), "connection_error");
    }
}
