/*!
 * Error types for Paystream
 */

use std::fmt;
use std::io;

use paystream_audit::AuditError;
use paystream_ledger::{LedgerError, Stream};

pub type Result<T> = std::result::Result<T, PaystreamError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CLIENT: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum PaystreamError {
    /// Stream lifecycle error
    Ledger(LedgerError),

    /// Audit log query error
    Audit(AuditError),

    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),
}

/// Caller-facing error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed business input
    InvalidTerms,
    /// Malformed query filter or pagination
    Validation,
    /// Duplicate open stream
    Conflict,
    /// No open stream or no matching record
    NotFound,
    /// Transition attempted on a cancelled stream
    Terminal,
    /// Persistence failure
    Store,
    /// Bad configuration
    Config,
}

impl ErrorKind {
    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidTerms | ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::Terminal => 409,
            ErrorKind::Store | ErrorKind::Config => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidTerms => write!(f, "invalid_terms"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Terminal => write!(f, "terminal"),
            ErrorKind::Store => write!(f, "store"),
            ErrorKind::Config => write!(f, "config"),
        }
    }
}

impl PaystreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaystreamError::Ledger(err) => match err {
                LedgerError::InvalidTerms(_) => ErrorKind::InvalidTerms,
                LedgerError::Conflict { .. } | LedgerError::DuplicateOpenStream => {
                    ErrorKind::Conflict
                }
                LedgerError::NotFound(_) => ErrorKind::NotFound,
                LedgerError::Terminal(_) => ErrorKind::Terminal,
                LedgerError::Store(_) => ErrorKind::Store,
            },
            PaystreamError::Audit(err) => match err {
                AuditError::Validation(_) => ErrorKind::Validation,
                AuditError::NotFound(_) => ErrorKind::NotFound,
                AuditError::Store(_) => ErrorKind::Store,
            },
            PaystreamError::Config(_) => ErrorKind::Config,
            PaystreamError::Io(_) => ErrorKind::Store,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.kind().is_client_error() {
            EXIT_CLIENT
        } else {
            EXIT_FATAL
        }
    }

    /// The stream that caused a creation conflict
    pub fn existing_stream(&self) -> Option<&Stream> {
        match self {
            PaystreamError::Ledger(LedgerError::Conflict { existing }) => Some(existing),
            _ => None,
        }
    }
}

impl fmt::Display for PaystreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaystreamError::Ledger(err) => write!(f, "{}", err),
            PaystreamError::Audit(err) => write!(f, "{}", err),
            PaystreamError::Config(msg) => write!(f, "Configuration error: {}", msg),
            // file paths stay out of caller-facing messages
            PaystreamError::Io(_) => write!(f, "storage backend failure"),
        }
    }
}

impl std::error::Error for PaystreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PaystreamError::Ledger(err) => Some(err),
            PaystreamError::Audit(err) => Some(err),
            PaystreamError::Io(err) => Some(err),
            PaystreamError::Config(_) => None,
        }
    }
}

impl From<LedgerError> for PaystreamError {
    fn from(err: LedgerError) -> Self {
        PaystreamError::Ledger(err)
    }
}

impl From<AuditError> for PaystreamError {
    fn from(err: AuditError) -> Self {
        PaystreamError::Audit(err)
    }
}

impl From<io::Error> for PaystreamError {
    fn from(err: io::Error) -> Self {
        PaystreamError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PaystreamError::from(LedgerError::invalid_terms("x")), 400),
            (PaystreamError::from(AuditError::validation("x")), 400),
            (PaystreamError::from(LedgerError::DuplicateOpenStream), 409),
            (PaystreamError::from(LedgerError::Terminal(uuid::Uuid::nil())), 409),
            (PaystreamError::from(LedgerError::NotFound("stream".into())), 404),
            (PaystreamError::from(AuditError::NotFound(7)), 404),
            (PaystreamError::from(AuditError::Store("disk".into())), 500),
            (PaystreamError::Config("bad".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            PaystreamError::from(LedgerError::NotFound("stream".into())).exit_code(),
            EXIT_CLIENT
        );
        let store = PaystreamError::from(LedgerError::Store("disk".into()));
        assert_eq!(store.exit_code(), EXIT_FATAL);
    }

    #[test]
    fn test_store_detail_not_leaked() {
        let err = PaystreamError::from(io::Error::new(io::ErrorKind::Other, "/secret/path"));
        assert_eq!(err.to_string(), "storage backend failure");
        assert!(std::error::Error::source(&err).is_some());
    }
}
