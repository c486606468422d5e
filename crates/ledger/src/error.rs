//! Error types for stream lifecycle operations

use thiserror::Error;

use crate::Stream;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Structurally impossible stream terms or snapshot values
    #[error("invalid stream terms: {0}")]
    InvalidTerms(String),

    /// An open stream already exists for the pair; carries that stream
    #[error("an open stream already exists for employer {} and employee {}", .existing.employer_address, .existing.employee_address)]
    Conflict { existing: Box<Stream> },

    #[error("{0} not found")]
    NotFound(String),

    /// Attempted transition on a cancelled stream
    #[error("stream {0} is cancelled")]
    Terminal(uuid::Uuid),

    /// The repository refused an insert that would create a second open stream
    #[error("an open stream already exists for this pair")]
    DuplicateOpenStream,

    /// Persistence failure; the source is kept for diagnostics only
    #[error("storage backend failure")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn invalid_terms(msg: impl Into<String>) -> Self {
        LedgerError::InvalidTerms(msg.into())
    }

    pub(crate) fn no_open_stream(
        employer: impl std::fmt::Display,
        employee: impl std::fmt::Display,
    ) -> Self {
        LedgerError::NotFound(format!(
            "open stream for employer {} and employee {}",
            employer, employee
        ))
    }

    /// True for both a controller-level conflict and a refused insert
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict { .. } | LedgerError::DuplicateOpenStream
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.is_unique_violation() {
                return LedgerError::DuplicateOpenStream;
            }
        }
        LedgerError::Store(Box::new(err))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        LedgerError::Store(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_hides_detail() {
        let err = LedgerError::Store("connection reset".into());
        assert_eq!(err.to_string(), "storage backend failure");
    }

    #[test]
    fn test_duplicate_counts_as_conflict() {
        assert!(LedgerError::DuplicateOpenStream.is_conflict());
        assert!(!LedgerError::invalid_terms("bad").is_conflict());
    }
}
