//! Error types for the audit store and log query engine

use thiserror::Error;

use crate::record::RecordId;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Malformed query filter, pagination or retention window
    #[error("invalid log query: {0}")]
    Validation(String),

    #[error("log record {0} not found")]
    NotFound(RecordId),

    /// Persistence failure; the source is kept for diagnostics only
    #[error("storage backend failure")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuditError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AuditError::Validation(msg.into())
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::Store(Box::new(err))
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Store(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_hides_detail() {
        let err = AuditError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), "storage backend failure");
        assert!(std::error::Error::source(&err).is_some());
    }
}
