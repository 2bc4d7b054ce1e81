//! Error types for the storage layer.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Database error types.
#[derive(Debug, Error, Diagnostic)]
pub enum DbError {
    /// The backing file could not be opened or created.
    #[error("Storage unavailable at {}: {source}", .path.display())]
    #[diagnostic(
        code(usage_db::storage_unavailable),
        help("Check that the directory exists and is writable, or open the store read-write first")
    )]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A write could not be serialized within the configured wait.
    #[error("Storage busy: write lock not obtained after {waited_ms}ms")]
    #[diagnostic(
        code(usage_db::storage_busy),
        help("Another writer holds the store; the call can be retried")
    )]
    StorageBusy { waited_ms: u64 },

    /// Write attempted through a read-only handle
    #[error("Write attempted on a read-only database handle")]
    #[diagnostic(code(usage_db::read_only))]
    ReadOnly,

    /// SQLite/sqlx error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

impl DbError {
    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// The store at `path` could not be opened or created.
    pub fn storage_unavailable(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Whether the caller may retry the failed operation.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::StorageBusy { .. })
    }

    /// Classify a sqlx error raised by a statement.
    ///
    /// SQLite reports lock contention between processes as `SQLITE_BUSY` or
    /// `SQLITE_LOCKED` (possibly as an extended code); both map to
    /// [`DbError::StorageBusy`].
    pub(crate) fn from_statement(err: sqlx::Error, waited_ms: u64) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            if matches!(primary, Some(5) | Some(6)) {
                return Self::StorageBusy { waited_ms };
            }
        }
        Self::Sqlx(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_stay_sqlx() {
        let err = DbError::from_statement(sqlx::Error::RowNotFound, 0);
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::RowNotFound)));
        assert!(!err.is_busy());
    }

    #[test]
    fn test_busy_is_retryable() {
        let err = DbError::StorageBusy { waited_ms: 250 };
        assert!(err.is_busy());
        assert_eq!(
            err.to_string(),
            "Storage busy: write lock not obtained after 250ms"
        );
    }
}
