use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use usage_db::DbError;

/// Configuration-specific errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("Invalid query: {reason}")]
    #[diagnostic(
        code(usage_core::invalid_query),
        help("An offset needs an explicit finite limit, and a date range must not end before it starts")
    )]
    InvalidQuery { reason: String },

    #[error("No usable link target: {reason}")]
    #[diagnostic(
        code(usage_core::invalid_link_target),
        help("Links need a concrete, global or resolvable current activity and agent; `any` is not a target")
    )]
    InvalidLinkTarget { reason: String },

    #[error("Configuration error for field '{field}'")]
    #[diagnostic(
        code(usage_core::configuration_error),
        help("Check configuration file at {config_path}\nExpected: {expected}")
    )]
    ConfigurationError {
        config_path: String,
        field: String,
        expected: String,
        #[source]
        cause: ConfigError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),
}

impl CoreError {
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    pub fn invalid_link_target(reason: impl Into<String>) -> Self {
        Self::InvalidLinkTarget {
            reason: reason.into(),
        }
    }

    /// Whether the failed write may be retried.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Database(db) if db.is_busy())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
