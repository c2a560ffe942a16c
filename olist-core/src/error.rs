//! Error types for the warehouse pipeline.
//!
//! Uses `thiserror` for the public error type. Referential gaps found while
//! building facts are not errors and never surface here.

use std::path::PathBuf;

/// Top-level error type for staging, transform and load operations.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("Source not found for {table}: {}", path.display())]
    SourceNotFound { table: String, path: PathBuf },

    #[error("CSV error in {table}: {source}")]
    Csv {
        table: String,
        #[source]
        source: csv::Error,
    },

    #[error("Unknown column '{column}' in extract for {table}")]
    UnknownColumn { table: String, column: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EtlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn csv(table: &str, source: csv::Error) -> Self {
        Self::Csv {
            table: table.to_string(),
            source,
        }
    }

    /// Whether this error means an input extract was absent.
    pub fn is_source_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound { .. })
    }
}

/// Convenience type alias for pipeline results.
pub type Result<T> = std::result::Result<T, EtlError>;
