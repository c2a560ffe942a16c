//! Error types for the olist-dq crate.
//!
//! Rule evaluation itself never fails: a rule that cannot be computed
//! degrades to [`crate::MetricValue::Undefined`]. These errors cover opening
//! the store and writing report artifacts.

use olist_core::EtlError;
use thiserror::Error;

/// Top-level error type for monitoring operations.
#[derive(Debug, Error)]
pub enum DqError {
    #[error("Store error: {0}")]
    Store(#[from] EtlError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DqError>;
