//! Error types for finmine
//!
//! Data-quality problems (`Parse`, `UnknownTimezone`, `GraphIntegrity`) are
//! normally recovered where they occur and surface as skipped items. The
//! structural `InvariantViolation` aborts the current processing unit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unparseable date/time: {0}")]
    Parse(String),

    #[error("Unknown timezone for location: {0}")]
    UnknownTimezone(String),

    #[error("Graph integrity error: {0}")]
    GraphIntegrity(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// True for structural faults that must abort the current unit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
