//! Error types for the poolmon-core crate.

use thiserror::Error;

/// Errors that can occur while building classifier configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A bucket table was constructed with invalid thresholds.
    #[error("invalid bucket table: {reason}")]
    InvalidBucketTable {
        /// The reason the table is invalid.
        reason: String,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
