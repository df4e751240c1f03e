//! Error types for the poolmon-query crate.

use thiserror::Error;

/// Errors that can occur while querying pool targets.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A single query attempt against a target failed.
    #[error("target {target} unreachable: {reason}")]
    TargetUnreachable {
        /// The target that could not be queried.
        target: String,
        /// The reason the attempt failed.
        reason: String,
    },

    /// All retry attempts against a target were exhausted.
    #[error("giving up on target {target} after {attempts} attempts")]
    RetriesExhausted {
        /// The target that was abandoned.
        target: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
