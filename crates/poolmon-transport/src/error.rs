//! Error types for the poolmon-transport crate.

use thiserror::Error;

/// Errors that can occur while delivering counter batches.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A send to one endpoint failed.
    #[error("unable to send to {endpoint}: {reason}")]
    Send {
        /// The endpoint that failed.
        endpoint: String,
        /// The reason the send failed.
        reason: String,
    },

    /// Every endpoint in the set failed before a full delivery completed.
    #[error("none of the {attempted} endpoints could be used")]
    AllEndpointsFailed {
        /// Number of endpoints attempted.
        attempted: usize,
    },

    /// The transport was constructed with no endpoints.
    #[error("no endpoints configured")]
    NoEndpoints,

    /// A schema string could not be parsed.
    #[error("invalid schema '{schema}': {reason}")]
    InvalidSchema {
        /// The offending schema string.
        schema: String,
        /// The reason the schema is invalid.
        reason: String,
    },
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
