//! Error types for the probe daemon.

use thiserror::Error;

/// Errors raised while starting or configuring the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration file or value problem.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for daemon startup operations.
pub type Result<T> = std::result::Result<T, DaemonError>;
