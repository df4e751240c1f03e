//! Resilient remote query client.
//!
//! Wraps one logical "ask the remote service for all matching records" call
//! with bounded, fixed-delay retry and per-target failure isolation. The
//! actual query transport is supplied by the caller through the
//! [`RecordSource`] trait; this crate only owns the retry and isolation
//! semantics.
//!
//! Retries are deliberately fixed-delay, not exponential: downstream
//! monitoring depends on the observable timing of the original contract.
//! The delay is an async sleep, so a poll cycle can be cancelled between
//! attempts.

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/poolmon-query/0.1.0")]
#![warn(missing_docs)]

pub mod error;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use poolmon_core::AttrRecord;

pub use error::{QueryError, Result};

/// A query target: one sub-service (scheduler, collector, negotiator)
/// within a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target name, used as a metric dimension (e.g. the scheduler name).
    pub name: String,
    /// Address the query transport should contact.
    pub address: String,
}

impl Target {
    /// Creates a target.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

/// Supplies raw attribute records for a target.
///
/// Implementations issue the actual pool query; they are expected to fail
/// with [`QueryError::TargetUnreachable`] on transport problems and leave
/// retry policy to [`PoolClient`].
pub trait RecordSource: Send + Sync {
    /// Fetches all matching records from one target.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be queried; the client retries.
    fn fetch(&self, target: &Target) -> Result<Vec<AttrRecord>>;
}

/// Bounded fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum query attempts per target.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            retry_delay: Duration::from_secs(30),
        }
    }
}

/// Retrying client over a [`RecordSource`].
#[derive(Debug, Clone)]
pub struct PoolClient<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: RecordSource> PoolClient<S> {
    /// Creates a client with the default retry policy.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_policy(source, RetryPolicy::default())
    }

    /// Creates a client with a custom retry policy.
    #[must_use]
    pub fn with_policy(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Queries one target, retrying with a fixed delay.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::RetriesExhausted`] once every attempt failed;
    /// the failure applies to this target only.
    pub async fn query(&self, target: &Target) -> Result<Vec<AttrRecord>> {
        let attempts = self.policy.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.source.fetch(target) {
                Ok(records) => {
                    debug!(%target, count = records.len(), "query succeeded");
                    return Ok(records);
                }
                Err(err) => {
                    warn!(
                        %target,
                        attempt,
                        max = attempts,
                        error = %err,
                        "trouble communicating with target, retrying after delay"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }
        Err(QueryError::RetriesExhausted {
            target: target.name.clone(),
            attempts,
        })
    }

    /// Queries many targets, isolating per-target failures.
    ///
    /// Exhausted targets are logged and skipped. Returns the merged record
    /// stream, or `None` when no target yielded records this cycle.
    pub async fn query_all(&self, targets: &[Target]) -> Option<Vec<(Target, Vec<AttrRecord>)>> {
        let mut results = Vec::new();
        for target in targets {
            match self.query(target).await {
                Ok(records) => results.push((target.clone(), records)),
                Err(err) => {
                    error!(%target, error = %err, "skipping target for this cycle");
                }
            }
        }
        if results.is_empty() { None } else { Some(results) }
    }
}
