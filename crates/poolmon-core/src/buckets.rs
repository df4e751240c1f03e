//! Duration bucketing for histogram-like counters.
//!
//! Job ages (time in queue, wall-clock runtime, time on hold) are reduced to
//! a small set of named ranges so they can be counted rather than stored as
//! raw values.

use crate::error::{CoreError, Result};

/// Label returned when a duration exceeds every threshold.
pub const OVERFLOW_LABEL: &str = "longer";

/// An ordered table of `(threshold_secs, label)` pairs.
///
/// Evaluated in order; the first entry whose threshold strictly exceeds the
/// input wins. Thresholds must be strictly increasing. Fixed configuration,
/// not runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTable {
    bins: Vec<(i64, String)>,
    overflow: String,
}

impl BucketTable {
    /// Creates a table from `(threshold_secs, label)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBucketTable`] if thresholds are not
    /// strictly increasing.
    pub fn new<L: Into<String>>(
        bins: Vec<(i64, L)>,
        overflow: impl Into<String>,
    ) -> Result<Self> {
        let bins: Vec<(i64, String)> = bins.into_iter().map(|(t, l)| (t, l.into())).collect();
        for pair in bins.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(CoreError::InvalidBucketTable {
                    reason: format!(
                        "thresholds must strictly increase ({} then {})",
                        pair[0].0, pair[1].0
                    ),
                });
            }
        }
        Ok(Self {
            bins,
            overflow: overflow.into(),
        })
    }

    /// The production age table: 5 minutes up through one week.
    #[must_use]
    pub fn default_ages() -> Self {
        Self {
            bins: vec![
                (300, "recent".to_string()),
                (3600, "one_hour".to_string()),
                (3600 * 4, "four_hours".to_string()),
                (3600 * 8, "eight_hours".to_string()),
                (3600 * 24, "one_day".to_string()),
                (3600 * 24 * 2, "two_days".to_string()),
                (3600 * 24 * 7, "one_week".to_string()),
            ],
            overflow: OVERFLOW_LABEL.to_string(),
        }
    }

    /// Returns the label for a duration in seconds.
    ///
    /// Negative durations are legal and simply fall into the first bucket
    /// whose threshold exceeds them.
    #[must_use]
    pub fn label(&self, duration_secs: i64) -> &str {
        for (threshold, label) in &self.bins {
            if duration_secs < *threshold {
                return label;
            }
        }
        &self.overflow
    }
}

impl Default for BucketTable {
    fn default() -> Self {
        Self::default_ages()
    }
}
