//! Record classification and counter aggregation for pool monitoring.
//!
//! `poolmon-core` turns raw attribute records polled from a compute pool
//! (slots, jobs, daemon status, user priorities, cloud instances) into a
//! flat set of
//! hierarchical, dot-separated counters suitable for a time-series backend.
//!
//! The pipeline is: a record source produces [`AttrRecord`]s, a classifier
//! maps each record to the metric paths it contributes to, and a
//! [`CounterSet`] accumulates the numeric contributions under well-defined
//! combination rules. The frozen [`CounterSnapshot`] is what a transport
//! delivers.
//!
//! # Example
//!
//! ```rust
//! use poolmon_core::{AttrRecord, CounterSet, SlotClassifier, SlotClassifierConfig};
//!
//! let slot = AttrRecord::new()
//!     .with("SlotType", "Static")
//!     .with("State", "Unclaimed")
//!     .with("Cpus", 8)
//!     .with("Memory", 16_000)
//!     .with("Disk", 2_000_000);
//!
//! let classifier = SlotClassifier::new(SlotClassifierConfig::default());
//! let mut counters = CounterSet::new();
//! classifier.classify(&slot, &mut counters);
//!
//! assert_eq!(counters.get("Static.Unclaimed.NumSlots"), Some(1.0));
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/poolmon-core/0.1.0")]
#![warn(missing_docs)]

pub mod aggregate;
pub mod buckets;
pub mod classify;
pub mod error;
pub mod path;
pub mod record;

// Re-export main types at crate root
pub use aggregate::{CounterSet, CounterSnapshot, Rule};
pub use buckets::BucketTable;
pub use classify::instances::{CpuUtilization, InstanceClassifier};
pub use classify::jobs::{ExperimentScheme, JobClassifier, JobClassifierConfig, JobStatus};
pub use classify::priorities::PriorityClassifier;
pub use classify::slots::{OwnershipScheme, SlotClassifier, SlotClassifierConfig};
pub use classify::status::StatusClassifier;
pub use error::{CoreError, Result};
pub use path::{MetricPath, sanitize};
pub use record::{AttrRecord, AttrValue};
