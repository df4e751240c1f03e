//! Cloud instance classification.
//!
//! Counts instances per `region.az.group.type.key.state` placement and folds
//! per-instance CPU utilization samples into running average/min/max
//! counters. The CPU samples come from a separate provider query and are
//! passed in alongside the record.

use crate::aggregate::{CounterSet, Rule};
use crate::path::sanitize;
use crate::record::AttrRecord;

/// One CPU utilization sample for a running instance, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuUtilization {
    /// Average utilization over the sample period.
    pub avg: Option<f64>,
    /// Minimum utilization over the sample period.
    pub min: Option<f64>,
    /// Maximum utilization over the sample period.
    pub max: Option<f64>,
}

/// Classifies cloud instance records.
#[derive(Debug, Clone, Default)]
pub struct InstanceClassifier;

impl InstanceClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Applies one instance record to the counter set.
    ///
    /// `region` comes from the query target, not the record. `cpu` is the
    /// utilization sample for running instances, when available.
    pub fn classify(
        &self,
        region: &str,
        record: &AttrRecord,
        cpu: Option<CpuUtilization>,
        counters: &mut CounterSet,
    ) {
        let group = match record.get_str("PlacementGroup") {
            Some(g) if !g.is_empty() => sanitize(Some(g)),
            _ => "none".to_string(),
        };
        let base = format!(
            "{}.{}.{}.{}.{}.{}",
            sanitize(Some(region)),
            sanitize(record.get_str("AvailabilityZone")),
            group,
            sanitize(record.get_str("InstanceType")),
            sanitize(record.get_str("KeyName")),
            sanitize(Some(record.str_or("State", "unknown"))),
        );

        counters.increment(format!("{base}.count"));

        if record.str_or("State", "") == "running" {
            if let Some(cpu) = cpu {
                // Running average over the instances counted so far.
                let count = counters.get(&format!("{base}.count")).unwrap_or(1.0);
                if let Some(avg) = cpu.avg {
                    let old = counters.get(&format!("{base}.cpu_avg")).unwrap_or(0.0);
                    counters.set_derived(
                        format!("{base}.cpu_avg"),
                        (old * (count - 1.0) + avg) / count,
                    );
                }
                if let Some(min) = cpu.min {
                    counters.add(format!("{base}.cpu_min"), min, Rule::Min);
                }
                if let Some(max) = cpu.max {
                    counters.add(format!("{base}.cpu_max"), max, Rule::Max);
                }
            }
        }
    }
}
