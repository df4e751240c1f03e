//! Slot (worker capacity) classification.
//!
//! Reduces one startd slot record into hierarchical counters keyed by
//! `SlotType.State[.<extra dims>][.group.owner]`, plus per-type running
//! totals. A partitionable slot whose remaining capacity is below the
//! usability thresholds is reclassified as an unusable dynamic slot before
//! any other rule applies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregate::{CounterSet, Rule};
use crate::path::{MetricPath, sanitize};
use crate::record::AttrRecord;

/// Residual-capacity fields folded into `<SlotType>.totals.*`.
const TOTAL_FIELDS: [&str; 9] = [
    "TotalDisk",
    "TotalSlotDisk",
    "TotalMemory",
    "TotalSlotMemory",
    "TotalCpus",
    "TotalSlotCpus",
    "TotalLoadAvg",
    "LoadAvg",
    "TotalCondorLoadAvg",
];

/// Current-capacity fields added for a still-usable partitionable slot.
const CURRENT_FIELDS: [&str; 3] = ["Disk", "Memory", "Cpus"];

/// How the accounting group of a claimed slot is derived.
///
/// Two divergent rules exist in production deployments; neither is
/// universally correct, so the scheme is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipScheme {
    /// Prefer `AccountingGroup` (group is everything before the last
    /// dot-separated segment, before any `@`), falling back to
    /// `RemoteGroup`.
    #[default]
    AccountingGroupFirst,
    /// Prefer `RemoteGroup`, parsing `group_<x>.<y>@<z>` style tags.
    RemoteGroupFirst,
}

/// Configuration for [`SlotClassifier`].
#[derive(Debug, Clone)]
pub struct SlotClassifierConfig {
    /// Extra attribute names inserted as hierarchy dimensions between the
    /// state and the group for claimed slots.
    pub extra_dims: Vec<String>,
    /// Group-derivation scheme for claimed slots.
    pub ownership: OwnershipScheme,
    /// Group used when no ownership attribute yields one.
    pub default_group: String,
}

impl Default for SlotClassifierConfig {
    fn default() -> Self {
        Self {
            extra_dims: Vec::new(),
            ownership: OwnershipScheme::default(),
            default_group: "rootgroup".to_string(),
        }
    }
}

static GROUP_TAG: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(r"^group_([^.@]+)").unwrap()
});

/// Classifies slot records into counter contributions.
#[derive(Debug, Clone)]
pub struct SlotClassifier {
    config: SlotClassifierConfig,
}

impl SlotClassifier {
    /// Creates a classifier with the given configuration.
    #[must_use]
    pub fn new(config: SlotClassifierConfig) -> Self {
        Self { config }
    }

    /// Applies one slot record's contributions to the counter set.
    pub fn classify(&self, record: &AttrRecord, counters: &mut CounterSet) {
        let mut slot_type = record.str_or("SlotType", "Static").to_string();
        let mut state = record.str_or("State", "Unknown").to_string();

        if slot_type == "Partitionable" {
            let exhausted = record.f64_or("Cpus", 0.0) == 0.0
                || record.f64_or("Memory", 0.0) < 500.0
                || record.f64_or("Disk", 0.0) < 1_048_576.0;

            for field in TOTAL_FIELDS {
                counters.add(
                    format!("{slot_type}.totals.{field}"),
                    record.f64_or(field, 0.0),
                    Rule::Sum,
                );
            }
            if exhausted {
                // Remaining capacity is effectively gone; reclassify the
                // record before any other rule sees it. One-way transform.
                slot_type = "Dynamic".to_string();
                state = "Unusable".to_string();
            } else {
                for field in CURRENT_FIELDS {
                    counters.add(
                        format!("{slot_type}.totals.{field}"),
                        record.f64_or(field, 0.0),
                        Rule::Sum,
                    );
                }
            }
        }

        let mut hierarchy = MetricPath::from_segments([slot_type.as_str(), state.as_str()]);

        if state == "Claimed" {
            let group = self.derive_group(record);
            let owner = derive_owner(record);

            for dim in &self.config.extra_dims {
                hierarchy.push(record.get_str(dim));
            }
            hierarchy.push(Some(&group));
            hierarchy.push(Some(&owner));

            for field in ["Disk", "Memory", "Cpus", "LoadAvg"] {
                let value = record.f64_or(field, 0.0);
                counters.add(hierarchy.join_with(&[field]), value, Rule::Sum);
                counters.add(format!("{slot_type}.totals.{field}"), value, Rule::Sum);
            }

            counters.add(
                hierarchy.join_with(&["Weighted"]),
                record.f64_or("SlotWeight", 1.0),
                Rule::Sum,
            );
            counters.increment(hierarchy.join_with(&["NumSlots"]));
        } else if slot_type != "Partitionable" {
            for field in CURRENT_FIELDS {
                let value = record.f64_or(field, 0.0);
                counters.add(hierarchy.join_with(&[field]), value, Rule::Sum);
                counters.add(format!("{slot_type}.totals.{field}"), value, Rule::Sum);
            }
            counters.increment(hierarchy.join_with(&["NumSlots"]));
        }
    }

    fn derive_group(&self, record: &AttrRecord) -> String {
        match self.config.ownership {
            OwnershipScheme::AccountingGroupFirst => {
                if let Some(acct) = record.get_str("AccountingGroup") {
                    let before_at = acct.split('@').next().unwrap_or(acct);
                    let segments: Vec<&str> = before_at.split('.').collect();
                    let group = segments[..segments.len() - 1].join(".");
                    if group.is_empty() {
                        self.config.default_group.clone()
                    } else {
                        group
                    }
                } else if let Some(remote) = record.get_str("RemoteGroup") {
                    if remote == "<none>" {
                        self.config.default_group.clone()
                    } else {
                        remote.to_string()
                    }
                } else {
                    self.config.default_group.clone()
                }
            }
            OwnershipScheme::RemoteGroupFirst => {
                let tag = record
                    .get_str("RemoteGroup")
                    .filter(|g| *g != "<none>")
                    .or_else(|| record.get_str("AccountingGroup"));
                match tag {
                    Some(tag) => GROUP_TAG
                        .captures(tag)
                        .and_then(|c| c.get(1))
                        .map_or_else(|| tag.to_string(), |m| m.as_str().to_string()),
                    None => self.config.default_group.clone(),
                }
            }
        }
    }
}

fn derive_owner(record: &AttrRecord) -> String {
    if let Some(owner) = record.get_str("Owner") {
        return owner.to_string();
    }
    match record.get_str("RemoteOwner") {
        Some(remote) => sanitize(remote.split('@').next()),
        None => "UnknownOwner".to_string(),
    }
}
