//! Hierarchical counter aggregation.
//!
//! A [`CounterSet`] is the single owner of the counter map for one poll
//! cycle. Classifiers feed it `(path, value, rule)` contributions; once the
//! cycle is complete it is frozen into a [`CounterSnapshot`] for delivery.
//! All updates are sequential within a cycle, so no locking is needed here.

use std::collections::BTreeMap;

use tracing::warn;

/// Combination rule for a counter path.
///
/// A given path always implies the same rule across a run; the first rule a
/// path is touched with sticks, and conflicting updates are dropped with a
/// warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Running sum of contributions.
    Sum,
    /// Count of contributions (value is ignored, +1 per call).
    Count,
    /// Minimum contribution seen.
    Min,
    /// Maximum contribution seen.
    Max,
    /// Derived value, recomputed from other counters; each set replaces.
    Derived,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    rule: Rule,
    value: f64,
}

/// Path-keyed accumulator map for one poll cycle.
///
/// Keys are flattened dotted metric paths. A `BTreeMap` keeps iteration
/// stable by path, which the transport relies on for reproducible batches.
#[derive(Debug, Clone, Default)]
pub struct CounterSet {
    counters: BTreeMap<String, Counter>,
}

impl CounterSet {
    /// Creates an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one contribution under the given rule.
    ///
    /// Unknown paths initialize at the rule's identity (0 for sum/count,
    /// +inf for min, -inf for max) before combining.
    pub fn add(&mut self, path: impl Into<String>, value: f64, rule: Rule) {
        let path = path.into();
        let entry = self.counters.entry(path.clone()).or_insert(Counter {
            rule,
            value: match rule {
                Rule::Sum | Rule::Count | Rule::Derived => 0.0,
                Rule::Min => f64::INFINITY,
                Rule::Max => f64::NEG_INFINITY,
            },
        });
        if entry.rule != rule {
            debug_assert!(false, "rule conflict on {path}");
            warn!(%path, existing = ?entry.rule, requested = ?rule, "counter rule conflict, update dropped");
            return;
        }
        match rule {
            Rule::Sum => entry.value += value,
            Rule::Count => entry.value += 1.0,
            Rule::Min => entry.value = entry.value.min(value),
            Rule::Max => entry.value = entry.value.max(value),
            Rule::Derived => entry.value = value,
        }
    }

    /// Increments a count counter by one.
    pub fn increment(&mut self, path: impl Into<String>) {
        self.add(path, 1.0, Rule::Count);
    }

    /// Sets a derived counter, replacing any previous value.
    pub fn set_derived(&mut self, path: impl Into<String>, value: f64) {
        self.add(path, value, Rule::Derived);
    }

    /// Returns the current value of a path, if touched this cycle.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<f64> {
        self.counters.get(path).map(|c| c.value)
    }

    /// Recomputes a derived ratio `base+out = base+num / base+den * scale`.
    ///
    /// Must be called after every update to either input so the derived
    /// value tracks the running sums, never pre-aggregated values. Returns
    /// the new value, or `None` when the denominator is absent or zero.
    pub fn derive_ratio(
        &mut self,
        base: &str,
        num_suffix: &str,
        den_suffix: &str,
        out_suffix: &str,
        scale: f64,
        clamp: Option<(f64, f64)>,
    ) -> Option<f64> {
        let num = self.get(&format!("{base}{num_suffix}"))?;
        let den = self.get(&format!("{base}{den_suffix}"))?;
        if den == 0.0 {
            return None;
        }
        let mut value = num / den * scale;
        if let Some((lo, hi)) = clamp {
            value = value.clamp(lo, hi);
        }
        self.set_derived(format!("{base}{out_suffix}"), value);
        Some(value)
    }

    /// Number of distinct paths touched this cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True if nothing was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Freezes the set into an immutable snapshot for delivery.
    #[must_use]
    pub fn freeze(self) -> CounterSnapshot {
        CounterSnapshot {
            values: self
                .counters
                .into_iter()
                .map(|(path, c)| (path, c.value))
                .collect(),
        }
    }
}

/// An immutable, path-ordered view of one cycle's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterSnapshot {
    values: BTreeMap<String, f64>,
}

impl CounterSnapshot {
    /// Iterates `(path, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns the value for a path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<f64> {
        self.values.get(path).copied()
    }

    /// Number of counters in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the snapshot holds no counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_accumulates_from_zero() {
        let mut set = CounterSet::new();
        set.add("a.b", 2.5, Rule::Sum);
        set.add("a.b", 1.5, Rule::Sum);
        assert_eq!(set.get("a.b"), Some(4.0));
    }

    #[test]
    fn count_ignores_value() {
        let mut set = CounterSet::new();
        set.add("jobs.count", 99.0, Rule::Count);
        set.increment("jobs.count");
        assert_eq!(set.get("jobs.count"), Some(2.0));
    }

    #[test]
    fn min_and_max_start_at_identity() {
        let mut set = CounterSet::new();
        set.add("cpu_min", 40.0, Rule::Min);
        set.add("cpu_min", 10.0, Rule::Min);
        set.add("cpu_min", 25.0, Rule::Min);
        set.add("cpu_max", 40.0, Rule::Max);
        set.add("cpu_max", 90.0, Rule::Max);
        assert_eq!(set.get("cpu_min"), Some(10.0));
        assert_eq!(set.get("cpu_max"), Some(90.0));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "rule conflict"))]
    fn conflicting_rule_is_rejected() {
        let mut set = CounterSet::new();
        set.add("x", 1.0, Rule::Sum);
        set.add("x", 5.0, Rule::Min);
        // In release builds the conflicting update is dropped.
        assert_eq!(set.get("x"), Some(1.0));
    }

    #[test]
    fn derive_ratio_tracks_running_sums() {
        let mut set = CounterSet::new();
        set.add("job.cputime", 50.0, Rule::Sum);
        set.add("job.walltime", 100.0, Rule::Sum);
        let eff = set.derive_ratio(
            "job",
            ".cputime",
            ".walltime",
            ".efficiency",
            100.0,
            Some((0.0, 100.0)),
        );
        assert_eq!(eff, Some(50.0));

        // More cputime than walltime: clamped at 100.
        set.add("job.cputime", 200.0, Rule::Sum);
        let eff = set.derive_ratio(
            "job",
            ".cputime",
            ".walltime",
            ".efficiency",
            100.0,
            Some((0.0, 100.0)),
        );
        assert_eq!(eff, Some(100.0));
        assert_eq!(set.get("job.efficiency"), Some(100.0));
    }

    #[test]
    fn derive_ratio_with_zero_denominator_is_none() {
        let mut set = CounterSet::new();
        set.add("j.cputime", 10.0, Rule::Sum);
        set.add("j.walltime", 0.0, Rule::Sum);
        assert_eq!(
            set.derive_ratio("j", ".cputime", ".walltime", ".efficiency", 100.0, None),
            None
        );
        assert_eq!(set.get("j.efficiency"), None);
    }

    #[test]
    fn snapshot_is_ordered_by_path() {
        let mut set = CounterSet::new();
        set.add("z.last", 1.0, Rule::Sum);
        set.add("a.first", 1.0, Rule::Sum);
        set.add("m.middle", 1.0, Rule::Sum);
        let snap = set.freeze();
        let paths: Vec<&str> = snap.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a.first", "m.middle", "z.last"]);
    }
}
