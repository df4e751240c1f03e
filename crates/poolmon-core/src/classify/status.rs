//! Pool daemon health classification.
//!
//! Each pool service (collector, negotiator, scheduler) advertises its own
//! state as a record of counters and gauges. Every numeric attribute is
//! copied through as a gauge keyed by `<daemon kind>.<daemon name>.<attr>`,
//! with the daemon name sanitized into a single path segment.

use crate::aggregate::CounterSet;
use crate::path::sanitize;
use crate::record::{AttrRecord, AttrValue};

/// Classifies daemon self-advertisement records.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl StatusClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Applies one daemon record's numeric attributes to the counter set.
    ///
    /// `daemon_kind` becomes the leading path segment, e.g. `collector` or
    /// `schedd`. String and boolean attributes are skipped.
    pub fn classify(&self, daemon_kind: &str, record: &AttrRecord, counters: &mut CounterSet) {
        let name = sanitize(record.get_str("Name"));
        for (attr, value) in record.iter() {
            let value = match value {
                AttrValue::Int(v) => *v as f64,
                AttrValue::Float(v) => *v,
                AttrValue::Bool(_) | AttrValue::Str(_) => continue,
            };
            counters.set_derived(format!("{daemon_kind}.{name}.{attr}"), value);
        }
    }
}
