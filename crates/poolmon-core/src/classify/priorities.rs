//! User-priority classification.
//!
//! Reduces negotiator priority records into per-user usage gauges keyed by
//! `<domain>.<group>.<user>`. Accounting-group aggregate rows and users idle
//! longer than the staleness window are skipped.

use crate::aggregate::CounterSet;
use crate::record::AttrRecord;

/// Gauge attributes copied through per user.
const PRIORITY_FIELDS: [&str; 6] = [
    "ResourcesUsed",
    "AccumulatedUsage",
    "WeightedAccumulatedUsage",
    "Priority",
    "WeightedResourcesUsed",
    "PriorityFactor",
];

/// Classifies negotiator priority records.
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    /// Users whose last usage is older than this are skipped.
    pub max_idle_secs: i64,
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self {
            max_idle_secs: 3600 * 24 * 60,
        }
    }
}

impl PriorityClassifier {
    /// Creates a classifier with the default staleness window (60 days).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one priority record's gauges to the counter set.
    ///
    /// `now_secs` is the current Unix time, used for the staleness check.
    pub fn classify(&self, record: &AttrRecord, now_secs: i64, counters: &mut CounterSet) {
        if record.bool_or("IsAccountingGroup", false) {
            return;
        }
        let last_usage = record.i64_or("LastUsageTime", 0);
        if now_secs - last_usage > self.max_idle_secs {
            return;
        }

        let name = record.str_or("Name", "");
        let acct_group = record.str_or("AccountingGroup", "<none>");

        let (group, user) = if acct_group == "<none>" {
            ("nogroup".to_string(), name.replace('.', "_"))
        } else {
            let user = name.get(acct_group.len() + 1..).unwrap_or(name);
            (acct_group.to_string(), user.to_string())
        };

        let mut parts = user.splitn(2, '@');
        let username = parts.next().unwrap_or("").replace('.', "_");
        let domain = parts.next().unwrap_or("unknown").replace('.', "_");

        let group = group.strip_prefix("group_").unwrap_or(&group);
        let base = format!("{domain}.{}.{username}", group.replace('.', "_"));

        for field in PRIORITY_FIELDS {
            if let Some(value) = record.get_f64(field) {
                counters.set_derived(format!("{base}.{field}"), value);
            }
        }
    }
}
