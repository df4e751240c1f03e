//! Job (submitted work) classification.
//!
//! Each job record fans out into seven hierarchy prefixes (global totals,
//! per-experiment, per-experiment-per-user, per-user, per-scheduler, and the
//! scheduler cross products), each of which receives a count, an age-bucket
//! count, running walltime/cputime sums with derived efficiency and waste,
//! and, for running jobs, resource request/usage quantities in bytes.

use serde::{Deserialize, Serialize};

use crate::aggregate::{CounterSet, Rule};
use crate::buckets::BucketTable;
use crate::path::sanitize;
use crate::record::AttrRecord;

/// Scheduler-reported job status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued, waiting for a match.
    Idle,
    /// Executing on a slot.
    Running,
    /// Held by the scheduler or the user.
    Held,
    /// Any other (or missing) status code.
    Other,
}

impl JobStatus {
    /// Decodes the numeric status attribute.
    #[must_use]
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::Idle,
            Some(2) => Self::Running,
            Some(5) => Self::Held,
            _ => Self::Other,
        }
    }
}

/// How the owning experiment of a job is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentScheme {
    /// Parse the leading `group_<exp>` segment of `AccountingGroup`.
    #[default]
    AccountingGroupPrefix,
    /// Read a dedicated experiment attribute directly.
    ExperimentAttr,
}

/// Configuration for [`JobClassifier`].
#[derive(Debug, Clone)]
pub struct JobClassifierConfig {
    /// Experiment-derivation scheme.
    pub experiment: ExperimentScheme,
    /// Site name treated as "home": substituted with the concrete resource
    /// name for running jobs, and controlling the usage-model refinement
    /// for idle jobs.
    pub home_site: String,
    /// Age bucket table shared by queue-age, runtime, and hold-age counts.
    pub buckets: BucketTable,
}

impl Default for JobClassifierConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentScheme::default(),
            home_site: "FNAL".to_string(),
            buckets: BucketTable::default_ages(),
        }
    }
}

/// Classifies job records into counter contributions.
#[derive(Debug, Clone)]
pub struct JobClassifier {
    config: JobClassifierConfig,
}

impl JobClassifier {
    /// Creates a classifier with the given configuration.
    #[must_use]
    pub fn new(config: JobClassifierConfig) -> Self {
        Self { config }
    }

    /// Applies one job record's contributions to the counter set.
    ///
    /// `schedd_name` is the name of the scheduler the record came from; it
    /// becomes the `schedds.<name>` dimension.
    pub fn classify(&self, record: &AttrRecord, schedd_name: &str, counters: &mut CounterSet) {
        let status = JobStatus::from_code(record.get_i64("JobStatus"));
        let suffixes = self.counter_suffixes(record, status);
        let prefixes = self.metric_prefixes(record, schedd_name, &suffixes);

        let bin = self.age_bin(record, status);
        let walltime = job_walltime(record);
        let cputime = job_cputime(record);

        for prefix in &prefixes {
            counters.increment(format!("{prefix}.count"));

            if let Some(bin) = &bin {
                counters.increment(format!("{prefix}{bin}"));
            }

            if walltime > 0.0 && cputime > 0.0 {
                counters.add(format!("{prefix}.walltime"), walltime, Rule::Sum);
                counters.add(format!("{prefix}.cputime"), cputime, Rule::Sum);
                counters.derive_ratio(
                    prefix,
                    ".cputime",
                    ".walltime",
                    ".efficiency",
                    100.0,
                    Some((0.0, 100.0)),
                );
                if let (Some(wall), Some(cpu)) = (
                    counters.get(&format!("{prefix}.walltime")),
                    counters.get(&format!("{prefix}.cputime")),
                ) {
                    counters.set_derived(format!("{prefix}.wastetime"), wall - cpu);
                    counters.derive_ratio(
                        prefix,
                        ".wastetime",
                        ".count",
                        ".wastetime_avg",
                        1.0,
                        None,
                    );
                }
            }

            if status == JobStatus::Running {
                add_resource_quantities(record, prefix, counters);
            }
        }
    }

    /// Returns the status-derived counter-name suffixes for a record.
    ///
    /// Workflow/meta jobs (universe 7) always classify as `.dag.totals`
    /// regardless of status.
    fn counter_suffixes(&self, record: &AttrRecord, status: JobStatus) -> Vec<String> {
        if record.i64_or("JobUniverse", 0) == 7 {
            return vec![".dag.totals".to_string()];
        }

        match status {
            JobStatus::Idle => {
                let mut suffixes = vec![".idle.totals".to_string()];
                if let Some(models) = record.get_str("DESIRED_usage_model") {
                    let mut models: Vec<&str> =
                        models.split(',').filter(|m| !m.is_empty()).collect();
                    if let Some(sites) = record.get_str("DESIRED_Sites") {
                        let sites: Vec<&str> = sites.split(',').collect();
                        for site in &sites {
                            suffixes.push(format!(".idle.sites.{}", sanitize(Some(site))));
                        }
                        if !sites.contains(&self.config.home_site.as_str()) {
                            // Off-site requests cannot use the home-site
                            // exclusive models; drop them to avoid double
                            // classification.
                            models.retain(|m| *m != "DEDICATED" && *m != "OPPORTUNISTIC");
                        }
                    }
                    models.sort_unstable();
                    models.dedup();
                    let joined = if models.is_empty() {
                        "impossible".to_string()
                    } else {
                        models.join("_")
                    };
                    suffixes.push(format!(".idle.usage_models.{}", sanitize(Some(&joined))));
                } else {
                    suffixes.push(".idle.usage_models.unknown".to_string());
                }
                suffixes
            }
            JobStatus::Running => {
                let mut suffixes = vec![".running.totals".to_string()];
                match record.get_str("MATCH_GLIDEIN_Site") {
                    Some(site) => {
                        let site = if site == self.config.home_site {
                            record
                                .get_str("MATCH_EXP_JOBGLIDEIN_ResourceName")
                                .unwrap_or(site)
                        } else {
                            site
                        };
                        suffixes.push(format!(".running.sites.{}", sanitize(Some(site))));
                    }
                    None => suffixes.push(".running.sites.unknown".to_string()),
                }
                suffixes
            }
            JobStatus::Held => vec![".held.totals".to_string()],
            JobStatus::Other => vec![".unknown.totals".to_string()],
        }
    }

    /// Expands counter suffixes into the seven-prefix cross product.
    fn metric_prefixes(
        &self,
        record: &AttrRecord,
        schedd_name: &str,
        suffixes: &[String],
    ) -> Vec<String> {
        let exp = sanitize(Some(&self.experiment_name(record)));
        let user = sanitize(Some(record.str_or("Owner", "UnknownOwner")));
        let schedd = sanitize(Some(schedd_name));

        let mut prefixes = Vec::with_capacity(suffixes.len() * 7);
        for c in suffixes {
            prefixes.push(format!("totals{c}"));
            prefixes.push(format!("experiments.{exp}.totals{c}"));
            prefixes.push(format!("experiments.{exp}.users.{user}{c}"));
            prefixes.push(format!("users.{user}{c}"));
            prefixes.push(format!("schedds.{schedd}.totals{c}"));
            prefixes.push(format!("schedds.{schedd}.experiments.{exp}.totals{c}"));
            prefixes.push(format!(
                "schedds.{schedd}.experiments.{exp}.users.{user}{c}"
            ));
        }
        prefixes
    }

    fn experiment_name(&self, record: &AttrRecord) -> String {
        match self.config.experiment {
            ExperimentScheme::AccountingGroupPrefix => {
                let acct = record.str_or("AccountingGroup", "group_none");
                let first = acct.split('.').next().unwrap_or(acct);
                first.strip_prefix("group_").unwrap_or(first).to_string()
            }
            ExperimentScheme::ExperimentAttr => record
                .str_or("RealExperiment", "UnknownExp")
                .to_string(),
        }
    }

    /// Returns the age-bucket counter suffix for a record, if any.
    ///
    /// The bucket source depends on status: queue age for idle, wall-clock
    /// runtime for running, hold age for held.
    fn age_bin(&self, record: &AttrRecord, status: JobStatus) -> Option<String> {
        let buckets = &self.config.buckets;
        match status {
            JobStatus::Idle => Some(match record.get_i64("QDate") {
                Some(qdate) => {
                    let age = record.i64_or("ServerTime", 0) - qdate;
                    format!(".count_{}", buckets.label(age))
                }
                None => ".count_unknown".to_string(),
            }),
            JobStatus::Running => {
                let walltime = job_walltime(record);
                Some(if walltime > 0.0 {
                    format!(".count_{}", buckets.label(walltime as i64))
                } else {
                    ".count_unknown".to_string()
                })
            }
            JobStatus::Held => Some(match record.get_i64("EnteredCurrentStatus") {
                Some(entered) => {
                    let age = record.i64_or("ServerTime", 0) - entered;
                    format!(".count_holdage_{}", buckets.label(age))
                }
                None => ".count_holdage_unknown".to_string(),
            }),
            JobStatus::Other => None,
        }
    }
}

/// Wall-clock runtime in seconds: server time minus current start date.
fn job_walltime(record: &AttrRecord) -> f64 {
    let now = record.f64_or("ServerTime", 0.0);
    let start = record.f64_or("JobCurrentStartDate", now);
    now - start
}

/// Accumulated user CPU time in seconds.
///
/// System CPU time is deliberately excluded: efficiency measures how much
/// of the wall clock the payload itself used.
fn job_cputime(record: &AttrRecord) -> f64 {
    record.f64_or("RemoteUserCpu", 0.0)
}

/// Request/usage quantities for running jobs, normalized to bytes.
///
/// Memory requests are reported in MiB, resident set and disk figures in
/// KiB.
fn add_resource_quantities(record: &AttrRecord, prefix: &str, counters: &mut CounterSet) {
    if let Some(cpus) = record.get_f64("RequestCpus") {
        counters.add(format!("{prefix}.cpu_request"), cpus, Rule::Sum);
    }
    if let Some(mem) = record.get_f64("RequestMemory") {
        counters.add(
            format!("{prefix}.memory_request_b"),
            mem * 1024.0 * 1024.0,
            Rule::Sum,
        );
    }
    if let Some(rss) = record.get_f64("ResidentSetSize_RAW") {
        counters.add(format!("{prefix}.memory_usage_b"), rss * 1024.0, Rule::Sum);
    }
    if let Some(disk) = record.get_f64("RequestDisk") {
        counters.add(format!("{prefix}.disk_request_b"), disk * 1024.0, Rule::Sum);
    }
    if let Some(disk) = record.get_f64("DiskUsage_RAW") {
        counters.add(format!("{prefix}.disk_usage_b"), disk * 1024.0, Rule::Sum);
    }
}
