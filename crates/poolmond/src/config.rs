//! Daemon configuration.
//!
//! Configuration for the pool monitoring probe, including:
//! - Pool identity, scheduler list, and record source selection
//! - Probe selection and cycle scheduling
//! - Classifier tuning (slot dimensions, job experiment derivation)
//! - Graphite and InfluxDB delivery settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use poolmon_core::{ExperimentScheme, OwnershipScheme};
use poolmon_transport::Endpoint;

use crate::error::{DaemonError, Result};

/// Probe names the daemon knows how to run.
pub const KNOWN_PROBES: [&str; 5] = ["slots", "jobs", "status", "priorities", "instances"];

/// How raw records are acquired for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Run an external query command per target and parse its JSON output.
    #[default]
    Command,
    /// Read `<records_dir>/<probe>/<target>.json` files. Intended for local
    /// development and integration tests.
    Files,
}

/// Pool identity and record acquisition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSection {
    /// Human-readable pool name, used in log context.
    pub name: String,
    /// Address of the pool's central manager.
    pub address: String,
    /// Scheduler names queried by the `jobs` probe.
    #[serde(default)]
    pub schedds: Vec<String>,
    /// Record source kind.
    #[serde(default)]
    pub source: SourceKind,
    /// Root directory for the `files` source.
    #[serde(default)]
    pub records_dir: Option<PathBuf>,
}

/// Query command argv per probe, with `{address}` and `{name}` placeholders
/// substituted from the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandsSection {
    /// Command for the `slots` probe.
    #[serde(default = "default_slots_command")]
    pub slots: Vec<String>,
    /// Command for the `jobs` probe, run once per scheduler.
    #[serde(default = "default_jobs_command")]
    pub jobs: Vec<String>,
    /// Command for the `status` probe, run once per daemon kind with the
    /// kind substituted for `{name}`.
    #[serde(default = "default_status_command")]
    pub status: Vec<String>,
    /// Command for the `priorities` probe.
    #[serde(default = "default_priorities_command")]
    pub priorities: Vec<String>,
    /// Command for the `instances` probe. No default; site-specific.
    #[serde(default)]
    pub instances: Vec<String>,
}

fn default_slots_command() -> Vec<String> {
    vec!["condor_status", "-json", "-pool", "{address}"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_jobs_command() -> Vec<String> {
    vec![
        "condor_q",
        "-json",
        "-allusers",
        "-pool",
        "{address}",
        "-name",
        "{name}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_status_command() -> Vec<String> {
    vec![
        "condor_status",
        "-json",
        "-pool",
        "{address}",
        "-subsystem",
        "{name}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_priorities_command() -> Vec<String> {
    vec!["condor_userprio", "-json", "-all", "-pool", "{address}"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            slots: default_slots_command(),
            jobs: default_jobs_command(),
            status: default_status_command(),
            priorities: default_priorities_command(),
            instances: Vec::new(),
        }
    }
}

/// Probe selection and cycle scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSection {
    /// Probes run each cycle.
    #[serde(default = "default_probes")]
    pub probes: Vec<String>,
    /// Seconds between cycle starts.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Query attempts per target before giving up for the cycle.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Seconds between query attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Run one cycle and exit.
    #[serde(default)]
    pub once: bool,
    /// Log points instead of sending them, and exit after one cycle.
    #[serde(default)]
    pub test: bool,
}

fn default_probes() -> Vec<String> {
    vec!["slots".to_string(), "jobs".to_string()]
}

fn default_interval() -> u64 {
    240
}

fn default_retries() -> u32 {
    4
}

fn default_retry_delay() -> u64 {
    30
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            probes: default_probes(),
            interval_secs: default_interval(),
            retries: default_retries(),
            retry_delay_secs: default_retry_delay(),
            once: false,
            test: false,
        }
    }
}

/// Slot classifier tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotsSection {
    /// Extra slot attributes inserted as hierarchy dimensions.
    #[serde(default)]
    pub extra_dims: Vec<String>,
    /// Group-derivation scheme for claimed slots.
    #[serde(default)]
    pub ownership: OwnershipScheme,
    /// Group used when no ownership attribute yields one.
    #[serde(default = "default_group")]
    pub default_group: String,
}

fn default_group() -> String {
    "rootgroup".to_string()
}

/// Job classifier tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobsSection {
    /// Experiment-derivation scheme.
    #[serde(default)]
    pub experiment: ExperimentScheme,
    /// Site treated as "home" for idle refinement and running-site breakdown.
    #[serde(default = "default_home_site")]
    pub home_site: String,
}

fn default_home_site() -> String {
    "FNAL".to_string()
}

/// Graphite delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphiteSection {
    /// Whether Graphite delivery is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoint list, `host` or `host:port`.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Port used for hosts given without one.
    #[serde(default = "default_pickle_port")]
    pub pickle_port: u16,
    /// Prefix for probe counters, e.g. `clusters.mypool`.
    #[serde(default)]
    pub namespace: String,
    /// Prefix for the daemon's own metrics, e.g. `probes.mypool`.
    #[serde(default)]
    pub meta_namespace: String,
}

fn default_true() -> bool {
    true
}

fn default_pickle_port() -> u16 {
    2004
}

impl Default for GraphiteSection {
    fn default() -> Self {
        Self {
            enabled: true,
            hosts: Vec::new(),
            pickle_port: default_pickle_port(),
            namespace: String::new(),
            meta_namespace: String::new(),
        }
    }
}

impl GraphiteSection {
    /// Parses the host list into endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable `host:port` entry.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        parse_endpoints(&self.hosts, self.pickle_port)
    }
}

/// InfluxDB delivery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfluxSection {
    /// Whether InfluxDB delivery is active.
    #[serde(default)]
    pub enabled: bool,
    /// Endpoint list, `host` or `host:port`.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Port used for hosts given without one.
    #[serde(default = "default_influx_port")]
    pub port: u16,
    /// Path-segment schema, e.g. `region.az.group.type.key.state.measurement`.
    #[serde(default)]
    pub schema: String,
    /// Fixed tags attached to every point.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_influx_port() -> u16 {
    8086
}

impl InfluxSection {
    /// Parses the host list into endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable `host:port` entry.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        parse_endpoints(&self.hosts, self.port)
    }
}

fn parse_endpoints(hosts: &[String], default_port: u16) -> Result<Vec<Endpoint>> {
    hosts
        .iter()
        .map(|entry| match entry.split_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    DaemonError::Config(format!("invalid port in endpoint '{entry}'"))
                })?;
                Ok(Endpoint::new(host, port))
            }
            None => Ok(Endpoint::new(entry.as_str(), default_port)),
        })
        .collect()
}

/// Main daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Pool identity and record acquisition.
    pub pool: PoolSection,
    /// Query command templates.
    #[serde(default)]
    pub commands: CommandsSection,
    /// Probe selection and scheduling.
    #[serde(default)]
    pub probe: ProbeSection,
    /// Slot classifier tuning.
    #[serde(default)]
    pub slots: SlotsSection,
    /// Job classifier tuning.
    #[serde(default)]
    pub jobs: JobsSection,
    /// Graphite delivery.
    #[serde(default)]
    pub graphite: GraphiteSection,
    /// InfluxDB delivery.
    #[serde(default)]
    pub influxdb: InfluxSection,
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DaemonError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DaemonError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.pool.name.is_empty() {
            return Err(DaemonError::Config("pool.name cannot be empty".to_string()));
        }

        if self.pool.address.is_empty() {
            return Err(DaemonError::Config(
                "pool.address cannot be empty".to_string(),
            ));
        }

        if self.pool.source == SourceKind::Files && self.pool.records_dir.is_none() {
            return Err(DaemonError::Config(
                "pool.records_dir is required with the files source".to_string(),
            ));
        }

        let unknown: Vec<&str> = self
            .probe
            .probes
            .iter()
            .map(String::as_str)
            .filter(|p| !KNOWN_PROBES.contains(p))
            .collect();
        if !unknown.is_empty() {
            return Err(DaemonError::Config(format!(
                "unknown probes: {} (known: {})",
                unknown.join(", "),
                KNOWN_PROBES.join(", ")
            )));
        }

        if self.probe.probes.is_empty() {
            return Err(DaemonError::Config(
                "probe.probes cannot be empty".to_string(),
            ));
        }

        if self.probe.interval_secs == 0 {
            return Err(DaemonError::Config(
                "probe.interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.probe.retries == 0 {
            return Err(DaemonError::Config(
                "probe.retries must be greater than 0".to_string(),
            ));
        }

        if self.probe.probes.iter().any(|p| p == "jobs") && self.pool.schedds.is_empty() {
            return Err(DaemonError::Config(
                "pool.schedds cannot be empty when the jobs probe is enabled".to_string(),
            ));
        }

        if self.probe.probes.iter().any(|p| p == "instances")
            && self.pool.source == SourceKind::Command
            && self.commands.instances.is_empty()
        {
            return Err(DaemonError::Config(
                "commands.instances is required when the instances probe is enabled".to_string(),
            ));
        }

        if self.graphite.enabled {
            if self.graphite.hosts.is_empty() {
                return Err(DaemonError::Config(
                    "graphite.hosts cannot be empty when graphite is enabled".to_string(),
                ));
            }
            if self.graphite.namespace.is_empty() {
                return Err(DaemonError::Config(
                    "graphite.namespace cannot be empty when graphite is enabled".to_string(),
                ));
            }
            self.graphite.endpoints()?;
        }

        if self.influxdb.enabled {
            if self.influxdb.hosts.is_empty() {
                return Err(DaemonError::Config(
                    "influxdb.hosts cannot be empty when influxdb is enabled".to_string(),
                ));
            }
            self.influxdb.endpoints()?;
            poolmon_transport::Schema::parse(&self.influxdb.schema)
                .map_err(|e| DaemonError::Config(e.to_string()))?;
        }

        Ok(())
    }
}
