//! The per-cycle collect/classify/deliver pipeline.
//!
//! Each cycle builds a fresh counter set per probe, classifies every record
//! the query client could fetch, and hands the frozen snapshot to the
//! enabled transports. A probe with no reachable targets skips delivery for
//! the cycle; delivery failures are logged and never abort the loop. When at
//! least one probe delivered, the cycle duration is reported under the meta
//! namespace; a cycle where every probe came up empty reports nothing.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use poolmon_core::{
    BucketTable, CounterSet, CounterSnapshot, CpuUtilization, InstanceClassifier, JobClassifier,
    JobClassifierConfig, PriorityClassifier, SlotClassifier, SlotClassifierConfig,
    StatusClassifier,
};
use poolmon_query::{PoolClient, RetryPolicy, Target};
use poolmon_transport::{
    Endpoint, GraphiteConfig, GraphiteTransport, InfluxConfig, InfluxTransport, Schema, TcpSink,
};

use crate::config::{DaemonConfig, SourceKind};
use crate::error::{DaemonError, Result};
use crate::source::{CommandSource, DaemonSource, FileSource};

/// Daemon kinds polled by the status probe, one query target each.
const STATUS_DAEMON_KINDS: [&str; 3] = ["collector", "negotiator", "schedd"];

/// The probe daemon: configuration plus resolved delivery endpoints.
pub struct Probe {
    config: DaemonConfig,
    sources: Vec<(String, DaemonSource)>,
    graphite_endpoints: Vec<Endpoint>,
    influx_endpoints: Vec<Endpoint>,
    influx_schema: Option<Schema>,
}

impl Probe {
    /// Resolves sources and endpoints from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error for an unusable source or endpoint list.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let sources = config
            .probe
            .probes
            .iter()
            .map(|probe| Ok((probe.clone(), source_for(&config, probe)?)))
            .collect::<Result<Vec<_>>>()?;

        let graphite_endpoints = if config.graphite.enabled {
            config.graphite.endpoints()?
        } else {
            Vec::new()
        };

        let (influx_endpoints, influx_schema) = if config.influxdb.enabled {
            let schema = Schema::parse(&config.influxdb.schema)
                .map_err(|e| DaemonError::Config(e.to_string()))?;
            (config.influxdb.endpoints()?, Some(schema))
        } else {
            (Vec::new(), None)
        };

        Ok(Self {
            config,
            sources,
            graphite_endpoints,
            influx_endpoints,
            influx_schema,
        })
    }

    /// Runs cycles until told to stop.
    ///
    /// `once` and test mode run a single cycle; otherwise the loop sleeps
    /// out the remainder of the configured interval between cycle starts.
    pub async fn run(&self) {
        loop {
            let started = Instant::now();
            self.run_cycle().await;

            if self.config.probe.once || self.config.probe.test {
                info!("single cycle requested, exiting");
                return;
            }

            let interval = Duration::from_secs(self.config.probe.interval_secs);
            let sleep_for = interval.saturating_sub(started.elapsed());
            debug!(seconds = sleep_for.as_secs(), "sleeping until next cycle");
            tokio::time::sleep(sleep_for).await;
        }
    }

    async fn run_cycle(&self) {
        let started = Instant::now();
        let timestamp = Utc::now().timestamp() as f64;

        let mut delivered = 0usize;
        for (probe, source) in &self.sources {
            match self.collect(probe, source).await {
                Some(snapshot) => {
                    self.deliver(probe, &snapshot, timestamp).await;
                    delivered += 1;
                }
                None => warn!(probe, "no records this cycle, nothing delivered"),
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        if delivered == 0 {
            warn!(seconds = elapsed, "every probe came up empty, skipping meta report");
            return;
        }
        info!(seconds = elapsed, "cycle complete");
        self.report_meta(elapsed, timestamp).await;
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.probe.retries,
            retry_delay: Duration::from_secs(self.config.probe.retry_delay_secs),
        }
    }

    async fn collect(&self, probe: &str, source: &DaemonSource) -> Option<CounterSnapshot> {
        let client = PoolClient::with_policy(source.clone(), self.retry_policy());
        match probe {
            "slots" => self.collect_slots(&client).await,
            "jobs" => self.collect_jobs(&client).await,
            "status" => self.collect_status(&client).await,
            "priorities" => self.collect_priorities(&client).await,
            "instances" => self.collect_instances(&client).await,
            other => {
                // Probe names are validated at startup.
                error!(probe = other, "unrecognized probe skipped");
                None
            }
        }
    }

    async fn collect_slots(&self, client: &PoolClient<DaemonSource>) -> Option<CounterSnapshot> {
        let targets = vec![Target::new(
            self.config.pool.name.clone(),
            self.config.pool.address.clone(),
        )];
        let results = client.query_all(&targets).await?;

        let classifier = SlotClassifier::new(SlotClassifierConfig {
            extra_dims: self.config.slots.extra_dims.clone(),
            ownership: self.config.slots.ownership,
            default_group: self.config.slots.default_group.clone(),
        });

        let mut counters = CounterSet::new();
        let mut total = 0;
        for (_, records) in &results {
            total += records.len();
            for record in records {
                classifier.classify(record, &mut counters);
            }
        }
        info!(slots = total, counters = counters.len(), "classified slot records");
        Some(counters.freeze())
    }

    async fn collect_jobs(&self, client: &PoolClient<DaemonSource>) -> Option<CounterSnapshot> {
        let targets: Vec<Target> = self
            .config
            .pool
            .schedds
            .iter()
            .map(|schedd| Target::new(schedd.clone(), self.config.pool.address.clone()))
            .collect();
        let results = client.query_all(&targets).await?;

        let classifier = JobClassifier::new(JobClassifierConfig {
            experiment: self.config.jobs.experiment,
            home_site: self.config.jobs.home_site.clone(),
            buckets: BucketTable::default_ages(),
        });

        let mut counters = CounterSet::new();
        let mut total = 0;
        for (target, records) in &results {
            total += records.len();
            for record in records {
                classifier.classify(record, &target.name, &mut counters);
            }
        }
        info!(jobs = total, counters = counters.len(), "classified job records");
        Some(counters.freeze())
    }

    async fn collect_status(&self, client: &PoolClient<DaemonSource>) -> Option<CounterSnapshot> {
        let targets: Vec<Target> = STATUS_DAEMON_KINDS
            .into_iter()
            .map(|kind| Target::new(kind, self.config.pool.address.clone()))
            .collect();
        let results = client.query_all(&targets).await?;

        let classifier = StatusClassifier::new();

        let mut counters = CounterSet::new();
        let mut total = 0;
        for (target, records) in &results {
            total += records.len();
            for record in records {
                classifier.classify(&target.name, record, &mut counters);
            }
        }
        info!(
            daemons = total,
            counters = counters.len(),
            "classified daemon status records"
        );
        Some(counters.freeze())
    }

    async fn collect_priorities(
        &self,
        client: &PoolClient<DaemonSource>,
    ) -> Option<CounterSnapshot> {
        let targets = vec![Target::new(
            "negotiator",
            self.config.pool.address.clone(),
        )];
        let results = client.query_all(&targets).await?;

        let classifier = PriorityClassifier::new();
        let now = Utc::now().timestamp();

        let mut counters = CounterSet::new();
        let mut total = 0;
        for (_, records) in &results {
            total += records.len();
            for record in records {
                classifier.classify(record, now, &mut counters);
            }
        }
        info!(
            users = total,
            counters = counters.len(),
            "classified priority records"
        );
        Some(counters.freeze())
    }

    async fn collect_instances(
        &self,
        client: &PoolClient<DaemonSource>,
    ) -> Option<CounterSnapshot> {
        let targets = vec![Target::new(
            self.config.pool.name.clone(),
            self.config.pool.address.clone(),
        )];
        let results = client.query_all(&targets).await?;

        let classifier = InstanceClassifier::new();

        let mut counters = CounterSet::new();
        let mut total = 0;
        for (_, records) in &results {
            total += records.len();
            for record in records {
                let region = record.str_or("Region", "unknown").to_string();
                let cpu = CpuUtilization {
                    avg: record.get_f64("CpuAvg"),
                    min: record.get_f64("CpuMin"),
                    max: record.get_f64("CpuMax"),
                };
                let cpu =
                    (cpu.avg.is_some() || cpu.min.is_some() || cpu.max.is_some()).then_some(cpu);
                classifier.classify(&region, record, cpu, &mut counters);
            }
        }
        info!(
            instances = total,
            counters = counters.len(),
            "classified instance records"
        );
        Some(counters.freeze())
    }

    async fn deliver(&self, probe: &str, snapshot: &CounterSnapshot, timestamp: f64) {
        if snapshot.is_empty() {
            debug!(probe, "empty snapshot, nothing to deliver");
            return;
        }

        if self.config.probe.test {
            for (path, value) in snapshot.iter() {
                debug!(probe, %path, value, "would send");
            }
            info!(probe, points = snapshot.len(), "test mode, delivery suppressed");
            return;
        }

        if self.config.graphite.enabled {
            let namespace = format!("{}.{probe}", self.config.graphite.namespace);
            let transport = GraphiteTransport::new(
                TcpSink::new(),
                self.graphite_endpoints.clone(),
                GraphiteConfig::default(),
            );
            if let Err(err) = transport.deliver(&namespace, snapshot, timestamp).await {
                error!(probe, error = %err, "graphite delivery failed");
            }
        }

        if let Some(schema) = &self.influx_schema {
            let transport = InfluxTransport::new(
                TcpSink::new(),
                self.influx_endpoints.clone(),
                schema.clone(),
                InfluxConfig {
                    tags: self.config.influxdb.tags.clone(),
                    ..InfluxConfig::default()
                },
            );
            if let Err(err) = transport.deliver(snapshot, timestamp).await {
                error!(probe, error = %err, "influxdb delivery failed");
            }
        }
    }

    /// Reports the cycle duration under the meta namespace.
    async fn report_meta(&self, elapsed: f64, timestamp: f64) {
        let mut counters = CounterSet::new();
        counters.set_derived("update_time", elapsed);
        let snapshot = counters.freeze();

        if self.config.probe.test {
            debug!(update_time = elapsed, "test mode, meta delivery suppressed");
            return;
        }

        if self.config.graphite.enabled && !self.config.graphite.meta_namespace.is_empty() {
            let transport = GraphiteTransport::new(
                TcpSink::new(),
                self.graphite_endpoints.clone(),
                GraphiteConfig::default(),
            );
            if let Err(err) = transport
                .deliver(&self.config.graphite.meta_namespace, &snapshot, timestamp)
                .await
            {
                error!(error = %err, "meta delivery failed");
            }
        }
    }
}

fn source_for(config: &DaemonConfig, probe: &str) -> Result<DaemonSource> {
    match config.pool.source {
        SourceKind::Files => {
            let root = config.pool.records_dir.as_ref().ok_or_else(|| {
                DaemonError::Config("pool.records_dir is required with the files source".to_string())
            })?;
            Ok(DaemonSource::Files(FileSource::new(root.join(probe))))
        }
        SourceKind::Command => {
            let argv = match probe {
                "slots" => &config.commands.slots,
                "jobs" => &config.commands.jobs,
                "status" => &config.commands.status,
                "priorities" => &config.commands.priorities,
                "instances" => &config.commands.instances,
                other => {
                    return Err(DaemonError::Config(format!("unknown probe '{other}'")));
                }
            };
            Ok(DaemonSource::Command(CommandSource::new(argv)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    fn write_records(dir: &Path, probe: &str, target: &str, payload: &str) {
        let probe_dir = dir.join(probe);
        std::fs::create_dir_all(&probe_dir).expect("mkdir");
        let mut file =
            std::fs::File::create(probe_dir.join(format!("{target}.json"))).expect("create");
        file.write_all(payload.as_bytes()).expect("write");
    }

    fn test_config(records_dir: &Path) -> DaemonConfig {
        let toml = format!(
            r#"
            [pool]
            name = "testpool"
            address = "cm.example.net"
            schedds = ["schedd1"]
            source = "files"
            records_dir = "{}"

            [probe]
            probes = ["slots", "jobs"]
            retries = 1
            retry_delay_secs = 1
            test = true

            [graphite]
            enabled = false
        "#,
            records_dir.display()
        );
        DaemonConfig::from_toml(&toml).expect("valid test config")
    }

    #[tokio::test]
    async fn test_mode_runs_one_cycle_without_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_records(
            dir.path(),
            "slots",
            "testpool",
            r#"[{"SlotType": "Static", "State": "Claimed", "Owner": "alice"}]"#,
        );
        write_records(
            dir.path(),
            "jobs",
            "schedd1",
            r#"[{"JobStatus": 2, "Owner": "alice", "ServerTime": 1000, "JobCurrentStartDate": 900}]"#,
        );

        let probe = Probe::new(test_config(dir.path())).expect("probe");
        // Single cycle; returns instead of looping because test mode is set.
        probe.run().await;
    }

    fn graphite_config(records_dir: &Path, port: u16) -> DaemonConfig {
        let toml = format!(
            r#"
            [pool]
            name = "testpool"
            address = "cm.example.net"
            source = "files"
            records_dir = "{}"

            [probe]
            probes = ["slots"]
            retries = 1
            retry_delay_secs = 1
            once = true

            [graphite]
            hosts = ["127.0.0.1:{port}"]
            namespace = "clusters.testpool"
            meta_namespace = "probes.testpool"
        "#,
            records_dir.display()
        );
        DaemonConfig::from_toml(&toml).expect("valid test config")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    #[tokio::test]
    async fn successful_cycle_reports_update_time() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        // One connection per delivery: the slot snapshot, then the meta report.
        let server = tokio::spawn(async move {
            let mut payloads = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.expect("accept");
                let mut buf = Vec::new();
                tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut buf)
                    .await
                    .expect("read");
                payloads.push(buf);
            }
            payloads
        });

        let dir = tempfile::tempdir().expect("tempdir");
        write_records(
            dir.path(),
            "slots",
            "testpool",
            r#"[{"SlotType": "Static", "State": "Claimed", "Owner": "alice"}]"#,
        );
        let probe = Probe::new(graphite_config(dir.path(), port)).expect("probe");
        probe.run().await;

        let payloads = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("both deliveries arrive")
            .expect("server task");
        assert!(contains(&payloads[0], b"clusters.testpool.slots"));
        assert!(contains(&payloads[1], b"probes.testpool.update_time"));
    }

    #[tokio::test]
    async fn failed_cycle_skips_update_time() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let dir = tempfile::tempdir().expect("tempdir");
        // No record files: the only configured probe fails its cycle.
        let probe = Probe::new(graphite_config(dir.path(), port)).expect("probe");
        probe.run().await;

        let waited = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(waited.is_err(), "nothing should connect after a failed cycle");
    }

    #[tokio::test]
    async fn missing_record_files_do_not_abort_the_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        // No record files at all: every target is unreachable.
        let probe = Probe::new(test_config(dir.path())).expect("probe");
        probe.run().await;
    }

    #[test]
    fn collect_routes_reject_nothing_at_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.probe.probes = vec![
            "status".to_string(),
            "priorities".to_string(),
            "instances".to_string(),
        ];
        let probe = Probe::new(config).expect("all known probes resolvable with files source");
        assert_eq!(probe.sources.len(), 3);
    }

    #[tokio::test]
    async fn status_probe_reports_per_daemon_gauges() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = tokio::spawn(async move {
            let mut payload = Vec::new();
            let (mut stream, _) = listener.accept().await.expect("accept");
            tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut payload)
                .await
                .expect("read");
            payload
        });

        let dir = tempfile::tempdir().expect("tempdir");
        write_records(
            dir.path(),
            "status",
            "collector",
            r#"[{"Name": "cm.example.net", "RunningJobs": 7}]"#,
        );
        write_records(
            dir.path(),
            "status",
            "schedd",
            r#"[{"Name": "schedd1.example.net", "TotalIdleJobs": 3}]"#,
        );

        let mut config = graphite_config(dir.path(), port);
        config.probe.probes = vec!["status".to_string()];
        config.graphite.meta_namespace = String::new();
        let probe = Probe::new(config).expect("probe");
        probe.run().await;

        let payload = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("delivery arrives")
            .expect("server task");
        assert!(contains(
            &payload,
            b"clusters.testpool.status.collector.cm_example_net.RunningJobs"
        ));
        assert!(contains(
            &payload,
            b"clusters.testpool.status.schedd.schedd1_example_net.TotalIdleJobs"
        ));
    }

    #[test]
    fn empty_command_argv_is_a_startup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.pool.source = SourceKind::Command;
        config.commands.slots = Vec::new();
        assert!(Probe::new(config).is_err());
    }
}
