//! InfluxDB line-protocol transport.
//!
//! The columnar backend wants tags, not deep paths, so a caller-declared
//! schema string describes what each path segment means (e.g.
//! `region.az.group.type.key.state.measurement`). The leading segments of
//! each counter path become tag values under the schema's keys; the
//! remaining segments form the measurement name. A fixed set of tags (e.g.
//! an account identifier) is attached to every point.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use poolmon_core::CounterSnapshot;

use crate::error::{Result, TransportError};
use crate::sink::{BatchSink, Endpoint, deliver_batches};

/// Parsed path-segment schema.
///
/// The final component must be the literal `measurement`; the components
/// before it name the tag keys for the corresponding path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    tag_keys: Vec<String>,
}

impl Schema {
    /// Parses a dotted schema string.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidSchema`] when the string does not
    /// end in `measurement` or declares no tag keys.
    pub fn parse(schema: &str) -> Result<Self> {
        let mut keys: Vec<String> = schema.split('.').map(ToString::to_string).collect();
        match keys.pop() {
            Some(last) if last == "measurement" => {}
            _ => {
                return Err(TransportError::InvalidSchema {
                    schema: schema.to_string(),
                    reason: "must end in 'measurement'".to_string(),
                });
            }
        }
        if keys.is_empty() || keys.iter().any(String::is_empty) {
            return Err(TransportError::InvalidSchema {
                schema: schema.to_string(),
                reason: "needs at least one non-empty tag key".to_string(),
            });
        }
        Ok(Self { tag_keys: keys })
    }

    /// Number of leading path segments consumed as tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tag_keys.len()
    }
}

/// Configuration for [`InfluxTransport`].
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Maximum lines per write.
    pub batch_size: usize,
    /// Fixed tags attached to every point.
    pub tags: BTreeMap<String, String>,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            tags: BTreeMap::new(),
        }
    }
}

/// Delivers counter snapshots as line-protocol writes.
#[derive(Debug, Clone)]
pub struct InfluxTransport<S> {
    sink: S,
    endpoints: Vec<Endpoint>,
    schema: Schema,
    config: InfluxConfig,
}

impl<S: BatchSink> InfluxTransport<S> {
    /// Creates a transport over the given endpoints.
    #[must_use]
    pub fn new(sink: S, endpoints: Vec<Endpoint>, schema: Schema, config: InfluxConfig) -> Self {
        Self {
            sink,
            endpoints,
            schema,
            config,
        }
    }

    /// Delivers every counter as one point with one timestamp.
    ///
    /// Paths shorter than the schema are logged and skipped; they cannot be
    /// tagged meaningfully.
    ///
    /// # Errors
    ///
    /// Returns an error when every endpoint fails before a complete
    /// delivery.
    pub async fn deliver(&self, snapshot: &CounterSnapshot, timestamp: f64) -> Result<()> {
        let mut lines = Vec::with_capacity(snapshot.len());
        for (path, value) in snapshot.iter() {
            match self.point_line(path, value, timestamp) {
                Some(line) => {
                    debug!(%line, "queued point");
                    lines.push(line);
                }
                None => {
                    warn!(%path, schema_tags = self.schema.tag_count(), "path too short for schema, skipped");
                }
            }
        }

        let batches: Vec<Vec<u8>> = lines
            .chunks(self.config.batch_size.max(1))
            .map(|chunk| {
                let mut body = chunk.join("\n");
                body.push('\n');
                body.into_bytes()
            })
            .collect();

        deliver_batches(&self.sink, &self.endpoints, &batches).await
    }

    fn point_line(&self, path: &str, value: f64, timestamp: f64) -> Option<String> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() <= self.schema.tag_keys.len() {
            return None;
        }
        let (tag_values, measurement) = segments.split_at(self.schema.tag_keys.len());

        let mut tags: Vec<String> = self
            .schema
            .tag_keys
            .iter()
            .zip(tag_values)
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        tags.extend(self.config.tags.iter().map(|(k, v)| format!("{k}={v}")));

        let ts_ns = (timestamp * 1e9) as i64;
        Some(format!(
            "{},{} value={} {}",
            measurement.join("_"),
            tags.join(","),
            value,
            ts_ns
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use poolmon_core::{CounterSet, Rule};

    fn schema() -> Schema {
        Schema::parse("region.az.group.type.key.state.measurement").expect("valid schema")
    }

    #[test]
    fn schema_must_end_in_measurement() {
        assert!(Schema::parse("region.az").is_err());
        assert!(Schema::parse("measurement").is_err());
        assert!(Schema::parse("a..measurement").is_err());
        assert_eq!(schema().tag_count(), 6);
    }

    fn instance_snapshot() -> CounterSnapshot {
        let mut set = CounterSet::new();
        set.add(
            "us-west-2.us-west-2a.none.m4_large.fleet.running.count",
            3.0,
            Rule::Sum,
        );
        set.add(
            "us-west-2.us-west-2a.none.m4_large.fleet.running.cpu_avg",
            42.5,
            Rule::Sum,
        );
        set.freeze()
    }

    #[tokio::test]
    async fn lines_carry_schema_and_fixed_tags() {
        let mut config = InfluxConfig::default();
        config
            .tags
            .insert("account".to_string(), "prod".to_string());
        let transport = InfluxTransport::new(
            RecordingSink::new(&[]),
            vec![Endpoint::new("influx1", 8086)],
            schema(),
            config,
        );
        transport
            .deliver(&instance_snapshot(), 100.0)
            .await
            .expect("delivery");

        let payloads = transport.sink.payloads.lock().expect("lock");
        let body = String::from_utf8(payloads[0].clone()).expect("utf8");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "count,region=us-west-2,az=us-west-2a,group=none,type=m4_large,key=fleet,state=running,account=prod value=3 100000000000"
        );
        assert!(lines[1].starts_with("cpu_avg,"));
        assert!(lines[1].contains("value=42.5"));
    }

    #[tokio::test]
    async fn short_paths_are_skipped_not_fatal() {
        let mut set = CounterSet::new();
        set.add("too.short", 1.0, Rule::Sum);
        set.add(
            "us-west-2.az.g.t.k.running.count",
            2.0,
            Rule::Sum,
        );
        let transport = InfluxTransport::new(
            RecordingSink::new(&[]),
            vec![Endpoint::new("influx1", 8086)],
            schema(),
            InfluxConfig::default(),
        );
        transport.deliver(&set.freeze(), 1.0).await.expect("delivery");
        let payloads = transport.sink.payloads.lock().expect("lock");
        let body = String::from_utf8(payloads[0].clone()).expect("utf8");
        assert_eq!(body.lines().count(), 1);
    }

    #[tokio::test]
    async fn failover_applies_to_influx_too() {
        let transport = InfluxTransport::new(
            RecordingSink::new(&["influx1"]),
            vec![
                Endpoint::new("influx1", 8086),
                Endpoint::new("influx2", 8086),
            ],
            schema(),
            InfluxConfig::default(),
        );
        transport
            .deliver(&instance_snapshot(), 1.0)
            .await
            .expect("second endpoint accepts");
        let attempts = transport.sink.attempts.lock().expect("lock");
        assert_eq!(*attempts, vec!["influx1:8086", "influx2:8086"]);
    }
}
