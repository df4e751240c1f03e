//! Graphite pickle transport.
//!
//! Serializes a frozen counter snapshot into size-bounded pickle batches and
//! delivers them to the first reachable endpoint from an ordered, optionally
//! shuffled, list.

use rand::seq::SliceRandom;
use tracing::debug;

use poolmon_core::CounterSnapshot;

use crate::error::Result;
use crate::pickle::{self, Point};
use crate::sink::{BatchSink, Endpoint, deliver_batches};

/// Configuration for [`GraphiteTransport`].
#[derive(Debug, Clone)]
pub struct GraphiteConfig {
    /// Maximum points per pickle message.
    pub batch_size: usize,
    /// Shuffle the endpoint list at construction to spread load across
    /// equally-valid destinations.
    pub shuffle: bool,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            shuffle: true,
        }
    }
}

/// Delivers counter snapshots to a Graphite pickle port.
#[derive(Debug, Clone)]
pub struct GraphiteTransport<S> {
    sink: S,
    endpoints: Vec<Endpoint>,
    batch_size: usize,
}

impl<S: BatchSink> GraphiteTransport<S> {
    /// Creates a transport over the given endpoints.
    #[must_use]
    pub fn new(sink: S, mut endpoints: Vec<Endpoint>, config: GraphiteConfig) -> Self {
        if config.shuffle {
            endpoints.shuffle(&mut rand::thread_rng());
        }
        Self {
            sink,
            endpoints,
            batch_size: config.batch_size.max(1),
        }
    }

    /// The endpoint order this transport will attempt.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Delivers every counter under `namespace.<path>` with one timestamp.
    ///
    /// The snapshot is only read; on failure it remains available for the
    /// caller to retry in a later cycle.
    ///
    /// # Errors
    ///
    /// Returns an error when every endpoint fails before a complete
    /// delivery.
    pub async fn deliver(
        &self,
        namespace: &str,
        snapshot: &CounterSnapshot,
        timestamp: f64,
    ) -> Result<()> {
        let points: Vec<Point> = snapshot
            .iter()
            .map(|(path, value)| (format!("{namespace}.{path}"), (timestamp, value)))
            .collect();
        for point in &points {
            debug!(path = %point.0, value = point.1 .1, "queued point");
        }

        let batches: Vec<Vec<u8>> = points
            .chunks(self.batch_size)
            .map(|chunk| pickle::frame(pickle::encode_batch(chunk)))
            .collect();

        deliver_batches(&self.sink, &self.endpoints, &batches).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use poolmon_core::{CounterSet, Rule};

    fn snapshot(n: usize) -> CounterSnapshot {
        let mut set = CounterSet::new();
        for i in 0..n {
            set.add(format!("m.{i:04}"), i as f64, Rule::Sum);
        }
        set.freeze()
    }

    fn no_shuffle() -> GraphiteConfig {
        GraphiteConfig {
            shuffle: false,
            ..GraphiteConfig::default()
        }
    }

    #[tokio::test]
    async fn batches_capped_at_batch_size() {
        let sink = RecordingSink::new(&[]);
        let transport = GraphiteTransport::new(
            sink,
            vec![Endpoint::new("g1", 2004)],
            GraphiteConfig {
                batch_size: 100,
                shuffle: false,
            },
        );
        transport
            .deliver("ns", &snapshot(250), 1_700_000_000.0)
            .await
            .expect("delivery");
        let payloads = transport.sink.payloads.lock().expect("lock");
        assert_eq!(payloads.len(), 3); // 100 + 100 + 50
    }

    #[tokio::test]
    async fn failover_succeeds_after_two_dead_endpoints() {
        let sink = RecordingSink::new(&["g1", "g2"]);
        let transport = GraphiteTransport::new(
            sink,
            vec![
                Endpoint::new("g1", 2004),
                Endpoint::new("g2", 2004),
                Endpoint::new("g3", 2004),
            ],
            no_shuffle(),
        );
        transport
            .deliver("ns", &snapshot(5), 0.0)
            .await
            .expect("third endpoint accepts");
        let attempts = transport.sink.attempts.lock().expect("lock");
        assert_eq!(*attempts, vec!["g1:2004", "g2:2004", "g3:2004"]);
    }

    #[tokio::test]
    async fn total_failure_leaves_snapshot_usable() {
        let sink = RecordingSink::new(&["g1"]);
        let transport =
            GraphiteTransport::new(sink, vec![Endpoint::new("g1", 2004)], no_shuffle());
        let snap = snapshot(10);
        let err = transport.deliver("ns", &snap, 0.0).await.expect_err("dead");
        assert!(matches!(
            err,
            crate::TransportError::AllEndpointsFailed { attempted: 1 }
        ));
        // The snapshot is untouched and can be retried.
        assert_eq!(snap.len(), 10);
        assert_eq!(snap.get("m.0003"), Some(3.0));
    }

    #[tokio::test]
    async fn payload_is_framed_pickle_with_namespace() {
        let sink = RecordingSink::new(&[]);
        let transport =
            GraphiteTransport::new(sink, vec![Endpoint::new("g1", 2004)], no_shuffle());
        transport
            .deliver("probes.pool", &snapshot(1), 123.0)
            .await
            .expect("delivery");
        let payloads = transport.sink.payloads.lock().expect("lock");
        let message = &payloads[0];
        let length = u32::from_be_bytes([message[0], message[1], message[2], message[3]]);
        assert_eq!(length as usize, message.len() - 4);
        let body = &message[4..];
        let needle = b"probes.pool.m.0000";
        assert!(
            body.windows(needle.len()).any(|w| w == needle),
            "namespaced path present in pickle body"
        );
    }

    #[test]
    fn shuffle_keeps_endpoint_set() {
        let sink = RecordingSink::new(&[]);
        let endpoints: Vec<Endpoint> =
            (0..20).map(|i| Endpoint::new(format!("g{i}"), 2004)).collect();
        let transport = GraphiteTransport::new(
            sink,
            endpoints.clone(),
            GraphiteConfig {
                shuffle: true,
                ..GraphiteConfig::default()
            },
        );
        let mut shuffled = transport.endpoints().to_vec();
        shuffled.sort_by(|a, b| a.host.cmp(&b.host));
        let mut original = endpoints;
        original.sort_by(|a, b| a.host.cmp(&b.host));
        assert_eq!(shuffled, original);
    }
}
