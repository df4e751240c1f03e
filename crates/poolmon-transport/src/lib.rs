//! Delivery of frozen counter snapshots to time-series backends.
//!
//! Two wire formats share one failover policy: the Graphite pickle protocol
//! ([`GraphiteTransport`]) and InfluxDB line protocol ([`InfluxTransport`]).
//! Both split a snapshot into size-bounded batches and walk an ordered
//! endpoint list, dropping unreachable endpoints until one accepts the full
//! delivery.
//!
//! ```no_run
//! use poolmon_core::{CounterSet, Rule};
//! use poolmon_transport::{Endpoint, GraphiteConfig, GraphiteTransport, TcpSink};
//!
//! # async fn example() -> poolmon_transport::Result<()> {
//! let mut counters = CounterSet::new();
//! counters.add("Claimed.NumSlots", 12.0, Rule::Sum);
//!
//! let transport = GraphiteTransport::new(
//!     TcpSink::new(),
//!     vec![Endpoint::new("graphite01", 2004)],
//!     GraphiteConfig::default(),
//! );
//! transport
//!     .deliver("probes.pool", &counters.freeze(), 1_700_000_000.0)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/poolmon-transport/0.1.0")]
#![warn(missing_docs)]

mod error;
mod graphite;
mod influx;
mod pickle;
mod sink;

pub use error::{Result, TransportError};
pub use graphite::{GraphiteConfig, GraphiteTransport};
pub use influx::{InfluxConfig, InfluxTransport, Schema};
pub use pickle::{Point, encode_batch, frame};
pub use sink::{BatchSink, Endpoint, TcpSink, deliver_batches};
