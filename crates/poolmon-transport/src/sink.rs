//! Endpoint sinks and the failover delivery loop.
//!
//! A [`BatchSink`] sends one opaque payload to one endpoint; the
//! [`deliver_batches`] loop owns the failover policy shared by all wire
//! formats: try every batch against the first endpoint, drop the endpoint
//! from the in-memory working list on any error, and fail the delivery only
//! when the list is exhausted. Delivery to an endpoint is all-or-nothing;
//! there is no partial success across endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::error::{Result, TransportError};

/// One metrics destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Sends one payload to one endpoint.
#[allow(async_fn_in_trait)]
pub trait BatchSink: Send + Sync {
    /// Sends the payload, returning an error on any transport problem.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the payload could not be fully
    /// written.
    async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<()>;
}

/// Plain-stream TCP sink with connect and write timeouts.
#[derive(Debug, Clone)]
pub struct TcpSink {
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Timeout for writing one payload.
    pub write_timeout: Duration,
}

impl Default for TcpSink {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
        }
    }
}

impl TcpSink {
    /// Creates a sink with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchSink for TcpSink {
    async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<()> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        let send_err = |reason: String| TransportError::Send {
            endpoint: endpoint.to_string(),
            reason,
        };

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| send_err("connect timed out".to_string()))?
            .map_err(|e| send_err(e.to_string()))?;

        tokio::time::timeout(self.write_timeout, stream.write_all(payload))
            .await
            .map_err(|_| send_err("write timed out".to_string()))?
            .map_err(|e| send_err(e.to_string()))?;

        stream
            .shutdown()
            .await
            .map_err(|e| send_err(e.to_string()))?;
        Ok(())
    }
}

/// Delivers all batches to the first endpoint that accepts every one.
///
/// # Errors
///
/// Returns [`TransportError::NoEndpoints`] for an empty endpoint list and
/// [`TransportError::AllEndpointsFailed`] when no endpoint completed a full
/// delivery.
pub async fn deliver_batches<S: BatchSink>(
    sink: &S,
    endpoints: &[Endpoint],
    batches: &[Vec<u8>],
) -> Result<()> {
    if endpoints.is_empty() {
        return Err(TransportError::NoEndpoints);
    }

    for endpoint in endpoints {
        match send_all(sink, endpoint, batches).await {
            Ok(()) => {
                info!(%endpoint, batches = batches.len(), "delivery complete");
                return Ok(());
            }
            Err(err) => {
                warn!(%endpoint, error = %err, "endpoint failed, trying next");
            }
        }
    }

    Err(TransportError::AllEndpointsFailed {
        attempted: endpoints.len(),
    })
}

async fn send_all<S: BatchSink>(
    sink: &S,
    endpoint: &Endpoint,
    batches: &[Vec<u8>],
) -> Result<()> {
    for batch in batches {
        sink.send(endpoint, batch).await?;
    }
    Ok(())
}

/// Test double recording attempted endpoints; shared by transport tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{BatchSink, Endpoint};
    use crate::error::{Result, TransportError};

    /// Records attempted endpoints; fails endpoints in the `dead` list.
    pub(crate) struct RecordingSink {
        pub dead: Vec<String>,
        pub attempts: Mutex<Vec<String>>,
        pub payloads: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingSink {
        pub(crate) fn new(dead: &[&str]) -> Self {
            Self {
                dead: dead.iter().map(ToString::to_string).collect(),
                attempts: Mutex::new(Vec::new()),
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl BatchSink for RecordingSink {
        async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<()> {
            self.attempts
                .lock()
                .expect("lock")
                .push(endpoint.to_string());
            if self.dead.contains(&endpoint.host) {
                return Err(TransportError::Send {
                    endpoint: endpoint.to_string(),
                    reason: "simulated failure".to_string(),
                });
            }
            self.payloads.lock().expect("lock").push(payload.to_vec());
            Ok(())
        }
    }
}
