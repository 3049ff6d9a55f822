use std::time::Duration;

use serde::Deserialize;

use crate::transport::TcpConnector;

const fn default_port() -> u16 {
    6734
}

const fn default_queue_depth() -> usize {
    1024
}

const fn default_timeout_ms() -> u64 {
    500
}

const fn default_drain_interval_secs() -> u64 {
    30
}

/// Configuration for the delivery side of the pipeline.
///
/// In RON config:
/// ```ron
/// Courier (
///     relay: (
///         collector: "198.51.100.7",
///         port: 6734,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Collector host (address or name).
    pub collector: String,

    /// Collector TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Capacity of the submission queue. Producers beyond this depth have
    /// their events dropped, never blocked.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Bound on every connect and send, in milliseconds. Keeps the worker
    /// from stalling on a dead peer.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often to drain spooled backlog over an otherwise idle
    /// connection, in seconds.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
}

impl RelayConfig {
    #[must_use]
    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(&self.collector, self.port, self.timeout())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }
}
