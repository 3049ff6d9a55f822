//! The transport seam.
//!
//! The delivery worker consumes connectivity as an injected capability so the
//! pipeline can be exercised without a collector. [`TcpConnector`] is the real
//! implementation; [`MockConnector`] is the scripted test double.
//!
//! Every operation is bounded by the configured timeout (sub-second by
//! default) so the worker can never stall indefinitely on a dead peer.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

use crate::error::TransportError;

/// One live outbound link.
#[async_trait]
pub trait Connection: Send {
    /// Send the whole buffer or fail.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Whether the link still looks usable. Closing is dropping.
    fn is_alive(&self) -> bool;
}

/// Factory for [`Connection`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// Plain TCP transport to the collector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    #[must_use]
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TransportError::Timeout("connect"))??;

        Ok(Box::new(TcpConnection {
            stream,
            timeout: self.timeout,
        }))
    }
}

struct TcpConnection {
    stream: TcpStream,
    timeout: Duration,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        timeout(self.timeout, self.stream.write_all(bytes))
            .await
            .map_err(|_| TransportError::Timeout("send"))??;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.stream.peer_addr().is_ok()
    }
}

/// Scripted outcome for one `connect` call on the mock.
#[derive(Debug, Clone, Copy)]
enum ConnectOutcome {
    /// Refuse the connection outright.
    Refuse,
    /// Accept, then fail sends once `fail_after` of them have succeeded.
    Accept { fail_after: usize },
}

/// Mock implementation of [`Connector`] for testing.
///
/// Connect outcomes are consumed from a scripted plan; once the plan is
/// exhausted every connect succeeds and every send succeeds. All accepted
/// connections record their sent frames into one shared log.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    plan: Arc<Mutex<VecDeque<ConnectOutcome>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `count` connect attempts to be refused.
    ///
    /// # Panics
    /// Panics if the plan mutex is poisoned.
    pub fn refuse_next(&self, count: usize) {
        let mut plan = self.plan.lock().expect("MockConnector plan mutex poisoned");
        for _ in 0..count {
            plan.push_back(ConnectOutcome::Refuse);
        }
    }

    /// Script the next connect to be accepted, with its sends failing after
    /// `fail_after` successful ones.
    ///
    /// # Panics
    /// Panics if the plan mutex is poisoned.
    pub fn accept_then_fail_after(&self, fail_after: usize) {
        self.plan
            .lock()
            .expect("MockConnector plan mutex poisoned")
            .push_back(ConnectOutcome::Accept { fail_after });
    }

    /// Every frame successfully sent over any accepted connection, in order.
    ///
    /// # Panics
    /// Panics if the log mutex is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .expect("MockConnector sent mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let outcome = self
            .plan
            .lock()
            .expect("MockConnector plan mutex poisoned")
            .pop_front()
            .unwrap_or(ConnectOutcome::Accept {
                fail_after: usize::MAX,
            });

        match outcome {
            ConnectOutcome::Refuse => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted refusal",
            ))),
            ConnectOutcome::Accept { fail_after } => Ok(Box::new(MockConnection {
                sent: Arc::clone(&self.sent),
                remaining: fail_after,
                alive: true,
            })),
        }
    }
}

struct MockConnection {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    remaining: usize,
    alive: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.remaining == 0 {
            self.alive = false;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }

        if self.remaining != usize::MAX {
            self.remaining -= 1;
        }

        self.sent
            .lock()
            .expect("MockConnector sent mutex poisoned")
            .push(bytes.to_vec());
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
