//! The delivery worker.
//!
//! One task owns the live connection and the spool cursors, serializing all
//! transmission. Per dequeued item the ladder is: ensure connectivity
//! (identity frame first on every fresh connection), send the item on the hot
//! path, and on success reconcile the spool backlog over the live connection.
//! Every failure lands the affected frame in the spool and tears the
//! connection down; the next item retries a fresh connect immediately.
//!
//! Ordering: live items go out in dequeue order, and backlog is drained only
//! after whatever live item triggered the recovery. The spool stream and the
//! queue stream are each FIFO, but no total order holds across the two.

use std::{sync::Arc, time::Duration};

use courier_common::{Signal, internal, outgoing};
use courier_spool::{SpoolFile, frame};
use tokio::sync::{Mutex, broadcast};

use crate::{queue::EventReceiver, transport::Connector};

/// Connection state.
///
/// The option is the whole state: `None` is disconnected. Keeping it behind
/// one lock means the (connected, socket) pair can never be observed
/// half-updated by the shutdown path.
#[derive(Default)]
pub struct Link {
    conn: Option<Box<dyn crate::transport::Connection>>,
}

impl Link {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

/// The single delivery worker.
pub struct RelayWorker {
    spool: SpoolFile,
    connector: Arc<dyn Connector>,
    link: Arc<Mutex<Link>>,
    auth_frame: Vec<u8>,
    rx: EventReceiver,
    drain_interval: Duration,
}

impl RelayWorker {
    /// Build a worker around an opened spool and a transport.
    ///
    /// `identity_payload` is the raw identity message; it is framed here and
    /// resent verbatim as the first frame of every fresh connection.
    #[must_use]
    pub fn new(
        spool: SpoolFile,
        connector: Arc<dyn Connector>,
        identity_payload: &[u8],
        rx: EventReceiver,
        drain_interval: Duration,
    ) -> Self {
        let max = spool.max_message_size();
        let auth_frame =
            frame::encode(frame::clamp(identity_payload, max), max).unwrap_or_default();

        Self {
            spool,
            connector,
            link: Arc::new(Mutex::new(Link::default())),
            auth_frame,
            rx,
            drain_interval,
        }
    }

    /// Handle to the connection state, for observers outside the worker.
    #[must_use]
    pub fn link(&self) -> Arc<Mutex<Link>> {
        Arc::clone(&self.link)
    }

    /// Run the delivery loop until shutdown.
    ///
    /// Suspends on the submission queue; a periodic tick drains backlog over
    /// an otherwise idle connection so a populated spool cannot linger
    /// behind light traffic. On shutdown the queue is flushed to completion
    /// before the connection and spool are dropped, so no accepted item is
    /// lost mid-transition.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!("Relay worker starting");

        let mut drain_timer =
            tokio::time::interval(self.drain_interval.max(Duration::from_millis(1)));
        // Skip the first tick to avoid immediate execution
        drain_timer.tick().await;

        loop {
            tokio::select! {
                item = self.rx.recv() => {
                    match item {
                        Some(frame) => self.process(frame).await,
                        None => {
                            internal!("All event sinks dropped, relay worker stopping");
                            break;
                        }
                    }
                }
                _ = drain_timer.tick() => self.idle_drain().await,
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Relay worker received shutdown signal");
                        }
                        Err(e) => {
                            internal!(level = WARN, "Relay worker shutdown channel error: {e}");
                        }
                    }
                    self.flush().await;
                    break;
                }
            }
        }

        internal!("Relay worker shutdown complete");
    }

    /// Deliver one dequeued frame.
    async fn process(&mut self, frame: Vec<u8>) {
        let link = Arc::clone(&self.link);
        let mut link = link.lock().await;

        if link.conn.as_ref().is_some_and(|conn| !conn.is_alive()) {
            internal!(level = DEBUG, "Connection no longer alive, resetting");
            link.conn = None;
        }

        if link.conn.is_none()
            && !Self::establish(self.connector.as_ref(), &self.auth_frame, &mut link).await
        {
            Self::spool_frame(&mut self.spool, &frame);
            return;
        }

        let Some(conn) = link.conn.as_mut() else {
            return;
        };

        // Hot path: straight to the wire, no spool round-trip.
        if let Err(e) = conn.send(&frame).await {
            internal!(level = WARN, "Send failed ({e}), spooling event");
            link.conn = None;
            Self::spool_frame(&mut self.spool, &frame);
            return;
        }

        outgoing!("Sent {} byte frame", frame.len());
        Self::drain(&mut self.spool, &mut link).await;
    }

    /// Drain backlog over an idle connection.
    ///
    /// Never connects on its own: an outage should cost one bounded connect
    /// timeout per dequeued item, not a background retry loop.
    async fn idle_drain(&mut self) {
        let link = Arc::clone(&self.link);
        let mut link = link.lock().await;

        if link.conn.is_some() && !self.spool.is_empty() {
            internal!(level = DEBUG, "Idle drain tick, {} bytes spooled", self.spool.unread());
            Self::drain(&mut self.spool, &mut link).await;
        }
    }

    /// Process whatever is already queued, then return.
    async fn flush(&mut self) {
        while let Ok(frame) = self.rx.try_recv() {
            self.process(frame).await;
        }
    }

    /// Connect and send the identity frame. Returns whether `link` holds a
    /// usable connection afterwards.
    async fn establish(connector: &dyn Connector, auth_frame: &[u8], link: &mut Link) -> bool {
        let mut conn = match connector.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                internal!(level = DEBUG, "Connect failed: {e}");
                return false;
            }
        };

        if !auth_frame.is_empty()
            && let Err(e) = conn.send(auth_frame).await
        {
            internal!(level = WARN, "Identity handshake failed: {e}");
            return false;
        }

        internal!(level = DEBUG, "Connected to collector");
        link.conn = Some(conn);
        true
    }

    /// Send spooled frames until the spool is empty or the link dies.
    ///
    /// A frame that fails to send is pushed back at the tail, so per-stream
    /// order is best-effort after a mid-drain failure but nothing is lost. A
    /// corrupted frame stops this round; the spool has already truncated
    /// itself forward to the next boundary.
    async fn drain(spool: &mut SpoolFile, link: &mut Link) {
        loop {
            match spool.pop() {
                Ok(None) => break,
                Ok(Some(frame)) => {
                    let Some(conn) = link.conn.as_mut() else {
                        Self::spool_frame(spool, &frame);
                        break;
                    };

                    if let Err(e) = conn.send(&frame).await {
                        internal!(level = WARN, "Backlog send failed ({e}), spooling back");
                        link.conn = None;
                        Self::spool_frame(spool, &frame);
                        break;
                    }

                    outgoing!("Drained {} byte frame from backlog", frame.len());
                }
                Err(e) => {
                    internal!(level = WARN, "Backlog read failed: {e}");
                    break;
                }
            }
        }
    }

    /// Last-resort persistence; a spool failure here means the event is gone.
    fn spool_frame(spool: &mut SpoolFile, frame: &[u8]) {
        if let Err(e) = spool.push(frame) {
            internal!(level = ERROR, "Failed to spool event: {e}");
        }
    }
}
