use std::sync::{Arc, LazyLock};

use courier_common::{Signal, identity::Identity, internal, logging};
use courier_relay::{RelayConfig, RelayWorker, queue};
use courier_spool::{SpoolConfig, SpoolFile};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::monitor::{Monitor, MonitorConfig};

/// The agent: configuration in, serving pipeline out.
#[derive(Deserialize)]
pub struct Courier {
    relay: RelayConfig,
    #[serde(default)]
    spool: SpoolConfig,
    #[serde(default)]
    monitor: MonitorConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Courier {
    /// Run the agent, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the spool cannot be opened or
    /// signal handlers cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        internal!("Controller running");

        let identity = Identity::discover();
        internal!(
            level = INFO,
            "Relaying as {} ({})",
            identity.host_name,
            identity.machine_id
        );

        let spool = SpoolFile::open(&self.spool)?;
        let (sink, rx) = queue::channel(self.relay.queue_depth, self.spool.max_message_size);

        let worker = RelayWorker::new(
            spool,
            Arc::new(self.relay.connector()),
            &identity.auth_payload(),
            rx,
            self.relay.drain_interval(),
        );
        let monitor = Monitor::new(self.monitor, sink);

        // The worker runs on its own task so its shutdown flush is always
        // awaited, never cancelled by another arm finishing first.
        let worker = tokio::spawn(worker.serve(SHUTDOWN_BROADCAST.subscribe()));

        let ret = tokio::select! {
            () = monitor.serve(SHUTDOWN_BROADCAST.subscribe()) => Ok(()),
            r = shutdown() => r,
        };

        internal!("Shutting down...");

        if let Err(e) = worker.await {
            tracing::error!("Relay worker task failed: {e}");
        }

        ret
    }
}
