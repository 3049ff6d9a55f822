//! The submission queue.
//!
//! Producers run in contexts that must never block and never learn whether a
//! message was ultimately delivered, so submission is a bounded `try_send`
//! with an explicit drop-newest policy: when the queue is full the event is
//! counted and discarded. The single worker drains items strictly in
//! submission order.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use courier_common::internal;
use courier_spool::frame;
use tokio::sync::mpsc;

/// Receiving half handed to the delivery worker.
pub type EventReceiver = mpsc::Receiver<Vec<u8>>;

/// Cheap, cloneable producer handle.
///
/// `submit` encodes the payload into a frame up front, so everything past the
/// queue deals in ready-to-send bytes.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Vec<u8>>,
    max_message_size: usize,
    dropped: Arc<AtomicU64>,
}

/// Create the submission channel.
#[must_use]
pub fn channel(depth: usize, max_message_size: usize) -> (EventSink, EventReceiver) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        EventSink {
            tx,
            max_message_size,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl EventSink {
    /// Submit one event payload, fire and forget.
    ///
    /// Oversize payloads are clamped to the maximum message size rather than
    /// rejected. A full or closed queue drops the event: the counter ticks, a
    /// debug line is logged, and the producer is never blocked.
    pub fn submit(&self, payload: &[u8]) {
        let clamped = frame::clamp(payload, self.max_message_size);
        if clamped.len() < payload.len() {
            internal!(
                level = DEBUG,
                "Event clamped from {} to {} bytes",
                payload.len(),
                clamped.len()
            );
        }

        let Some(frame) = frame::encode(clamped, self.max_message_size) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if self.tx.try_send(frame).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            internal!(level = DEBUG, "Event queue full, dropping event");
        }
    }

    /// Number of events dropped at submission since startup.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn submissions_arrive_in_order() {
        let (sink, mut rx) = channel(8, 512);

        sink.submit(b"CPO\x1ffirst");
        sink.submit(b"CPO\x1fsecond");

        assert_eq!(rx.try_recv().unwrap(), b"0009CPO\x1ffirst");
        assert_eq!(rx.try_recv().unwrap(), b"0010CPO\x1fsecond");
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn full_queue_drops_newest() {
        let (sink, mut rx) = channel(2, 512);

        sink.submit(b"CCU\x1f1");
        sink.submit(b"CCU\x1f2");
        sink.submit(b"CCU\x1f3");

        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap(), b"0005CCU\x1f1");
        assert_eq!(rx.try_recv().unwrap(), b"0005CCU\x1f2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oversize_payload_clamped_not_dropped() {
        let (sink, mut rx) = channel(2, 512);

        sink.submit(&vec![b'x'; 600]);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.len(), 512);
        assert_eq!(&frame[..4], b"0508");
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn empty_payload_dropped() {
        let (sink, mut rx) = channel(2, 512);

        sink.submit(b"");

        assert_eq!(sink.dropped(), 1);
        assert!(rx.try_recv().is_err());
    }
}
