//! Error types for the courier-relay crate.

use std::io;

use thiserror::Error;

/// Failures at the transport seam.
///
/// Always recoverable: the worker spools the affected frame, tears the
/// connection down, and retries on the next dequeued item. Nothing here ever
/// reaches a producer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket operation failed.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// The operation exceeded the configured transport timeout.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.to_string().contains("refused"));
    }
}
