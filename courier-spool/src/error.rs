//! Error types for the courier-spool crate.

use std::io;

use thiserror::Error;

/// Top-level spool error type.
///
/// Spool operations either fail at the file layer (`Io`), on the framing
/// layer (`Corrupted`), or before the spool is ever opened (`Validation`).
#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O operation failed. The affected cursor was not committed, so the
    /// spool is exactly as it was before the call.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame failed to parse. The log has been truncated forward to the
    /// next frame boundary (or reset entirely) as self-healing.
    #[error("Corrupted frame: {0}")]
    Corrupted(String),

    /// Spool configuration validation failed.
    #[error("Spool validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Spool configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Capacity cannot hold even a single maximum-size frame.
    #[error("Spool capacity {capacity} cannot hold a frame of up to {frame} bytes")]
    CapacityTooSmall { capacity: u64, frame: u64 },

    /// The maximum message size exceeds what the length prefix can encode.
    #[error("Maximum message size {0} exceeds the length prefix range")]
    MessageSizeTooLarge(usize),

    /// The truncation fraction must sit strictly between 0 and 1.
    #[error("Truncation fraction {0} is not within (0, 1)")]
    InvalidTruncateFraction(f64),
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let spool_err: SpoolError = io_err.into();
        assert!(matches!(spool_err, SpoolError::Io(_)));
    }

    #[test]
    fn error_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let spool_err = SpoolError::from(io_err);

        assert!(matches!(spool_err, SpoolError::Io(_)));
        assert!(spool_err.to_string().contains("access denied"));
    }
}
