use std::path::PathBuf;

use serde::Deserialize;

use crate::{error::ValidationError, frame::LEN_DIGITS};

const fn default_capacity() -> u64 {
    64 * 1024
}

const fn default_truncate_fraction() -> f64 {
    0.2
}

const fn default_max_message() -> usize {
    512
}

fn default_path() -> PathBuf {
    PathBuf::from("/var/lib/courier/spool")
}

/// Configuration for the on-disk spool.
///
/// In RON config:
/// ```ron
/// Courier (
///     spool: (
///         path: "/var/lib/courier/spool",
///         capacity: 65536,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    /// Path of the backing file. Created (along with parent directories)
    /// if missing.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Size of the circular region in bytes. The file on disk is this plus
    /// the two cursor trailer fields.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Fraction of capacity reclaimed by one truncation pass.
    #[serde(default = "default_truncate_fraction")]
    pub truncate_fraction: f64,

    /// Upper bound on one encoded message (length prefix included).
    ///
    /// This bounds producer buffers independently of spool capacity.
    #[serde(default = "default_max_message")]
    pub max_message_size: usize,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            capacity: default_capacity(),
            truncate_fraction: default_truncate_fraction(),
            max_message_size: default_max_message(),
        }
    }
}

impl SpoolConfig {
    /// Check the configuration is internally consistent.
    ///
    /// # Errors
    /// If the capacity cannot hold one maximum-size frame, the prefix cannot
    /// express the maximum message size, or the truncation fraction is
    /// outside `(0, 1)`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // Largest spool record: a maximum-size frame plus its separator byte.
        let frame = self.max_message_size as u64 + 1;
        if self.capacity <= frame {
            return Err(ValidationError::CapacityTooSmall {
                capacity: self.capacity,
                frame,
            });
        }

        if self.max_message_size <= LEN_DIGITS
            || self.max_message_size - LEN_DIGITS > 9999
        {
            return Err(ValidationError::MessageSizeTooLarge(self.max_message_size));
        }

        if !(self.truncate_fraction > 0.0 && self.truncate_fraction < 1.0) {
            return Err(ValidationError::InvalidTruncateFraction(
                self.truncate_fraction,
            ));
        }

        Ok(())
    }

    /// Bytes one truncation pass reclaims.
    #[must_use]
    pub fn truncate_size(&self) -> u64 {
        (self.capacity as f64 * self.truncate_fraction) as u64
    }
}
