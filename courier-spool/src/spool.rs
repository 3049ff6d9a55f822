//! The circular spool file.
//!
//! A fixed-capacity region of one file holds concatenated frames; two `u64`
//! cursor fields follow the region so positions survive a crash. The unread
//! region is `[read, write)` modulo capacity, `read == write` means empty,
//! and a write is never allowed to land the write cursor on the read cursor
//! while data remains: truncation runs first, so "full" is unrepresentable.
//!
//! The circular primitives are compute-then-commit: each takes a cursor value
//! and returns the new one, and [`SpoolFile`] assigns its stored cursors only
//! once the whole operation has succeeded. A failed operation therefore
//! leaves the spool exactly as it was: no partial frame ever straddles a
//! failed write, and no rollback bookkeeping exists to get wrong.

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::{FileExt, OpenOptionsExt},
};

use courier_common::internal;

use crate::{
    config::SpoolConfig,
    error::{Result, SpoolError},
    frame::{self, LEN_DIGITS, SEPARATOR},
};

/// Width of one cursor trailer field.
const CURSOR_BYTES: u64 = size_of::<u64>() as u64;

/// A fixed-capacity circular byte log backed by one file.
///
/// Owned and mutated by a single task; nothing here is synchronized.
#[derive(Debug)]
pub struct SpoolFile {
    file: File,
    capacity: u64,
    truncate_size: u64,
    max_message_size: usize,
    read_pos: u64,
    write_pos: u64,
}

impl SpoolFile {
    /// Open (or create) the spool at the configured path and restore the
    /// persisted cursors.
    ///
    /// Out-of-range cursor values (a fresh file, a capacity change, a torn
    /// trailer write) reset to zero rather than failing: the spool is
    /// best-effort storage and an empty log is always a safe state.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all)]
    pub fn open(config: &SpoolConfig) -> Result<Self> {
        config.validate()?;

        internal!("Initialising spool at {:?}", config.path);

        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&config.path)?;

        // Reserve the region plus the trailer so positioned I/O never shrinks
        // or extends the file afterwards.
        let full_len = config.capacity + 2 * CURSOR_BYTES;
        if file.metadata()?.len() < full_len {
            file.set_len(full_len)?;
        }

        let mut spool = Self {
            file,
            capacity: config.capacity,
            truncate_size: config.truncate_size(),
            max_message_size: config.max_message_size,
            read_pos: 0,
            write_pos: 0,
        };

        spool.read_pos = spool.load_cursor(spool.capacity);
        spool.write_pos = spool.load_cursor(spool.capacity + CURSOR_BYTES);

        internal!(
            level = DEBUG,
            "Spool opened: capacity={}, read={}, write={}",
            spool.capacity,
            spool.read_pos,
            spool.write_pos
        );

        Ok(spool)
    }

    /// Number of unread bytes in the circular region.
    #[must_use]
    pub const fn unread(&self) -> u64 {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            self.capacity - (self.read_pos - self.write_pos)
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Upper bound on one encoded message, as configured.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Append one frame and its separator, then persist both cursors.
    ///
    /// On failure nothing was committed and the frame is lost; the caller
    /// already failed to deliver it, and the spool was its last resort.
    pub fn push(&mut self, frame: &[u8]) -> Result<()> {
        self.write_circular(frame)?;
        self.write_circular(&[SEPARATOR])?;
        self.persist_cursors()
    }

    /// Read the oldest frame out of the spool, or `None` when empty.
    ///
    /// Returns the full frame (length prefix plus payload), the exact bytes
    /// to resend. A malformed length prefix truncates the log forward to the
    /// next separator (one frame is sacrificed to self-heal) and reports
    /// [`SpoolError::Corrupted`]; an I/O failure leaves the read cursor
    /// where this call found it.
    pub fn pop(&mut self) -> Result<Option<Vec<u8>>> {
        if self.is_empty() {
            return Ok(None);
        }

        let mut prefix = [0u8; LEN_DIGITS];
        let cursor = self.read_wrapped(self.read_pos, &mut prefix)?;

        let Some(len) = frame::parse_len(&prefix, self.max_message_size) else {
            internal!(
                level = WARN,
                "Corrupted frame prefix {prefix:?} in spool, truncating to recover"
            );
            self.truncate();
            self.persist_cursors()?;
            return Err(SpoolError::Corrupted(format!(
                "invalid length prefix {:?}",
                String::from_utf8_lossy(&prefix)
            )));
        };

        let mut frame = vec![0u8; LEN_DIGITS + len];
        frame[..LEN_DIGITS].copy_from_slice(&prefix);
        let cursor = self.read_wrapped(cursor, &mut frame[LEN_DIGITS..])?;

        // Skip the separator; advancing past it has no failure mode.
        self.read_pos = (cursor + 1) % self.capacity;
        self.persist_cursors()?;

        Ok(Some(frame))
    }

    /// Write raw bytes at the write cursor, truncating old frames first if
    /// space would run out.
    ///
    /// Exposed for tests of the circular layer; message traffic goes through
    /// [`SpoolFile::push`].
    pub fn write_circular(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() as u64 > self.capacity {
            return Err(SpoolError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid write length {}", data.len()),
            )));
        }

        let free = self.capacity - self.unread();
        if data.len() as u64 >= free {
            self.truncate();

            // Still no room after reclaiming: the only writable state left
            // is an empty log. The whole backlog is sacrificed.
            let free = self.capacity - self.unread();
            if data.len() as u64 >= free {
                internal!(
                    level = WARN,
                    "Spool overrun, discarding {} byte backlog",
                    self.unread()
                );
                self.read_pos = 0;
                self.write_pos = 0;
            }
        }

        self.write_pos = self.write_wrapped(self.write_pos, data)?;
        Ok(())
    }

    /// Read exactly `buf.len()` bytes at the read cursor.
    ///
    /// Exposed for tests of the circular layer; frame traffic goes through
    /// [`SpoolFile::pop`].
    pub fn read_circular(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() || buf.len() as u64 > self.capacity {
            return Err(SpoolError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid read length {}", buf.len()),
            )));
        }

        self.read_pos = self.read_wrapped(self.read_pos, buf)?;
        Ok(())
    }

    /// Reclaim space by discarding the oldest frames.
    ///
    /// Advances the read cursor by the configured reclaim size, then scans
    /// forward for the next separator so the next read starts exactly on a
    /// frame boundary. If the unread region is smaller than the reclaim size
    /// the log simply empties. A scan that exhausts the whole capacity means
    /// the log is not a frame sequence at all; both cursors reset to zero and
    /// the backlog is unconditionally discarded as the designed last resort.
    pub fn truncate(&mut self) {
        let distance = self.unread();
        if distance < self.truncate_size {
            self.read_pos = self.write_pos;
            return;
        }

        let mut remaining = distance - self.truncate_size;
        let mut pos = (self.read_pos + self.truncate_size) % self.capacity;

        let mut attempts = 0;
        while attempts < self.capacity && remaining > 0 {
            let mut byte = [0u8; 1];
            if self.file.read_exact_at(&mut byte, pos).is_err() {
                break;
            }

            pos = (pos + 1) % self.capacity;
            if byte[0] == SEPARATOR {
                self.read_pos = pos;
                return;
            }

            remaining -= 1;
            attempts += 1;
        }

        internal!(
            level = WARN,
            "No frame boundary found while truncating, discarding {distance} byte backlog"
        );
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Write `data` starting at `pos`, splitting across the region boundary
    /// when needed. Returns the new cursor; commits nothing.
    fn write_wrapped(&self, pos: u64, data: &[u8]) -> Result<u64> {
        let pos = pos % self.capacity;
        let tail = (self.capacity - pos).min(data.len() as u64) as usize;
        let (first, second) = data.split_at(tail);

        self.file.write_all_at(first, pos)?;
        if second.is_empty() {
            return Ok((pos + first.len() as u64) % self.capacity);
        }

        self.file.write_all_at(second, 0)?;
        Ok(second.len() as u64)
    }

    /// Mirror of [`SpoolFile::write_wrapped`] for reads.
    fn read_wrapped(&self, pos: u64, buf: &mut [u8]) -> Result<u64> {
        let pos = pos % self.capacity;
        let tail = (self.capacity - pos).min(buf.len() as u64) as usize;
        let (first, second) = buf.split_at_mut(tail);

        self.file.read_exact_at(first, pos)?;
        if second.is_empty() {
            return Ok((pos + first.len() as u64) % self.capacity);
        }

        self.file.read_exact_at(second, 0)?;
        Ok(second.len() as u64)
    }

    /// Load one cursor from the trailer, resetting out-of-range values.
    fn load_cursor(&self, offset: u64) -> u64 {
        let mut buf = [0u8; CURSOR_BYTES as usize];
        if self.file.read_exact_at(&mut buf, offset).is_err() {
            return 0;
        }

        let value = u64::from_ne_bytes(buf);
        if value >= self.capacity { 0 } else { value }
    }

    /// Persist both cursors to the trailer.
    fn persist_cursors(&self) -> Result<()> {
        self.file
            .write_all_at(&self.read_pos.to_ne_bytes(), self.capacity)?;
        self.file
            .write_all_at(&self.write_pos.to_ne_bytes(), self.capacity + CURSOR_BYTES)?;
        Ok(())
    }
}
