//! Frame encoding.
//!
//! One frame is `LEN` (fixed-width decimal ASCII, zero-padded) followed by
//! `LEN` payload bytes. The collector reads the same prefix off the wire, so
//! the encoded frame is both the spool record (plus a trailing separator the
//! spool adds itself) and the exact bytes sent to the collector.

/// Width of the decimal length prefix.
pub const LEN_DIGITS: usize = 4;

/// Sentinel byte written between frames in the spool.
///
/// Never part of `LEN` (which is ASCII digits), and never scanned for inside
/// payloads during normal reads; it is read and written at known offsets.
/// Only truncation scans for it, to realign on a frame boundary.
pub const SEPARATOR: u8 = 0xFF;

/// Largest value the fixed-width prefix can express.
const MAX_ENCODABLE: usize = 9999;

/// Encode one payload into a frame.
///
/// Returns `None` when the payload plus prefix would exceed `max_message`
/// (the bounded buffer producers are promised) or the prefix range. Callers
/// on the fire-and-forget path should [`clamp`] first instead of dropping.
#[must_use]
pub fn encode(payload: &[u8], max_message: usize) -> Option<Vec<u8>> {
    if payload.is_empty()
        || payload.len() + LEN_DIGITS > max_message
        || payload.len() > MAX_ENCODABLE
    {
        return None;
    }

    let mut frame = Vec::with_capacity(LEN_DIGITS + payload.len());
    frame.extend(format!("{:0width$}", payload.len(), width = LEN_DIGITS).into_bytes());
    frame.extend_from_slice(payload);
    Some(frame)
}

/// Clamp a payload to the largest length `encode` will accept.
#[must_use]
pub fn clamp(payload: &[u8], max_message: usize) -> &[u8] {
    let limit = max_message.saturating_sub(LEN_DIGITS).min(MAX_ENCODABLE);
    &payload[..payload.len().min(limit)]
}

/// Parse a length prefix read back out of the spool.
///
/// Returns the payload length only if the prefix is well-formed decimal and
/// the length fits a maximum-size message. Anything else is frame corruption.
#[must_use]
pub fn parse_len(prefix: &[u8; LEN_DIGITS], max_message: usize) -> Option<usize> {
    let text = std::str::from_utf8(prefix).ok()?;
    let len = text.parse::<usize>().ok()?;

    (len > 0 && len + LEN_DIGITS <= max_message).then_some(len)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn prefix_is_zero_padded() {
        let frame = encode(b"CPO\x1fbash", 512).unwrap();
        assert_eq!(&frame[..LEN_DIGITS], b"0008");
        assert_eq!(&frame[LEN_DIGITS..], b"CPO\x1fbash");
    }

    #[test]
    fn oversize_payload_rejected() {
        let payload = vec![b'x'; 512];
        assert!(encode(&payload, 512).is_none());
        assert!(encode(&payload[..512 - LEN_DIGITS], 512).is_some());
    }

    #[test]
    fn empty_payload_rejected() {
        assert!(encode(b"", 512).is_none());
    }

    #[test]
    fn clamp_bounds_payload() {
        let payload = vec![b'x'; 600];
        let clamped = clamp(&payload, 512);
        assert_eq!(clamped.len(), 512 - LEN_DIGITS);
        assert!(encode(clamped, 512).is_some());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_len(b"0012", 512), Some(12));
        assert_eq!(parse_len(b"9999", 512), None);
        assert_eq!(parse_len(b"0000", 512), None);
        assert_eq!(parse_len(b"12ab", 512), None);
        assert_eq!(parse_len(&[0xFF, 0xFF, 0xFF, 0xFF], 512), None);
    }
}
