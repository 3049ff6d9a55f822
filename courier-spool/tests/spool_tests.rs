//! Integration tests for the circular spool file.

use std::os::unix::fs::FileExt;

use courier_spool::{SEPARATOR, SpoolConfig, SpoolError, SpoolFile, frame};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn config_in(dir: &TempDir, capacity: u64, max_message_size: usize) -> SpoolConfig {
    SpoolConfig {
        path: dir.path().join("spool"),
        capacity,
        max_message_size,
        ..Default::default()
    }
}

fn frame_of(payload: &[u8], max: usize) -> Vec<u8> {
    frame::encode(payload, max).expect("payload within bounds")
}

#[test]
fn push_pop_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut spool = SpoolFile::open(&config_in(&dir, 4096, 512)).unwrap();

    let frames: Vec<_> = (0..10)
        .map(|i| frame_of(format!("CPO\x1fproc-{i}").as_bytes(), 512))
        .collect();

    for frame in &frames {
        spool.push(frame).unwrap();
    }

    for frame in &frames {
        assert_eq!(spool.pop().unwrap().as_deref(), Some(frame.as_slice()));
    }
    assert_eq!(spool.pop().unwrap(), None);
}

#[test]
fn empty_pop_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut spool = SpoolFile::open(&config_in(&dir, 4096, 512)).unwrap();

    for _ in 0..3 {
        assert_eq!(spool.pop().unwrap(), None);
    }
    assert!(spool.is_empty());
}

#[test]
fn write_splits_across_the_boundary() {
    let dir = TempDir::new().unwrap();
    let capacity = 1024;
    let mut spool = SpoolFile::open(&config_in(&dir, capacity, 512)).unwrap();

    // Park both cursors ten bytes shy of the boundary.
    let lead_in = vec![0xAA; capacity as usize - 10];
    spool.write_circular(&lead_in).unwrap();
    let mut buf = vec![0u8; lead_in.len()];
    spool.read_circular(&mut buf).unwrap();
    assert_eq!(buf, lead_in);

    // This write must wrap: ten bytes at the tail, ten at the head.
    let wrapped: Vec<u8> = (0u8..20).collect();
    spool.write_circular(&wrapped).unwrap();

    let mut back = vec![0u8; 20];
    spool.read_circular(&mut back).unwrap();
    assert_eq!(back, wrapped);
    assert!(spool.is_empty());
}

#[test]
fn truncation_reclaims_a_fifth_on_frame_boundaries() {
    let dir = TempDir::new().unwrap();
    let capacity = 64 * 1024;
    let max = 4096;
    let mut spool = SpoolFile::open(&config_in(&dir, capacity, max)).unwrap();

    // 253 records of 255 bytes each (250 byte payload + prefix + separator)
    // fill the spool to ~63 KiB.
    let frames: Vec<_> = (0..253)
        .map(|i| frame_of(format!("{i:03}{}", "x".repeat(247)).as_bytes(), max))
        .collect();
    for frame in &frames {
        spool.push(frame).unwrap();
    }
    assert_eq!(spool.unread(), 253 * 255);

    // A 2 KiB record does not fit in the ~1 KiB left, so truncation must
    // first reclaim at least 20% of capacity (13107 bytes), landing on a
    // frame boundary.
    let big = frame_of(&vec![b'y'; 2000], max);
    spool.push(&big).unwrap();

    // Reclaiming 13107 bytes of 255-byte records discards the first 52.
    let first_kept = spool.pop().unwrap().unwrap();
    assert_eq!(first_kept, frames[52]);

    for frame in &frames[53..] {
        assert_eq!(spool.pop().unwrap().as_deref(), Some(frame.as_slice()));
    }
    assert_eq!(spool.pop().unwrap().as_deref(), Some(big.as_slice()));
    assert_eq!(spool.pop().unwrap(), None);
}

#[test]
fn corrupt_length_prefix_self_heals() {
    let dir = TempDir::new().unwrap();
    let mut spool = SpoolFile::open(&config_in(&dir, 4096, 512)).unwrap();

    // A frame advertising 9999 bytes of payload with only ten present.
    spool.write_circular(b"9999xxxxxxxxxx").unwrap();
    spool.write_circular(&[SEPARATOR]).unwrap();

    let err = spool.pop().unwrap_err();
    assert!(matches!(err, SpoolError::Corrupted(_)));

    // The unread region was smaller than the reclaim size, so truncation
    // emptied the log; subsequent pops report empty rather than reading
    // out of bounds.
    assert_eq!(spool.pop().unwrap(), None);
    assert!(spool.is_empty());
}

#[test]
fn corruption_recovery_realigns_to_next_frame() {
    let dir = TempDir::new().unwrap();
    // Small truncate fraction so recovery scans instead of emptying.
    let config = SpoolConfig {
        path: dir.path().join("spool"),
        capacity: 4096,
        truncate_fraction: 0.01,
        max_message_size: 512,
    };
    let mut spool = SpoolFile::open(&config).unwrap();

    // A 60 byte garbage record: long enough that truncation's 40 byte
    // advance lands inside it and the boundary scan finds its separator.
    spool.write_circular(&vec![b'!'; 60]).unwrap();
    spool.write_circular(&[SEPARATOR]).unwrap();
    let good = frame_of(b"CCU\x1f42", 512);
    spool.push(&good).unwrap();

    assert!(matches!(spool.pop(), Err(SpoolError::Corrupted(_))));

    // After self-healing the next read starts exactly on the good frame.
    assert_eq!(spool.pop().unwrap().as_deref(), Some(good.as_slice()));
    assert_eq!(spool.pop().unwrap(), None);
}

#[test]
fn cursors_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, 4096, 512);

    let first = frame_of(b"CPO\x1fbash", 512);
    let second = frame_of(b"CPC\x1fbash", 512);
    {
        let mut spool = SpoolFile::open(&config).unwrap();
        spool.push(&first).unwrap();
        spool.push(&second).unwrap();
        assert_eq!(spool.pop().unwrap().as_deref(), Some(first.as_slice()));
    }

    let mut spool = SpoolFile::open(&config).unwrap();
    assert_eq!(spool.pop().unwrap().as_deref(), Some(second.as_slice()));
    assert_eq!(spool.pop().unwrap(), None);
}

#[test]
fn out_of_range_trailer_cursors_reset() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, 4096, 512);
    drop(SpoolFile::open(&config).unwrap());

    // Scribble nonsense positions into the trailer.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&config.path)
        .unwrap();
    file.write_all_at(&u64::MAX.to_ne_bytes(), 4096).unwrap();
    file.write_all_at(&8192u64.to_ne_bytes(), 4096 + 8).unwrap();
    drop(file);

    let spool = SpoolFile::open(&config).unwrap();
    assert!(spool.is_empty());
    assert_eq!(spool.unread(), 0);
}

#[test]
fn zero_length_and_oversize_writes_rejected() {
    let dir = TempDir::new().unwrap();
    let mut spool = SpoolFile::open(&config_in(&dir, 1024, 512)).unwrap();

    assert!(spool.write_circular(&[]).is_err());
    assert!(spool.write_circular(&vec![0u8; 1025]).is_err());
    assert!(spool.is_empty());
}

#[test]
fn sustained_overflow_keeps_a_readable_suffix() {
    let dir = TempDir::new().unwrap();
    let mut spool = SpoolFile::open(&config_in(&dir, 2048, 512)).unwrap();

    // Far more traffic than the spool can hold; old frames are discarded
    // but whatever remains must be intact, in order, and a suffix of what
    // was pushed.
    let frames: Vec<_> = (0..200)
        .map(|i| frame_of(format!("CIE\x1fkeyboard\x1f{i:03}").as_bytes(), 512))
        .collect();
    for frame in &frames {
        spool.push(frame).unwrap();
    }

    let mut drained = Vec::new();
    while let Some(frame) = spool.pop().unwrap() {
        drained.push(frame);
    }

    assert!(!drained.is_empty());
    let start = frames.len() - drained.len();
    assert_eq!(drained, frames[start..]);
}
