//! Tests for Object Files
//!
//! These tests verify:
//! - Offset ids and the length-prefixed layout
//! - Buffered, flush-then-buffer and raw write paths
//! - Two-phase allocate/complete/abort writes and their misuse
//! - Truncate/reposition, scans, sync and reopen
//! - Corruption detection on read

use std::fs;
use std::path::PathBuf;

use strata::channel::{Channel, MemChannel};
use strata::object::{
    open_memory_object_file, open_object_file, LoggingObjectFile, ObjectFileStorage,
    LENGTH_PREFIX_SIZE,
};
use strata::{ObjectFile, StoreConfig, StrataError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("objects.dat");
    (temp_dir, path)
}

fn config_with_buffer(size: usize) -> StoreConfig {
    StoreConfig::builder().object_buffer_size(size).build()
}

fn memory_file(buffer_size: usize) -> ObjectFileStorage<MemChannel> {
    open_memory_object_file("objects", &config_with_buffer(buffer_size)).unwrap()
}

fn collect_all(file: &mut dyn ObjectFile) -> Vec<(u64, Vec<u8>)> {
    file.all()
        .map(|entry| {
            let (id, bytes) = entry.unwrap();
            (id, bytes.to_vec())
        })
        .collect()
}

// =============================================================================
// Basic Write/Read Tests
// =============================================================================

#[test]
fn test_concrete_offsets() {
    let mut file = memory_file(8192);

    assert_eq!(file.write(b"x1").unwrap(), 0);
    assert_eq!(file.write(b"hello").unwrap(), 6);

    assert_eq!(&file.read(0).unwrap()[..], b"x1");
    assert_eq!(&file.read(6).unwrap()[..], b"hello");
    assert_eq!(file.length(), 13);
}

#[test]
fn test_empty_entry() {
    let mut file = memory_file(64);

    let id = file.write(b"").unwrap();
    let next = file.write(b"after").unwrap();

    assert_eq!(next, id + LENGTH_PREFIX_SIZE as u64);
    assert!(file.read(id).unwrap().is_empty());
    file.sync().unwrap();
    assert!(file.read(id).unwrap().is_empty());
    assert_eq!(&file.read(next).unwrap()[..], b"after");
}

#[test]
fn test_buffered_and_flushed_reads_agree() {
    let mut file = memory_file(32);
    let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; (i % 7) as usize + 1]).collect();

    let ids: Vec<u64> = payloads.iter().map(|p| file.write(p).unwrap()).collect();
    // The 32-byte buffer forced several flushes, so some entries are on file
    assert!(file.file_size() > 0);
    assert!(file.buffered() > 0);

    let before: Vec<_> = ids.iter().map(|&id| file.read(id).unwrap()).collect();
    file.sync().unwrap();
    assert_eq!(file.buffered(), 0);
    let after: Vec<_> = ids.iter().map(|&id| file.read(id).unwrap()).collect();

    for ((payload, b), a) in payloads.iter().zip(&before).zip(&after) {
        assert_eq!(&b[..], &payload[..]);
        assert_eq!(&a[..], &payload[..]);
    }
}

#[test]
fn test_ids_are_stable_across_flushes() {
    let mut file = memory_file(16);
    let mut expected = 0u64;

    for i in 0..50usize {
        let payload = vec![b'a' + (i % 26) as u8; i % 13];
        let id = file.write(&payload).unwrap();
        assert_eq!(id, expected);
        expected += (LENGTH_PREFIX_SIZE + payload.len()) as u64;
    }
    assert_eq!(file.length(), expected);
}

#[test]
fn test_raw_write_larger_than_buffer() {
    let mut file = memory_file(16);

    let small = file.write(b"ab").unwrap();
    let big_payload = vec![0xEE; 100];
    let big = file.write(&big_payload).unwrap();
    let tail = file.write(b"cd").unwrap();

    assert_eq!(small, 0);
    assert_eq!(big, 6);
    assert_eq!(tail, 6 + 4 + 100);
    // Large entry went straight to the channel after the buffer was flushed
    assert_eq!(file.file_size(), tail);

    assert_eq!(&file.read(small).unwrap()[..], b"ab");
    assert_eq!(&file.read(big).unwrap()[..], &big_payload[..]);
    assert_eq!(&file.read(tail).unwrap()[..], b"cd");
}

#[test]
fn test_read_out_of_bounds() {
    let mut file = memory_file(64);
    assert!(matches!(file.read(0), Err(StrataError::Bounds { id: 0, limit: 0 })));

    file.write(b"x1").unwrap();
    assert!(matches!(file.read(6), Err(StrataError::Bounds { id: 6, limit: 6 })));
    assert!(matches!(file.read(u64::MAX), Err(StrataError::Bounds { .. })));
}

#[test]
fn test_read_misaligned_id_is_format_error() {
    let mut file = memory_file(64);
    file.write(b"a").unwrap();
    file.write(b"b").unwrap();

    // Offset 3 is inside entry 0; its "prefix" runs past the buffered data
    assert!(matches!(file.read(3), Err(StrataError::Format(_))));
}

// =============================================================================
// Two-Phase Write Tests
// =============================================================================

#[test]
fn test_alloc_complete_partial() {
    let mut file = memory_file(64);
    file.write(b"x1").unwrap();

    let mut slot = file.alloc_write(10).unwrap();
    assert_eq!(slot.id(), 6);
    assert_eq!(slot.capacity(), 10);
    slot.put_slice(b"abc").unwrap();
    assert_eq!(slot.remaining(), 7);

    let id = file.complete_write(slot).unwrap();
    assert_eq!(id, 6);
    assert_eq!(&file.read(id).unwrap()[..], b"abc");
    assert_eq!(file.length(), 6 + 4 + 3);

    // Next write follows the committed bytes, not the reservation
    assert_eq!(file.write(b"z").unwrap(), 13);
}

#[test]
fn test_alloc_abort_reuses_space() {
    let mut file = memory_file(64);
    file.write(b"x1").unwrap();
    let length = file.length();

    let mut slot = file.alloc_write(20).unwrap();
    slot.put_slice(b"discarded").unwrap();
    let reserved_id = slot.id();
    file.abort_write(slot).unwrap();

    assert_eq!(file.length(), length);
    assert!(!file.has_pending_write());
    assert_eq!(file.write(b"kept").unwrap(), reserved_id);
    assert_eq!(&file.read(reserved_id).unwrap()[..], b"kept");
}

#[test]
fn test_alloc_standalone_larger_than_buffer() {
    let mut file = memory_file(16);
    file.write(b"ab").unwrap();

    let mut slot = file.alloc_write(64).unwrap();
    // Buffer was flushed first, so the entry lands right after it
    assert_eq!(slot.id(), 6);
    slot.put_slice(&[0x5C; 40]).unwrap();
    let id = file.complete_write(slot).unwrap();

    assert_eq!(id, 6);
    assert_eq!(file.read(id).unwrap().len(), 40);
    assert_eq!(file.length(), 6 + 4 + 40);

    let mut slot = file.alloc_write(64).unwrap();
    let aborted = slot.id();
    file.abort_write(slot).unwrap();
    assert_eq!(file.write(b"next").unwrap(), aborted);
}

#[test]
fn test_alloc_overrun_rejected() {
    let mut file = memory_file(64);
    let mut slot = file.alloc_write(4).unwrap();

    slot.put_slice(b"abc").unwrap();
    assert!(matches!(slot.put_slice(b"de"), Err(StrataError::Protocol(_))));
    assert_eq!(slot.as_slice(), b"abc");

    let id = file.complete_write(slot).unwrap();
    assert_eq!(&file.read(id).unwrap()[..], b"abc");
}

#[test]
fn test_mutation_refused_while_pending() {
    let mut file = memory_file(64);
    file.write(b"x1").unwrap();
    let slot = file.alloc_write(8).unwrap();

    assert!(matches!(file.write(b"no"), Err(StrataError::Protocol(_))));
    assert!(matches!(file.alloc_write(1), Err(StrataError::Protocol(_))));
    assert!(matches!(file.truncate(0), Err(StrataError::Protocol(_))));
    assert!(matches!(file.sync(), Err(StrataError::Protocol(_))));
    assert!(matches!(file.close(), Err(StrataError::Protocol(_))));

    // Reads still see only committed data
    assert_eq!(file.length(), 6);
    assert_eq!(&file.read(0).unwrap()[..], b"x1");

    file.abort_write(slot).unwrap();
    file.sync().unwrap();
}

#[test]
fn test_complete_with_foreign_slot_rejected() {
    let mut first = memory_file(64);
    let mut second = memory_file(64);

    let slot = first.alloc_write(4).unwrap();
    assert!(matches!(second.complete_write(slot), Err(StrataError::Protocol(_))));
    assert!(first.has_pending_write());
}

#[test]
fn test_foreign_slot_rejected_while_both_pending() {
    let mut first = memory_file(64);
    let mut second = memory_file(64);

    let mut first_slot = first.alloc_write(8).unwrap();
    first_slot.put_slice(b"from-A").unwrap();
    let mut second_slot = second.alloc_write(8).unwrap();
    second_slot.put_slice(b"from-B").unwrap();
    // Same offset in two fresh files
    assert_eq!(first_slot.id(), second_slot.id());

    assert!(matches!(
        second.complete_write(first_slot),
        Err(StrataError::Protocol(_))
    ));
    assert!(second.has_pending_write());

    let id = second.complete_write(second_slot).unwrap();
    assert_eq!(&second.read(id).unwrap()[..], b"from-B");
    assert_eq!(second.length(), 4 + 6);
}

#[test]
fn test_complete_with_stale_slot_rejected() {
    let mut file = memory_file(64);
    let stale = file.alloc_write(4).unwrap();
    let stale_id = stale.id();
    file.abort_write(stale).unwrap();

    // Same id, different allocation
    let current = file.alloc_write(4).unwrap();
    assert_eq!(current.id(), stale_id);

    let mut other = memory_file(64);
    let foreign = other.alloc_write(4).unwrap();
    assert_eq!(foreign.id(), stale_id);
    assert!(matches!(file.complete_write(foreign), Err(StrataError::Protocol(_))));

    assert_eq!(file.complete_write(current).unwrap(), stale_id);
}

#[test]
fn test_complete_without_alloc_rejected() {
    let mut file = memory_file(64);
    let mut other = memory_file(64);

    let orphan = other.alloc_write(4).unwrap();
    assert!(matches!(file.abort_write(orphan), Err(StrataError::Protocol(_))));
    assert!(!file.has_pending_write());
}

// =============================================================================
// Truncate and Scan Tests
// =============================================================================

#[test]
fn test_truncate_drops_tail() {
    let mut file = memory_file(32);
    let ids: Vec<u64> = (0..10u8).map(|i| file.write(&[i; 5]).unwrap()).collect();

    file.truncate(ids[4]).unwrap();
    assert_eq!(file.length(), ids[4]);
    assert_eq!(&file.read(ids[3]).unwrap()[..], &[3u8; 5]);
    assert!(matches!(file.read(ids[4]), Err(StrataError::Bounds { .. })));

    // Appends continue at the cut
    assert_eq!(file.write(b"new").unwrap(), ids[4]);
}

#[test]
fn test_reposition_into_buffer() {
    let mut file = memory_file(4096);
    let a = file.write(b"one").unwrap();
    let b = file.write(b"two").unwrap();
    file.write(b"three").unwrap();

    file.reposition(b).unwrap();
    assert_eq!(file.length(), b);
    assert_eq!(&file.read(a).unwrap()[..], b"one");
    assert_eq!(file.write(b"TWO").unwrap(), b);
}

#[test]
fn test_truncate_past_end_rejected() {
    let mut file = memory_file(64);
    file.write(b"x1").unwrap();
    assert!(matches!(file.truncate(7), Err(StrataError::Bounds { .. })));
    file.truncate(6).unwrap();
    assert_eq!(file.length(), 6);
}

#[test]
fn test_all_scans_file_then_buffer() {
    let mut file = memory_file(24);
    let mut expected = Vec::new();
    for i in 0..12u8 {
        let payload = vec![i; i as usize];
        let id = file.write(&payload).unwrap();
        expected.push((id, payload));
    }
    assert!(file.file_size() > 0 && file.buffered() > 0);

    assert_eq!(collect_all(&mut file), expected);
    // Restartable
    assert_eq!(collect_all(&mut file), expected);
}

#[test]
fn test_all_on_empty_file() {
    let mut file = memory_file(64);
    assert!(collect_all(&mut file).is_empty());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_entries() {
    let (_temp, path) = setup_temp_file();
    let config = config_with_buffer(64);

    let ids: Vec<u64> = {
        let mut file = open_object_file(&path, &config).unwrap();
        let ids = (0..30u32)
            .map(|i| file.write(format!("entry-{}", i).as_bytes()).unwrap())
            .collect();
        file.close().unwrap();
        ids
    };

    let mut file = open_object_file(&path, &config).unwrap();
    assert_eq!(file.length(), fs::metadata(&path).unwrap().len());
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(&file.read(*id).unwrap()[..], format!("entry-{}", i).as_bytes());
    }

    // Appends continue after the existing content
    let next = file.write(b"more").unwrap();
    assert_eq!(next, file.file_size());
}

#[test]
fn test_file_layout_is_length_prefixed() {
    let (_temp, path) = setup_temp_file();
    {
        let mut file = open_object_file(&path, &config_with_buffer(64)).unwrap();
        file.write(b"x1").unwrap();
        file.write(b"hello").unwrap();
        file.close().unwrap();
    }

    let raw = fs::read(&path).unwrap();
    assert_eq!(raw, b"\x00\x00\x00\x02x1\x00\x00\x00\x05hello");
}

#[test]
fn test_corrupt_length_detected() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"\x00\x00\x00\x02x1\x00\x00\x01\x00short").unwrap();

    let mut file = open_object_file(&path, &config_with_buffer(64)).unwrap();
    assert_eq!(&file.read(0).unwrap()[..], b"x1");
    assert!(matches!(file.read(6), Err(StrataError::Format(_))));

    let entries: Vec<_> = file.all().collect();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_ok());
    assert!(entries[1].is_err());
}

#[test]
fn test_close_flushes_and_refuses_further_calls() {
    let mut file = memory_file(64);
    file.write(b"x1").unwrap();
    file.close().unwrap();

    assert!(file.is_closed());
    assert!(matches!(file.write(b"no"), Err(StrataError::Protocol(_))));
    assert!(matches!(file.read(0), Err(StrataError::Protocol(_))));
    assert!(file.close().is_err());
}

#[test]
fn test_from_channel_appends_after_existing_data() {
    let mut channel = MemChannel::new("preloaded");
    channel.write_at(0, b"\x00\x00\x00\x02x1").unwrap();

    let mut file = ObjectFileStorage::from_channel(channel, 64).unwrap();
    assert_eq!(file.length(), 6);
    assert_eq!(file.write(b"hello").unwrap(), 6);
    assert_eq!(&file.read(0).unwrap()[..], b"x1");
}

#[test]
fn test_logging_object_file_delegates() {
    let mut file = LoggingObjectFile::new("logged", memory_file(64));

    assert_eq!(file.write(b"x1").unwrap(), 0);
    let mut slot = file.alloc_write(8).unwrap();
    slot.put_slice(b"hello").unwrap();
    assert_eq!(file.complete_write(slot).unwrap(), 6);
    assert_eq!(file.length(), 13);
    assert_eq!(collect_all(&mut file).len(), 2);

    file.close().unwrap();
    assert!(file.into_inner().is_closed());
}

#[test]
fn test_boxed_object_file() {
    let mut file: Box<dyn ObjectFile> = Box::new(memory_file(64));
    file.write(b"x1").unwrap();
    assert_eq!(&file.read(0).unwrap()[..], b"x1");
    assert!(!file.is_empty());
}
