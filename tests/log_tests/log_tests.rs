//! Tests for Log
//!
//! These tests verify:
//! - Frames written, flushed and synced decode back in order
//! - Cursor-based reads over the decoded payloads
//! - Region capacity is enforced
//! - Torn tails and stale generations end the valid prefix

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use rawstore::frame::{self, DecodeStop, FRAME_OVERHEAD};
use rawstore::{Config, Device, FrameType, LogKind, RawStoreError, Region};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const METADATA_LOG_SIZE: u64 = 256;
const WAL_SIZE: u64 = 1024;
const SLOT_SIZE: u64 = 4096;

fn setup_device() -> (TempDir, PathBuf, Device) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("device.img");
    let file = File::create(&path).unwrap();
    file.set_len(METADATA_LOG_SIZE + WAL_SIZE + 2 * SLOT_SIZE).unwrap();

    let device = Device::open(scaled_config(&path)).unwrap();
    (temp_dir, path, device)
}

fn scaled_config(path: &Path) -> Config {
    Config::builder()
        .device_path(path)
        .metadata_log_size(METADATA_LOG_SIZE)
        .wal_size(WAL_SIZE)
        .slot_size(SLOT_SIZE)
        .build()
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_three_frames_decode_in_order() {
    let (_temp, _path, device) = setup_device();
    let p1 = [0x11u8; 20];
    let p2 = [0x22u8; 20];
    let p3 = [0x33u8; 20];

    let mut log = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    log.write(&p1, FrameType::DeltaVersion, 1).unwrap();
    log.write(&p2, FrameType::DeltaVersion, 2).unwrap();
    log.write(&p3, FrameType::DeltaVersion, 3).unwrap();
    assert_eq!(log.size(), 3 * (20 + FRAME_OVERHEAD as u64));
    log.sync().unwrap();

    let decoded = frame::decode_frames(log.region());
    let payloads: Vec<&[u8]> = decoded.frames.iter().map(|f| &f.payload[..]).collect();
    assert_eq!(payloads, vec![&p1[..], &p2[..], &p3[..]]);
    assert_eq!(decoded.frames[1].sequence, 2);
    assert_eq!(decoded.stop, DecodeStop::BadMagic);
}

#[test]
fn test_reader_sees_concatenated_payloads() {
    let (_temp, _path, device) = setup_device();

    let mut writer = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    writer.append(b"first;").unwrap();
    writer.append(b"second;").unwrap();
    writer.append(b"third").unwrap();
    writer.sync().unwrap();
    writer.close().unwrap();

    let mut reader = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    assert_eq!(&reader.read(4096)[..], b"first;second;third");
    assert!(reader.read(4096).is_empty());
}

#[test]
fn test_read_in_small_pieces() {
    let (_temp, _path, device) = setup_device();

    let mut writer = device.open_log(LogKind::WriteAhead, "000003.log");
    writer.append(b"abcdefghij").unwrap();
    writer.append(b"klm").unwrap();
    writer.flush().unwrap();

    let mut reader = device.open_log(LogKind::WriteAhead, "000003.log");
    assert_eq!(&reader.read(4)[..], b"abcd");
    assert_eq!(reader.skip(3), 3);
    assert_eq!(&reader.read(4)[..], b"hijk");
    assert_eq!(&reader.read(100)[..], b"lm");
    assert!(reader.read(1).is_empty());
}

#[test]
fn test_decoded_once_per_object() {
    let (_temp, _path, device) = setup_device();

    let mut writer = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    writer.append(b"before").unwrap();
    writer.flush().unwrap();

    let mut reader = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    assert_eq!(&reader.read(3)[..], b"bef");

    // appended after the reader decoded the region
    writer.append(b"after").unwrap();
    writer.flush().unwrap();

    assert_eq!(&reader.read(100)[..], b"ore");
    assert_eq!(device.open_log(LogKind::Metadata, "m").read(100), &b"beforeafter"[..]);
}

#[test]
fn test_unflushed_frames_are_invisible() {
    let (_temp, _path, device) = setup_device();

    let mut writer = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    writer.append(b"buffered only").unwrap();

    let mut reader = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    assert!(reader.read(100).is_empty());

    writer.flush().unwrap();
}

#[test]
fn test_regions_are_independent() {
    let (_temp, _path, device) = setup_device();

    let mut manifest = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    let mut wal = device.open_log(LogKind::WriteAhead, "000003.log");
    manifest.append(b"version-edit").unwrap();
    wal.append(b"put k v").unwrap();
    manifest.sync().unwrap();
    wal.sync().unwrap();

    assert_eq!(device.open_log(LogKind::Metadata, "m").read(100), &b"version-edit"[..]);
    assert_eq!(device.open_log(LogKind::WriteAhead, "w").read(100), &b"put k v"[..]);
}

#[test]
fn test_frame_written_at_region_base() {
    let (_temp, path, device) = setup_device();

    let mut wal = device.open_log(LogKind::WriteAhead, "000003.log");
    wal.write(b"x", FrameType::DeltaVersion, 0x42).unwrap();
    wal.flush().unwrap();

    let file = File::open(&path).unwrap();
    let mut header = [0u8; 20];
    file.read_exact_at(&mut header, METADATA_LOG_SIZE).unwrap();
    assert_eq!(&header[0..4], b"LDSX");
    assert_eq!(&header[4..8], &2u32.to_le_bytes());
    assert_eq!(&header[8..16], &0x42u64.to_le_bytes());
    assert_eq!(&header[16..20], &1u32.to_le_bytes());
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_overflow_is_rejected() {
    let (_temp, _path, device) = setup_device();
    let mut log = device.open_log(LogKind::Metadata, "MANIFEST-000001");

    // 5 * 44 = 220 bytes of the 256-byte region
    for _ in 0..5 {
        log.append(&[0u8; 20]).unwrap();
    }

    let err = log.append(&[0u8; 20]).unwrap_err();
    match err {
        RawStoreError::CapacityExceeded { region, offset, requested, available } => {
            assert_eq!(region, Region::MetadataLog);
            assert_eq!(offset, 220);
            assert_eq!(requested, 44);
            assert_eq!(available, 36);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.size(), 220);

    // a frame that exactly fills the region still fits
    log.append(&[0u8; 12]).unwrap();
    assert_eq!(log.size(), 256);
    log.sync().unwrap();

    assert_eq!(log.frames().len(), 6);
}

#[test]
fn test_wal_overflow_names_region() {
    let (_temp, _path, device) = setup_device();
    let mut wal = device.open_log(LogKind::WriteAhead, "000003.log");

    let err = wal.append(&vec![0u8; 1024]).unwrap_err();
    assert!(matches!(
        err,
        RawStoreError::CapacityExceeded { region: Region::WriteAheadLog, offset: 256, .. }
    ));
    assert!(err.is_fatal());
}

// =============================================================================
// Valid-Prefix Tests
// =============================================================================

#[test]
fn test_torn_final_frame_is_dropped() {
    let (_temp, path, device) = setup_device();

    let mut log = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    log.append(b"complete").unwrap();
    log.append(b"torn-frame-payload").unwrap();
    log.sync().unwrap();

    // zero the last bytes of the second frame as if the write was cut short
    let second_end = (FRAME_OVERHEAD + 8) + (FRAME_OVERHEAD + 18);
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.write_all_at(&[0u8; 10], (second_end - 10) as u64).unwrap();

    let mut reader = device.open_log(LogKind::Metadata, "MANIFEST-000001");
    assert_eq!(&reader.read(100)[..], b"complete");

    let decoded = frame::decode_frames(reader.region());
    assert_eq!(decoded.frames.len(), 1);
    assert_eq!(decoded.stop, DecodeStop::ChecksumMismatch);
}

#[test]
fn test_new_generation_hides_stale_frames() {
    let (_temp, _path, device) = setup_device();

    let mut old = device.open_log(LogKind::WriteAhead, "000003.log");
    for i in 0..5u8 {
        old.append(&[i; 30]).unwrap();
    }
    old.sync().unwrap();
    old.close().unwrap();

    let mut new = device.open_log(LogKind::WriteAhead, "000007.log");
    new.append(b"fresh").unwrap();
    new.sync().unwrap();

    let frames = device.open_log(LogKind::WriteAhead, "000007.log").frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0].payload[..], b"fresh");
}

#[test]
fn test_empty_region_reads_empty() {
    let (_temp, _path, device) = setup_device();
    let mut log = device.open_log(LogKind::Metadata, "MANIFEST-000001");

    assert!(log.read(100).is_empty());
    assert!(log.frames().is_empty());
}
