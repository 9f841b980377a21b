//! Tests for Device Layout
//!
//! These tests verify:
//! - Region partitioning of a pre-allocated file
//! - Startup failures surface as fatal errors
//! - Exclusive locking of the device
//! - Logical id to physical slot placement

use std::fs::File;
use std::path::{Path, PathBuf};

use rawstore::{Config, Device, Extent, RawStoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const METADATA_LOG_SIZE: u64 = 1024;
const WAL_SIZE: u64 = 2048;
const SLOT_SIZE: u64 = 4096;

fn setup_device_file(slots: u64, extra: u64) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("device.img");
    let file = File::create(&path).unwrap();
    file.set_len(METADATA_LOG_SIZE + WAL_SIZE + slots * SLOT_SIZE + extra).unwrap();
    (temp_dir, path)
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
// Layout Tests
// =============================================================================

#[test]
fn test_open_partitions_regular_file() {
    let (_temp, path) = setup_device_file(6, 0);
    let device = Device::open(scaled_config(&path)).unwrap();
    let layout = device.layout();

    assert_eq!(layout.device_size, 3072 + 6 * 4096);
    assert_eq!(layout.metadata_log, Extent { offset: 0, len: 1024 });
    assert_eq!(layout.write_ahead_log, Extent { offset: 1024, len: 2048 });
    assert_eq!(layout.slots, Extent { offset: 3072, len: 6 * 4096 });
    assert_eq!(layout.slot_count, 6);
    assert_eq!(device.allocator().total(), 6);
    assert_eq!(device.allocator().allocated_count(), 0);
}

#[test]
fn test_partial_trailing_slot_is_ignored() {
    let (_temp, path) = setup_device_file(3, 4095);
    let device = Device::open(scaled_config(&path)).unwrap();

    assert_eq!(device.layout().slot_count, 3);
    assert_eq!(device.layout().slots.end(), 3072 + 3 * 4096);
}

#[test]
fn test_slot_placement_wraps_modulo_pool() {
    let (_temp, path) = setup_device_file(4, 0);
    let device = Device::open(scaled_config(&path)).unwrap();

    assert_eq!(device.slot_offset(0), 3072);
    assert_eq!(device.slot_offset(3), 3072 + 3 * 4096);
    assert_eq!(device.slot_offset(6), 3072 + 2 * 4096);
}

#[test]
fn test_physical_slot_bounds() {
    let (_temp, path) = setup_device_file(2, 0);
    let device = Device::open(scaled_config(&path)).unwrap();

    assert_eq!(device.physical_slot_bytes(1).unwrap().len(), 4096);
    assert!(matches!(
        device.physical_slot_bytes(2),
        Err(RawStoreError::SlotOutOfRange { slot: 2, total: 2 })
    ));
}

// =============================================================================
// Startup Failure Tests
// =============================================================================

#[test]
fn test_missing_path_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.img");

    let err = Device::open(scaled_config(&path)).unwrap_err();
    assert!(matches!(err, RawStoreError::DeviceOpen { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_device_without_room_for_a_slot() {
    let (_temp, path) = setup_device_file(0, 100);

    let err = Device::open(scaled_config(&path)).unwrap_err();
    assert!(matches!(err, RawStoreError::DeviceTooSmall { size: 3172, required: 7168, .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_default_layout_needs_large_device() {
    let (_temp, path) = setup_device_file(4, 0);

    let err = Device::open_path(&path).unwrap_err();
    assert!(matches!(err, RawStoreError::DeviceTooSmall { .. }));
}

#[test]
fn test_invalid_config_rejected() {
    let (_temp, path) = setup_device_file(4, 0);
    let config = Config::builder()
        .device_path(&path)
        .metadata_log_size(METADATA_LOG_SIZE)
        .wal_size(WAL_SIZE)
        .slot_size(8)
        .build();

    assert!(matches!(Device::open(config), Err(RawStoreError::Config(_))));
}

#[test]
fn test_overflowing_slot_size_rejected() {
    let (_temp, path) = setup_device_file(4, 0);
    let config = Config::builder()
        .device_path(&path)
        .metadata_log_size(METADATA_LOG_SIZE)
        .wal_size(WAL_SIZE)
        .slot_size(u64::MAX)
        .build();

    assert!(matches!(Device::open(config), Err(RawStoreError::Config(_))));
}

// =============================================================================
// Locking Tests
// =============================================================================

#[test]
fn test_second_open_is_locked_out() {
    let (_temp, path) = setup_device_file(2, 0);
    let _first = Device::open(scaled_config(&path)).unwrap();

    let err = Device::open(scaled_config(&path)).unwrap_err();
    assert!(matches!(err, RawStoreError::DeviceLocked { .. }));
}

#[test]
fn test_lock_released_on_drop() {
    let (_temp, path) = setup_device_file(2, 0);
    drop(Device::open(scaled_config(&path)).unwrap());

    Device::open(scaled_config(&path)).unwrap();
}

#[test]
fn test_lock_can_be_disabled() {
    let (_temp, path) = setup_device_file(2, 0);
    let mut config = scaled_config(&path);
    config.exclusive_lock = false;

    let _first = Device::open(config.clone()).unwrap();
    let _second = Device::open(config).unwrap();
}
