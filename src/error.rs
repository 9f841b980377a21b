//! Error types for rawstore
//!
//! Provides a unified error type for all operations. Conditions that the
//! layer cannot recover from (capacity overflow, pool exhaustion, failed
//! durable sync, unusable device) are returned as distinguished variants
//! instead of terminating the process; the caller decides what to do.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using RawStoreError
pub type Result<T> = std::result::Result<T, RawStoreError>;

/// Physical region of the device an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    MetadataLog,
    WriteAheadLog,
    Slot(u64),
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::MetadataLog => write!(f, "metadata log"),
            Region::WriteAheadLog => write!(f, "write-ahead log"),
            Region::Slot(id) => write!(f, "slot {}", id),
        }
    }
}

/// Unified error type for rawstore operations
#[derive(Debug, Error)]
pub enum RawStoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Startup Errors (fatal)
    // -------------------------------------------------------------------------
    #[error("failed to open device {path:?}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to determine size of device {path:?}: {source}")]
    DeviceSize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("device {path:?} is too small: {size} bytes, at least {required} required")]
    DeviceTooSmall { path: PathBuf, size: u64, required: u64 },

    #[error("failed to map device {path:?}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("device {path:?} is locked by another process")]
    DeviceLocked { path: PathBuf },

    // -------------------------------------------------------------------------
    // Capacity Errors (fatal)
    // -------------------------------------------------------------------------
    #[error("{region} overflow at offset {offset}: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        region: Region,
        offset: u64,
        requested: u64,
        available: u64,
    },

    #[error("slot pool exhausted: all {total} slots are allocated")]
    PoolExhausted { total: u64 },

    // -------------------------------------------------------------------------
    // Durability Errors (fatal)
    // -------------------------------------------------------------------------
    #[error("durable sync of {region} failed at offset {offset} ({len} bytes): {source}")]
    SyncFailed {
        region: Region,
        offset: u64,
        len: u64,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Slot Errors
    // -------------------------------------------------------------------------
    #[error("slot {slot} footer records {recorded} bytes, capacity is {capacity}")]
    CorruptFooter { slot: u64, recorded: u64, capacity: u64 },

    #[error("physical slot {slot} out of range (device has {total} slots)")]
    SlotOutOfRange { slot: u64, total: u64 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RawStoreError {
    /// Whether this error means the storage layer cannot continue.
    ///
    /// Nothing in this crate retries; fatal errors are surfaced so that the
    /// host can terminate (or fail the request) with full context.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RawStoreError::DeviceOpen { .. }
                | RawStoreError::DeviceSize { .. }
                | RawStoreError::DeviceTooSmall { .. }
                | RawStoreError::Mapping { .. }
                | RawStoreError::DeviceLocked { .. }
                | RawStoreError::CapacityExceeded { .. }
                | RawStoreError::PoolExhausted { .. }
                | RawStoreError::SyncFailed { .. }
        )
    }
}
