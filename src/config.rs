//! Configuration for rawstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{RawStoreError, Result};
use crate::slot::FOOTER_SIZE;

/// Default size of the metadata-log region (64 MiB)
pub const DEFAULT_METADATA_LOG_SIZE: u64 = 0x400_0000;

/// Default size of one chunk slot (4 MiB)
pub const DEFAULT_SLOT_SIZE: u64 = 4 * 1024 * 1024;

/// Default size of the write-ahead-log region (four slots)
pub const DEFAULT_WAL_SIZE: u64 = DEFAULT_SLOT_SIZE * 4;

/// Paths under this prefix are sized with the block-device ioctl
pub const RAW_DEVICE_PREFIX: &str = "/dev/";

/// Main configuration for a rawstore device
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// Raw block device (e.g. `/dev/sdb1`) or a pre-allocated file.
    /// Layout:
    ///   [0, V)          metadata log
    ///   [V, V+B)        write-ahead log
    ///   [V+B, end)      slot pool, N = (size - V - B) / slot_size
    pub device_path: PathBuf,

    /// Take an exclusive advisory lock on the device while it is open
    pub exclusive_lock: bool,

    // -------------------------------------------------------------------------
    // Region Configuration
    // -------------------------------------------------------------------------
    /// Size of the metadata-log region (V)
    pub metadata_log_size: u64,

    /// Size of the write-ahead-log region (B)
    pub wal_size: u64,

    /// Size of every slot, including its 8-byte footer
    pub slot_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/sdb1"),
            exclusive_lock: true,
            metadata_log_size: DEFAULT_METADATA_LOG_SIZE,
            wal_size: DEFAULT_WAL_SIZE,
            slot_size: DEFAULT_SLOT_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Bytes reserved ahead of the slot pool
    pub fn reserved_size(&self) -> u64 {
        self.metadata_log_size + self.wal_size
    }

    /// Check that the region sizes describe a usable layout
    pub fn validate(&self) -> Result<()> {
        if self.metadata_log_size == 0 {
            return Err(RawStoreError::Config("metadata_log_size must be non-zero".into()));
        }
        if self.wal_size == 0 {
            return Err(RawStoreError::Config("wal_size must be non-zero".into()));
        }
        if self.slot_size <= FOOTER_SIZE {
            return Err(RawStoreError::Config(format!(
                "slot_size must exceed the {}-byte footer, got {}",
                FOOTER_SIZE, self.slot_size
            )));
        }
        let reserved = self
            .metadata_log_size
            .checked_add(self.wal_size)
            .ok_or_else(|| RawStoreError::Config("log regions overflow u64".into()))?;
        if reserved.checked_add(self.slot_size).is_none() {
            return Err(RawStoreError::Config(format!(
                "log regions plus one {}-byte slot overflow u64",
                self.slot_size
            )));
        }
        Ok(())
    }

    /// Whether the device path names a raw block device by convention
    pub fn is_raw_device_path(&self) -> bool {
        self.device_path.to_string_lossy().starts_with(RAW_DEVICE_PREFIX)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the device (or pre-allocated file) path
    pub fn device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.device_path = path.into();
        self
    }

    /// Enable or disable the exclusive device lock
    pub fn exclusive_lock(mut self, enabled: bool) -> Self {
        self.config.exclusive_lock = enabled;
        self
    }

    /// Set the metadata-log region size (in bytes)
    pub fn metadata_log_size(mut self, size: u64) -> Self {
        self.config.metadata_log_size = size;
        self
    }

    /// Set the write-ahead-log region size (in bytes)
    pub fn wal_size(mut self, size: u64) -> Self {
        self.config.wal_size = size;
        self
    }

    /// Set the slot size (in bytes, footer included)
    pub fn slot_size(mut self, size: u64) -> Self {
        self.config.slot_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
