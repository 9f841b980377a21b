//! Device Layout
//!
//! Opens the backing device, partitions it into regions and hands out
//! Slot and Log objects bound to the right descriptor and offset.
//!
//! ## On-Disk Layout
//! ```text
//! 0                V                V+B                                end
//! ├────────────────┼────────────────┼────────┬────────┬─────┬──────────┤
//! │  metadata log  │ write-ahead log│ slot 0 │ slot 1 │ ... │ slot N-1 │
//! └────────────────┴────────────────┴────────┴────────┴─────┴──────────┘
//! ```
//!
//! ## Descriptors
//! Each region type gets its own descriptor onto the device so writers use
//! positioned I/O without sharing a file cursor. A single read-only mapping
//! of the whole device serves zero-copy slot reads and log decoding; regions
//! never move, so the mapping is valid for the lifetime of the `Device`.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use memmap2::{Mmap, MmapOptions};
use tracing::{debug, info};

use crate::allocator::SlotAllocator;
use crate::config::Config;
use crate::error::{RawStoreError, Result};
use crate::log::{Log, LogKind};
use crate::slot::{self, Slot, FOOTER_SIZE};

/// A contiguous byte range of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub len: u64,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Region boundaries computed from the device size and config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Total device size in bytes
    pub device_size: u64,
    /// `[0, V)`
    pub metadata_log: Extent,
    /// `[V, V+B)`
    pub write_ahead_log: Extent,
    /// `[V+B, V+B+N*slot_size)`; any remainder past the last slot is unused
    pub slots: Extent,
    /// Size of one slot, footer included
    pub slot_size: u64,
    /// N
    pub slot_count: u64,
}

impl Layout {
    /// Partition a device of `device_size` bytes.
    ///
    /// Fails if the device cannot hold both logs and at least one slot.
    pub fn compute(device_size: u64, config: &Config, path: &Path) -> Result<Self> {
        config.validate()?;

        let reserved = config.reserved_size();
        let required = reserved
            .checked_add(config.slot_size)
            .ok_or_else(|| RawStoreError::Config("region sizes overflow u64".into()))?;
        if device_size < required {
            return Err(RawStoreError::DeviceTooSmall {
                path: path.to_path_buf(),
                size: device_size,
                required,
            });
        }

        let slot_count = (device_size - reserved) / config.slot_size;

        Ok(Self {
            device_size,
            metadata_log: Extent { offset: 0, len: config.metadata_log_size },
            write_ahead_log: Extent { offset: config.metadata_log_size, len: config.wal_size },
            slots: Extent { offset: reserved, len: slot_count * config.slot_size },
            slot_size: config.slot_size,
            slot_count,
        })
    }

    /// Device offset of a physical slot
    pub fn slot_offset(&self, physical: u64) -> u64 {
        self.slots.offset + physical * self.slot_size
    }

    /// Extent of a log flavor's region
    pub fn log_extent(&self, kind: LogKind) -> Extent {
        match kind {
            LogKind::Metadata => self.metadata_log,
            LogKind::WriteAhead => self.write_ahead_log,
        }
    }
}

/// An open device: layout, per-region descriptors, mapping and allocator
pub struct Device {
    path: PathBuf,
    layout: Layout,
    metadata_fd: Arc<File>,
    wal_fd: Arc<File>,
    slot_fd: Arc<File>,
    mapping: Arc<Mmap>,
    allocator: SlotAllocator,
    /// Holds the advisory lock (when enabled) for as long as the device is open
    _primary: File,
}

impl Device {
    /// Open and partition the device named by `config.device_path`.
    ///
    /// On startup:
    /// 1. Open the path (plus one descriptor per region type)
    /// 2. Determine the device size (ioctl for block devices, seek otherwise)
    /// 3. Compute the region layout and slot count
    /// 4. Map the whole device read-only
    /// 5. Start with an empty online map
    pub fn open(config: Config) -> Result<Self> {
        let path = config.device_path.clone();

        let primary = open_rw(&path)?;
        if config.exclusive_lock {
            FileExt::try_lock_exclusive(&primary)
                .map_err(|_| RawStoreError::DeviceLocked { path: path.clone() })?;
        }

        let device_size = device_size(&primary, &config).map_err(|source| {
            RawStoreError::DeviceSize { path: path.clone(), source }
        })?;
        let layout = Layout::compute(device_size, &config, &path)?;

        let metadata_fd = Arc::new(open_rw(&path)?);
        let wal_fd = Arc::new(open_rw(&path)?);
        let slot_fd = Arc::new(open_rw(&path)?);

        let len = usize::try_from(device_size).map_err(|_| RawStoreError::Mapping {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "device larger than address space"),
        })?;
        // SAFETY: the mapping is read-only; every write to the device goes
        // through the region descriptors at offsets inside the mapping.
        let mapping = unsafe { MmapOptions::new().len(len).map(&primary) }
            .map_err(|source| RawStoreError::Mapping { path: path.clone(), source })?;

        info!(
            path = %path.display(),
            device_size,
            device_gib = device_size / 1024 / 1024 / 1024,
            slot_size = layout.slot_size,
            slot_count = layout.slot_count,
            "device layout initialised"
        );

        Ok(Self {
            path,
            layout,
            metadata_fd,
            wal_fd,
            slot_fd,
            mapping: Arc::new(mapping),
            allocator: SlotAllocator::new(layout.slot_count),
            _primary: primary,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default region sizes with the specified device
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.device_path = path.to_path_buf();
        Self::open(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.allocator
    }

    /// Allocate a slot id at or after `seed` (see [`SlotAllocator::allocate`])
    pub fn allocate_slot(&self, seed: u64) -> Result<u64> {
        self.allocator.allocate(seed)
    }

    /// Device offset of the slot behind a logical id
    pub fn slot_offset(&self, id: u64) -> u64 {
        self.layout.slot_offset(self.allocator.physical_slot(id))
    }

    /// Create a writer for slot `id` with a fresh aligned buffer
    pub fn open_slot(&self, id: u64) -> Slot {
        Slot::new(id, self.slot_offset(id), self.layout.slot_size, Arc::clone(&self.slot_fd))
    }

    /// Create a buffered log object over the region of `kind`
    pub fn open_log(&self, kind: LogKind, name: impl Into<String>) -> Log {
        let fd = match kind {
            LogKind::Metadata => &self.metadata_fd,
            LogKind::WriteAhead => &self.wal_fd,
        };
        Log::new(
            kind,
            name.into(),
            self.layout.log_extent(kind),
            Arc::clone(fd),
            Arc::clone(&self.mapping),
        )
    }

    /// Logical size recorded in the footer of slot `id`
    pub fn slot_len(&self, id: u64) -> Result<u64> {
        let base = self.slot_offset(id) as usize;
        let extent = &self.mapping[base..base + self.layout.slot_size as usize];

        let recorded = slot::decode_footer(extent);
        let capacity = self.layout.slot_size - FOOTER_SIZE;
        if recorded > capacity {
            return Err(RawStoreError::CorruptFooter { slot: id, recorded, capacity });
        }
        Ok(recorded)
    }

    /// Zero-copy view of the chunk stored in slot `id`
    pub fn read_slot(&self, id: u64) -> Result<&[u8]> {
        let len = self.slot_len(id)?;
        let base = self.slot_offset(id) as usize;
        debug!(id, base, len, "mapped slot for reading");
        Ok(&self.mapping[base..base + len as usize])
    }

    /// Read-only view of a physical slot by index (no footer interpretation)
    pub fn physical_slot_bytes(&self, physical: u64) -> Result<&[u8]> {
        if physical >= self.layout.slot_count {
            return Err(RawStoreError::SlotOutOfRange { slot: physical, total: self.layout.slot_count });
        }
        let base = self.layout.slot_offset(physical) as usize;
        Ok(&self.mapping[base..base + self.layout.slot_size as usize])
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("allocated", &self.allocator.allocated_count())
            .finish()
    }
}

fn open_rw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| RawStoreError::DeviceOpen { path: path.to_path_buf(), source })
}

/// Byte size of the device: ioctl for block devices, seek-to-end otherwise
fn device_size(file: &File, config: &Config) -> io::Result<u64> {
    let meta = file.metadata()?;
    let is_block = meta.file_type().is_block_device();

    if is_block || (config.is_raw_device_path() && !meta.is_file()) {
        return block_device_size(file);
    }

    let mut cursor = file;
    let size = cursor.seek(SeekFrom::End(0))?;
    cursor.seek(SeekFrom::Start(0))?;
    Ok(size)
}

#[cfg(target_os = "linux")]
fn block_device_size(file: &File) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    // _IOR(0x12, 114, size_t)
    const BLKGETSIZE64: u64 = 0x8008_1272;

    let mut size: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut size as *mut u64) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size)
}

#[cfg(not(target_os = "linux"))]
fn block_device_size(file: &File) -> io::Result<u64> {
    let mut cursor = file;
    let size = cursor.seek(SeekFrom::End(0))?;
    cursor.seek(SeekFrom::Start(0))?;
    Ok(size)
}

/// Force `[offset, offset+len)` of `file` to stable storage and wait for it
pub(crate) fn sync_range(file: &File, offset: u64, len: u64) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let flags = libc::SYNC_FILE_RANGE_WAIT_BEFORE
            | libc::SYNC_FILE_RANGE_WRITE
            | libc::SYNC_FILE_RANGE_WAIT_AFTER;
        // SAFETY: plain syscall on a descriptor we own.
        let rc = unsafe {
            libc::sync_file_range(file.as_raw_fd(), offset as libc::off64_t, len as libc::off64_t, flags)
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = (offset, len);
        file.sync_data()
    }
}
