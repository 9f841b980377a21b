//! Slot
//!
//! Fixed-capacity buffered chunk writer. A slot holds one immutable chunk
//! followed, at the very end of its physical extent, by an 8-byte footer
//! recording the chunk's logical size.
//!
//! ```text
//! phy_offset                                        phy_offset + slot_size
//! ├──────────────────────────────────────────┬───────────────┬────────────┤
//! │ chunk bytes (size)                       │   unused      │ size (8 LE)│
//! └──────────────────────────────────────────┴───────────────┴────────────┘
//! ```
//!
//! Writes only touch the aligned in-memory buffer. `flush` pushes the
//! pending range to the device, `sync` additionally writes the footer and
//! waits for the whole extent to reach stable storage.
//! `write_head >= flush_offset >= sync_offset` holds at all times.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::buffer::AlignedBuffer;
use crate::device::sync_range;
use crate::error::{RawStoreError, Region, Result};

/// Size of the trailing size footer
pub const FOOTER_SIZE: u64 = 8;

/// Buffered writer for one slot
pub struct Slot {
    id: u64,
    phy_offset: u64,
    slot_size: u64,
    buffer: AlignedBuffer,
    write_head: usize,
    flush_offset: usize,
    sync_offset: usize,
    file: Arc<File>,
}

impl Slot {
    pub(crate) fn new(id: u64, phy_offset: u64, slot_size: u64, file: Arc<File>) -> Self {
        Self {
            id,
            phy_offset,
            slot_size,
            buffer: AlignedBuffer::zeroed(slot_size as usize),
            write_head: 0,
            flush_offset: 0,
            sync_offset: 0,
            file,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn physical_offset(&self) -> u64 {
        self.phy_offset
    }

    /// Bytes a chunk may occupy (slot size minus footer)
    pub fn capacity(&self) -> u64 {
        self.slot_size - FOOTER_SIZE
    }

    /// Logical size written so far
    pub fn size(&self) -> u64 {
        self.write_head as u64
    }

    pub fn flush_offset(&self) -> u64 {
        self.flush_offset as u64
    }

    pub fn sync_offset(&self) -> u64 {
        self.sync_offset as u64
    }

    /// Append `data` to the buffer. No I/O happens here.
    ///
    /// Fails with `CapacityExceeded` if the chunk would overlap the footer;
    /// nothing is written in that case.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let available = self.capacity() - self.size();
        if data.len() as u64 > available {
            error!(slot = self.id, size = self.size(), requested = data.len(), "slot overflow");
            return Err(RawStoreError::CapacityExceeded {
                region: Region::Slot(self.id),
                offset: self.phy_offset + self.size(),
                requested: data.len() as u64,
                available,
            });
        }

        let end = self.write_head + data.len();
        self.buffer[self.write_head..end].copy_from_slice(data);
        self.write_head = end;
        Ok(data.len())
    }

    /// Write `[flush_offset, write_head)` to the device.
    ///
    /// Returns the number of bytes pushed (0 when nothing was pending).
    pub fn flush(&mut self) -> Result<usize> {
        let pending = self.write_head - self.flush_offset;
        if pending == 0 {
            return Ok(0);
        }

        let offset = self.phy_offset + self.flush_offset as u64;
        self.file
            .write_all_at(&self.buffer[self.flush_offset..self.write_head], offset)?;
        debug!(slot = self.id, offset, bytes = pending, "flushed slot");

        self.flush_offset = self.write_head;
        Ok(pending)
    }

    /// Flush, record the logical size in the footer and wait until the full
    /// slot extent is on stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.flush()?;

        let footer_offset = self.phy_offset + self.slot_size - FOOTER_SIZE;
        self.file.write_all_at(&self.size().to_le_bytes(), footer_offset)?;

        sync_range(&self.file, self.phy_offset, self.slot_size).map_err(|source| {
            error!(slot = self.id, offset = self.phy_offset, "slot sync failed: {}", source);
            RawStoreError::SyncFailed {
                region: Region::Slot(self.id),
                offset: self.phy_offset,
                len: self.slot_size,
                source,
            }
        })?;

        self.sync_offset = self.flush_offset;
        debug!(slot = self.id, size = self.size(), "synced slot");
        Ok(())
    }

    /// Flush anything pending and release the buffer.
    ///
    /// Does not sync: a slot closed without `sync` has no footer.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.write_head > self.flush_offset {
            warn!(
                slot = self.id,
                unflushed = self.write_head - self.flush_offset,
                "slot dropped with unflushed bytes"
            );
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("phy_offset", &self.phy_offset)
            .field("write_head", &self.write_head)
            .field("flush_offset", &self.flush_offset)
            .field("sync_offset", &self.sync_offset)
            .finish()
    }
}

/// Logical size stored in the last 8 bytes of a slot extent
pub(crate) fn decode_footer(extent: &[u8]) -> u64 {
    let mut buf = [0u8; FOOTER_SIZE as usize];
    buf.copy_from_slice(&extent[extent.len() - FOOTER_SIZE as usize..]);
    u64::from_le_bytes(buf)
}
