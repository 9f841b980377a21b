//! Log
//!
//! Fixed-capacity buffered append store over one of the two log regions.
//! Payloads are wrapped in frames (see [`crate::frame`]) and appended to an
//! aligned buffer; `flush`/`sync` push them to the region with the same
//! cursor discipline as [`crate::slot::Slot`].
//!
//! ## Reading
//! The first `read` decodes the region through the read-only device mapping
//! and keeps the concatenated payloads; later reads are served from that
//! buffer by a cursor without re-scanning.
//!
//! ## Tail Terminator
//! A flush also writes the zero bytes that follow `write_head` (up to one
//! magic-width, capacity permitting). That way frames left behind by an
//! earlier generation of the region are cut off at decode time instead of
//! being replayed after the new tail.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;
use tracing::{debug, error, info, warn};

use crate::buffer::AlignedBuffer;
use crate::device::{sync_range, Extent};
use crate::error::{RawStoreError, Region, Result};
use crate::frame::{self, Frame, FrameType, MAGIC};

/// Which log region a Log object writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Metadata (version/manifest) log at `[0, V)`
    Metadata,
    /// Write-ahead log at `[V, V+B)`
    WriteAhead,
}

impl LogKind {
    pub fn region(self) -> Region {
        match self {
            LogKind::Metadata => Region::MetadataLog,
            LogKind::WriteAhead => Region::WriteAheadLog,
        }
    }
}

/// Result of positioning a Log after its valid prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of valid frames found
    pub frames_recovered: u64,
    /// Sequence number of the last valid frame
    pub last_sequence: Option<u64>,
    /// Length of the valid prefix in bytes
    pub valid_bytes: u64,
    /// Whether the prefix ended on a torn or corrupt frame
    pub was_truncated: bool,
}

/// Buffered framed-append store over a log region
pub struct Log {
    kind: LogKind,
    name: String,
    extent: Extent,
    buffer: AlignedBuffer,
    write_head: usize,
    flush_offset: usize,
    sync_offset: usize,
    next_sequence: u64,
    file: Arc<File>,
    mapping: Arc<Mmap>,
    decoded: Option<Bytes>,
    read_offset: usize,
}

impl Log {
    pub(crate) fn new(
        kind: LogKind,
        name: String,
        extent: Extent,
        file: Arc<File>,
        mapping: Arc<Mmap>,
    ) -> Self {
        Self {
            kind,
            name,
            extent,
            buffer: AlignedBuffer::zeroed(extent.len as usize),
            write_head: 0,
            flush_offset: 0,
            sync_offset: 0,
            next_sequence: 1,
            file,
            mapping,
            decoded: None,
            read_offset: 0,
        }
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.extent.len
    }

    /// Framed bytes written so far
    pub fn size(&self) -> u64 {
        self.write_head as u64
    }

    pub fn flush_offset(&self) -> u64 {
        self.flush_offset as u64
    }

    pub fn sync_offset(&self) -> u64 {
        self.sync_offset as u64
    }

    /// Sequence number `append` will use next
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Frame `payload` and append it to the buffer. No I/O happens here.
    ///
    /// Returns the payload length. Fails with `CapacityExceeded` if the
    /// frame does not fit in what is left of the region.
    pub fn write(&mut self, payload: &[u8], frame_type: FrameType, sequence: u64) -> Result<usize> {
        let framed = frame::encoded_len(payload.len()) as u64;
        let available = self.capacity() - self.size();

        if framed > available || payload.len() > u32::MAX as usize {
            error!(
                log = %self.name,
                size = self.size(),
                requested = framed,
                "{} overflow",
                self.kind.region()
            );
            return Err(RawStoreError::CapacityExceeded {
                region: self.kind.region(),
                offset: self.extent.offset + self.size(),
                requested: framed,
                available,
            });
        }

        let written = frame::encode_into(&mut self.buffer[self.write_head..], frame_type, sequence, payload);
        self.write_head += written;
        self.next_sequence = self.next_sequence.max(sequence.saturating_add(1));
        Ok(payload.len())
    }

    /// Append a delta-version frame with the next sequence number.
    ///
    /// Returns the sequence number used.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        let sequence = self.next_sequence;
        self.write(payload, FrameType::DeltaVersion, sequence)?;
        Ok(sequence)
    }

    /// End of the range a flush writes: the frames plus the tail terminator
    fn flush_end(&self) -> usize {
        (self.write_head + MAGIC.len()).min(self.extent.len as usize)
    }

    /// Write `[flush_offset, write_head)` (plus terminator) to the region.
    ///
    /// Returns the number of framed bytes pushed.
    pub fn flush(&mut self) -> Result<usize> {
        let pending = self.write_head - self.flush_offset;
        if pending == 0 {
            return Ok(0);
        }

        let offset = self.extent.offset + self.flush_offset as u64;
        let end = self.flush_end();
        self.file.write_all_at(&self.buffer[self.flush_offset..end], offset)?;
        debug!(log = %self.name, offset, bytes = pending, "flushed log");

        self.flush_offset = self.write_head;
        Ok(pending)
    }

    /// Flush and wait until the written extent is on stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.flush()?;

        let len = self.flush_end() as u64;
        sync_range(&self.file, self.extent.offset, len).map_err(|source| {
            error!(log = %self.name, "log sync failed: {}", source);
            RawStoreError::SyncFailed {
                region: self.kind.region(),
                offset: self.extent.offset,
                len,
                source,
            }
        })?;

        self.sync_offset = self.flush_offset;
        debug!(log = %self.name, synced = self.sync_offset, "synced log");
        Ok(())
    }

    /// The raw region as currently visible on the device
    pub fn region(&self) -> &[u8] {
        let start = self.extent.offset as usize;
        &self.mapping[start..start + self.extent.len as usize]
    }

    /// Return up to `n` decoded payload bytes from the read cursor.
    ///
    /// The region is decoded once, on the first call. An empty result means
    /// the valid prefix is exhausted.
    pub fn read(&mut self, n: usize) -> Bytes {
        let decoded = match &self.decoded {
            Some(decoded) => decoded.clone(),
            None => {
                let decoded = frame::decode(self.region());
                debug!(log = %self.name, bytes = decoded.len(), "decoded log region");
                self.decoded = Some(decoded.clone());
                decoded
            }
        };

        let remaining = decoded.len() - self.read_offset;
        let supply = remaining.min(n);
        let out = decoded.slice(self.read_offset..self.read_offset + supply);
        self.read_offset += supply;
        out
    }

    /// Advance the read cursor by up to `n` bytes, returning how far it moved
    pub fn skip(&mut self, n: usize) -> usize {
        self.read(n).len()
    }

    /// Frames of the region's valid prefix
    pub fn frames(&self) -> Vec<Frame> {
        frame::decode_frames(self.region()).frames
    }

    /// Position the writer after the valid prefix already on the device.
    ///
    /// Buffers the valid bytes, moves all three cursors to the end of the
    /// prefix and continues the sequence after the last recovered frame.
    pub fn recover(&mut self) -> Result<RecoveryReport> {
        let decoded = frame::decode_frames(self.region());
        let valid = decoded.valid_len;

        // unflushed frames past the prefix are dropped; the stale bytes must
        // not reach the device later as the tail terminator
        if self.write_head > self.flush_offset {
            warn!(
                log = %self.name,
                discarded = self.write_head - self.flush_offset,
                "recover discards unflushed frames"
            );
        }
        let stale_end = self.write_head.max(valid);
        self.buffer[valid..stale_end].fill(0);

        let start = self.extent.offset as usize;
        self.buffer[..valid].copy_from_slice(&self.mapping[start..start + valid]);
        self.write_head = valid;
        self.flush_offset = valid;
        self.sync_offset = valid;

        let last_sequence = decoded.frames.last().map(|f| f.sequence);
        if let Some(seq) = last_sequence {
            self.next_sequence = seq.saturating_add(1);
        }

        let report = RecoveryReport {
            frames_recovered: decoded.frames.len() as u64,
            last_sequence,
            valid_bytes: valid as u64,
            was_truncated: decoded.is_torn(),
        };

        if report.was_truncated {
            warn!(log = %self.name, valid_bytes = valid, stop = ?decoded.stop, "log tail discarded");
        }
        info!(
            log = %self.name,
            frames = report.frames_recovered,
            valid_bytes = report.valid_bytes,
            "recovered log"
        );
        Ok(report)
    }

    /// Flush anything pending and release the buffer. Does not sync.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        if self.write_head > self.flush_offset {
            warn!(
                log = %self.name,
                unflushed = self.write_head - self.flush_offset,
                "log dropped with unflushed frames"
            );
        }
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("extent", &self.extent)
            .field("write_head", &self.write_head)
            .field("flush_offset", &self.flush_offset)
            .field("sync_offset", &self.sync_offset)
            .finish()
    }
}
