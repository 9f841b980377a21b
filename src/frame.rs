//! Frame codec shared by both log flavors
//!
//! ## Frame Format
//! ```text
//! ┌───────────┬──────────┬──────────────┬─────────────┬─────────┬───────────┐
//! │ Magic (4) │ Type (4) │ Sequence (8) │ Length (4)  │ Payload │ CRC32 (4) │
//! │  "LDSX"   │  u32 LE  │    u64 LE    │   u32 LE    │         │  u32 LE   │
//! └───────────┴──────────┴──────────────┴─────────────┴─────────┴───────────┘
//! ```
//!
//! The CRC covers type, sequence, length and payload. Decoding walks the
//! region from offset 0 and stops at the first frame that does not check
//! out: wrong magic, a length running past the region, an unknown type or a
//! CRC mismatch. Everything before that point is the valid prefix; the rest
//! is treated as an unwritten or torn tail, never as an error.

use bytes::{Bytes, BytesMut};

/// Magic bytes opening every frame
pub const MAGIC: &[u8; 4] = b"LDSX";

/// Header size: Magic (4) + Type (4) + Sequence (8) + Length (4) = 20 bytes
pub const HEADER_SIZE: usize = 20;

/// Trailing checksum size
pub const CHECKSUM_SIZE: usize = 4;

/// Bytes added to every payload on disk
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CHECKSUM_SIZE;

const TYPE_OFFSET: usize = 4;
const SEQUENCE_OFFSET: usize = 8;
const LENGTH_OFFSET: usize = 16;

/// Kind of record carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameType {
    /// Delta version record (an edit applied on top of the previous version)
    DeltaVersion = 2,
}

impl FrameType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            2 => Some(FrameType::DeltaVersion),
            _ => None,
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub sequence: u64,
    pub payload: Bytes,
}

/// Why decoding stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStop {
    /// Fewer than four bytes left in the region
    EndOfRegion,
    /// Magic did not match (unwritten tail)
    BadMagic,
    /// Header or payload runs past the end of the region
    Truncated,
    /// Type field holds no known frame type
    UnknownType,
    /// Stored CRC does not match the frame contents
    ChecksumMismatch,
}

/// Result of walking a raw region
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Valid frames in region order
    pub frames: Vec<Frame>,
    /// Length of the valid prefix in bytes
    pub valid_len: usize,
    /// What ended the valid prefix
    pub stop: DecodeStop,
}

impl Decoded {
    /// Whether the prefix ended on something that looks like a torn frame
    /// rather than a clean unwritten tail.
    pub fn is_torn(&self) -> bool {
        matches!(
            self.stop,
            DecodeStop::Truncated | DecodeStop::UnknownType | DecodeStop::ChecksumMismatch
        )
    }
}

/// On-disk size of a frame carrying `payload_len` bytes
pub fn encoded_len(payload_len: usize) -> usize {
    FRAME_OVERHEAD + payload_len
}

/// Encode one frame into the front of `dst`, returning the bytes written.
///
/// Panics if `dst` is shorter than `encoded_len(payload.len())` or the
/// payload length does not fit the 32-bit length field; callers check
/// capacity first.
pub fn encode_into(dst: &mut [u8], frame_type: FrameType, sequence: u64, payload: &[u8]) -> usize {
    let payload_len = u32::try_from(payload.len()).expect("frame payload exceeds u32::MAX");
    let total = encoded_len(payload.len());
    let frame = &mut dst[..total];

    frame[..TYPE_OFFSET].copy_from_slice(MAGIC);
    frame[TYPE_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&frame_type.as_u32().to_le_bytes());
    frame[SEQUENCE_OFFSET..LENGTH_OFFSET].copy_from_slice(&sequence.to_le_bytes());
    frame[LENGTH_OFFSET..HEADER_SIZE].copy_from_slice(&payload_len.to_le_bytes());
    frame[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

    let crc = checksum(&frame[TYPE_OFFSET..HEADER_SIZE], payload);
    frame[HEADER_SIZE + payload.len()..].copy_from_slice(&crc.to_le_bytes());

    total
}

/// Encode one frame into a fresh vector
pub fn encode(frame_type: FrameType, sequence: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; encoded_len(payload.len())];
    encode_into(&mut out, frame_type, sequence, payload);
    out
}

/// Walk `raw` from the start and collect every frame of the valid prefix
pub fn decode_frames(raw: &[u8]) -> Decoded {
    let mut frames = Vec::new();
    let mut pos = 0usize;

    let stop = loop {
        let rest = &raw[pos..];
        if rest.len() < MAGIC.len() {
            break DecodeStop::EndOfRegion;
        }
        if &rest[..MAGIC.len()] != MAGIC {
            break DecodeStop::BadMagic;
        }
        if rest.len() < HEADER_SIZE {
            break DecodeStop::Truncated;
        }

        let raw_type = read_u32(&rest[TYPE_OFFSET..SEQUENCE_OFFSET]);
        let sequence = read_u64(&rest[SEQUENCE_OFFSET..LENGTH_OFFSET]);
        let payload_len = read_u32(&rest[LENGTH_OFFSET..HEADER_SIZE]) as usize;

        let total = encoded_len(payload_len);
        if rest.len() < total {
            break DecodeStop::Truncated;
        }

        let frame_type = match FrameType::from_u32(raw_type) {
            Some(t) => t,
            None => break DecodeStop::UnknownType,
        };

        let payload = &rest[HEADER_SIZE..HEADER_SIZE + payload_len];
        let stored_crc = read_u32(&rest[HEADER_SIZE + payload_len..total]);
        if stored_crc != checksum(&rest[TYPE_OFFSET..HEADER_SIZE], payload) {
            break DecodeStop::ChecksumMismatch;
        }

        frames.push(Frame {
            frame_type,
            sequence,
            payload: Bytes::copy_from_slice(payload),
        });
        pos += total;
    };

    Decoded { frames, valid_len: pos, stop }
}

/// Decode `raw` into the concatenation of its valid payloads, in order
pub fn decode(raw: &[u8]) -> Bytes {
    let decoded = decode_frames(raw);
    let total: usize = decoded.frames.iter().map(|f| f.payload.len()).sum();

    let mut out = BytesMut::with_capacity(total);
    for frame in &decoded.frames {
        out.extend_from_slice(&frame.payload);
    }
    out.freeze()
}

fn checksum(header_fields: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_fields);
    hasher.update(payload);
    hasher.finalize()
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
