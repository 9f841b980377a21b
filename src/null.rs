//! Null sink for files the layer does not persist
//!
//! Writes are discarded. Reads return nothing, except on the `CURRENT`
//! marker: its first read yields a fixed pointer to the metadata log so the
//! host finds its manifest, and every later read on the same handle is
//! empty.

use std::path::Path;

use bytes::Bytes;

/// File name that gets the fabricated one-shot payload
pub const MARKER_NAME: &str = "CURRENT";

/// Contents served for the marker
pub const MARKER_PAYLOAD: &[u8] = b"MANIFEST-LDS\n";

/// Passthrough handle for a non-persisted file
#[derive(Debug)]
pub struct NullSink {
    name: String,
    is_marker: bool,
    marker_served: bool,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_marker = Path::new(&name)
            .file_name()
            .map(|f| f == MARKER_NAME)
            .unwrap_or(false);

        Self { name, is_marker, marker_served: false }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discard `data`, reporting it as fully written
    pub fn write(&mut self, data: &[u8]) -> usize {
        data.len()
    }

    pub fn flush(&mut self) {}

    pub fn sync(&mut self) {}

    /// Read from the sink.
    ///
    /// The marker payload is delivered whole on the first read regardless of
    /// `_n`; everything else reads as empty.
    pub fn read(&mut self, _n: usize) -> Bytes {
        if self.is_marker && !self.marker_served {
            self.marker_served = true;
            return Bytes::from_static(MARKER_PAYLOAD);
        }
        Bytes::new()
    }

    pub fn skip(&mut self, _n: usize) {}
}
