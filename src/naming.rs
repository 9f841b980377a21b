//! Resource naming conventions
//!
//! Maps the host engine's file names onto the primitive that backs them:
//! `NNNNNN.ldb` chunks go to slots, `MANIFEST-*` to the metadata log,
//! `*.log` to the write-ahead log, everything else to a [`NullSink`].
//!
//! [`NullSink`]: crate::null::NullSink

use std::path::Path;

/// What a host file name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Chunk file carrying its numeric id
    Chunk(u64),
    MetadataLog,
    WriteAheadLog,
    /// Not persisted
    Other,
}

impl ResourceKind {
    pub fn classify(name: &str) -> Self {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(name);

        if let Some(stem) = file_name.strip_suffix(".ldb") {
            return match stem.parse::<u64>() {
                Ok(id) => ResourceKind::Chunk(id),
                Err(_) => ResourceKind::Other,
            };
        }
        if file_name.contains("MANIFEST") {
            return ResourceKind::MetadataLog;
        }
        if file_name.ends_with(".log") {
            return ResourceKind::WriteAheadLog;
        }
        ResourceKind::Other
    }

    /// Chunk file name for a slot id (`000042.ldb`)
    pub fn chunk_name(id: u64) -> String {
        format!("{:06}.ldb", id)
    }
}
