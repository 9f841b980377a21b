//! # rawstore
//!
//! Raw-device storage substrate for a log-structured key-value engine:
//! - Fixed partitioning of a block device (or pre-allocated file)
//! - Pool of fixed-size chunk slots with a size footer
//! - Framed, checksummed metadata and write-ahead logs
//! - Valid-prefix recovery that tolerates a torn tail
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Host engine adapter                       │
//! │        (classifies names, maps file ops 1:1 below)           │
//! └───────┬───────────────────┬───────────────────┬─────────────┘
//!         │ chunk             │ MANIFEST / .log   │ other
//!         ▼                   ▼                   ▼
//!   ┌───────────┐      ┌─────────────┐     ┌─────────────┐
//!   │   Slot    │      │     Log     │     │  NullSink   │
//!   │ (buffer + │      │ (frames via │     │ (discard)   │
//!   │  footer)  │      │ FrameCodec) │     └─────────────┘
//!   └─────┬─────┘      └──────┬──────┘
//!         │                   │
//!   ┌─────▼─────┐             │
//!   │   Slot    │             │
//!   │ Allocator │             │
//!   └─────┬─────┘             │
//!         ▼                   ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │                    Device Layout                     │
//!   │  [metadata log | write-ahead log | slot 0 .. N-1]   │
//!   └─────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod buffer;
pub mod frame;
pub mod allocator;
pub mod device;
pub mod slot;
pub mod log;
pub mod null;
pub mod naming;
pub mod worker;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RawStoreError, Region, Result};
pub use config::Config;
pub use device::{Device, Extent, Layout};
pub use allocator::SlotAllocator;
pub use slot::Slot;
pub use log::{Log, LogKind, RecoveryReport};
pub use frame::{Frame, FrameType};
pub use null::NullSink;
pub use naming::ResourceKind;
pub use worker::BackgroundWorker;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rawstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
