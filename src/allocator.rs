//! Slot Allocator
//!
//! Owns the online map (one bit per physical slot) and hands out slot ids.
//!
//! ## Id Mapping
//! Slot ids are logical and monotonic; the physical slot backing an id is
//! `id mod N`. `allocate(seed)` returns the smallest id `>= seed` (scanning
//! forward, then wrapping once) whose physical slot is free, so host file
//! numbers keep growing while physical slots get reused.
//!
//! ## Concurrency
//! The whole scan-and-mark sequence runs under one lock, so two callers can
//! never be handed the same physical slot.

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{RawStoreError, Result};

/// Bitmap over the physical slots, `1` = allocated
#[derive(Debug)]
struct OnlineMap {
    words: Vec<u64>,
    len: u64,
    allocated: u64,
}

impl OnlineMap {
    fn new(len: u64) -> Self {
        let words = len.div_ceil(64) as usize;
        Self { words: vec![0; words], len, allocated: 0 }
    }

    fn get(&self, bit: u64) -> bool {
        self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0
    }

    /// Set `bit`, returning true if it was previously clear
    fn set(&mut self, bit: u64) -> bool {
        let word = &mut self.words[(bit / 64) as usize];
        let mask = 1 << (bit % 64);
        let was_clear = *word & mask == 0;
        *word |= mask;
        if was_clear {
            self.allocated += 1;
        }
        was_clear
    }

    /// Clear `bit`, returning true if it was previously set
    fn clear(&mut self, bit: u64) -> bool {
        let word = &mut self.words[(bit / 64) as usize];
        let mask = 1 << (bit % 64);
        let was_set = *word & mask != 0;
        *word &= !mask;
        if was_set {
            self.allocated -= 1;
        }
        was_set
    }

    /// First clear bit in `[from, to)`
    fn first_free(&self, from: u64, to: u64) -> Option<u64> {
        let mut bit = from;
        while bit < to {
            let word = self.words[(bit / 64) as usize];
            if bit % 64 == 0 && word == u64::MAX {
                bit += 64;
                continue;
            }
            if word & (1 << (bit % 64)) == 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }
}

/// Assigns slot ids over a fixed pool of physical slots
#[derive(Debug)]
pub struct SlotAllocator {
    map: Mutex<OnlineMap>,
    total: u64,
}

impl SlotAllocator {
    /// Create an allocator over `total` slots, all free
    pub fn new(total: u64) -> Self {
        Self {
            map: Mutex::new(OnlineMap::new(total)),
            total,
        }
    }

    /// Number of physical slots
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of physical slots currently allocated
    pub fn allocated_count(&self) -> u64 {
        self.map.lock().allocated
    }

    /// Physical slot backing a logical id
    pub fn physical_slot(&self, id: u64) -> u64 {
        id % self.total.max(1)
    }

    /// Allocate the first free slot at or after `seed`, wrapping once.
    ///
    /// Returns the logical id whose physical slot was marked allocated, or
    /// `PoolExhausted` if every slot is taken.
    pub fn allocate(&self, seed: u64) -> Result<u64> {
        let n = self.total;
        if n == 0 {
            return Err(RawStoreError::PoolExhausted { total: 0 });
        }

        let mut map = self.map.lock();
        let start = seed % n;

        if let Some(p) = map.first_free(start, n) {
            map.set(p);
            let id = seed + (p - start);
            debug!(seed, id, physical = p, "allocated slot");
            return Ok(id);
        }

        warn!(seed, start, "no free slot before end of pool, wrapping around");
        if let Some(p) = map.first_free(0, start) {
            map.set(p);
            let id = seed + (n - start) + p;
            debug!(seed, id, physical = p, "allocated slot after wrap");
            return Ok(id);
        }

        error!(total = n, "slot pool exhausted");
        Err(RawStoreError::PoolExhausted { total: n })
    }

    /// Mark the slot behind `id` allocated without scanning.
    ///
    /// Used when the host rebuilds the online map from its own metadata.
    /// Returns false if the slot was already allocated.
    pub fn reserve(&self, id: u64) -> bool {
        if self.total == 0 {
            return false;
        }
        let p = self.physical_slot(id);
        self.map.lock().set(p)
    }

    /// Return the slot behind `id` to the pool.
    ///
    /// Returns false if the slot was not allocated.
    pub fn release(&self, id: u64) -> bool {
        if self.total == 0 {
            return false;
        }
        let p = self.physical_slot(id);
        let released = self.map.lock().clear(p);
        if released {
            debug!(id, physical = p, "released slot");
        }
        released
    }

    /// Whether the slot behind `id` is allocated
    pub fn is_allocated(&self, id: u64) -> bool {
        if self.total == 0 {
            return false;
        }
        let p = self.physical_slot(id);
        self.map.lock().get(p)
    }
}
