//! Memory accounting for buffer backing stores
//!
//! Every ArrayBuffer data block books its size here on allocation and
//! returns it when the block is dropped.

use crate::error::{VmError, VmResult};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks and limits the bytes held by buffer data blocks
#[derive(Debug)]
pub struct MemoryManager {
    /// Total bytes currently allocated
    allocated: AtomicUsize,
    /// Maximum bytes allowed
    limit: usize,
}

impl MemoryManager {
    /// Create a new memory manager with the specified limit
    pub fn new(limit: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            limit,
        }
    }

    /// Create a memory manager with a very large limit (for tests)
    pub fn test() -> Self {
        Self::new(usize::MAX / 2)
    }

    /// Try to book `size` bytes. Returns `Err(VmError::OutOfMemory)` if the
    /// limit would be exceeded.
    pub fn alloc(&self, size: usize) -> VmResult<()> {
        self.allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(size).filter(|total| *total <= self.limit)
            })
            .map(|_| ())
            .map_err(|_| VmError::OutOfMemory)
    }

    /// Record deallocation of `size` bytes
    pub fn free(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }

    /// Get current allocated bytes
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}
