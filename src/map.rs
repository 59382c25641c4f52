use std::sync::atomic::{AtomicU64, AtomicUsize};

use parking_lot::Mutex;

use crate::alloc::{Allocator, SystemAllocator};
use crate::pool::NodePool;
use crate::sync::ORD_RLX;

/// A concurrent, ordered map from `u64` keys to `usize` payloads.
///
/// Backed by a hybrid radix/crit-bit tree: a single writer mutex serializes
/// [`Map::insert`], [`Map::remove`] and [`Map::iterate`]; [`Map::get`],
/// [`Map::find`] and friends never take a lock, instead bounding their
/// staleness against a shared remove counter (see the crate-level docs).
pub struct Map<A: Allocator = SystemAllocator> {
    pub(crate) root: AtomicUsize,
    pub(crate) remove_count: AtomicU64,
    pub(crate) write_lock: Mutex<()>,
    pub(crate) pool: NodePool<A>,
}

impl Map<SystemAllocator> {
    /// Create a fresh, empty map using the global allocator.
    pub fn new() -> Self {
        Self::with_allocator(SystemAllocator)
    }
}

impl Default for Map<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Map<A> {
    /// Create a fresh, empty map using a caller-supplied allocator for node
    /// storage.
    pub fn with_allocator(alloc: A) -> Self {
        Self {
            root: AtomicUsize::new(0),
            remove_count: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            pool: NodePool::new(alloc),
        }
    }

    /// Number of complete remove operations performed so far. Exposed
    /// mainly for tests that want to observe the grace-period window
    /// directly (scenario S5).
    pub fn remove_count(&self) -> u64 {
        self.remove_count.load(ORD_RLX)
    }
}

impl<A: Allocator> Drop for Map<A> {
    fn drop(&mut self) {
        // Not safe against concurrent operations (section 4.9): by the time
        // `Drop::drop` runs we are the sole owner, so no reader or writer
        // can be mid-traversal.
        let root = self.root.load(ORD_RLX);
        unsafe {
            self.pool.delete_subtree(root);
            self.pool.drain();
        }
    }
}
