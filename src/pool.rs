//! Per-map freelists with a bounded retirement ring, converting "logically
//! freed" into "safe to hand back to `alloc_*`" only after `DELETED_LIFE`
//! further removes have elapsed.
//!
//! All of this is touched only while the map's write mutex is held (inserts
//! and removes are the only callers), so plain `Cell`-like access guarded
//! by that external lock would be sufficient; we still route everything
//! through `AtomicUsize`/`AtomicU64` so the type doesn't need an `unsafe
//! impl Sync` of its own and so the handful of fields a stalled reader
//! might transiently observe through a retired node (e.g. `children[0]`
//! used as a free-list link) are never a data race even in the absence of
//! the mutex.

use std::sync::atomic::AtomicUsize;

use crate::alloc::{Allocator, Layout};
use crate::node::{decode, Inner, Leaf, Slot, DELETED_LIFE, SLNODES};
use crate::sync::{ORD_ACQ, ORD_REL, ORD_RLX};

pub(crate) struct NodePool<A: Allocator> {
    alloc: A,
    free_inner: AtomicUsize,
    free_leaf: AtomicUsize,
    retire_inner: [AtomicUsize; DELETED_LIFE],
    retire_leaf: [AtomicUsize; DELETED_LIFE],
}

fn inner_layout() -> Layout {
    Layout::new::<Inner>()
}

fn leaf_layout() -> Layout {
    Layout::new::<Leaf>()
}

impl<A: Allocator> NodePool<A> {
    pub(crate) fn new(alloc: A) -> Self {
        Self {
            alloc,
            free_inner: AtomicUsize::new(0),
            free_leaf: AtomicUsize::new(0),
            retire_inner: std::array::from_fn(|_| AtomicUsize::new(0)),
            retire_leaf: std::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }

    /// Return a reusable inner node if the free list has one, else allocate
    /// fresh. Caller must fully initialize the returned node's fields
    /// before publishing a pointer to it.
    pub(crate) fn alloc_inner(&self) -> Result<*mut Inner, ()> {
        let head = self.free_inner.load(ORD_RLX);
        if head == 0 {
            let ptr = self.alloc.allocate(inner_layout())?;
            return Ok(ptr.as_ptr().cast::<Inner>());
        }
        let node = head as *mut Inner;
        let next = unsafe { (*node).children[0].load(ORD_RLX) };
        self.free_inner.store(next, ORD_RLX);
        Ok(node)
    }

    pub(crate) fn alloc_leaf(&self) -> Result<*mut Leaf, ()> {
        let head = self.free_leaf.load(ORD_RLX);
        if head == 0 {
            let ptr = self.alloc.allocate(leaf_layout())?;
            return Ok(ptr.as_ptr().cast::<Leaf>());
        }
        let leaf = head as *mut Leaf;
        let next = unsafe { (*leaf).value.load(ORD_RLX) };
        self.free_leaf.store(next, ORD_RLX);
        Ok(leaf)
    }

    /// Push `n` onto the inner free list. `n` must not currently be
    /// reachable from the live tree.
    fn push_free_inner(&self, n: *mut Inner) {
        if n.is_null() {
            return;
        }
        let head = self.free_inner.load(ORD_RLX);
        unsafe { (*n).children[0].store(head, ORD_REL) };
        self.free_inner.store(n as usize, ORD_REL);
    }

    fn push_free_leaf(&self, k: *mut Leaf) {
        if k.is_null() {
            return;
        }
        let head = self.free_leaf.load(ORD_RLX);
        unsafe { (*k).value.store(head, ORD_REL) };
        self.free_leaf.store(k as usize, ORD_REL);
    }

    /// Retire a leaf that was allocated as insert scratch space but never
    /// published into the tree (the landing key already existed). It was
    /// never reachable from a reader, so it can go straight onto the free
    /// list rather than through the retirement ring.
    pub(crate) fn retire_scratch_leaf(&self, k: *mut Leaf) {
        self.push_free_leaf(k);
    }

    /// Rotate the retirement ring for a remove that has reached the point
    /// of actually removing a key: evict whatever currently sits in slot
    /// `(remove_count - 1) % DELETED_LIFE` onto the free lists, then return
    /// that slot index so the caller can schedule its own retirements into
    /// it via [`Self::schedule_inner`]/[`Self::schedule_leaf`].
    pub(crate) fn rotate(&self, remove_count: u64) -> usize {
        let slot = ((remove_count - 1) % DELETED_LIFE as u64) as usize;
        let old_inner = self.retire_inner[slot].swap(0, ORD_ACQ) as *mut Inner;
        let old_leaf = self.retire_leaf[slot].swap(0, ORD_ACQ) as *mut Leaf;
        self.push_free_inner(old_inner);
        self.push_free_leaf(old_leaf);
        slot
    }

    pub(crate) fn schedule_inner(&self, slot: usize, n: *mut Inner) {
        if !n.is_null() {
            self.retire_inner[slot].store(n as usize, ORD_REL);
        }
    }

    pub(crate) fn schedule_leaf(&self, slot: usize, k: *mut Leaf) {
        if !k.is_null() {
            self.retire_leaf[slot].store(k as usize, ORD_REL);
        }
    }

    /// Recursively free a live subtree back to the system allocator.
    /// Only safe when no reader can possibly be traversing it, i.e. during
    /// `destroy`.
    pub(crate) unsafe fn delete_subtree(&self, word: usize) {
        match decode(word) {
            Slot::Null => {}
            Slot::Leaf(k) => self.alloc.deallocate(
                std::ptr::NonNull::new_unchecked(k.cast::<u8>()),
                leaf_layout(),
            ),
            Slot::Inner(n) => {
                for i in 0..SLNODES {
                    let child = (*n).children[i].load(ORD_RLX);
                    self.delete_subtree(child);
                }
                self.alloc
                    .deallocate(std::ptr::NonNull::new_unchecked(n.cast::<u8>()), inner_layout());
            }
        }
    }

    /// Drain both free lists and all ring slots back to the system
    /// allocator. Called only from `destroy`.
    pub(crate) unsafe fn drain(&self) {
        let mut n = self.free_inner.load(ORD_RLX) as *mut Inner;
        while !n.is_null() {
            let next = (*n).children[0].load(ORD_RLX);
            self.alloc
                .deallocate(std::ptr::NonNull::new_unchecked(n.cast::<u8>()), inner_layout());
            n = next as *mut Inner;
        }
        let mut k = self.free_leaf.load(ORD_RLX) as *mut Leaf;
        while !k.is_null() {
            let next = (*k).value.load(ORD_RLX);
            self.alloc
                .deallocate(std::ptr::NonNull::new_unchecked(k.cast::<u8>()), leaf_layout());
            k = next as *mut Leaf;
        }
        for slot in &self.retire_inner {
            let n = slot.load(ORD_RLX) as *mut Inner;
            if !n.is_null() {
                self.alloc
                    .deallocate(std::ptr::NonNull::new_unchecked(n.cast::<u8>()), inner_layout());
            }
        }
        for slot in &self.retire_leaf {
            let k = slot.load(ORD_RLX) as *mut Leaf;
            if !k.is_null() {
                self.alloc
                    .deallocate(std::ptr::NonNull::new_unchecked(k.cast::<u8>()), leaf_layout());
            }
        }
    }
}

#[cfg(test)]
impl<A: Allocator> NodePool<A> {
    /// Raw free-list head word, for tests that want to observe when a
    /// retired leaf actually becomes reusable (scenario S5).
    pub(crate) fn free_leaf_head(&self) -> usize {
        self.free_leaf.load(ORD_RLX)
    }
}
