//! Reader: bounded in-order iteration (section 4.8).
//!
//! Unlike every other read operation this one takes the write mutex: the
//! callback may perform secondary operations against other shared state
//! that assume a stable view, so this is a deliberate policy choice, not
//! an oversight to "optimize" into a lock-free walk (section 9).

use crate::alloc::Allocator;
use crate::map::Map;
use crate::node::{decode, path_mask, Slot, SLNODES};
use crate::sync::ORD_RLX;

impl<A: Allocator> Map<A> {
    /// Visit every leaf with `min <= key <= max` in ascending key order,
    /// calling `callback(key, value)` for each. If `callback` returns
    /// `true`, iteration stops immediately.
    pub fn iterate(&self, min: u64, max: u64, mut callback: impl FnMut(u64, usize) -> bool) {
        let _guard = self.write_lock.lock();
        let root = self.root.load(ORD_RLX);
        if root != 0 {
            iter_word(root, min, max, &mut callback);
        }
    }
}

/// Returns `true` if the walk should stop — either because the callback
/// asked to, or because this subtree's `path` already exceeds `max`, which
/// (given the tree is visited in strictly ascending key order) means every
/// leaf from here to the end of the whole traversal is also out of range.
/// Propagating that as a full stop rather than merely skipping this
/// subtree is intentional and relies on that global ordering guarantee.
fn iter_word(word: usize, min: u64, max: u64, callback: &mut impl FnMut(u64, usize) -> bool) -> bool {
    match decode(word) {
        Slot::Null => false,
        Slot::Leaf(k) => {
            let key = unsafe { (*k).key.load(ORD_RLX) };
            if key >= min && key <= max {
                let value = unsafe { (*k).value.load(ORD_RLX) };
                callback(key, value)
            } else {
                false
            }
        }
        Slot::Inner(n) => {
            let path = unsafe { (*n).path.load(ORD_RLX) };
            let shift = unsafe { (*n).shift };
            if path > max {
                return true;
            }
            if (path | path_mask(shift)) < min {
                return false;
            }
            for i in 0..SLNODES {
                let child = unsafe { (*n).children[i].load(ORD_RLX) };
                if child != 0 && iter_word(child, min, max, callback) {
                    return true;
                }
            }
            false
        }
    }
}
