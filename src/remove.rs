//! Writer: remove (section 4.5).

use std::sync::atomic::AtomicUsize;

use crate::alloc::Allocator;
use crate::map::Map;
use crate::node::{decode, slice_index, Inner, Slot, SLNODES};
use crate::sync::{ORD_REL, ORD_RLX};

impl<A: Allocator> Map<A> {
    /// Remove `key`, returning its value, or `None` if absent.
    pub fn remove(&self, key: u64) -> Option<usize> {
        let _guard = self.write_lock.lock();

        let root = self.root.load(ORD_RLX);
        if root == 0 {
            return None;
        }

        // Every call that gets this far rotates a ring slot, whether or
        // not the key is ultimately found (section 9's resolution of the
        // source's remove-count ambiguity).
        let rc = self.remove_count.fetch_add(1, ORD_REL) + 1;
        let slot = self.pool.rotate(rc);

        if let Slot::Leaf(k) = decode(root) {
            if unsafe { (*k).key.load(ORD_RLX) } == key {
                self.root.store(0, ORD_REL);
                let value = unsafe { (*k).value.load(ORD_RLX) };
                self.pool.schedule_leaf(slot, k);
                return Some(value);
            }
            return None;
        }

        // root is an inner node; descend tracking both the slot holding the
        // leaf (`k_parent`) and the slot holding its parent inner node
        // (`n_parent`), so a single-child collapse can splice the survivor
        // straight into the grandparent.
        let mut n_parent: &AtomicUsize = &self.root;
        let mut k_parent: &AtomicUsize = &self.root;
        let mut kn = root;
        let mut n: *mut Inner = std::ptr::null_mut();

        loop {
            match decode(kn) {
                Slot::Leaf(_) => break,
                Slot::Inner(inner_ptr) => {
                    n_parent = k_parent;
                    n = inner_ptr;
                    let idx = slice_index(key, unsafe { (*inner_ptr).shift });
                    k_parent = unsafe { &(*inner_ptr).children[idx] };
                    kn = k_parent.load(ORD_RLX);
                    if kn == 0 {
                        return None;
                    }
                }
                Slot::Null => unreachable!("kn is checked non-null before the loop re-enters"),
            }
        }

        let k = match decode(kn) {
            Slot::Leaf(k) => k,
            _ => unreachable!("loop above only exits on Slot::Leaf"),
        };
        if unsafe { (*k).key.load(ORD_RLX) } != key {
            return None;
        }

        k_parent.store(0, ORD_REL);

        let mut only_idx: Option<usize> = None;
        let mut more_than_one = false;
        for i in 0..SLNODES {
            if unsafe { (*n).children[i].load(ORD_RLX) } != 0 {
                if only_idx.is_some() {
                    more_than_one = true;
                    break;
                }
                only_idx = Some(i);
            }
        }

        let value = unsafe { (*k).value.load(ORD_RLX) };

        if !more_than_one {
            let idx = only_idx.expect("invariant 1: inner node had >= 2 children before remove");
            let survivor = unsafe { (*n).children[idx].load(ORD_RLX) };
            n_parent.store(survivor, ORD_REL);
            self.pool.schedule_inner(slot, n);
            log::debug!("remove: collapsed inner node for key {key:#x}");
        }

        self.pool.schedule_leaf(slot, k);
        Some(value)
    }
}
