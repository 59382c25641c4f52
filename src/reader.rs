//! Reader: exact lookup and bounded (`≤`/`≥`) lookup (sections 4.6, 4.7).
//!
//! Every public method here takes no lock; each wraps its traversal in the
//! remove-count envelope described in section 5 and retries unconditionally
//! if it detects it may have run long enough to race a retiring node back
//! into reuse.

use crate::alloc::Allocator;
use crate::error::Dir;
use crate::map::Map;
use crate::node::{contains, decode, slice_index, Inner, Leaf, Slot, DELETED_LIFE, SLNODES};
use crate::sync::{Backoff, ORD_ACQ};

impl<A: Allocator> Map<A> {
    /// Exact-match lookup.
    pub fn get(&self, key: u64) -> Option<usize> {
        self.read_with_retry(|| {
            let mut cur = self.root.load(ORD_ACQ);
            while let Slot::Inner(n) = decode(cur) {
                let idx = slice_index(key, unsafe { (*n).shift });
                cur = unsafe { (*n).children[idx].load(ORD_ACQ) };
            }
            match decode(cur) {
                Slot::Leaf(k) if unsafe { (*k).key.load(ORD_ACQ) } == key => {
                    Some(unsafe { (*k).value.load(ORD_ACQ) })
                }
                _ => None,
            }
        })
    }

    /// Largest-key-at-most lookup.
    pub fn find_le(&self, key: u64) -> Option<(u64, usize)> {
        self.read_with_retry(|| {
            let root = self.root.load(ORD_ACQ);
            find_le_word(root, key).map(read_leaf)
        })
    }

    /// Smallest-key-at-least lookup.
    pub fn find_ge(&self, key: u64) -> Option<(u64, usize)> {
        self.read_with_retry(|| {
            let root = self.root.load(ORD_ACQ);
            find_ge_word(root, key).map(read_leaf)
        })
    }

    /// Parametrized lookup: `dir` selects `<`, `≤`, `=`, `≥` or `>`.
    ///
    /// The strict variants are implemented, as in the source, by
    /// decrementing/incrementing `key` once and delegating to `≤`/`≥`; the
    /// boundary is guarded so no key is treated as `< 0` or `> u64::MAX`.
    pub fn find(&self, key: u64, dir: Dir) -> Option<(u64, usize)> {
        let key = match dir {
            Dir::Lt => key.checked_sub(1)?,
            Dir::Gt => key.checked_add(1)?,
            Dir::Le | Dir::Eq | Dir::Ge => key,
        };
        match dir {
            Dir::Lt | Dir::Le => self.find_le(key),
            Dir::Gt | Dir::Ge => self.find_ge(key),
            Dir::Eq => self.get(key).map(|v| (key, v)),
        }
    }

    /// Wrap `attempt` in the remove-count envelope: sample `remove_count`
    /// before and after, and retry unconditionally if at least
    /// `DELETED_LIFE` removes elapsed during the attempt.
    fn read_with_retry<T>(&self, mut attempt: impl FnMut() -> T) -> T {
        let mut backoff = Backoff::new();
        loop {
            let r1 = self.remove_count.load(ORD_ACQ);
            let result = attempt();
            let r2 = self.remove_count.load(ORD_ACQ);
            if r1 + DELETED_LIFE as u64 <= r2 {
                log::trace!("reader retry: r1={r1} r2={r2}");
                backoff.spin();
                continue;
            }
            return result;
        }
    }
}

fn read_leaf(k: *mut Leaf) -> (u64, usize) {
    unsafe { ((*k).key.load(ORD_ACQ), (*k).value.load(ORD_ACQ)) }
}

fn find_le_word(word: usize, key: u64) -> Option<*mut Leaf> {
    match decode(word) {
        Slot::Null => None,
        Slot::Leaf(k) => {
            if unsafe { (*k).key.load(ORD_ACQ) } <= key {
                Some(k)
            } else {
                None
            }
        }
        Slot::Inner(n) => {
            let path = unsafe { (*n).path.load(ORD_ACQ) };
            let shift = unsafe { (*n).shift };
            if !contains(key, path, shift) {
                return if path < key {
                    find_predecessor(n)
                } else {
                    None
                };
            }
            let nib = slice_index(key, shift);
            let child = unsafe { (*n).children[nib].load(ORD_ACQ) };
            if let Some(k) = find_le_word(child, key) {
                return Some(k);
            }
            for i in (0..nib).rev() {
                let sib = unsafe { (*n).children[i].load(ORD_ACQ) };
                if sib != 0 {
                    return match decode(sib) {
                        Slot::Leaf(k) => Some(k),
                        Slot::Inner(m) => find_predecessor(m),
                        Slot::Null => unreachable!(),
                    };
                }
            }
            None
        }
    }
}

fn find_ge_word(word: usize, key: u64) -> Option<*mut Leaf> {
    match decode(word) {
        Slot::Null => None,
        Slot::Leaf(k) => {
            if unsafe { (*k).key.load(ORD_ACQ) } >= key {
                Some(k)
            } else {
                None
            }
        }
        Slot::Inner(n) => {
            let path = unsafe { (*n).path.load(ORD_ACQ) };
            let shift = unsafe { (*n).shift };
            if !contains(key, path, shift) {
                return if path > key {
                    find_successor(n)
                } else {
                    None
                };
            }
            let nib = slice_index(key, shift);
            let child = unsafe { (*n).children[nib].load(ORD_ACQ) };
            if let Some(k) = find_ge_word(child, key) {
                return Some(k);
            }
            for i in (nib + 1)..SLNODES {
                let sib = unsafe { (*n).children[i].load(ORD_ACQ) };
                if sib != 0 {
                    return match decode(sib) {
                        Slot::Leaf(k) => Some(k),
                        Slot::Inner(m) => find_successor(m),
                        Slot::Null => unreachable!(),
                    };
                }
            }
            None
        }
    }
}

/// Rightmost leaf in a subtree: repeatedly takes the highest non-null
/// child. Returns `None` only if a level has no non-null child at all,
/// which invariant 1 rules out.
fn find_predecessor(mut n: *mut Inner) -> Option<*mut Leaf> {
    loop {
        let mut next = None;
        for i in (0..SLNODES).rev() {
            let child = unsafe { (*n).children[i].load(ORD_ACQ) };
            if child != 0 {
                next = Some(child);
                break;
            }
        }
        match decode(next?) {
            Slot::Leaf(k) => return Some(k),
            Slot::Inner(m) => n = m,
            Slot::Null => unreachable!(),
        }
    }
}

/// Leftmost leaf in a subtree: mirror of [`find_predecessor`].
fn find_successor(mut n: *mut Inner) -> Option<*mut Leaf> {
    loop {
        let mut next = None;
        for i in 0..SLNODES {
            let child = unsafe { (*n).children[i].load(ORD_ACQ) };
            if child != 0 {
                next = Some(child);
                break;
            }
        }
        match decode(next?) {
            Slot::Leaf(k) => return Some(k),
            Slot::Inner(m) => n = m,
            Slot::Null => unreachable!(),
        }
    }
}
