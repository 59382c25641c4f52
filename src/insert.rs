//! Writer: insert/update (section 4.4).

use std::sync::atomic::AtomicUsize;

use crate::alloc::Allocator;
use crate::bitops::msb_position;
use crate::error::{InsertError, InsertOutcome};
use crate::map::Map;
use crate::node::{contains, decode, path_mask, slice_index, tag_inner, tag_leaf, Slot};
use crate::sync::{ORD_REL, ORD_RLX};

impl<A: Allocator> Map<A> {
    /// Insert `key -> value`.
    ///
    /// If the key is already present: with `update = false` this is a
    /// no-op that reports [`InsertError::AlreadyExists`]; with
    /// `update = true` the existing leaf's value is overwritten in place
    /// and [`InsertOutcome::Updated`] is reported.
    pub fn insert(
        &self,
        key: u64,
        value: usize,
        update: bool,
    ) -> Result<InsertOutcome, InsertError> {
        let _guard = self.write_lock.lock();

        let leaf = self
            .pool
            .alloc_leaf()
            .map_err(|_| InsertError::OutOfMemory)?;
        unsafe {
            (*leaf).key.store(key, ORD_REL);
            (*leaf).value.store(value, ORD_REL);
        }
        let tagged_leaf = tag_leaf(leaf);

        let root = self.root.load(ORD_RLX);
        if root == 0 {
            self.root.store(tagged_leaf, ORD_REL);
            log::debug!("insert: {key:#x} became the root leaf");
            return Ok(InsertOutcome::Inserted);
        }

        // Descend while inside a containing inner node. `parent` is the
        // slot we last departed from, i.e. where a new pointer gets
        // published if the descent stops here.
        let mut parent: &AtomicUsize = &self.root;
        let mut cur = root;
        while let Slot::Inner(n) = decode(cur) {
            let path = unsafe { (*n).path.load(ORD_RLX) };
            let shift = unsafe { (*n).shift };
            if !contains(key, path, shift) {
                break;
            }
            let idx = slice_index(key, shift);
            parent = unsafe { &(*n).children[idx] };
            cur = parent.load(ORD_RLX);
        }

        if cur == 0 {
            parent.store(tagged_leaf, ORD_REL);
            return Ok(InsertOutcome::Inserted);
        }

        let existing_path = match decode(cur) {
            Slot::Leaf(k) => unsafe { (*k).key.load(ORD_RLX) },
            Slot::Inner(n) => unsafe { (*n).path.load(ORD_RLX) },
            Slot::Null => unreachable!("cur == 0 handled above"),
        };
        let diff = existing_path ^ key;

        if diff == 0 {
            // Landed on a leaf with the same key.
            let existing = match decode(cur) {
                Slot::Leaf(k) => k,
                _ => unreachable!("diff == 0 only possible when landing node is a leaf"),
            };
            self.pool.retire_scratch_leaf(leaf);
            if update {
                unsafe { (*existing).value.store(value, ORD_REL) };
                return Ok(InsertOutcome::Updated);
            }
            return Err(InsertError::AlreadyExists);
        }

        let sh = (msb_position(diff) & !3) as u8;
        let m = match self.pool.alloc_inner() {
            Ok(m) => m,
            Err(()) => {
                self.pool.retire_scratch_leaf(leaf);
                return Err(InsertError::OutOfMemory);
            }
        };
        unsafe {
            for child in &(*m).children {
                child.store(0, ORD_REL);
            }
            let key_idx = slice_index(key, sh);
            let existing_idx = slice_index(existing_path, sh);
            (*m).children[key_idx].store(tagged_leaf, ORD_REL);
            (*m).children[existing_idx].store(cur, ORD_REL);
            (*m).shift = sh;
            (*m).path.store(key & path_mask(sh), ORD_REL);
        }
        parent.store(tag_inner(m), ORD_REL);
        log::debug!("insert: split at shift={sh} for key {key:#x}");

        Ok(InsertOutcome::Inserted)
    }
}
