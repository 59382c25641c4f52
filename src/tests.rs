//! Scenario tests (S1-S6) and randomized invariant checks (section 8),
//! colocated with the implementation in the teacher's `#[cfg(test)] mod
//! tests` style.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alloc::{Allocator, Layout, SystemAllocator};
use crate::error::{Dir, InsertError, InsertOutcome};
use crate::map::Map;
use crate::node::{contains, decode, slice_index, Slot, SLNODES};
use std::ptr::NonNull;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn collect_all<A: Allocator>(map: &Map<A>) -> Vec<(u64, usize)> {
    let mut out = Vec::new();
    map.iterate(0, u64::MAX, |k, v| {
        out.push((k, v));
        false
    });
    out
}

/// Walks the live tree checking invariants 1, 2, 4 (section 3): every
/// non-root inner node has >= 2 children, every child occupies the slot its
/// key's crit nibble dictates, and every key in a subtree agrees with that
/// subtree's `path` above the crit nibble.
fn check_invariants<A: Allocator>(map: &Map<A>) {
    let root = map.root.load(Ordering::Acquire);
    walk(root, true);

    fn walk(word: usize, is_root: bool) {
        match decode(word) {
            Slot::Null => {}
            Slot::Leaf(_) => {}
            Slot::Inner(n) => {
                let path = unsafe { (*n).path.load(Ordering::Acquire) };
                let shift = unsafe { (*n).shift };
                let mut live = 0usize;
                for i in 0..SLNODES {
                    let child = unsafe { (*n).children[i].load(Ordering::Acquire) };
                    if child == 0 {
                        continue;
                    }
                    live += 1;
                    match decode(child) {
                        Slot::Leaf(k) => {
                            let key = unsafe { (*k).key.load(Ordering::Acquire) };
                            assert_eq!(
                                slice_index(key, shift),
                                i,
                                "invariant 4 violated: leaf {key:#x} not in its crit-nibble slot"
                            );
                            assert!(
                                contains(key, path, shift),
                                "invariant 2 violated: leaf {key:#x} outside subtree path"
                            );
                        }
                        Slot::Inner(m) => {
                            let child_path = unsafe { (*m).path.load(Ordering::Acquire) };
                            assert_eq!(
                                slice_index(child_path, shift),
                                i,
                                "invariant 4 violated: inner node not in its crit-nibble slot"
                            );
                            assert!(
                                contains(child_path, path, shift),
                                "invariant 2 violated: inner subtree path escapes parent"
                            );
                        }
                        Slot::Null => unreachable!(),
                    }
                    walk(child, false);
                }
                if !is_root {
                    assert!(live >= 2, "invariant 1 violated: non-root inner node with < 2 children");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// S1: basic lifecycle
// ---------------------------------------------------------------------

#[test]
fn s1_basic_lifecycle() {
    init_log();
    let map = Map::new();
    map.insert(10, 100, false).unwrap();
    map.insert(20, 200, false).unwrap();

    assert_eq!(map.get(10), Some(100));
    assert_eq!(map.get(15), None);
    assert_eq!(map.find_le(15), Some((10, 100)));
    assert_eq!(map.find_ge(15), Some((20, 200)));

    assert_eq!(map.remove(10), Some(100));
    assert_eq!(map.get(10), None);
    assert_eq!(map.find_le(15), None);
}

// ---------------------------------------------------------------------
// S2: split / collapse
// ---------------------------------------------------------------------

#[test]
fn s2_split_and_collapse() {
    init_log();
    let map = Map::new();
    map.insert(0x100, 1, false).unwrap();
    map.insert(0x200, 2, false).unwrap();
    check_invariants(&map);

    map.insert(0x108, 3, false).unwrap();
    check_invariants(&map);
    assert_eq!(map.get(0x108), Some(3));

    assert_eq!(map.remove(0x108), Some(3));
    check_invariants(&map);
    assert_eq!(map.get(0x100), Some(1));
    assert_eq!(map.get(0x200), Some(2));

    assert_eq!(map.remove(0x200), Some(2));
    check_invariants(&map);
    assert_eq!(map.get(0x100), Some(1));
    assert_eq!(map.get(0x200), None);
}

// ---------------------------------------------------------------------
// S3: update vs. existence
// ---------------------------------------------------------------------

#[test]
fn s3_update_vs_existence() {
    init_log();
    let map = Map::new();
    assert_eq!(map.insert(1, 0xaa, false), Ok(InsertOutcome::Inserted));
    assert_eq!(map.insert(1, 0xbb, false), Err(InsertError::AlreadyExists));
    assert_eq!(map.get(1), Some(0xaa));
    assert_eq!(map.insert(1, 0xbb, true), Ok(InsertOutcome::Updated));
    assert_eq!(map.get(1), Some(0xbb));
}

// ---------------------------------------------------------------------
// S4: range iteration, including early abort
// ---------------------------------------------------------------------

#[test]
fn s4_range_iteration() {
    init_log();
    let map = Map::new();
    for k in [3u64, 1, 4, 1, 5, 9, 2, 6] {
        let _ = map.insert(k, k as usize, false);
    }

    let mut seen = Vec::new();
    map.iterate(2, 6, |k, _| {
        seen.push(k);
        false
    });
    assert_eq!(seen, vec![2, 3, 4, 5, 6]);

    let mut partial = Vec::new();
    map.iterate(2, 6, |k, _| {
        partial.push(k);
        partial.len() == 2
    });
    assert_eq!(partial, vec![2, 3]);
}

// ---------------------------------------------------------------------
// S5: grace-period reuse
// ---------------------------------------------------------------------

#[test]
fn s5_grace_period_reuse() {
    init_log();
    let map = Map::new();
    for k in 0..20u64 {
        map.insert(k, k as usize, false).unwrap();
    }

    // Removes 1..=16 only rotate empty ring slots: nothing is freed yet.
    for k in 0..16u64 {
        map.remove(k);
        assert_eq!(
            map.pool.free_leaf_head(),
            0,
            "leaf from key {k} freed before its grace period elapsed"
        );
    }

    // Remove #17 reuses slot 0, which evicts the leaf removed in remove #1
    // onto the free list.
    map.remove(16);
    assert_ne!(
        map.pool.free_leaf_head(),
        0,
        "leaf should have become reusable after DELETED_LIFE further removes"
    );
}

// ---------------------------------------------------------------------
// Randomized single-threaded invariant checks (invariants 1-5, 8)
// ---------------------------------------------------------------------

#[test]
fn randomized_matches_reference_btreemap() {
    init_log();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let map = Map::new();
    let mut reference: BTreeMap<u64, usize> = BTreeMap::new();

    for step in 0..20_000u64 {
        let key = rng.gen_range(0..512u64);
        let op = rng.gen_range(0..3);
        match op {
            0 => {
                let value = step as usize;
                let update = rng.gen_bool(0.5);
                match map.insert(key, value, update) {
                    Ok(InsertOutcome::Inserted) => {
                        assert!(reference.insert(key, value).is_none());
                    }
                    Ok(InsertOutcome::Updated) => {
                        assert!(reference.insert(key, value).is_some());
                    }
                    Err(InsertError::AlreadyExists) => {
                        assert!(reference.contains_key(&key));
                    }
                    Err(InsertError::OutOfMemory) => panic!("system allocator reported OOM"),
                }
            }
            1 => {
                assert_eq!(map.remove(key), reference.remove(&key));
            }
            _ => {
                assert_eq!(map.get(key), reference.get(&key).copied());
            }
        }

        if step % 500 == 0 {
            check_invariants(&map);
            assert_eq!(reference.get(&key).copied(), map.get(key));
        }
    }

    let mut got = collect_all(&map);
    got.sort_unstable();
    let want: Vec<(u64, usize)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
    assert_eq!(got, want);
    check_invariants(&map);
}

#[test]
fn find_variants_match_reference() {
    init_log();
    let mut rng = StdRng::seed_from_u64(0xFEED);
    let map = Map::new();
    let mut reference: BTreeMap<u64, usize> = BTreeMap::new();

    for i in 0..2_000u64 {
        let key = rng.gen_range(0..4096u64);
        let _ = map.insert(key, i as usize, true);
        reference.insert(key, i as usize);
    }

    for _ in 0..2_000 {
        let key = rng.gen_range(0..4096u64);

        let want_le = reference
            .range(..=key)
            .next_back()
            .map(|(&k, &v)| (k, v));
        assert_eq!(map.find_le(key), want_le);
        assert_eq!(map.find(key, Dir::Le), want_le);

        let want_ge = reference.range(key..).next().map(|(&k, &v)| (k, v));
        assert_eq!(map.find_ge(key), want_ge);
        assert_eq!(map.find(key, Dir::Ge), want_ge);

        let want_eq = reference.get(&key).map(|&v| (key, v));
        assert_eq!(map.find(key, Dir::Eq), want_eq);

        if let Some(pred) = key.checked_sub(1) {
            let want_lt = reference.range(..=pred).next_back().map(|(&k, &v)| (k, v));
            assert_eq!(map.find(key, Dir::Lt), want_lt);
        }
        if let Some(succ) = key.checked_add(1) {
            let want_gt = reference.range(succ..).next().map(|(&k, &v)| (k, v));
            assert_eq!(map.find(key, Dir::Gt), want_gt);
        }
    }
}

// ---------------------------------------------------------------------
// S6: concurrent reader under writer churn
// ---------------------------------------------------------------------

#[test]
fn s6_reader_survives_writer_churn() {
    init_log();
    const DOMAIN: u64 = 64;
    const ITERS: usize = 200_000;

    let map = Arc::new(Map::new());
    for k in 0..DOMAIN {
        map.insert(k, k as usize, false).unwrap();
    }

    // Starting gate, mirroring the teacher's `multispam_insert` idiom: every
    // thread blocks on a read-lock until the main thread drops its write
    // guard, so they all race each other from roughly the same instant.
    let gate = Arc::new(RwLock::new(()));
    let hold = gate.write().unwrap();

    let crashed = Arc::new(AtomicUsize::new(0));

    let writer = {
        let map = Arc::clone(&map);
        let gate = Arc::clone(&gate);
        thread::Builder::new()
            .name("writer".into())
            .spawn(move || {
                let _g = gate.read().unwrap();
                for i in 0..ITERS {
                    let key = (i as u64) % DOMAIN;
                    let _ = map.remove(key);
                    let _ = map.insert(key, i, true);
                }
            })
            .unwrap()
    };

    let readers: Vec<_> = (0..4)
        .map(|tid| {
            let map = Arc::clone(&map);
            let gate = Arc::clone(&gate);
            let crashed = Arc::clone(&crashed);
            thread::Builder::new()
                .name(format!("reader-{tid}"))
                .spawn(move || {
                    let _g = gate.read().unwrap();
                    for i in 0..ITERS {
                        let key = (i as u64 + tid as u64) % DOMAIN;
                        // Either a stale-but-real value or absent; anything
                        // else (a panic unwinding out of this closure) is
                        // caught by the join below.
                        let _ = map.get(key);
                        let _ = map.find_le(key);
                    }
                })
                .unwrap_or_else(|_| {
                    crashed.fetch_add(1, Ordering::Relaxed);
                    panic!("failed to spawn reader");
                })
        })
        .collect();

    drop(hold);
    writer.join().expect("writer thread panicked");
    for r in readers {
        r.join().expect("reader thread panicked");
    }
    assert_eq!(crashed.load(Ordering::Relaxed), 0);
    check_invariants(&map);
}

// ---------------------------------------------------------------------
// Pluggable allocator seam (ambient configuration, section 12)
// ---------------------------------------------------------------------

struct FailAfter {
    remaining: AtomicUsize,
}

unsafe impl Allocator for FailAfter {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()> {
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 {
                    None
                } else {
                    Some(n - 1)
                }
            })
            .is_err()
        {
            return Err(());
        }
        unsafe { NonNull::new(std::alloc::alloc(layout)).ok_or(()) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

#[test]
fn insert_reports_out_of_memory_from_custom_allocator() {
    init_log();
    // One allocation lets the first leaf through; the second (whichever it
    // is - scratch leaf or split inner node) must fail cleanly.
    let map = Map::with_allocator(FailAfter {
        remaining: AtomicUsize::new(1),
    });
    assert_eq!(map.insert(1, 1, false), Ok(InsertOutcome::Inserted));
    assert_eq!(map.insert(2, 2, false), Err(InsertError::OutOfMemory));
    // State is unchanged by the failed insert.
    assert_eq!(map.get(1), Some(1));
    assert_eq!(map.get(2), None);
}

#[test]
fn custom_allocator_is_used_by_default_map_too() {
    init_log();
    let map = Map::<SystemAllocator>::new();
    map.insert(42, 7, false).unwrap();
    assert_eq!(map.get(42), Some(7));
}
