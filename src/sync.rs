//! Ordering aliases and a spin/yield backoff helper shared by the reader
//! retry loops.
//!
//! Grounded on the teacher's `engine::sync` split: named ordering constants
//! instead of bare `Ordering::Acquire` at every call site, and a small
//! `Backoff` type for bounded spin-then-yield retry.

use core::sync::atomic::Ordering;
use std::hint;

pub(crate) const ORD_RLX: Ordering = Ordering::Relaxed;
pub(crate) const ORD_ACQ: Ordering = Ordering::Acquire;
pub(crate) const ORD_REL: Ordering = Ordering::Release;

const MAX_SPIN: u32 = 6;
const MAX_YIELD: u32 = 8;

/// Exponential spin-then-yield backoff for the reader's remove-count retry
/// loop. Bounded: past `MAX_YIELD` steps it keeps yielding rather than
/// spinning tighter, since under DELETED_LIFE-bounded contention the loop
/// is expected to settle within a handful of iterations.
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline(always)]
    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    #[inline(always)]
    pub(crate) fn spin(&mut self) {
        if self.step <= MAX_SPIN {
            for _ in 0..1 << self.step {
                hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }
        if self.step <= MAX_YIELD {
            self.step += 1;
        }
    }
}
