//! A concurrent, ordered associative map keyed by 64-bit unsigned integers,
//! built as a hybrid radix/crit-bit tree.
//!
//! The map supports exact lookup, bounded (`≤`/`≥`/`<`/`>`) lookup,
//! single-key insert/update/remove, and bounded in-order iteration. It is
//! designed for workloads where readers vastly outnumber writers: reads
//! take no lock at all, instead bounding their own staleness against a
//! shared remove counter, while writes are serialized behind a single
//! mutex per map.
//!
//! # Concurrency model
//!
//! A single writer mutex ([`Map::insert`], [`Map::remove`],
//! [`Map::iterate`]) publishes every pointer and counter update with a
//! release store. Readers ([`Map::get`], [`Map::find_le`],
//! [`Map::find_ge`], [`Map::find`]) take no lock and only acquire-load;
//! each read samples the remove counter before and after its traversal and
//! restarts unconditionally if `DELETED_LIFE` or more removes completed
//! in between. That bound is what makes it safe to ever reuse a retired
//! node's storage at all: a node is held on a retirement ring for at least
//! `DELETED_LIFE` complete removes before it becomes eligible for reuse,
//! which is longer than any reader can possibly still be referencing it
//! without having already noticed the gap and restarted.
//!
//! This is the crate's one documented trust boundary: readers hold
//! transient, non-owning raw-pointer references into tree storage, whose
//! validity rests entirely on the remove-count envelope rather than on any
//! borrow-checked lifetime. Every `unsafe` block in this crate exists to
//! cross that boundary.

mod alloc;
mod bitops;
mod error;
mod insert;
mod iter;
mod map;
mod node;
mod pool;
mod reader;
mod remove;
mod sync;

pub use alloc::{Allocator, Layout, SystemAllocator};
pub use error::{Dir, InsertError, InsertOutcome};
pub use map::Map;

#[cfg(test)]
mod tests;
