//! Storage Module
//!
//! Immutable segment files produced by memtable flushes.
//!
//! ## Responsibilities
//! - Write a flushed index as a sorted, newline-delimited text dump
//! - Record per-segment metadata (key range, checksum, Bloom filter)
//! - Discover existing segments so ids keep increasing across restarts
//!
//! There is no segment reader: data files are write-only from this crate's
//! point of view. The metadata sidecar is what a future read path would use
//! to skip segments that cannot hold a key.
//!
//! ## Files
//! ```text
//! {data_dir}/segments/
//!   ├── segment_000000.sst    key::value\n  (ascending keys, no header)
//!   ├── segment_000000.meta   bincode(SegmentMeta + bloom bits) | CRC32 (4)
//!   ├── segment_000001.sst
//!   └── segment_000001.meta
//! ```
//! The `.meta` sidecar is an extension; the `.sst` text dump alone is the
//! segment contract.

mod manager;
mod segment;

pub use manager::SegmentStore;
pub use segment::{Segment, SegmentMeta, SegmentWriter};
