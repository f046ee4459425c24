//! # SkipKV
//!
//! The write path of a log-structured key-value store:
//! - Skip list as the ordered in-memory index
//! - Bounded memtable that flushes to immutable, sorted segment files
//! - Bloom filters sized for a target false positive rate
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Callers                               │
//! │                  (any number of threads)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ insert / find / freeze / flush
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      MemTable                                │
//! │                (one exclusive Mutex)                         │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │ size > threshold
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │    SkipList     │ ── dump() ───► │  SegmentStore   │
//!   │ (arena, levels) │                │ segment_N.sst   │
//!   └─────────────────┘                │ segment_N.meta ─┼──► BloomFilter
//!                                      └─────────────────┘
//! ```
//!
//! Flushed segments are not read back: `MemTable::find` only sees the
//! current index.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod bloom;
pub mod skiplist;
pub mod memtable;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use bloom::BloomFilter;
pub use config::{BloomConfig, Config};
pub use error::{Result, SkipKvError};
pub use memtable::{Entry, MemTable, Phase};
pub use skiplist::SkipList;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SkipKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
