//! MemTable Module
//!
//! Bounded in-memory write buffer in front of the segment files.
//!
//! ## Responsibilities
//! - Buffer writes in a skip list ordered by key
//! - Track key + value bytes against a flush threshold
//! - Flush the index to a new segment and swap in an empty one
//! - Serialize every operation behind one lock
//!
//! ## State Machine
//! ```text
//!            insert would exceed threshold          segment written
//!  ACTIVE ─────────────────────────────────► FLUSHING ──────────────► ACTIVE
//!    │                                          ▲                   (new index)
//!    │ freeze()                       flush()   │
//!    └──────────────► FROZEN ───────────────────┘
//!                  (reads only)
//! ```
//! FLUSHING only exists while the lock is held, so callers never observe it.

mod table;

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

pub use table::MemTable;

/// Externally visible memtable phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting inserts and lookups
    Active,

    /// Read-only until the next flush
    Frozen,
}

/// Key-value pair stored in the memtable index.
///
/// Equality and ordering look at the key only, so an entry can be found
/// in a [`SkipList`](crate::skiplist::SkipList) by its key bytes.
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: Bytes,
    pub value: Bytes,
}

impl Entry {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bytes this entry counts against the memtable threshold
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Borrow<[u8]> for Entry {
    fn borrow(&self) -> &[u8] {
        &self.key
    }
}

/// Segment line format: `key::value`, with newlines, quotes, backslashes
/// and non-printable bytes escaped so every entry stays on one line.
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.key)?;
        f.write_str("::")?;
        write_escaped(f, &self.value)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for &byte in bytes {
        for escaped in std::ascii::escape_default(byte) {
            write!(f, "{}", escaped as char)?;
        }
    }
    Ok(())
}
