//! MemTable implementation
//!
//! Skip list index behind a single parking_lot Mutex.

use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SkipKvError};
use crate::skiplist::SkipList;
use crate::storage::{Segment, SegmentStore};

use super::{Entry, Phase};

/// Name of the segments directory under `data_dir`
const SEGMENT_DIR: &str = "segments";

/// Bounded in-memory table that flushes to segment files.
///
/// ## Concurrency Model: one exclusive lock
///
/// `insert`, `find`, `freeze` and `flush` all take the same Mutex, so at
/// most one runs at a time. A flush writes its segment while holding the
/// lock: every other caller stalls until the file is on disk. There is no
/// double buffering; a frozen index is not readable while a new one fills.
///
/// ## Read Path
///
/// `find` only looks at the current index. Keys flushed to segments are
/// reported absent. [`MemTable::candidate_segments`] tells a caller which
/// segments might hold a key, but nothing reads segment files back yet.
pub struct MemTable {
    /// Configuration (validated at open)
    config: Config,

    /// Segment directory and file naming
    store: SegmentStore,

    /// All mutable state, guarded by one lock
    inner: Mutex<Inner>,
}

struct Inner {
    /// Active index; replaced wholesale by a flush
    index: SkipList<Entry>,

    /// Key + value bytes resident in `index`, shadowed duplicates included
    accumulated_size: usize,

    /// Id of the next segment to write
    segment_counter: u64,

    /// Set by `freeze()`, cleared by a successful flush
    frozen: bool,

    /// Segments flushed so far (and found at open), newest first
    segments: Vec<Segment>,
}

impl MemTable {
    /// Open a memtable writing segments under `{data_dir}/segments`.
    ///
    /// Existing segments are discovered so the counter continues after them.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = SegmentStore::open(&config.data_dir.join(SEGMENT_DIR))?;
        let segment_counter = store.next_id()?;
        let segments = store.load_all()?;
        let index = Self::fresh_index(&config, segment_counter)?;

        tracing::debug!(
            dir = %store.dir().display(),
            segment_counter,
            segments = segments.len(),
            threshold = config.memtable_threshold,
            "memtable opened"
        );

        Ok(Self {
            config,
            store,
            inner: Mutex::new(Inner {
                index,
                accumulated_size: 0,
                segment_counter,
                frozen: false,
                segments,
            }),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Insert a key-value pair.
    ///
    /// Flush-then-insert: if admitting the entry would push the buffered
    /// bytes past the threshold, the current index is flushed first and the
    /// entry lands in the fresh index. An entry bigger than the threshold
    /// on an empty index is admitted as-is and flushed by the next insert.
    ///
    /// Fails with `Frozen` after `freeze()`, and with `FlushFailed` if the
    /// segment write fails; in that case the entry was not inserted and the
    /// old index is still live, so the call can be retried.
    pub fn insert(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let entry = Entry::new(key, value);
        let size = entry.size();

        let mut inner = self.inner.lock();
        if inner.frozen {
            return Err(SkipKvError::Frozen);
        }

        if inner.accumulated_size + size > self.config.memtable_threshold
            && !inner.index.is_empty()
        {
            tracing::debug!(
                accumulated = inner.accumulated_size,
                incoming = size,
                threshold = self.config.memtable_threshold,
                "threshold reached, flushing before insert"
            );
            self.flush_locked(&mut inner)?;
        }

        inner.index.insert(entry);
        inner.accumulated_size += size;
        Ok(())
    }

    /// Value stored under `key` in the current index, newest write first.
    ///
    /// Never consults flushed segments: a key written before the last flush
    /// reads as `None`.
    pub fn find(&self, key: &[u8]) -> Option<Bytes> {
        let inner = self.inner.lock();
        inner.index.get(key).map(|entry| entry.value.clone())
    }

    /// Mark the memtable read-only until the next `flush()`
    pub fn freeze(&self) {
        let mut inner = self.inner.lock();
        if !inner.frozen {
            tracing::debug!(entries = inner.index.len(), "memtable frozen");
        }
        inner.frozen = true;
    }

    /// Flush the current index to a new segment and return to `Active`.
    ///
    /// Returns the id of the segment written, or `None` if the index was
    /// empty (no file is produced). On failure nothing changes, including
    /// the frozen flag.
    pub fn flush(&self) -> Result<Option<u64>> {
        let mut inner = self.inner.lock();
        self.flush_locked(&mut inner)
    }

    /// Ids of flushed segments whose key range and Bloom filter admit
    /// `key`, newest first. An empty result means no segment has it.
    pub fn candidate_segments(&self, key: &[u8]) -> Vec<u64> {
        let inner = self.inner.lock();
        inner
            .segments
            .iter()
            .filter(|segment| segment.might_contain(key))
            .map(Segment::id)
            .collect()
    }

    // =========================================================================
    // Flush Internals
    // =========================================================================

    /// Write the index out and swap in an empty one (lock held by caller)
    fn flush_locked(&self, inner: &mut Inner) -> Result<Option<u64>> {
        if inner.index.is_empty() {
            inner.frozen = false;
            return Ok(None);
        }

        let id = inner.segment_counter;
        let fresh = Self::fresh_index(&self.config, id + 1)?;

        let segment = self
            .store
            .write(id, inner.index.iter_newest(), &self.config.bloom)
            .map_err(|err| {
                tracing::error!(segment_id = id, error = %err, "segment flush failed");
                flush_failed(id, err)
            })?;

        tracing::info!(
            segment_id = id,
            entries = segment.entry_count(),
            bytes = segment.meta().file_size,
            path = %self.store.segment_path(id).display(),
            "segment written"
        );

        inner.index = fresh;
        inner.accumulated_size = 0;
        inner.segment_counter += 1;
        inner.frozen = false;
        inner.segments.insert(0, segment);

        Ok(Some(id))
    }

    /// Empty index for generation `generation`; seeded configs stay
    /// reproducible across flushes.
    fn fresh_index(config: &Config, generation: u64) -> Result<SkipList<Entry>> {
        match config.rng_seed {
            Some(seed) => SkipList::with_seed(config.max_levels, seed.wrapping_add(generation)),
            None => SkipList::new(config.max_levels),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Key + value bytes buffered since the last flush
    pub fn size(&self) -> usize {
        self.inner.lock().accumulated_size
    }

    /// Entries in the current index, duplicates included
    pub fn entry_count(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Id the next flush will use
    pub fn segment_counter(&self) -> u64 {
        self.inner.lock().segment_counter
    }

    /// Number of segments with loaded metadata
    pub fn segment_count(&self) -> usize {
        self.inner.lock().segments.len()
    }

    pub fn phase(&self) -> Phase {
        if self.inner.lock().frozen {
            Phase::Frozen
        } else {
            Phase::Active
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.phase() == Phase::Frozen
    }

    pub fn threshold(&self) -> usize {
        self.config.memtable_threshold
    }

    /// Directory holding the segment files
    pub fn segments_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Path of segment `id`'s data file
    pub fn segment_path(&self, id: u64) -> std::path::PathBuf {
        self.store.segment_path(id)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Any error writing segment `id` fails the flush as a whole
fn flush_failed(id: u64, err: SkipKvError) -> SkipKvError {
    match err {
        already @ SkipKvError::FlushFailed { .. } => already,
        other => SkipKvError::FlushFailed {
            segment_id: id,
            source: Box::new(other),
        },
    }
}
