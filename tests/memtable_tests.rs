//! MemTable Tests
//!
//! Tests verify:
//! - Insert / find against the active index
//! - Size tracking and the flush trigger
//! - Segment file contents after a flush
//! - Freeze and explicit flush transitions
//! - Failed flushes leave the memtable usable and retryable
//! - Concurrent writers through one shared memtable

use std::fs;
use std::path::Path;
use std::sync::Arc;

use skipkv::{Config, MemTable, Phase, SkipKvError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_memtable(dir: &Path, threshold: usize) -> MemTable {
    let config = Config::builder()
        .data_dir(dir)
        .memtable_threshold(threshold)
        .rng_seed(17)
        .build();
    MemTable::open(config).unwrap()
}

fn segment_files(memtable: &MemTable) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(memtable.segments_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".sst"))
        .collect();
    names.sort();
    names
}

fn segment_lines(memtable: &MemTable, id: u64) -> Vec<String> {
    fs::read_to_string(memtable.segment_path(id))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Key "keyNN" (5 bytes) + value "valueNN" (7 bytes) = 12 bytes
fn pair(i: usize) -> (String, String) {
    (format!("key{:02}", i), format!("value{:02}", i))
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    assert!(memtable.is_empty());
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.segment_counter(), 0);
    assert_eq!(memtable.phase(), Phase::Active);
    assert!(segment_files(&memtable).is_empty());
}

#[test]
fn test_insert_and_find() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("key1", "value1").unwrap();
    memtable.insert("key2", "value2").unwrap();

    assert_eq!(memtable.find(b"key1").as_deref(), Some(&b"value1"[..]));
    assert_eq!(memtable.find(b"key2").as_deref(), Some(&b"value2"[..]));
    assert_eq!(memtable.entry_count(), 2);
}

#[test]
fn test_find_missing_key_is_absent() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("b", "1").unwrap();
    assert_eq!(memtable.find(b"a"), None);
    assert_eq!(memtable.find(b"c"), None);
}

#[test]
fn test_newest_duplicate_wins() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("key", "short").unwrap();
    memtable.insert("key", "much_longer_value").unwrap();

    assert_eq!(memtable.find(b"key").as_deref(), Some(&b"much_longer_value"[..]));
    // Both versions stay resident until the flush.
    assert_eq!(memtable.entry_count(), 2);
    assert_eq!(memtable.size(), 3 + 5 + 3 + 17);
}

#[test]
fn test_size_tracking() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("key", "value").unwrap();
    assert_eq!(memtable.size(), 8);

    memtable.insert("key2", "value2").unwrap();
    assert_eq!(memtable.size(), 8 + 10);
}

#[test]
fn test_open_path_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let memtable = MemTable::open_path(temp.path()).unwrap();

    assert_eq!(memtable.threshold(), 1000);
    assert_eq!(memtable.config().max_levels, 16);
    assert_eq!(memtable.segments_dir(), temp.path().join("segments").as_path());
}

#[test]
fn test_zero_threshold_rejected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .memtable_threshold(0)
        .build();

    assert!(matches!(MemTable::open(config), Err(SkipKvError::Config(_))));
}

// =============================================================================
// Flush Trigger Tests
// =============================================================================

#[test]
fn test_crossing_threshold_flushes_exactly_once() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 50);

    // 4 x 12 = 48 bytes fit under 50.
    for i in 0..4 {
        let (k, v) = pair(i);
        memtable.insert(k, v).unwrap();
    }
    assert_eq!(memtable.size(), 48);
    assert!(segment_files(&memtable).is_empty());

    // The 5th pair would make 60: flush first, then insert.
    let (k, v) = pair(4);
    memtable.insert(k, v).unwrap();

    assert_eq!(segment_files(&memtable), vec!["segment_000000.sst"]);
    assert_eq!(memtable.segment_counter(), 1);
    assert_eq!(memtable.size(), 12);
    assert_eq!(memtable.entry_count(), 1);

    // Flushed keys are no longer visible; the trigger entry is.
    for i in 0..4 {
        let (k, _) = pair(i);
        assert_eq!(memtable.find(k.as_bytes()), None);
    }
    assert_eq!(memtable.find(b"key04").as_deref(), Some(&b"value04"[..]));
}

#[test]
fn test_entry_exactly_at_threshold_does_not_flush() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 24);

    memtable.insert("key00", "value00").unwrap();
    memtable.insert("key01", "value01").unwrap();

    assert_eq!(memtable.size(), 24);
    assert_eq!(memtable.segment_counter(), 0);
}

#[test]
fn test_oversized_entry_on_empty_index_is_admitted() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 10);

    memtable.insert("big-key", "a value longer than ten bytes").unwrap();
    assert_eq!(memtable.segment_counter(), 0);
    assert!(memtable.size() > 10);

    // The next insert flushes the oversized entry on its own.
    memtable.insert("k", "v").unwrap();
    assert_eq!(memtable.segment_counter(), 1);
    assert_eq!(segment_lines(&memtable, 0), vec!["big-key::a value longer than ten bytes"]);
}

#[test]
fn test_many_inserts_produce_consecutive_segments() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 50);

    for i in 0..20 {
        let (k, v) = pair(i);
        memtable.insert(k, v).unwrap();
    }

    // 4 pairs per segment: 0-3, 4-7, 8-11, 12-15 flushed, 16-19 resident.
    assert_eq!(
        segment_files(&memtable),
        vec![
            "segment_000000.sst",
            "segment_000001.sst",
            "segment_000002.sst",
            "segment_000003.sst",
        ]
    );
    assert_eq!(memtable.segment_counter(), 4);
    assert_eq!(memtable.entry_count(), 4);
    assert_eq!(segment_lines(&memtable, 2)[0], "key08::value08");
}

// =============================================================================
// Segment Content Tests
// =============================================================================

#[test]
fn test_segment_is_sorted_and_deduplicated() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("cherry", "3").unwrap();
    memtable.insert("apple", "1").unwrap();
    memtable.insert("banana", "old").unwrap();
    memtable.insert("banana", "2").unwrap();

    assert_eq!(memtable.flush().unwrap(), Some(0));
    assert_eq!(
        segment_lines(&memtable, 0),
        vec!["apple::1", "banana::2", "cherry::3"]
    );
}

#[test]
fn test_segment_escapes_binary_bytes() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert(&b"line\nbreak"[..], vec![0u8, 0xff]).unwrap();
    memtable.flush().unwrap();

    assert_eq!(segment_lines(&memtable, 0), vec!["line\\nbreak::\\x00\\xff"]);
}

// =============================================================================
// Freeze / Explicit Flush Tests
// =============================================================================

#[test]
fn test_frozen_memtable_rejects_inserts_but_serves_reads() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("key", "value").unwrap();
    memtable.freeze();

    assert!(memtable.is_frozen());
    assert!(matches!(memtable.insert("other", "v"), Err(SkipKvError::Frozen)));
    assert_eq!(memtable.find(b"key").as_deref(), Some(&b"value"[..]));
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_flush_after_freeze_returns_to_active() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("key", "value").unwrap();
    memtable.freeze();
    assert_eq!(memtable.flush().unwrap(), Some(0));

    assert_eq!(memtable.phase(), Phase::Active);
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.find(b"key"), None);
    memtable.insert("next", "value").unwrap();
}

#[test]
fn test_flush_of_empty_index_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.freeze();
    assert_eq!(memtable.flush().unwrap(), None);

    assert_eq!(memtable.phase(), Phase::Active);
    assert_eq!(memtable.segment_counter(), 0);
    assert!(segment_files(&memtable).is_empty());
}

// =============================================================================
// Flush Failure Tests
// =============================================================================

#[test]
fn test_failed_flush_keeps_index_and_can_be_retried() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 50);

    for i in 0..4 {
        let (k, v) = pair(i);
        memtable.insert(k, v).unwrap();
    }

    // Swap the segments directory for a plain file so the write fails.
    let segments_dir = memtable.segments_dir().to_path_buf();
    fs::remove_dir_all(&segments_dir).unwrap();
    fs::write(&segments_dir, b"not a directory").unwrap();

    let (k, v) = pair(4);
    let err = memtable.insert(k.clone(), v.clone()).unwrap_err();
    assert!(matches!(err, SkipKvError::FlushFailed { segment_id: 0, .. }));

    // Nothing moved: old entries readable, counters untouched, trigger not admitted.
    assert_eq!(memtable.size(), 48);
    assert_eq!(memtable.segment_counter(), 0);
    assert_eq!(memtable.find(b"key00").as_deref(), Some(&b"value00"[..]));
    assert_eq!(memtable.find(b"key04"), None);
    assert_eq!(memtable.phase(), Phase::Active);

    // Restore the directory and retry the same insert.
    fs::remove_file(&segments_dir).unwrap();
    fs::create_dir(&segments_dir).unwrap();
    memtable.insert(k, v).unwrap();

    assert_eq!(memtable.segment_counter(), 1);
    assert_eq!(segment_lines(&memtable, 0).len(), 4);
    assert_eq!(memtable.find(b"key04").as_deref(), Some(&b"value04"[..]));
}

#[test]
fn test_failed_explicit_flush_stays_frozen() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("key", "value").unwrap();
    memtable.freeze();

    let segments_dir = memtable.segments_dir().to_path_buf();
    fs::remove_dir_all(&segments_dir).unwrap();
    fs::write(&segments_dir, b"").unwrap();

    assert!(matches!(memtable.flush(), Err(SkipKvError::FlushFailed { .. })));
    assert!(memtable.is_frozen());
    assert_eq!(memtable.find(b"key").as_deref(), Some(&b"value"[..]));
}

// =============================================================================
// Segment Metadata Tests
// =============================================================================

#[test]
fn test_candidate_segments_uses_range_and_bloom() {
    let temp = TempDir::new().unwrap();
    let memtable = open_memtable(temp.path(), 1000);

    memtable.insert("b", "1").unwrap();
    memtable.insert("d", "2").unwrap();
    memtable.flush().unwrap();
    memtable.insert("a", "3").unwrap();
    memtable.insert("d", "4").unwrap();
    memtable.flush().unwrap();

    assert_eq!(memtable.candidate_segments(b"d"), vec![1, 0]);
    assert_eq!(memtable.candidate_segments(b"b"), vec![0]);
    assert!(memtable.candidate_segments(b"z").is_empty());
    // The read path itself still ignores segments.
    assert_eq!(memtable.find(b"d"), None);
}

#[test]
fn test_reopen_continues_segment_counter() {
    let temp = TempDir::new().unwrap();

    {
        let memtable = open_memtable(temp.path(), 1000);
        memtable.insert("k1", "v1").unwrap();
        memtable.flush().unwrap();
        memtable.insert("k2", "v2").unwrap();
        memtable.flush().unwrap();
    }

    let memtable = open_memtable(temp.path(), 1000);
    assert_eq!(memtable.segment_counter(), 2);
    assert_eq!(memtable.segment_count(), 2);
    assert_eq!(memtable.candidate_segments(b"k1"), vec![0]);

    memtable.insert("k3", "v3").unwrap();
    assert_eq!(memtable.flush().unwrap(), Some(2));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_lose_nothing() {
    let temp = TempDir::new().unwrap();
    let memtable = Arc::new(open_memtable(temp.path(), 100));

    crossbeam::thread::scope(|scope| {
        for thread in 0..4 {
            let memtable = Arc::clone(&memtable);
            scope.spawn(move |_| {
                for i in 0..200 {
                    memtable
                        .insert(format!("t{}-{:04}", thread, i), "v")
                        .unwrap();
                }
            });
        }
    })
    .unwrap();

    let flushed: usize = (0..memtable.segment_counter())
        .map(|id| segment_lines(&memtable, id).len())
        .sum();
    assert_eq!(flushed + memtable.entry_count(), 800);
    assert!(memtable.size() <= 100);
}

#[test]
fn test_concurrent_readers_and_writers() {
    let temp = TempDir::new().unwrap();
    let memtable = Arc::new(open_memtable(temp.path(), 1_000_000));
    memtable.insert("shared", "value").unwrap();

    crossbeam::thread::scope(|scope| {
        for thread in 0..4 {
            let memtable = Arc::clone(&memtable);
            scope.spawn(move |_| {
                for i in 0..100 {
                    memtable.insert(format!("w{}-{}", thread, i), "x").unwrap();
                    assert_eq!(memtable.find(b"shared").as_deref(), Some(&b"value"[..]));
                }
            });
        }
    })
    .unwrap();

    assert_eq!(memtable.entry_count(), 401);
    assert_eq!(memtable.segment_counter(), 0);
}
