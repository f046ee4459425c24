//! Segment Writer
//!
//! Writes sorted entries to a new segment file plus its metadata sidecar.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::bloom::BloomFilter;
use crate::config::BloomConfig;
use crate::error::{Result, SkipKvError};
use crate::memtable::Entry;

/// Trailing checksum size of the metadata sidecar
const SIDECAR_CRC_SIZE: usize = 4;

// =============================================================================
// Segment Metadata
// =============================================================================

/// What a segment holds, without its entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Segment id (the memtable's segment counter at flush time)
    pub id: u64,
    /// Number of lines in the data file
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// Data file size in bytes
    pub file_size: u64,
    /// CRC32 over the whole data file
    pub data_crc: u32,
    /// Sizing of the segment's Bloom filter
    pub bloom: BloomConfig,
}

/// On-disk sidecar body; followed by a CRC32 of these bincode bytes
#[derive(Serialize, Deserialize)]
struct SidecarRecord {
    meta: SegmentMeta,
    bloom_bits: Vec<u8>,
}

/// A flushed segment: metadata plus the Bloom filter over its keys
#[derive(Debug, Clone)]
pub struct Segment {
    meta: SegmentMeta,
    bloom: BloomFilter,
}

impl Segment {
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }

    pub fn entry_count(&self) -> u64 {
        self.meta.entry_count
    }

    /// False only if `key` is definitely not in this segment: outside
    /// [min_key, max_key] or rejected by the Bloom filter.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        if self.meta.entry_count == 0 {
            return false;
        }
        key >= self.meta.min_key.as_slice()
            && key <= self.meta.max_key.as_slice()
            && self.bloom.check(key)
    }

    /// Read a sidecar back and check it against its data file
    pub(super) fn load(data_path: &Path, meta_path: &Path) -> Result<Self> {
        let raw = fs::read(meta_path)?;
        if raw.len() < SIDECAR_CRC_SIZE {
            return Err(SkipKvError::Corruption(format!(
                "metadata file {} is truncated",
                meta_path.display()
            )));
        }

        let (body, crc_bytes) = raw.split_at(raw.len() - SIDECAR_CRC_SIZE);
        let mut stored = [0u8; SIDECAR_CRC_SIZE];
        stored.copy_from_slice(crc_bytes);
        if crc32fast::hash(body) != u32::from_le_bytes(stored) {
            return Err(SkipKvError::Corruption(format!(
                "metadata checksum mismatch in {}",
                meta_path.display()
            )));
        }

        let record: SidecarRecord = bincode::deserialize(body)?;

        let data = fs::read(data_path)?;
        if crc32fast::hash(&data) != record.meta.data_crc {
            return Err(SkipKvError::Corruption(format!(
                "data checksum mismatch in {}",
                data_path.display()
            )));
        }

        let bloom = BloomFilter::from_bytes(
            record.meta.bloom.clone(),
            &record.bloom_bits,
            record.meta.entry_count as usize,
        )?;

        Ok(Self {
            meta: record.meta,
            bloom,
        })
    }
}

// =============================================================================
// Segment Writer
// =============================================================================

/// Builder for one segment file.
///
/// Lines go to `<path>.tmp`; `finish()` syncs it, writes the sidecar and
/// renames the data file into place, so a visible `.sst` is always complete.
pub struct SegmentWriter {
    id: u64,
    /// Final data file path
    path: PathBuf,
    /// Path being written until `finish()`
    tmp_path: PathBuf,
    /// Final sidecar path
    meta_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    entry_count: u64,
    file_size: u64,
    /// Track min/max keys for metadata; `max_key` also enforces ordering
    min_key: Option<Bytes>,
    max_key: Option<Bytes>,
    /// Running CRC hasher for the data file
    data_hasher: crc32fast::Hasher,
    bloom: BloomFilter,
}

impl SegmentWriter {
    /// Start segment `id` at `path`; the sidecar goes next to it as `.meta`
    pub fn create(id: u64, path: &Path, bloom: BloomConfig) -> Result<Self> {
        let tmp_path = tmp_path(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            tmp_path,
            meta_path: path.with_extension("meta"),
            writer: BufWriter::new(file),
            entry_count: 0,
            file_size: 0,
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
            bloom: BloomFilter::new(bloom)?,
        })
    }

    /// Append one line. Keys must be strictly ascending.
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        if let Some(last) = &self.max_key {
            if entry.key <= *last {
                return Err(SkipKvError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "segment {} keys out of order: {:?} after {:?}",
                        self.id, entry.key, last
                    ),
                )));
            }
        }

        let line = format!("{}\n", entry);
        self.writer.write_all(line.as_bytes())?;
        self.data_hasher.update(line.as_bytes());
        self.file_size += line.len() as u64;

        self.bloom.insert(&entry.key);
        if self.min_key.is_none() {
            self.min_key = Some(entry.key.clone());
        }
        self.max_key = Some(entry.key.clone());
        self.entry_count += 1;

        Ok(())
    }

    /// Sync the data, write the sidecar and publish the segment
    pub fn finish(mut self) -> Result<Segment> {
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| SkipKvError::Io(e.into_error()))?;
        file.sync_all()?;

        let meta = SegmentMeta {
            id: self.id,
            entry_count: self.entry_count,
            min_key: self.min_key.map(|k| k.to_vec()).unwrap_or_default(),
            max_key: self.max_key.map(|k| k.to_vec()).unwrap_or_default(),
            file_size: self.file_size,
            data_crc: self.data_hasher.finalize(),
            bloom: self.bloom.config().clone(),
        };

        let record = SidecarRecord {
            meta,
            bloom_bits: self.bloom.to_bytes(),
        };
        let mut sidecar = bincode::serialize(&record)?;
        let crc = crc32fast::hash(&sidecar);
        sidecar.extend_from_slice(&crc.to_le_bytes());

        let mut meta_file = File::create(&self.meta_path)?;
        meta_file.write_all(&sidecar)?;
        meta_file.sync_all()?;

        fs::rename(&self.tmp_path, &self.path)?;

        Ok(Segment {
            meta: record.meta,
            bloom: self.bloom,
        })
    }
}

/// `segment_000001.sst` → `segment_000001.sst.tmp`
pub(super) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
