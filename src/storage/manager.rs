//! Segment Store
//!
//! Owns the segments directory and the file naming scheme.
//!
//! ## Responsibilities
//! - Discover existing segment files on startup
//! - Write new segments from sorted entries
//! - Load and verify segment metadata

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BloomConfig;
use crate::error::Result;
use crate::memtable::Entry;

use super::segment::tmp_path;
use super::{Segment, SegmentWriter};

/// Manages the segments directory
#[derive(Debug, Clone)]
pub struct SegmentStore {
    /// Directory where segments are stored
    dir: PathBuf,
}

impl SegmentStore {
    /// Open or create the segments directory
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            dir: path.to_path_buf(),
        })
    }

    /// Ids of the segment data files on disk, ascending
    pub fn segment_ids(&self) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_segment_id(&file_path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Id for the next flush: one past the highest on disk, or 0
    pub fn next_id(&self) -> Result<u64> {
        Ok(self.segment_ids()?.last().map_or(0, |&id| id + 1))
    }

    /// Write `entries` (strictly ascending keys) as segment `id`.
    ///
    /// On failure the partial temp file and any sidecar already written are
    /// removed and no `.sst` for `id` becomes visible, so the same id can be
    /// written again.
    pub fn write<'a, I>(&self, id: u64, entries: I, bloom: &BloomConfig) -> Result<Segment>
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        let path = self.segment_path(id);
        let result = (|| -> Result<Segment> {
            let mut writer = SegmentWriter::create(id, &path, bloom.clone())?;
            for entry in entries {
                writer.add(entry)?;
            }
            writer.finish()
        })();

        if result.is_err() {
            for leftover in [tmp_path(&path), self.meta_path(id)] {
                if let Err(e) = fs::remove_file(&leftover) {
                    tracing::debug!(
                        segment_id = id,
                        path = %leftover.display(),
                        error = %e,
                        "no partial segment file to clean up"
                    );
                }
            }
        }
        result
    }

    /// Load segment `id`'s metadata, verifying both checksums
    pub fn load(&self, id: u64) -> Result<Segment> {
        Segment::load(&self.segment_path(id), &self.meta_path(id))
    }

    /// Load every segment with readable metadata, newest first.
    ///
    /// Segments whose sidecar is missing or corrupt are skipped with a
    /// warning; their data files are left alone.
    pub fn load_all(&self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        for id in self.segment_ids()?.into_iter().rev() {
            match self.load(id) {
                Ok(segment) => segments.push(segment),
                Err(e) => {
                    tracing::warn!(segment_id = id, error = %e, "skipping segment metadata")
                }
            }
        }
        Ok(segments)
    }

    /// Get the segments directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate the data file path for a segment with given ID
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("segment_{:06}.sst", id))
    }

    /// Generate the sidecar path for a segment with given ID
    pub fn meta_path(&self, id: u64) -> PathBuf {
        self.segment_path(id).with_extension("meta")
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Parse segment ID from filename
    /// "segment_000042.sst" → Some(42)
    fn parse_segment_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("segment_")?;
        id_str.parse().ok()
    }
}
