//! Configuration for SkipKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkipKvError};

/// Main configuration for a SkipKV memtable
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── segments/        (segment_NNNNNN.sst + segment_NNNNNN.meta)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Bytes of keys + values the memtable buffers before it flushes
    pub memtable_threshold: usize,

    /// Number of levels in each skip list index
    pub max_levels: usize,

    /// Seed for skip list level promotion. `None` seeds from the OS.
    pub rng_seed: Option<u64>,

    // -------------------------------------------------------------------------
    // Bloom Filter Configuration
    // -------------------------------------------------------------------------
    /// Sizing of the per-segment Bloom filters
    pub bloom: BloomConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./skipkv_data"),
            memtable_threshold: 1000,
            max_levels: 16,
            rng_seed: None,
            bloom: BloomConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the memtable cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_threshold == 0 {
            return Err(SkipKvError::Config(
                "memtable threshold must be greater than zero".to_string(),
            ));
        }
        if self.max_levels == 0 {
            return Err(SkipKvError::Config(
                "skip list needs at least one level".to_string(),
            ));
        }
        self.bloom.validate()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn memtable_threshold(mut self, bytes: usize) -> Self {
        self.config.memtable_threshold = bytes;
        self
    }

    /// Set the number of skip list levels
    pub fn max_levels(mut self, levels: usize) -> Self {
        self.config.max_levels = levels;
        self
    }

    /// Fix the skip list coin flips for reproducible layouts
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Set the Bloom filter sizing
    pub fn bloom(mut self, bloom: BloomConfig) -> Self {
        self.config.bloom = bloom;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Bloom Filter Sizing
// =============================================================================

/// Hash seeds used by the default sizing, one per hash function
pub const DEFAULT_BLOOM_SEEDS: [u32; 5] = [52711, 648391, 9737333, 3713921, 1744400];

/// Bit-array length for 4000 items at a 1e-6 false positive rate with 5 hashes
pub const DEFAULT_BLOOM_BITS: usize = 306_871;

/// Item count the default sizing was derived for
pub const DEFAULT_BLOOM_EXPECTED_ITEMS: usize = 4000;

/// The (m, seeds, N) triple that sizes a Bloom filter.
///
/// `seeds.len()` is the number of hash functions `k`. Inserting more than
/// `expected_items` keys is allowed; the false positive rate just climbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomConfig {
    /// Length of the bit array (m)
    pub num_bits: usize,

    /// One seed per hash function (k = seeds.len())
    pub seeds: Vec<u32>,

    /// Item count the sizing assumes (N)
    pub expected_items: usize,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            num_bits: DEFAULT_BLOOM_BITS,
            seeds: DEFAULT_BLOOM_SEEDS.to_vec(),
            expected_items: DEFAULT_BLOOM_EXPECTED_ITEMS,
        }
    }
}

impl BloomConfig {
    /// Derive m and k for `expected_items` keys at `false_positive_rate`.
    ///
    /// m = ceil(-n ln p / (ln 2)^2), k = round(m / n * ln 2).
    pub fn optimal(expected_items: usize, false_positive_rate: f64) -> Result<Self> {
        if expected_items == 0 {
            return Err(SkipKvError::Config(
                "bloom filter needs a non-zero expected item count".to_string(),
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(SkipKvError::Config(format!(
                "bloom false positive rate must be in (0, 1), got {}",
                false_positive_rate
            )));
        }

        let n = expected_items as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = (-n * false_positive_rate.ln() / (ln2 * ln2)).ceil() as usize;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as usize;

        Ok(Self {
            num_bits,
            seeds: derive_seeds(num_hashes),
            expected_items,
        })
    }

    /// Number of hash functions (k)
    pub fn num_hashes(&self) -> usize {
        self.seeds.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_bits == 0 {
            return Err(SkipKvError::Config(
                "bloom filter needs at least one bit".to_string(),
            ));
        }
        if self.seeds.is_empty() {
            return Err(SkipKvError::Config(
                "bloom filter needs at least one hash seed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reference seeds first, then golden-ratio offsets of them.
fn derive_seeds(count: usize) -> Vec<u32> {
    (0..count)
        .map(|i| {
            let base = DEFAULT_BLOOM_SEEDS[i % DEFAULT_BLOOM_SEEDS.len()];
            let round = (i / DEFAULT_BLOOM_SEEDS.len()) as u32;
            base ^ round.wrapping_mul(0x9E37_79B9)
        })
        .collect()
}
