//! Bloom Filter Module
//!
//! Fixed-capacity probabilistic set membership over opaque byte keys.
//!
//! ## Guarantees
//! - No false negatives: once `insert(k)` ran, `check(k)` is true forever
//!   (bits are only ever set, never cleared; there is no delete)
//! - False positives happen at roughly the configured rate while the number
//!   of inserted keys stays near `expected_items`
//!
//! ## Operational Caveat
//! Inserting more than `expected_items` keys is not an error. The filter
//! keeps answering, but the false positive rate grows with every extra key.
//! A single warning is logged the first time the sizing is exceeded.
//!
//! ## Hashing
//! ```text
//!   key ──► xxh32(key, seed_0) % m ──► bit i0
//!       ──► xxh32(key, seed_1) % m ──► bit i1
//!       ...           (one probe per seed, k = seeds.len())
//! ```
//!
//! Not internally synchronized: share behind a lock if several threads insert.

use std::hash::Hasher;

use bitvec::prelude::*;
use twox_hash::XxHash32;

use crate::config::BloomConfig;
use crate::error::{Result, SkipKvError};

/// Probabilistic membership filter
#[derive(Debug, Clone)]
pub struct BloomFilter {
    config: BloomConfig,
    bits: BitVec<u64, Lsb0>,
    /// Number of insert calls (duplicates included)
    inserted: usize,
}

impl BloomFilter {
    /// Create an empty filter sized by `config`
    pub fn new(config: BloomConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::empty(config))
    }

    /// All-zero filter for an already validated `config`
    fn empty(config: BloomConfig) -> Self {
        let bits = bitvec![u64, Lsb0; 0; config.num_bits];
        Self {
            config,
            bits,
            inserted: 0,
        }
    }

    /// Create an empty filter sized for `expected_items` at `false_positive_rate`
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Result<Self> {
        Self::new(BloomConfig::optimal(expected_items, false_positive_rate)?)
    }

    /// Set the k bits for `key`. Idempotent.
    pub fn insert(&mut self, key: &[u8]) {
        for position in Self::positions(&self.config, key) {
            self.bits.set(position, true);
        }

        self.inserted += 1;
        if self.inserted == self.config.expected_items + 1 {
            tracing::warn!(
                expected_items = self.config.expected_items,
                num_bits = self.config.num_bits,
                "bloom filter exceeded its sizing, false positive rate will degrade"
            );
        }
    }

    /// True iff all k bits for `key` are set. May be a false positive.
    pub fn check(&self, key: &[u8]) -> bool {
        Self::positions(&self.config, key).all(|position| self.bits[position])
    }

    /// Number of insert calls so far
    pub fn len(&self) -> usize {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Sizing this filter was built with
    pub fn config(&self) -> &BloomConfig {
        &self.config
    }

    /// Number of bits currently set
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    /// Expected false positive rate at the current fill: (1 - e^(-kn/m))^k
    pub fn false_positive_rate(&self) -> f64 {
        let k = self.config.num_hashes() as f64;
        let n = self.inserted as f64;
        let m = self.config.num_bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Raw bit words, little-endian, for persisting the filter
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits
            .as_raw_slice()
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    /// Rebuild a filter from `to_bytes` output and the config it was built with
    pub fn from_bytes(config: BloomConfig, bytes: &[u8], inserted: usize) -> Result<Self> {
        config.validate()?;

        let words = config.num_bits.div_ceil(u64::BITS as usize);
        if bytes.len() != words * 8 {
            return Err(SkipKvError::Corruption(format!(
                "bloom filter expects {} bytes for {} bits, got {}",
                words * 8,
                config.num_bits,
                bytes.len()
            )));
        }

        let raw: Vec<u64> = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect();

        let mut bits = BitVec::<u64, Lsb0>::from_vec(raw);
        bits.truncate(config.num_bits);

        Ok(Self {
            config,
            bits,
            inserted,
        })
    }

    fn positions<'a>(config: &'a BloomConfig, key: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        let num_bits = config.num_bits as u64;
        config.seeds.iter().map(move |&seed| {
            let mut hasher = XxHash32::with_seed(seed);
            hasher.write(key);
            (hasher.finish() % num_bits) as usize
        })
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::empty(BloomConfig::default())
    }
}
