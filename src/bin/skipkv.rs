//! SkipKV Driver
//!
//! Thin command-line driver over the memtable and Bloom filter.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skipkv::{BloomConfig, BloomFilter, Config, MemTable};
use tracing_subscriber::{fmt, EnvFilter};

/// SkipKV
#[derive(Parser, Debug)]
#[command(name = "skipkv")]
#[command(about = "Drive the SkipKV write path")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert random key-value pairs through a memtable
    Load {
        /// Data directory
        #[arg(short, long, default_value = "./skipkv_data")]
        data_dir: PathBuf,

        /// Number of pairs to insert
        #[arg(short, long, default_value = "10000")]
        count: usize,

        /// Writer threads sharing the memtable
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Memtable flush threshold in bytes
        #[arg(long, default_value = "1000")]
        threshold: usize,

        /// Seed for the generated workload
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Measure a Bloom filter's false positive rate
    Bloom {
        /// Keys to insert
        #[arg(short, long, default_value = "4000")]
        items: usize,

        /// Disjoint keys to probe
        #[arg(short, long, default_value = "100000")]
        probes: usize,

        /// Size the filter for this rate instead of the default sizing
        #[arg(short, long)]
        rate: Option<f64>,

        /// Seed for the generated keys
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,skipkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::info!("SkipKV v{}", skipkv::VERSION);

    let outcome = match args.command {
        Commands::Load {
            data_dir,
            count,
            threads,
            threshold,
            seed,
        } => run_load(data_dir, count, threads, threshold, seed),
        Commands::Bloom {
            items,
            probes,
            rate,
            seed,
        } => run_bloom(items, probes, rate, seed),
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run_load(
    data_dir: PathBuf,
    count: usize,
    threads: usize,
    threshold: usize,
    seed: u64,
) -> skipkv::Result<()> {
    let config = Config::builder()
        .data_dir(data_dir)
        .memtable_threshold(threshold)
        .build();
    let memtable = MemTable::open(config)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..count)
        .map(|_| (random_bytes(&mut rng, 10..=15), random_bytes(&mut rng, 15..=100)))
        .collect();

    let chunk_size = count.div_ceil(threads.max(1)).max(1);
    let started = std::time::Instant::now();

    let results = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = pairs
            .chunks(chunk_size)
            .map(|chunk| {
                let memtable = &memtable;
                scope.spawn(move |_| -> skipkv::Result<()> {
                    for (key, value) in chunk {
                        memtable.insert(key.clone(), value.clone())?;
                    }
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    })
    .map_err(|_| worker_panicked())?;

    for result in results {
        result.map_err(|_| worker_panicked())??;
    }

    let resident = pairs
        .iter()
        .filter(|(key, _)| memtable.find(key).is_some())
        .count();
    let flushed = pairs
        .iter()
        .filter(|(key, _)| !memtable.candidate_segments(key).is_empty())
        .count();

    tracing::info!(
        inserted = count,
        resident,
        flushed,
        segments = memtable.segment_counter(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "load finished"
    );
    Ok(())
}

fn run_bloom(items: usize, probes: usize, rate: Option<f64>, seed: u64) -> skipkv::Result<()> {
    let config = match rate {
        Some(rate) => BloomConfig::optimal(items, rate)?,
        None => BloomConfig::default(),
    };
    let mut filter = BloomFilter::new(config)?;
    let mut rng = StdRng::seed_from_u64(seed);

    // Inserted keys are 16 bytes, probes 17, so the sets are disjoint.
    for _ in 0..items {
        filter.insert(&random_bytes(&mut rng, 16..=16));
    }
    let false_positives = (0..probes)
        .filter(|_| filter.check(&random_bytes(&mut rng, 17..=17)))
        .count();

    tracing::info!(
        items,
        probes,
        num_bits = filter.config().num_bits,
        hashes = filter.config().num_hashes(),
        false_positives,
        observed_rate = false_positives as f64 / probes.max(1) as f64,
        expected_rate = filter.false_positive_rate(),
        "bloom filter measured"
    );
    Ok(())
}

fn worker_panicked() -> skipkv::SkipKvError {
    std::io::Error::new(std::io::ErrorKind::Other, "load worker panicked").into()
}

fn random_bytes(rng: &mut StdRng, len: std::ops::RangeInclusive<usize>) -> Vec<u8> {
    let len = rng.gen_range(len);
    (0..len).map(|_| rng.gen()).collect()
}
