//! Synthetic market-data generator for benchmarks and demos.
//!
//! Per symbol it writes a trade file and an order-book level file, each a
//! seeded random walk around a base price with strictly increasing timestamp
//! groups. Level files carry 1-5 rows per timestamp; the first row of each
//! group is marked `rebuild=1`.
//!
//! Every file gets its own RNG seeded from BLAKE3 of `(seed, file name)`, so
//! the output is byte-identical for a given seed regardless of how rayon
//! schedules the files.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TRADE_HEADER: &str = "receive_ts;exchange_ts;price;quantity;side";
pub const LEVEL_HEADER: &str = "receive_ts;exchange_ts;price;quantity;side;rebuild";

const START_TS: u64 = 1_716_810_808_000_000;
const TS_STEP: (u64, u64) = (100, 5_000);
const EXCHANGE_LAG: (u64, u64) = (500, 3_000);
const LEVEL_SPREAD: f64 = 50.0;
const SIDES: [&str; 2] = ["bid", "ask"];

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid generator options: {0}")]
    InvalidOptions(String),
}

/// Generator knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Approximate bytes per symbol, split between trade and level files.
    pub bytes_per_symbol: u64,
    /// Fraction of `bytes_per_symbol` given to the trade file.
    pub trade_share: f64,
    pub seed: u64,
    pub symbols: Vec<String>,
    pub base_price: f64,
    /// Max relative price move per step.
    pub volatility: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            bytes_per_symbol: 100 * 1024 * 1024,
            trade_share: 0.5,
            seed: 42,
            symbols: vec!["btcusdt".into()],
            base_price: 68_000.0,
            volatility: 0.0005,
        }
    }
}

impl GenerateOptions {
    fn validate(&self) -> Result<(), GenerateError> {
        if self.symbols.is_empty() {
            return Err(GenerateError::InvalidOptions("no symbols given".into()));
        }
        if !(0.0..=1.0).contains(&self.trade_share) {
            return Err(GenerateError::InvalidOptions(format!(
                "trade_share {} outside [0, 1]",
                self.trade_share
            )));
        }
        if !(self.base_price.is_finite() && self.base_price > 0.0) {
            return Err(GenerateError::InvalidOptions(format!(
                "base_price {} must be positive",
                self.base_price
            )));
        }
        if !(self.volatility.is_finite() && (0.0..1.0).contains(&self.volatility)) {
            return Err(GenerateError::InvalidOptions(format!(
                "volatility {} outside [0, 1)",
                self.volatility
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Trade,
    Level,
}

struct FileJob {
    path: PathBuf,
    kind: FileKind,
    target_bytes: u64,
}

/// Write the dataset into `dir` and return the generated paths, trade file
/// first for each symbol.
pub fn generate_dataset(dir: &Path, opts: &GenerateOptions) -> Result<Vec<PathBuf>, GenerateError> {
    opts.validate()?;
    std::fs::create_dir_all(dir).map_err(|source| GenerateError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let trade_bytes = (opts.bytes_per_symbol as f64 * opts.trade_share) as u64;
    let level_bytes = opts.bytes_per_symbol.saturating_sub(trade_bytes);

    let jobs: Vec<FileJob> = opts
        .symbols
        .iter()
        .flat_map(|symbol| {
            [
                FileJob {
                    path: dir.join(format!("{symbol}_trade_2024.csv")),
                    kind: FileKind::Trade,
                    target_bytes: trade_bytes,
                },
                FileJob {
                    path: dir.join(format!("{symbol}_level_2024.csv")),
                    kind: FileKind::Level,
                    target_bytes: level_bytes,
                },
            ]
        })
        .collect();

    let written: Vec<u64> = jobs
        .par_iter()
        .map(|job| write_file(job, opts))
        .collect::<Result<_, _>>()?;

    for (job, bytes) in jobs.iter().zip(&written) {
        tracing::info!(
            file = %job.path.display(),
            bytes = *bytes,
            "generated"
        );
    }

    Ok(jobs.into_iter().map(|job| job.path).collect())
}

fn file_rng(seed: u64, path: &Path) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    if let Some(name) = path.file_name() {
        hasher.update(name.to_string_lossy().as_bytes());
    }
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

fn write_file(job: &FileJob, opts: &GenerateOptions) -> Result<u64, GenerateError> {
    let io_err = |source| GenerateError::Write {
        path: job.path.clone(),
        source,
    };
    let file = File::create(&job.path).map_err(io_err)?;
    let mut out = BufWriter::with_capacity(1 << 20, file);
    let mut rng = file_rng(opts.seed, &job.path);

    let header = match job.kind {
        FileKind::Trade => TRADE_HEADER,
        FileKind::Level => LEVEL_HEADER,
    };
    writeln!(out, "{header}").map_err(io_err)?;

    let mut written = 0u64;
    let mut price = opts.base_price;
    let mut ts = match job.kind {
        FileKind::Trade => START_TS,
        FileKind::Level => START_TS + rng.gen_range(0..=10_000),
    };
    let mut line = String::with_capacity(96);

    while written < job.target_bytes {
        if opts.volatility > 0.0 {
            price *= 1.0 + rng.gen_range(-opts.volatility..=opts.volatility);
        }
        ts += rng.gen_range(TS_STEP.0..=TS_STEP.1);
        let exchange_ts = ts.saturating_sub(rng.gen_range(EXCHANGE_LAG.0..=EXCHANGE_LAG.1));

        line.clear();
        match job.kind {
            FileKind::Trade => {
                let quantity: f64 = rng.gen_range(0.001..=5.0);
                let side = SIDES[rng.gen_range(0..SIDES.len())];
                line.push_str(&format!(
                    "{ts};{exchange_ts};{price:.8};{quantity:.8};{side}\n"
                ));
            }
            FileKind::Level => {
                let levels = rng.gen_range(1..=5);
                for i in 0..levels {
                    let level_price = price + rng.gen_range(-LEVEL_SPREAD..=LEVEL_SPREAD);
                    let quantity: f64 = rng.gen_range(0.001..=20.0);
                    let side = SIDES[rng.gen_range(0..SIDES.len())];
                    let rebuild = u8::from(i == 0);
                    line.push_str(&format!(
                        "{ts};{exchange_ts};{level_price:.8};{quantity:.8};{side};{rebuild}\n"
                    ));
                }
            }
        }
        out.write_all(line.as_bytes()).map_err(io_err)?;
        written += line.len() as u64;
    }

    out.flush().map_err(io_err)?;
    Ok(written)
}
