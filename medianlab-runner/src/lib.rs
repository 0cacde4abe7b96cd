//! MedianLab Runner — everything around the streaming core.
//!
//! This crate builds on `medianlab-core` to provide:
//! - TOML run configuration with defaults and validation
//! - The result writer (`receive_ts;price_median`) with a BLAKE3 digest
//! - `run_median`: scan → merge → median → result file, plus a JSON run summary
//! - A seeded synthetic trade/level dataset generator

pub mod config;
pub mod runner;
pub mod synthetic;
pub mod writer;

pub use config::{ConfigError, RunConfig, DEFAULT_RESULT_FILE, SUMMARY_FILE};
pub use runner::{run_median, RunError, RunSummary};
pub use synthetic::{generate_dataset, GenerateError, GenerateOptions};
pub use writer::{ResultWriter, WriterError, WrittenOutput};
