//! MedianLab CLI — streaming median over time-sorted market data files.
//!
//! Commands:
//! - `run`: merge every matching CSV in the input directory by timestamp and
//!   write the running price median each time it changes
//! - `generate`: write a seeded synthetic trade/level dataset

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use medianlab_core::CancelToken;
use medianlab_runner::{generate_dataset, run_median, GenerateOptions, RunConfig, RunSummary};

/// Config file looked up next to the executable when `--config` is absent.
const DEFAULT_CONFIG_NAME: &str = "config.toml";

#[derive(Parser)]
#[command(
    name = "medianlab",
    version,
    about = "MedianLab CLI — incremental median over merged price streams"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG still takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the input files and write median changes.
    Run {
        /// Path to the TOML config. Defaults to config.toml next to the binary.
        #[arg(long, visible_alias = "cfg")]
        config: Option<PathBuf>,

        /// Override [main].input.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Override [main].output.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override [merge].workers (0 = available parallelism).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Generate a synthetic dataset.
    Generate {
        /// Directory to write into.
        #[arg(long, default_value = "input")]
        output: PathBuf,

        /// Approximate megabytes per symbol.
        #[arg(long, default_value_t = 100)]
        size_mb: u64,

        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Symbols to generate (one trade and one level file each).
        #[arg(long, num_args = 1.., default_value = "btcusdt")]
        symbols: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            input,
            output,
            workers,
        } => run_cmd(config, input, output, workers),
        Commands::Generate {
            output,
            size_mb,
            seed,
            symbols,
        } => run_generate(output, size_mb, seed, symbols),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .compact()
        .init();
}

fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(DEFAULT_CONFIG_NAME))
}

/// Explicit `--config`, else `config.toml` beside the binary, else (with
/// `--input`) an all-defaults config.
fn load_config(explicit: Option<PathBuf>, input: Option<&Path>) -> Result<RunConfig> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let path = default_config_path()?;
            if !path.exists() {
                if let Some(input) = input {
                    tracing::info!(path = %path.display(), "no config file found, using defaults");
                    return Ok(RunConfig::for_input(input));
                }
            }
            tracing::info!(path = %path.display(), "no --config given, using default config location");
            path
        }
    };
    RunConfig::from_file(&path).with_context(|| format!("loading config {}", path.display()))
}

fn run_cmd(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<()> {
    let mut config = load_config(config_path, input.as_deref())?;

    if let Some(input) = input {
        config.main.input = Some(input);
    }
    if let Some(output) = output {
        config.main.output = Some(output);
    }
    if let Some(workers) = workers {
        config.merge.workers = workers;
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, stopping after the current record");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let summary = run_median(&config, Some(&cancel))?;
    print_summary(&summary);
    Ok(())
}

fn run_generate(output: PathBuf, size_mb: u64, seed: u64, symbols: Vec<String>) -> Result<()> {
    let opts = GenerateOptions {
        bytes_per_symbol: size_mb * 1024 * 1024,
        seed,
        symbols,
        ..GenerateOptions::default()
    };
    let paths = generate_dataset(&output, &opts)?;

    let total: u64 = paths
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    println!(
        "Generated {} files, {:.1} MB in {}",
        paths.len(),
        total as f64 / (1024.0 * 1024.0),
        output.display()
    );
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!();
    println!("=== Median Run ===");
    println!("Input:            {}", s.input_dir.display());
    println!("Files:            {} found, {} merged, {} skipped", s.files_found, s.files_merged, s.skipped.len());
    for skipped in &s.skipped {
        println!("  skipped {}: {}", skipped.source.path().display(), skipped.reason);
    }
    println!("Records:          {}", s.records_processed);
    println!("Rows skipped:     {}", s.rows_skipped);
    println!("Median changes:   {}", s.median_changes);
    match s.final_median {
        Some(m) => println!("Final median:     {m:.8}"),
        None => println!("Final median:     n/a"),
    }
    println!("Workers:          {}", s.workers);
    println!("Elapsed:          {:.3}s", s.elapsed_secs);
    println!("Output:           {}", s.output_path.display());
    println!("Digest:           {}", s.output_digest);
    if s.cancelled {
        println!("Run was cancelled; output holds the changes seen before the interrupt.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cfg_is_an_alias_for_config() {
        let cli = Cli::try_parse_from(["medianlab", "run", "--cfg", "/tmp/a.toml"]).unwrap();
        match cli.command {
            Commands::Run { config, .. } => assert_eq!(config, Some(PathBuf::from("/tmp/a.toml"))),
            Commands::Generate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn run_overrides_are_optional() {
        let cli = Cli::try_parse_from(["medianlab", "run", "--input", "in", "--workers", "4"]).unwrap();
        match cli.command {
            Commands::Run {
                config,
                input,
                output,
                workers,
            } => {
                assert_eq!(config, None);
                assert_eq!(input, Some(PathBuf::from("in")));
                assert_eq!(output, None);
                assert_eq!(workers, Some(4));
            }
            Commands::Generate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn generate_defaults() {
        let cli = Cli::try_parse_from(["medianlab", "generate"]).unwrap();
        match cli.command {
            Commands::Generate {
                output,
                size_mb,
                seed,
                symbols,
            } => {
                assert_eq!(output, PathBuf::from("input"));
                assert_eq!(size_mb, 100);
                assert_eq!(seed, 42);
                assert_eq!(symbols, vec!["btcusdt"]);
            }
            Commands::Run { .. } => panic!("expected generate"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["medianlab", "generate", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["medianlab", "run", "--bogus"]).is_err());
    }
}
