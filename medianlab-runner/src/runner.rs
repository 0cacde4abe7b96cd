//! Run orchestration: scan → prime → merge → median → result file.
//!
//! Fatal errors are directory-level and sink-level only. Anything wrong with a
//! single source file or row is logged, counted, and skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use medianlab_core::data::{apply_tie_break, scan_directory, ScanError};
use medianlab_core::{CancelToken, MedianAggregate, MergeEngine, MergeError, PoolError, SkippedSource, WorkerPool};

use crate::config::RunConfig;
use crate::writer::{ResultWriter, WriterError};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("input scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("result sink failed: {0}")]
    Sink(#[from] WriterError),

    #[error("worker pool failed: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to serialize run summary: {0}")]
    SummaryEncode(#[from] serde_json::Error),

    #[error("run summary I/O failed for {}: {source}", .path.display())]
    SummaryIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<MergeError<WriterError>> for RunError {
    fn from(e: MergeError<WriterError>) -> Self {
        match e {
            MergeError::Pool(e) => RunError::Pool(e),
            MergeError::Sink(e) => RunError::Sink(e),
        }
    }
}

/// Outcome of one run, also persisted as `run_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_dir: PathBuf,
    pub files_found: usize,
    pub files_merged: usize,
    pub skipped: Vec<SkippedSource>,
    pub records_processed: u64,
    pub rows_skipped: u64,
    pub median_changes: u64,
    pub final_median: Option<f64>,
    pub output_path: PathBuf,
    /// BLAKE3 of the result file contents.
    pub output_digest: String,
    pub workers: usize,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Write as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), RunError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RunError::SummaryIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_json(path: &Path) -> Result<Self, RunError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunError::SummaryIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Execute one full median run.
///
/// `cancel` is checked once per merged record; a cancelled run still flushes
/// the rows written so far and returns `Ok` with `cancelled = true`.
pub fn run_median(config: &RunConfig, cancel: Option<&CancelToken>) -> Result<RunSummary, RunError> {
    let started = Instant::now();
    let input = config.input_dir();
    let masks = &config.main.filename_mask;

    let found = scan_directory(input, masks)?;
    if found.is_empty() {
        tracing::warn!(input = %input.display(), masks = ?masks, "no matching source files");
    } else {
        tracing::info!(input = %input.display(), files = found.len(), "source files found");
    }
    let paths = apply_tie_break(found, masks, config.merge.tie_break);

    let result_path = config.result_path();
    let mut writer = ResultWriter::create(&result_path)?;

    let workers = config.worker_count();
    let pool = WorkerPool::new(workers)?;
    let engine = MergeEngine::new(&pool, config.cursor_options());
    let mut median = MedianAggregate::with_tolerance(config.median.change_tolerance);

    let report = engine.run(&paths, cancel, |record| {
        median.add(record.price);
        match median.median() {
            Some(value) if median.is_changed() => {
                writer.write(record.timestamp, value)
            }
            _ => Ok(()),
        }
    })?;
    pool.shutdown();

    let output = writer.finish()?;
    let summary = RunSummary {
        input_dir: input.to_path_buf(),
        files_found: report.sources_total,
        files_merged: report.sources_merged,
        skipped: report.skipped,
        records_processed: report.records_emitted,
        rows_skipped: report.rows_skipped,
        median_changes: output.rows,
        final_median: median.median(),
        output_path: output.path,
        output_digest: output.digest,
        workers: pool.size(),
        cancelled: report.cancelled,
        elapsed_secs: started.elapsed().as_secs_f64(),
        finished_at: Utc::now(),
    };

    if config.output.write_summary {
        summary.save_json(&config.summary_path())?;
    }

    tracing::info!(
        records = summary.records_processed,
        changes = summary.median_changes,
        skipped_files = summary.skipped.len(),
        skipped_rows = summary.rows_skipped,
        output = %summary.output_path.display(),
        elapsed_secs = summary.elapsed_secs,
        "run finished"
    );
    Ok(summary)
}
