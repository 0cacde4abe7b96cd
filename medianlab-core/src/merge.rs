//! K-way merge over per-file cursors.
//!
//! Cursors are built in parallel on a [`WorkerPool`] (file open, header parse
//! and first-row read are I/O bound and independent). Once primed, a single
//! thread drains a min-heap keyed by `(timestamp, source index)`:
//!
//! 1. pop the smallest key
//! 2. emit that cursor's current record
//! 3. advance the cursor and push its new key, or drop it when exhausted
//!
//! The heap holds exactly one entry per live cursor, so memory is O(k) in the
//! number of sources and time is O(T log k) in emitted records. Equal
//! timestamps across sources come out in ascending source-index order; records
//! inside one source keep file order.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::data::cursor::{open_cursor, Cursor, CursorOptions};
use crate::domain::{Record, SourceId};
use crate::pool::{PoolError, WorkerPool};

/// Merge failure; `E` is the record sink's own error type.
#[derive(Debug, Error)]
pub enum MergeError<E = io::Error> {
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("record sink failed: {0}")]
    Sink(#[source] E),
}

/// Cooperative stop signal, checked by the drain loop once per record.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Anything the drain loop can pull ordered records from.
pub trait RecordSource {
    /// The buffered record not yet emitted, if any.
    fn current(&self) -> Option<Record>;

    /// Move to the next record; `false` once the source is exhausted.
    fn advance(&mut self) -> bool;

    /// Malformed rows skipped so far.
    fn skipped_rows(&self) -> u64 {
        0
    }
}

impl<R: Read> RecordSource for Cursor<R> {
    fn current(&self) -> Option<Record> {
        Cursor::current(self).copied()
    }

    fn advance(&mut self) -> bool {
        Cursor::advance(self)
    }

    fn skipped_rows(&self) -> u64 {
        Cursor::skipped_rows(self)
    }
}

/// In-memory source, mainly for tests and benchmarks.
#[derive(Debug, Clone)]
pub struct VecSource {
    records: Vec<Record>,
    pos: usize,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records, pos: 0 }
    }
}

impl RecordSource for VecSource {
    fn current(&self) -> Option<Record> {
        self.records.get(self.pos).copied()
    }

    fn advance(&mut self) -> bool {
        if self.pos < self.records.len() {
            self.pos += 1;
        }
        self.pos < self.records.len()
    }
}

/// Counters from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub records_emitted: u64,
    pub rows_skipped: u64,
    pub cancelled: bool,
}

/// Merge already-primed sources into one ascending stream.
///
/// `sources` must be in ascending source-index order; slot position is the
/// tie-break key. Sources with no current record are dropped up front. The
/// callback's first error stops the drain and is returned as-is.
pub fn drain<S, F, E>(
    sources: Vec<S>,
    cancel: Option<&CancelToken>,
    mut on_record: F,
) -> Result<DrainStats, E>
where
    S: RecordSource,
    F: FnMut(&Record) -> Result<(), E>,
{
    let mut stats = DrainStats::default();
    let mut slots: Vec<Option<S>> = Vec::with_capacity(sources.len());
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::with_capacity(sources.len());

    for (slot, source) in sources.into_iter().enumerate() {
        match source.current() {
            Some(record) => {
                heap.push(Reverse((record.timestamp, slot)));
                slots.push(Some(source));
            }
            None => {
                stats.rows_skipped += source.skipped_rows();
                slots.push(None);
            }
        }
    }

    while let Some(Reverse((_, slot))) = heap.pop() {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            stats.cancelled = true;
            break;
        }

        let Some(source) = slots[slot].as_mut() else {
            continue;
        };
        let Some(record) = source.current() else {
            continue;
        };

        on_record(&record)?;
        stats.records_emitted += 1;

        if source.advance() {
            if let Some(next) = source.current() {
                heap.push(Reverse((next.timestamp, slot)));
                continue;
            }
        }

        // Exhausted: release the source for good.
        if let Some(done) = slots[slot].take() {
            stats.rows_skipped += done.skipped_rows();
        }
    }

    // Sources still live after a cancel contribute what they skipped so far.
    stats.rows_skipped += slots.iter().flatten().map(RecordSource::skipped_rows).sum::<u64>();

    Ok(stats)
}

/// A source dropped before the merge, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub source: SourceId,
    pub reason: String,
}

/// Cursors ready to merge, plus the sources rejected while priming.
pub struct PrimedSources {
    pub cursors: Vec<Cursor>,
    pub skipped: Vec<SkippedSource>,
    /// Malformed rows seen by the rejected sources only.
    pub rows_skipped: u64,
}

/// Outcome of a full merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub sources_total: usize,
    pub sources_merged: usize,
    pub skipped: Vec<SkippedSource>,
    pub records_emitted: u64,
    pub rows_skipped: u64,
    pub cancelled: bool,
}

/// Builds cursors on a worker pool and drains them in timestamp order.
pub struct MergeEngine<'a> {
    pool: &'a WorkerPool,
    options: CursorOptions,
}

impl<'a> MergeEngine<'a> {
    pub fn new(pool: &'a WorkerPool, options: CursorOptions) -> Self {
        Self { pool, options }
    }

    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    /// Open and prime one cursor per path in parallel.
    ///
    /// The index of a path in `paths` becomes its source index. Invalid and
    /// empty sources are logged and set aside; only a pool failure is an error.
    pub fn prime(&self, paths: &[PathBuf]) -> Result<PrimedSources, PoolError> {
        let mut handles = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let task_path = path.clone();
            let options = self.options.clone();
            let handle = self
                .pool
                .submit(move || open_cursor(index, &task_path, &options))?;
            handles.push((SourceId::new(index, path.clone()), handle));
        }

        let mut primed = PrimedSources {
            cursors: Vec::with_capacity(handles.len()),
            skipped: Vec::new(),
            rows_skipped: 0,
        };

        for (source, handle) in handles {
            let cursor = match handle.join() {
                Ok(cursor) => cursor,
                Err(PoolError::TaskPanicked) => {
                    tracing::error!(path = %source.path().display(), "cursor construction panicked; skipping file");
                    primed.skipped.push(SkippedSource {
                        source,
                        reason: PoolError::TaskPanicked.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            if cursor.is_primed() {
                tracing::info!(file = %source.file_name(), index = source.index, "source primed");
                primed.cursors.push(cursor);
                continue;
            }

            let reason = match cursor.invalid_reason() {
                // The cursor already logged why it was rejected.
                Some(e) => e.to_string(),
                None => {
                    tracing::warn!(path = %source.path().display(), "skipping source with no valid rows");
                    "no valid rows".to_string()
                }
            };
            primed.rows_skipped += cursor.skipped_rows();
            primed.skipped.push(SkippedSource { source, reason });
        }

        Ok(primed)
    }

    /// Merge every readable file in `paths`, calling `on_record` in global
    /// ascending `(timestamp, source index)` order.
    ///
    /// The first error returned by `on_record` stops the merge and comes back
    /// unchanged as [`MergeError::Sink`].
    pub fn run<F, E>(
        &self,
        paths: &[PathBuf],
        cancel: Option<&CancelToken>,
        on_record: F,
    ) -> Result<MergeReport, MergeError<E>>
    where
        F: FnMut(&Record) -> Result<(), E>,
    {
        let primed = self.prime(paths)?;
        let mut report = MergeReport {
            sources_total: paths.len(),
            sources_merged: primed.cursors.len(),
            skipped: primed.skipped,
            ..MergeReport::default()
        };

        if primed.cursors.is_empty() {
            tracing::warn!(sources = paths.len(), "no readable sources; nothing to merge");
            report.rows_skipped = primed.rows_skipped;
            return Ok(report);
        }

        let stats = drain(primed.cursors, cancel, on_record).map_err(MergeError::Sink)?;

        report.records_emitted = stats.records_emitted;
        report.rows_skipped = primed.rows_skipped + stats.rows_skipped;
        report.cancelled = stats.cancelled;

        if report.cancelled {
            tracing::warn!(records = report.records_emitted, "merge cancelled");
        } else {
            tracing::info!(records = report.records_emitted, "merge complete");
        }
        Ok(report)
    }
}
