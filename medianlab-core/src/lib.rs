//! MedianLab Core — streaming median over many time-sorted price files.
//!
//! This crate contains the streaming pipeline:
//! - Per-file cursors with an explicit state machine (`data::cursor`)
//! - Directory scan, mask filter and tie-break ordering (`data::scan`)
//! - Fixed-size worker pool with typed one-shot result handles (`pool`)
//! - K-way merge over cursors with bounded memory (`merge`)
//! - Two-heap incremental median with an edge-triggered change flag (`median`)

pub mod data;
pub mod domain;
pub mod median;
pub mod merge;
pub mod pool;

pub use data::{Cursor, CursorError, CursorOptions, CursorState, ScanError, TieBreak};
pub use domain::{Record, SourceId};
pub use median::{ChangePolicy, MedianAggregate};
pub use merge::{
    drain, CancelToken, DrainStats, MergeEngine, MergeError, MergeReport, RecordSource,
    SkippedSource, VecSource,
};
pub use pool::{default_worker_count, PoolError, TaskHandle, WorkerPool};
