//! Source file access: directory scanning and per-file cursors.

pub mod cursor;
pub mod scan;

pub use cursor::{open_cursor, Columns, Cursor, CursorError, CursorOptions, CursorState, RowError};
pub use scan::{apply_tie_break, matches_masks, scan_directory, ScanError, TieBreak};
