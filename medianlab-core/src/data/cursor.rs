//! Sequential reader over one sorted, delimiter-separated source file.
//!
//! A cursor holds exactly one buffered record at a time. The first non-blank
//! line is the header; it is parsed once to resolve the timestamp and price column positions; every
//! other column is ignored. Data rows that cannot be parsed are skipped with a
//! warning and never fail the cursor. Quote characters have no special
//! meaning: every line is split on the delimiter as-is.
//!
//! Lifecycle:
//! ```text
//! Constructing ──open──► Invalid      (unreadable file, no header, missing column)
//!      │
//!      └──prime──► Primed ◄──advance──┐
//!             │        └──────────────┘
//!             └──────► Exhausted      (no further valid rows; file handle released)
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

use crate::domain::{Record, SourceId};

/// Default read buffer: 64 KiB keeps syscalls low without holding much per source.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// File-level reasons a cursor ends up `Invalid`.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("failed to open file: {0}")]
    Open(#[source] io::Error),

    #[error("file is empty (no header line)")]
    EmptyFile,

    #[error("failed to read header: {0}")]
    Header(#[source] csv::Error),

    #[error("missing required column(s): {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },
}

/// Row-level parse failures. Logged and skipped, never propagated.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("row has {found} column(s), needs at least {needed}")]
    TooFewColumns { found: usize, needed: usize },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid price '{0}'")]
    InvalidPrice(String),
}

/// How a source file is laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Header name of the unsigned-integer timestamp column.
    pub timestamp_column: String,
    /// Header name of the floating-point price column.
    pub price_column: String,
    /// Read buffer size in bytes.
    pub buffer_capacity: usize,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            timestamp_column: "receive_ts".into(),
            price_column: "price".into(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Resolved positions of the two required columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub timestamp: usize,
    pub price: usize,
}

impl Columns {
    /// Resolve both required columns from a header row.
    ///
    /// Matching is exact and case-sensitive; the first matching token wins.
    pub fn resolve(
        header: &csv::ByteRecord,
        options: &CursorOptions,
    ) -> Result<Self, CursorError> {
        let find = |name: &str| header.iter().position(|field| field == name.as_bytes());

        match (find(&options.timestamp_column), find(&options.price_column)) {
            (Some(timestamp), Some(price)) => Ok(Self { timestamp, price }),
            (ts, price) => {
                let mut missing = Vec::new();
                if ts.is_none() {
                    missing.push(options.timestamp_column.clone());
                }
                if price.is_none() {
                    missing.push(options.price_column.clone());
                }
                Err(CursorError::MissingColumns { missing })
            }
        }
    }

    fn min_len(&self) -> usize {
        self.timestamp.max(self.price) + 1
    }

    /// Parse one data row into a record.
    pub fn parse(&self, row: &csv::ByteRecord) -> Result<Record, RowError> {
        if row.len() < self.min_len() {
            return Err(RowError::TooFewColumns {
                found: row.len(),
                needed: self.min_len(),
            });
        }

        let ts_field = &row[self.timestamp];
        let timestamp = std::str::from_utf8(ts_field)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| RowError::InvalidTimestamp(lossy(ts_field)))?;

        let price_field = &row[self.price];
        let price = std::str::from_utf8(price_field)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .ok_or_else(|| RowError::InvalidPrice(lossy(price_field)))?;

        Ok(Record { timestamp, price })
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Explicit cursor state.
#[derive(Debug)]
pub enum CursorState {
    Constructing,
    /// Holds a record that has not been emitted yet.
    Primed(Record),
    Exhausted,
    Invalid(CursorError),
}

/// Sequential reader over one source, buffering a single current record.
pub struct Cursor<R = File> {
    source: SourceId,
    reader: Option<csv::Reader<R>>,
    columns: Option<Columns>,
    row: csv::ByteRecord,
    state: CursorState,
    skipped_rows: u64,
}

impl Cursor<File> {
    /// Open a file, resolve its header, and prime the first valid row.
    ///
    /// Never fails: an unreadable file or a header without the required
    /// columns yields a cursor in the `Invalid` state.
    pub fn open(source: SourceId, options: &CursorOptions) -> Self {
        match File::open(source.path()) {
            Ok(file) => Self::from_reader(source, file, options),
            Err(e) => {
                tracing::error!(path = %source.path().display(), error = %e, "failed to open source file");
                Self::invalid(source, CursorError::Open(e))
            }
        }
    }
}

impl<R: Read> Cursor<R> {
    /// Build a cursor over any byte stream. Used by [`Cursor::open`] and tests.
    pub fn from_reader(source: SourceId, reader: R, options: &CursorOptions) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .flexible(true)
            // Fields are plain tokens; a stray quote must not swallow the following lines.
            .quoting(false)
            .buffer_capacity(options.buffer_capacity.max(1))
            .from_reader(reader);

        let mut header = csv::ByteRecord::new();
        let columns = match reader.read_byte_record(&mut header) {
            Ok(true) => Columns::resolve(&header, options),
            Ok(false) => Err(CursorError::EmptyFile),
            Err(e) => Err(CursorError::Header(e)),
        };

        let columns = match columns {
            Ok(columns) => columns,
            Err(e) => {
                match &e {
                    CursorError::EmptyFile => {
                        tracing::warn!(path = %source.path().display(), "source file is empty")
                    }
                    _ => {
                        tracing::error!(path = %source.path().display(), error = %e, "source file rejected")
                    }
                }
                return Self::invalid(source, e);
            }
        };

        let mut cursor = Self {
            source,
            reader: Some(reader),
            columns: Some(columns),
            row: csv::ByteRecord::new(),
            state: CursorState::Constructing,
            skipped_rows: 0,
        };
        cursor.fill_next();
        cursor
    }

    fn invalid(source: SourceId, error: CursorError) -> Self {
        Self {
            source,
            reader: None,
            columns: None,
            row: csv::ByteRecord::new(),
            state: CursorState::Invalid(error),
            skipped_rows: 0,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn is_primed(&self) -> bool {
        matches!(self.state, CursorState::Primed(_))
    }

    pub fn columns(&self) -> Option<Columns> {
        self.columns
    }

    /// The buffered, not-yet-emitted record. `None` unless primed.
    pub fn current(&self) -> Option<&Record> {
        match &self.state {
            CursorState::Primed(record) => Some(record),
            _ => None,
        }
    }

    /// Number of data rows skipped as malformed so far.
    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows
    }

    /// Why the cursor was rejected, if it was.
    pub fn invalid_reason(&self) -> Option<&CursorError> {
        match &self.state {
            CursorState::Invalid(e) => Some(e),
            _ => None,
        }
    }

    /// Move past the current record. Returns whether a new `current()` exists.
    ///
    /// Only a primed cursor moves; any other state returns `false` unchanged.
    pub fn advance(&mut self) -> bool {
        if !self.is_primed() {
            return false;
        }
        self.fill_next()
    }

    /// Read forward to the next parseable row, or to end of input.
    fn fill_next(&mut self) -> bool {
        let (Some(reader), Some(columns)) = (self.reader.as_mut(), self.columns) else {
            self.state = CursorState::Exhausted;
            return false;
        };

        loop {
            match reader.read_byte_record(&mut self.row) {
                Ok(true) => match columns.parse(&self.row) {
                    Ok(record) => {
                        self.state = CursorState::Primed(record);
                        return true;
                    }
                    Err(e) => {
                        self.skipped_rows += 1;
                        let line = self.row.position().map(|p| p.line()).unwrap_or(0);
                        tracing::warn!(
                            file = %self.source.file_name(),
                            line,
                            reason = %e,
                            "skipping malformed row"
                        );
                    }
                },
                Ok(false) => break,
                Err(e) => {
                    tracing::error!(
                        file = %self.source.file_name(),
                        error = %e,
                        "read error, closing source early"
                    );
                    break;
                }
            }
        }

        // End of input: release the handle now rather than when the cursor drops.
        self.reader = None;
        self.state = CursorState::Exhausted;
        false
    }
}

/// Open a cursor for `path` at `index`.
pub fn open_cursor(index: usize, path: &Path, options: &CursorOptions) -> Cursor {
    Cursor::open(SourceId::new(index, path), options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(content: &str) -> Cursor<&[u8]> {
        Cursor::from_reader(
            SourceId::new(0, "mem.csv"),
            content.as_bytes(),
            &CursorOptions::default(),
        )
    }

    fn drain(mut c: Cursor<&[u8]>) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(r) = c.current() {
            out.push(*r);
            c.advance();
        }
        out
    }

    #[test]
    fn primes_first_row_on_construction() {
        let c = cursor("receive_ts;exchange_ts;price\n1000;900;100.5\n2000;1900;101\n");
        assert!(c.is_primed());
        assert_eq!(c.current(), Some(&Record::new(1000, 100.5)));
        assert_eq!(c.columns(), Some(Columns { timestamp: 0, price: 2 }));
    }

    #[test]
    fn columns_resolved_by_name_not_position() {
        let c = cursor("price;side;receive_ts\n68480.1;bid;42\n");
        assert_eq!(c.current(), Some(&Record::new(42, 68480.1)));
    }

    #[test]
    fn first_matching_header_token_wins() {
        let c = cursor("receive_ts;price;price\n1;10.0;20.0\n");
        assert_eq!(c.current().map(|r| r.price), Some(10.0));
    }

    #[test]
    fn header_match_is_case_sensitive() {
        let c = cursor("Receive_Ts;price\n1;10.0\n");
        match c.state() {
            CursorState::Invalid(CursorError::MissingColumns { missing }) => {
                assert_eq!(missing, &vec!["receive_ts".to_string()]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn missing_both_columns_lists_both() {
        let c = cursor("a;b\n1;2\n");
        let reason = c.invalid_reason().expect("invalid").to_string();
        assert!(reason.contains("receive_ts"));
        assert!(reason.contains("price"));
    }

    #[test]
    fn empty_input_is_invalid() {
        let c = cursor("");
        assert!(matches!(c.state(), CursorState::Invalid(CursorError::EmptyFile)));
        assert!(c.current().is_none());
    }

    #[test]
    fn header_only_is_exhausted() {
        let c = cursor("receive_ts;price\n");
        assert!(matches!(c.state(), CursorState::Exhausted));
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let c = cursor(
            "receive_ts;price\n\
             abc;1.0\n\
             1000;xyz\n\
             2000\n\
             -5;1.0\n\
             3000;NaN\n\
             4000;2.5\n",
        );
        assert_eq!(c.current(), Some(&Record::new(4000, 2.5)));
        assert_eq!(c.skipped_rows(), 5);
    }

    #[test]
    fn blank_lines_are_skipped_silently() {
        let c = cursor("receive_ts;price\n\n\n1;1.0\n\n2;2.0\n");
        assert_eq!(c.skipped_rows(), 0);
        assert_eq!(drain(c), vec![Record::new(1, 1.0), Record::new(2, 2.0)]);
    }

    #[test]
    fn advance_walks_file_order_then_exhausts() {
        let mut c = cursor("receive_ts;price\n1;1.0\n1;0.5\n3;3.0\n");
        assert!(c.advance());
        assert_eq!(c.current(), Some(&Record::new(1, 0.5)));
        assert!(c.advance());
        assert!(!c.advance());
        assert!(matches!(c.state(), CursorState::Exhausted));
        assert!(c.current().is_none());
        // Further advances are no-ops.
        assert!(!c.advance());
    }

    #[test]
    fn stray_quote_in_ignored_column_does_not_swallow_rows() {
        let c = cursor("receive_ts;price;side\n1;1.0;\"bid\n2;2.0;ask\n3;3.0;ask\n4;4.0;bid\n");
        assert_eq!(c.skipped_rows(), 0);
        let ts: Vec<u64> = drain(c).iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3, 4]);
    }

    #[test]
    fn quoted_price_is_a_row_skip() {
        let c = cursor("receive_ts;price\n1;\"1.0\"\n2;2.0\n");
        assert_eq!(c.current(), Some(&Record::new(2, 2.0)));
        assert_eq!(c.skipped_rows(), 1);
    }

    #[test]
    fn quote_in_header_is_kept_literally() {
        let c = cursor("\"receive_ts\";price\n1;1.0\n");
        assert!(matches!(
            c.state(),
            CursorState::Invalid(CursorError::MissingColumns { .. })
        ));
    }

    #[test]
    fn leading_blank_lines_before_header_are_skipped() {
        let c = cursor("\n\nreceive_ts;price\n7;7.5\n");
        assert_eq!(c.columns(), Some(Columns { timestamp: 0, price: 1 }));
        assert_eq!(c.current(), Some(&Record::new(7, 7.5)));
    }

    #[test]
    fn blank_lines_only_is_an_empty_file() {
        let c = cursor("\n\n\n");
        assert!(matches!(c.state(), CursorState::Invalid(CursorError::EmptyFile)));
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let c = cursor("receive_ts;price\r\n1;1.25\r\n");
        assert_eq!(c.current(), Some(&Record::new(1, 1.25)));
    }

    #[test]
    fn custom_delimiter_and_column_names() {
        let opts = CursorOptions {
            delimiter: b',',
            timestamp_column: "ts".into(),
            price_column: "px".into(),
            ..CursorOptions::default()
        };
        let c = Cursor::from_reader(SourceId::new(0, "x.csv"), "px,ts\n9.5,7\n".as_bytes(), &opts);
        assert_eq!(c.current(), Some(&Record::new(7, 9.5)));
    }

    #[test]
    fn row_parse_reports_reason() {
        let cols = Columns { timestamp: 0, price: 2 };
        let row = csv::ByteRecord::from(vec!["1", "2"]);
        assert_eq!(
            cols.parse(&row),
            Err(RowError::TooFewColumns { found: 2, needed: 3 })
        );
        let row = csv::ByteRecord::from(vec!["1.5", "x", "2"]);
        assert_eq!(cols.parse(&row), Err(RowError::InvalidTimestamp("1.5".into())));
    }

    #[test]
    fn open_missing_file_is_invalid() {
        let c = open_cursor(0, Path::new("/definitely/not/here.csv"), &CursorOptions::default());
        assert!(matches!(c.state(), CursorState::Invalid(CursorError::Open(_))));
    }
}
