//! Result sink: one `receive_ts;price_median` row per median change.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RESULT_HEADER: [&str; 2] = ["receive_ts", "price_median"];

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create result file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush {}: {source}", .path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What was written, reported once the writer is finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenOutput {
    pub path: PathBuf,
    pub rows: u64,
    /// BLAKE3 over the header and every data row, as written.
    pub digest: String,
}

/// Buffered `;`-separated result file.
pub struct ResultWriter {
    path: PathBuf,
    inner: csv::Writer<File>,
    hasher: blake3::Hasher,
    rows: u64,
}

impl ResultWriter {
    /// Create (or truncate) `path`, creating its parent directory first, and
    /// write the header row.
    pub fn create(path: &Path) -> Result<Self, WriterError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| WriterError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let inner = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_path(path)
            .map_err(|source| WriterError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        let mut writer = Self {
            path: path.to_path_buf(),
            inner,
            hasher: blake3::Hasher::new(),
            rows: 0,
        };
        writer.write_fields(RESULT_HEADER[0], RESULT_HEADER[1])?;
        tracing::debug!(path = %path.display(), "result file opened");
        Ok(writer)
    }

    /// Append one `(timestamp, median)` row; the median has 8 decimals.
    pub fn write(&mut self, timestamp: u64, median: f64) -> Result<(), WriterError> {
        let ts = timestamp.to_string();
        let median = format!("{median:.8}");
        self.write_fields(&ts, &median)?;
        self.rows += 1;
        Ok(())
    }

    fn write_fields(&mut self, first: &str, second: &str) -> Result<(), WriterError> {
        self.inner
            .write_record([first, second])
            .map_err(|source| WriterError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.hasher.update(first.as_bytes());
        self.hasher.update(b";");
        self.hasher.update(second.as_bytes());
        self.hasher.update(b"\n");
        Ok(())
    }

    /// Data rows written so far (header excluded).
    pub fn written_count(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush everything to disk.
    pub fn finish(mut self) -> Result<WrittenOutput, WriterError> {
        self.inner.flush().map_err(|source| WriterError::Flush {
            path: self.path.clone(),
            source,
        })?;
        Ok(WrittenOutput {
            digest: self.hasher.finalize().to_hex().to_string(),
            path: self.path,
            rows: self.rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_fixed_precision_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("median_result.csv");

        let mut w = ResultWriter::create(&path).unwrap();
        w.write(1716810808663260, 68480.1).unwrap();
        w.write(1716810808665000, 68480.05).unwrap();
        assert_eq!(w.written_count(), 2);
        let out = w.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "receive_ts;price_median\n\
             1716810808663260;68480.10000000\n\
             1716810808665000;68480.05000000\n"
        );
        assert_eq!(out.rows, 2);
        assert_eq!(out.digest, blake3::hash(text.as_bytes()).to_hex().to_string());
    }

    #[test]
    fn creates_missing_output_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/c/result.csv");
        let w = ResultWriter::create(&path).unwrap();
        assert_eq!(w.path(), path.as_path());
        w.finish().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn truncates_an_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.csv");
        std::fs::write(&path, "stale content that is much longer than the header\n").unwrap();
        ResultWriter::create(&path).unwrap().finish().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "receive_ts;price_median\n");
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent "directory" is a regular file.
        let err = ResultWriter::create(&blocker.join("r.csv")).err().unwrap();
        assert!(matches!(err, WriterError::CreateDir { .. }));
    }

    #[test]
    fn same_rows_same_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let digest = |name: &str| {
            let mut w = ResultWriter::create(&tmp.path().join(name)).unwrap();
            w.write(1, 1.5).unwrap();
            w.finish().unwrap().digest
        };
        assert_eq!(digest("a.csv"), digest("b.csv"));
    }
}
