//! Record and source identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A single price observation.
///
/// Ordering across sources is by `timestamp` ascending; ties are broken by the
/// source index of the cursor that produced the record, never by price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: u64,
    pub price: f64,
}

impl Record {
    pub fn new(timestamp: u64, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Identity of one source file inside a merge run.
///
/// `index` is the position of the path in the (already tie-break ordered)
/// input list and is the permanent tie-break key for equal timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId {
    pub index: usize,
    pub path: PathBuf,
}

impl SourceId {
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name only, for log lines.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.path.display())
    }
}
