//! Directory scan: find candidate source files and fix their merge order.
//!
//! The order of the returned list is the source-index order used by the merge
//! engine to break timestamp ties, so it is decided here by an explicit
//! [`TieBreak`] policy rather than left to whatever the filesystem returns.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of files considered by the scanner.
pub const SOURCE_EXTENSION: &str = "csv";

/// Fatal, directory-level scan failures.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input directory does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to scan {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Policy deciding which source wins when timestamps are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Sorted path order.
    #[default]
    PathOrder,
    /// Files matching an earlier mask come first; path order within a mask group.
    MaskPriority,
}

/// True when `path`'s stem contains any of `masks`, or when `masks` is empty.
pub fn matches_masks(path: &Path, masks: &[String]) -> bool {
    if masks.is_empty() {
        return true;
    }
    let stem = stem_of(path);
    masks.iter().any(|mask| stem.contains(mask.as_str()))
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn mask_rank(path: &Path, masks: &[String]) -> usize {
    let stem = stem_of(path);
    masks
        .iter()
        .position(|mask| stem.contains(mask.as_str()))
        .unwrap_or(masks.len())
}

/// List regular `.csv` files in `dir` whose stem matches a mask, sorted by path.
pub fn scan_directory(dir: &Path, masks: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.exists() {
        return Err(ScanError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let io_err = |source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let file_type = entry.file_type().map_err(io_err)?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }
        if matches_masks(&path, masks) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Reorder a path-sorted list according to `policy`.
///
/// The sort is stable, so `PathOrder` is the identity on sorted input and
/// `MaskPriority` keeps path order inside each mask group.
pub fn apply_tie_break(mut paths: Vec<PathBuf>, masks: &[String], policy: TieBreak) -> Vec<PathBuf> {
    match policy {
        TieBreak::PathOrder => paths.sort(),
        TieBreak::MaskPriority => {
            paths.sort();
            paths.sort_by_key(|p| mask_rank(p, masks));
        }
    }
    paths
}
