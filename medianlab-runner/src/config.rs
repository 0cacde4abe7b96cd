//! TOML run configuration.
//!
//! Only `[main].input` is required; every other key has a default. The file is
//! validated once at load time so the rest of the run can rely on it.

use medianlab_core::data::{CursorOptions, TieBreak};
use medianlab_core::default_worker_count;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default result file name inside the output directory.
pub const DEFAULT_RESULT_FILE: &str = "median_result.csv";

/// Name of the JSON run summary written next to the result file.
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config is missing required key [main].input")]
    MissingInput,

    #[error("delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(String),

    #[error("change_tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
}

/// Full run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub main: MainSection,
    #[serde(default)]
    pub columns: ColumnsSection,
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub median: MedianSection,
    #[serde(default)]
    pub output: OutputSection,
}

/// `[main]`: where to read and write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainSection {
    /// Input directory. Required.
    pub input: Option<PathBuf>,
    /// Output directory; `<cwd>/output` when absent.
    pub output: Option<PathBuf>,
    /// Substrings of the file stem; empty means every `.csv` file.
    #[serde(default)]
    pub filename_mask: Vec<String>,
}

/// `[columns]`: source file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsSection {
    pub timestamp: String,
    pub price: String,
    pub delimiter: String,
}

impl Default for ColumnsSection {
    fn default() -> Self {
        Self {
            timestamp: "receive_ts".into(),
            price: "price".into(),
            delimiter: ";".into(),
        }
    }
}

/// `[merge]`: parallelism and tie-break.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSection {
    /// Worker threads for cursor construction; 0 means available parallelism.
    pub workers: usize,
    pub tie_break: TieBreak,
}

/// `[median]`: change detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianSection {
    /// Absolute tolerance; 0.0 compares medians exactly.
    pub change_tolerance: f64,
}

/// `[output]`: result artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub file_name: String,
    pub write_summary: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_RESULT_FILE.into(),
            write_summary: true,
        }
    }
}

impl RunConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config for an input directory with every other key defaulted.
    pub fn for_input(input: impl Into<PathBuf>) -> Self {
        Self {
            main: MainSection {
                input: Some(input.into()),
                ..MainSection::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.input.is_none() {
            return Err(ConfigError::MissingInput);
        }
        delimiter_byte(&self.columns.delimiter)?;
        let tol = self.median.change_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ConfigError::InvalidTolerance(tol));
        }
        Ok(())
    }

    /// Input directory. Empty path if unset, which the scanner rejects.
    pub fn input_dir(&self) -> &Path {
        self.main.input.as_deref().unwrap_or(Path::new(""))
    }

    pub fn output_dir(&self) -> PathBuf {
        match &self.main.output {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("output"),
        }
    }

    pub fn result_path(&self) -> PathBuf {
        self.output_dir().join(&self.output.file_name)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir().join(SUMMARY_FILE)
    }

    /// Worker count with `0` resolved to the machine's parallelism.
    pub fn worker_count(&self) -> usize {
        match self.merge.workers {
            0 => default_worker_count(),
            n => n,
        }
    }

    /// Cursor layout derived from `[columns]`.
    pub fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            delimiter: delimiter_byte(&self.columns.delimiter).unwrap_or(b';'),
            timestamp_column: self.columns.timestamp.clone(),
            price_column: self.columns.price.clone(),
            ..CursorOptions::default()
        }
    }
}

fn delimiter_byte(s: &str) -> Result<u8, ConfigError> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(ConfigError::InvalidDelimiter(s.to_string())),
    }
}
