//! Error types for the matching core.
//!
//! Data-quality problems (missing datasets, malformed rows, missing
//! directories) are recovered where they occur and only logged. What reaches
//! callers through this type is either invalid caller input or an I/O failure
//! in a loader that the caller asked to run strictly.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for tune matching operations
pub type Result<T> = std::result::Result<T, TuneError>;

#[derive(Error, Debug)]
pub enum TuneError {
    /// Match threshold outside [0, 1] (or NaN)
    #[error("Invalid threshold {0}: must be between 0 and 1")]
    InvalidThreshold(f64),

    /// Any other invalid caller-supplied parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Alias, catalog or recordings file not present
    #[error("Dataset not found: {}", .0.display())]
    MissingDataset(PathBuf),

    /// Dataset exists but could not be read as CSV
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TuneError {
    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        TuneError::Csv {
            path: path.into(),
            source,
        }
    }
}
