//! Dataset locations, defaults and the shared CSV row reader.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TuneError};

/// Directory holding the TheSession CSV exports
pub const DEFAULT_DATA_DIR: &str = "TheSession-data/csv";

/// Environment override for the data directory
pub const DATA_DIR_ENV: &str = "TUNE_DATA_DIR";

pub const ALIASES_FILE: &str = "aliases.csv";
pub const TUNES_FILE: &str = "tunes.csv";
pub const RECORDINGS_FILE: &str = "recordings.csv";

/// Alias data is reloaded after this long
pub const DEFAULT_ALIAS_TTL: Duration = Duration::from_secs(60 * 60);

/// Directory listings are reused for this long
pub const DEFAULT_SCAN_TTL: Duration = Duration::from_secs(5 * 60);

/// Paths of the three dataset files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub aliases: PathBuf,
    pub tunes: PathBuf,
    pub recordings: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            aliases: dir.join(ALIASES_FILE),
            tunes: dir.join(TUNES_FILE),
            recordings: dir.join(RECORDINGS_FILE),
        }
    }

    /// Replace individual files, keeping the directory defaults for the rest
    pub fn with_overrides(
        mut self,
        aliases: Option<PathBuf>,
        tunes: Option<PathBuf>,
        recordings: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = aliases {
            self.aliases = path;
        }
        if let Some(path) = tunes {
            self.tunes = path;
        }
        if let Some(path) = recordings {
            self.recordings = path;
        }
        self
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.aliases, &self.tunes, &self.recordings]
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::in_dir(DEFAULT_DATA_DIR)
    }
}

/// Read every well-formed row of a CSV dataset.
///
/// A missing file is `MissingDataset`; rows that fail to deserialize are
/// skipped and counted in a debug log.
pub fn read_dataset_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(TuneError::MissingDataset(path.to_path_buf()));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TuneError::csv(path, e))?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                debug!("Skipping malformed row in {}: {}", path.display(), e);
            }
        }
    }

    if skipped > 0 {
        debug!("{}: {} rows loaded, {} skipped", path.display(), rows.len(), skipped);
    }
    Ok(rows)
}
