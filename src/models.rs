//! Core data models for tune matching.
//!
//! Dataset rows as read from the TheSession CSV exports, the typed records
//! the matching core passes around, and batch statistics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TuneError};
use crate::normalize::{derive_name, normalize_tune_name};
use crate::scoring::CompositeTitle;

// ============================================================================
// Dataset Rows
// ============================================================================

/// One row of aliases.csv: an alternate name for a catalogued tune.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AliasRow {
    pub tune_id: String,
    pub alias: String,
    pub name: String,
}

/// One row of tunes.csv. TheSession names the key column "mode".
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRow {
    pub tune_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub tune_type: String,
    #[serde(default)]
    pub meter: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl CatalogRow {
    pub fn into_identity(self) -> TuneIdentity {
        TuneIdentity {
            tune_id: self.tune_id,
            name: self.name,
            tune_type: self.tune_type.trim().to_lowercase(),
            meter: non_empty(self.meter),
            key: non_empty(self.key.or(self.mode)),
        }
    }
}

/// One row of recordings.csv: a tune appearing on a track of an album.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingRow {
    #[serde(default)]
    pub tune_id: Option<String>,
    pub artist: String,
    pub recording: String,
    #[serde(default)]
    pub track: Option<String>,
    pub tune: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Tune Records
// ============================================================================

/// A distinct catalogued tune. Several can share one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TuneIdentity {
    pub tune_id: String,
    pub name: String,
    /// Lowercased type ("reel", "slip jig", ...)
    #[serde(rename = "type")]
    pub tune_type: String,
    pub meter: Option<String>,
    pub key: Option<String>,
}

impl fmt::Display for TuneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tune_type)?;
        if let Some(meter) = &self.meter {
            write!(f, " in {}", meter)?;
        }
        if let Some(key) = &self.key {
            write!(f, " ({})", key)?;
        }
        Ok(())
    }
}

/// An audio file on disk with its precomputed names.
#[derive(Debug, Clone)]
pub struct AudioFileCandidate {
    /// Absolute path
    pub path: PathBuf,
    pub derived_name: String,
    pub normalized_name: String,
    pub composite: CompositeTitle,
}

impl AudioFileCandidate {
    pub fn new(path: PathBuf) -> Self {
        let derived_name = derive_name(&path);
        let normalized_name = normalize_tune_name(&derived_name);
        let composite = CompositeTitle::new(&derived_name);
        Self {
            path,
            derived_name,
            normalized_name,
            composite,
        }
    }
}

/// A candidate that cleared the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub path: PathBuf,
    pub derived_name: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MatchResult {
    pub fn new(candidate: &AudioFileCandidate, score: f64, reason: Option<String>) -> Self {
        Self {
            path: candidate.path.clone(),
            derived_name: candidate.derived_name.clone(),
            score,
            reason,
        }
    }

    /// Append a tag to the reason string.
    pub fn add_reason(&mut self, tag: &str) {
        self.reason = Some(match self.reason.take() {
            Some(existing) => format!("{} {}", existing, tag),
            None => tag.to_string(),
        });
    }
}

/// Tunes played together, in order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TuneSet {
    tunes: Vec<String>,
}

impl TuneSet {
    pub fn new(tunes: Vec<String>) -> Result<Self> {
        if tunes.is_empty() {
            return Err(TuneError::InvalidInput("a set needs at least one tune".into()));
        }
        Ok(Self { tunes })
    }

    pub fn tunes(&self) -> &[String] {
        &self.tunes
    }

    pub fn len(&self) -> usize {
        self.tunes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunes.is_empty()
    }
}

// ============================================================================
// Batch Statistics
// ============================================================================

/// Summary of one batch resolution run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub tunes_requested: usize,
    pub tunes_matched: usize,
    pub tunes_unmatched: usize,
    pub files_scanned: usize,
    pub matched_files: usize,
    pub workers: usize,
    pub elapsed_secs: f64,
    pub match_rate: f64,
}

impl BatchStats {
    /// Record one tune's outcome
    pub fn record_tune(&mut self, matched_files: usize) {
        self.tunes_requested += 1;
        if matched_files > 0 {
            self.tunes_matched += 1;
            self.matched_files += matched_files;
        } else {
            self.tunes_unmatched += 1;
        }
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
        self.match_rate = if self.tunes_requested == 0 {
            0.0
        } else {
            self.tunes_matched as f64 / self.tunes_requested as f64
        };
    }

    /// Log stats as pretty JSON to stderr
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// One-line summary through tracing
    pub fn log_summary(&self) {
        info!(
            requested = self.tunes_requested,
            matched = self.tunes_matched,
            unmatched = self.tunes_unmatched,
            files = self.matched_files,
            "Match rate {:.1}% in {:.1}s",
            self.match_rate * 100.0,
            self.elapsed_secs
        );
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
