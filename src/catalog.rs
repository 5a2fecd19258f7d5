//! Tune catalog lookups and type-aware re-scoring.
//!
//! Several catalogued tunes can share a name ("The Boys of Ballisodare" is
//! both a reel and a slip jig). When a name is ambiguous, file paths that
//! carry a type cue ("reels", "9/8", "hornpipe") are moved up or down.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::read_dataset_rows;
use crate::error::{Result, TuneError};
use crate::models::{CatalogRow, TuneIdentity};
use crate::normalize::{rotate_leading_the, LEADING_THE, ROTATED_THE};

// ============================================================================
// Score Adjustments
// ============================================================================

/// Path carries a cue for the preferred type
pub const PREFERRED_TYPE_BOOST: f64 = 1.2;

/// Path carries a cue for another catalogued type only
pub const OTHER_TYPE_PENALTY: f64 = 0.8;

/// No preferred type, but the path names one of the candidate types
pub const ANY_TYPE_BOOST: f64 = 1.1;

// ============================================================================
// Catalog
// ============================================================================

/// In-memory tunes.csv, indexed by lowercased name in both article forms.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    identities: Vec<TuneIdentity>,
    by_name: FxHashMap<String, Vec<usize>>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = CatalogRow>,
    {
        let mut catalog = Self::default();
        for row in rows {
            let identity = row.into_identity();
            let pos = catalog.identities.len();
            let raw = identity.name.trim().to_lowercase();
            let rotated = rotate_leading_the(&raw);

            if rotated != raw {
                catalog.by_name.entry(rotated).or_default().push(pos);
            }
            catalog.by_name.entry(raw).or_default().push(pos);
            catalog.identities.push(identity);
        }
        catalog
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let rows: Vec<CatalogRow> = read_dataset_rows(path)?;
        let catalog = Self::from_rows(rows);
        info!("Loaded {} catalogued tunes from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load tunes.csv, or an empty catalog (disambiguation off) if it can't be read.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load_csv(path) {
            Ok(catalog) => catalog,
            Err(TuneError::MissingDataset(path)) => {
                warn!(
                    "Tune catalog not found at {}; type disambiguation disabled",
                    path.display()
                );
                Self::empty()
            }
            Err(e) => {
                warn!("Failed to load tune catalog: {}; type disambiguation disabled", e);
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// All catalogued tunes with this name, one per tune_id, in catalog order.
    ///
    /// "The Kesh" finds a row stored as "Kesh, The" and the reverse. A bare
    /// name is also tried with ", the" appended.
    pub fn get_identities(&self, tune_name: &str) -> Vec<TuneIdentity> {
        let query = tune_name.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut keys = vec![query.clone()];
        if query.starts_with(LEADING_THE) {
            keys.push(rotate_leading_the(&query));
        } else if !query.ends_with(ROTATED_THE) {
            keys.push(format!("{}{}", query, ROTATED_THE));
        }

        let mut positions: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.by_name.get(key))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        let mut identities: Vec<TuneIdentity> = Vec::new();
        for pos in positions {
            let identity = &self.identities[pos];
            if !identities.iter().any(|i| i.tune_id == identity.tune_id) {
                identities.push(identity.clone());
            }
        }
        identities
    }

    /// Case-insensitive substring search over names, one entry per tune_id.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<TuneIdentity> {
        let query = query.trim().to_lowercase();
        let mut results: Vec<TuneIdentity> = Vec::new();
        if query.is_empty() {
            return results;
        }
        for identity in &self.identities {
            if results.len() >= max_results {
                break;
            }
            if identity.name.to_lowercase().contains(&query)
                && !results.iter().any(|r| r.tune_id == identity.tune_id)
            {
                results.push(identity.clone());
            }
        }
        results
    }
}

// ============================================================================
// Type Keywords
// ============================================================================

/// Tune type → path cues that suggest it. Lowercase throughout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TypeKeywords {
    table: FxHashMap<String, Vec<String>>,
}

impl Default for TypeKeywords {
    fn default() -> Self {
        let defaults: [(&str, &[&str]); 10] = [
            ("reel", &["reel", "reels", "120bpm", "116bpm", "fast"]),
            ("jig", &["jig", "jigs", "6/8"]),
            ("slip jig", &["slip", "slip jig", "slip-jig", "9/8", "hop jig"]),
            ("slide", &["slide", "slides", "12/8"]),
            ("hornpipe", &["hornpipe", "hornpipes"]),
            ("polka", &["polka", "polkas"]),
            ("waltz", &["waltz", "waltzes", "3/4"]),
            ("mazurka", &["mazurka", "mazurkas"]),
            ("barndance", &["barndance", "barn dance"]),
            ("strathspey", &["strathspey", "strathspeys"]),
        ];
        let table = defaults
            .iter()
            .map(|(tune_type, cues)| {
                (
                    tune_type.to_string(),
                    cues.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect();
        Self { table }
    }
}

impl TypeKeywords {
    /// Read a `{ "type": ["cue", ...] }` JSON object.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let parsed: TypeKeywords = serde_json::from_str(&text)?;
        Ok(parsed.lowercased())
    }

    fn lowercased(self) -> Self {
        let table = self
            .table
            .into_iter()
            .map(|(tune_type, cues)| {
                (
                    tune_type.trim().to_lowercase(),
                    cues.into_iter().map(|c| c.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { table }
    }

    /// Entries in `other` replace entries for the same type.
    pub fn merge(mut self, other: TypeKeywords) -> Self {
        self.table.extend(other.table);
        self
    }

    pub fn cues_for(&self, tune_type: &str) -> Option<&[String]> {
        self.table.get(tune_type).map(Vec::as_slice)
    }

    /// Does `path_lower` contain any cue for `tune_type`?
    fn path_has_cue(&self, path_lower: &str, tune_type: &str) -> bool {
        self.cues_for(tune_type)
            .map(|cues| cues.iter().any(|cue| path_lower.contains(cue.as_str())))
            .unwrap_or(false)
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

// ============================================================================
// Type-Aware Scoring
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeVerdict {
    Unchanged,
    /// Score went up
    Match,
    /// Score went down
    Mismatch,
}

impl TypeVerdict {
    pub fn reason_tag(self) -> Option<&'static str> {
        match self {
            TypeVerdict::Unchanged => None,
            TypeVerdict::Match => Some("[type match]"),
            TypeVerdict::Mismatch => Some("[type mismatch]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeAdjustment {
    pub score: f64,
    pub verdict: TypeVerdict,
}

/// Re-score one file given the identities sharing the query's name.
///
/// Returns `base_score` untouched unless there are at least two identities.
pub fn score_adjustment(
    file_path: &Path,
    base_score: f64,
    identities: &[TuneIdentity],
    preferred_type: Option<&str>,
    keywords: &TypeKeywords,
) -> f64 {
    if identities.len() <= 1 {
        return base_score;
    }

    let path_lower = file_path.to_string_lossy().to_lowercase();

    match preferred_type.map(|t| t.trim().to_lowercase()) {
        Some(preferred) => {
            if keywords.path_has_cue(&path_lower, &preferred) {
                return (base_score * PREFERRED_TYPE_BOOST).min(1.0);
            }
            let other_type_cued = identities
                .iter()
                .filter(|identity| identity.tune_type != preferred)
                .any(|identity| keywords.path_has_cue(&path_lower, &identity.tune_type));
            if other_type_cued {
                base_score * OTHER_TYPE_PENALTY
            } else {
                base_score
            }
        }
        None => {
            let any_type_cued = identities
                .iter()
                .any(|identity| keywords.path_has_cue(&path_lower, &identity.tune_type));
            if any_type_cued {
                (base_score * ANY_TYPE_BOOST).min(1.0)
            } else {
                base_score
            }
        }
    }
}

/// `score_adjustment` plus which way the score moved.
pub fn adjust_for_type(
    file_path: &Path,
    base_score: f64,
    identities: &[TuneIdentity],
    preferred_type: Option<&str>,
    keywords: &TypeKeywords,
) -> TypeAdjustment {
    let score = score_adjustment(file_path, base_score, identities, preferred_type, keywords);
    let verdict = if score > base_score {
        TypeVerdict::Match
    } else if score < base_score {
        TypeVerdict::Mismatch
    } else {
        TypeVerdict::Unchanged
    };
    TypeAdjustment { score, verdict }
}

// ============================================================================
// TESTS
// ============================================================================
