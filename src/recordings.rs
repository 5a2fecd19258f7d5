//! Album-context search over the TheSession recordings dataset.
//!
//! When a file name doesn't carry the tune name at all ("07 Track 7.mp3"),
//! knowing that the tune was recorded on "Altan - Harvest Storm" and finding
//! that artist and album in the path is still decent evidence.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Component, Path};
use tracing::{info, warn};

use crate::config::read_dataset_rows;
use crate::error::{Result, TuneError};
use crate::models::{AudioFileCandidate, MatchResult, RecordingRow};
use crate::normalize::normalize_tune_name;
use crate::scoring::{similarity, SimilarityAlgorithm};

/// Artist and album both in the path, track number in the file name
pub const ALBUM_TRACK_SCORE: f64 = 0.95;
/// Artist and album both in the path
pub const ALBUM_SCORE: f64 = 0.85;
/// Only one of artist or album in the path
pub const PARTIAL_ALBUM_SCORE: f64 = 0.75;
/// Similarity needed between a path component and an artist/album name
pub const PATH_COMPONENT_THRESHOLD: f64 = 0.8;

/// A tune listed on one track of one album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumAppearance {
    pub artist: String,
    pub album: String,
    pub track: Option<u32>,
    pub tune_as_listed: String,
}

/// recordings.csv indexed by normalized tune name.
#[derive(Debug, Clone, Default)]
pub struct RecordingsIndex {
    appearances: Vec<AlbumAppearance>,
    by_tune: FxHashMap<String, Vec<usize>>,
}

impl RecordingsIndex {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = RecordingRow>,
    {
        let mut index = Self::default();
        for row in rows {
            if row.artist.is_empty() || row.recording.is_empty() || row.tune.is_empty() {
                continue;
            }
            let key = normalize_tune_name(&row.tune);
            if key.is_empty() {
                continue;
            }
            let pos = index.appearances.len();
            index.appearances.push(AlbumAppearance {
                artist: row.artist,
                album: row.recording,
                track: row.track.and_then(|t| t.trim().parse().ok()),
                tune_as_listed: row.tune,
            });
            index.by_tune.entry(key).or_default().push(pos);
        }
        index
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let rows: Vec<RecordingRow> = read_dataset_rows(path)?;
        let index = Self::from_rows(rows);
        info!("Loaded {} recorded tracks from {}", index.len(), path.display());
        Ok(index)
    }

    /// Load recordings.csv, or an empty index (no album matches) if it can't be read.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load_csv(path) {
            Ok(index) => index,
            Err(TuneError::MissingDataset(path)) => {
                warn!("Recordings not found at {}; album search disabled", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load recordings: {}; album search disabled", e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.appearances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appearances.is_empty()
    }

    /// Albums listing any of `names` (compared normalized), in dataset order.
    pub fn find_albums_with_tune(&self, names: &[String]) -> Vec<AlbumAppearance> {
        let keys: FxHashSet<String> = names
            .iter()
            .map(|n| normalize_tune_name(n))
            .filter(|k| !k.is_empty())
            .collect();

        let mut positions: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.by_tune.get(key))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        positions
            .into_iter()
            .map(|pos| self.appearances[pos].clone())
            .collect()
    }
}

/// Does `name` appear in the lowercased path, or fuzzily as one of its components?
fn path_mentions(
    name: &str,
    path_lower: &str,
    components: &[String],
    algorithm: SimilarityAlgorithm,
) -> bool {
    let name_lower = name.to_lowercase();
    if !name_lower.trim().is_empty() && path_lower.contains(&name_lower) {
        return true;
    }
    components
        .iter()
        .any(|part| similarity(name, part, algorithm) >= PATH_COMPONENT_THRESHOLD)
}

fn path_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Files that look like they come from an album carrying the tune.
///
/// Album evidence has fixed scores and is not filtered by the name
/// threshold. A path matched by several albums keeps its best score.
/// Output is in candidate order.
pub fn search_by_album_context(
    appearances: &[AlbumAppearance],
    candidates: &[AudioFileCandidate],
    algorithm: SimilarityAlgorithm,
) -> Vec<MatchResult> {
    if appearances.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<MatchResult> = Vec::new();
    for candidate in candidates {
        let path_lower = candidate.path.to_string_lossy().to_lowercase();
        let components = path_components(&candidate.path);
        let file_name = candidate
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut best: Option<(f64, String)> = None;
        for appearance in appearances {
            let artist_match = path_mentions(&appearance.artist, &path_lower, &components, algorithm);
            let album_match = path_mentions(&appearance.album, &path_lower, &components, algorithm);

            let scored = match (artist_match, album_match) {
                (true, true) => {
                    let on_track = appearance
                        .track
                        .map(|t| file_name.contains(&format!("{:02}", t)))
                        .unwrap_or(false);
                    let score = if on_track { ALBUM_TRACK_SCORE } else { ALBUM_SCORE };
                    Some((score, format!("Album: {} - {}", appearance.artist, appearance.album)))
                }
                (true, false) | (false, true) => Some((
                    PARTIAL_ALBUM_SCORE,
                    format!("Possible album: {} - {}", appearance.artist, appearance.album),
                )),
                (false, false) => None,
            };

            if let Some((score, reason)) = scored {
                if best.as_ref().map_or(true, |(b, _)| score > *b) {
                    best = Some((score, reason));
                }
            }
        }

        if let Some((score, reason)) = best {
            results.push(MatchResult::new(candidate, score, Some(reason)));
        }
    }
    results
}
