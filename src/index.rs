//! Audio file discovery.
//!
//! Walks the caller's directory roots, keeps files with an audio extension
//! (case-insensitive) and turns each into an `AudioFileCandidate` with its
//! derived and normalized names precomputed. A missing root is a warning and
//! contributes nothing; the other roots are still scanned.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_SCAN_TTL;
use crate::models::AudioFileCandidate;

pub const DEFAULT_AUDIO_EXTENSIONS: [&str; 9] =
    ["mp3", "mp4", "m4a", "flac", "wav", "ogg", "opus", "aac", "wma"];

// ============================================================================
// Extensions
// ============================================================================

/// Lowercased extension allowlist, stored without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtensions {
    exts: FxHashSet<String>,
}

impl AudioExtensions {
    /// Parse "mp3,flac,.OGG"
    pub fn from_list(list: &str) -> Self {
        let exts = list
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { exts }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.exts.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.exts.is_empty()
    }
}

impl Default for AudioExtensions {
    fn default() -> Self {
        Self {
            exts: DEFAULT_AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Absolute paths of the audio files under one root, in file-name order.
pub fn scan_directory(dir: &Path, recursive: bool, extensions: &AudioExtensions) -> Vec<PathBuf> {
    let root = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    if !root.is_dir() {
        warn!("Directory '{}' does not exist", dir.display());
        return Vec::new();
    }

    let mut walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if is_file && extensions.contains(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files
}

/// Deduplicate by absolute path (first occurrence wins) and precompute names.
pub fn build_candidates<I>(paths: I) -> Vec<AudioFileCandidate>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
    let unique: Vec<PathBuf> = paths
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect();

    unique.into_par_iter().map(AudioFileCandidate::new).collect()
}

/// Candidates from every root. The same file reached through overlapping
/// roots appears once.
pub fn scan(
    directories: &[PathBuf],
    recursive: bool,
    extensions: &AudioExtensions,
) -> Vec<AudioFileCandidate> {
    let paths = directories
        .iter()
        .flat_map(|dir| scan_directory(dir, recursive, extensions));
    build_candidates(paths)
}

// ============================================================================
// Scan Cache
// ============================================================================

type ScanKey = (PathBuf, bool);

/// Directory listings reused across searches within the TTL.
pub struct ScanCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    extensions: AudioExtensions,
    entries: Mutex<FxHashMap<ScanKey, (Instant, Arc<Vec<PathBuf>>)>>,
    walks: AtomicUsize,
}

impl ScanCache {
    pub fn new(extensions: AudioExtensions) -> Self {
        Self::with_clock(extensions, DEFAULT_SCAN_TTL, Arc::new(SystemClock))
    }

    pub fn with_clock(extensions: AudioExtensions, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ttl,
            extensions,
            entries: Mutex::new(FxHashMap::default()),
            walks: AtomicUsize::new(0),
        }
    }

    /// Number of directory walks actually performed
    pub fn walk_count(&self) -> usize {
        self.walks.load(Ordering::Relaxed)
    }

    /// Files under one root, walking it only if no fresh listing exists.
    pub fn files(&self, dir: &Path, recursive: bool) -> Arc<Vec<PathBuf>> {
        let key = (
            std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()),
            recursive,
        );
        let now = self.clock.now();

        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((scanned_at, files)) = entries.get(&key) {
                if now.saturating_duration_since(*scanned_at) < self.ttl {
                    return Arc::clone(files);
                }
            }
        }

        self.walks.fetch_add(1, Ordering::Relaxed);
        let files = Arc::new(scan_directory(dir, recursive, &self.extensions));
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, (now, Arc::clone(&files)));
        files
    }

    /// Same as `index::scan`, going through the cache for each root.
    pub fn scan(&self, directories: &[PathBuf], recursive: bool) -> Vec<AudioFileCandidate> {
        let listings: Vec<Arc<Vec<PathBuf>>> = directories
            .iter()
            .map(|dir| self.files(dir, recursive))
            .collect();
        build_candidates(listings.iter().flat_map(|files| files.iter().cloned()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
