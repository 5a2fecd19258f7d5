//! Alias resolution against the TheSession alias dataset.
//!
//! Rows are grouped by tune_id, then inverted so every normalized name maps
//! to the union of all groups it belongs to. Grouping before inverting makes
//! membership symmetric: if B is an alias of A, A is an alias of B.
//!
//! `AliasCache` holds one loaded index for a TTL (one hour by default) and
//! reloads it on the first access after expiry. A load failure stores an
//! empty index, so lookups fall back to the queried name itself.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{read_dataset_rows, DEFAULT_ALIAS_TTL};
use crate::error::{Result, TuneError};
use crate::models::AliasRow;
use crate::normalize::{common_variations, dedup_case_insensitive, normalize_tune_name};

// ============================================================================
// Alias Index
// ============================================================================

/// Normalized name → every name sharing a tune_id with it.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    by_key: FxHashMap<String, Vec<String>>,
    tunes: usize,
}

impl AliasIndex {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = AliasRow>,
    {
        // Group by tune_id, keeping first-seen order of ids and names
        let mut group_of: FxHashMap<String, usize> = FxHashMap::default();
        let mut groups: Vec<Vec<String>> = Vec::new();

        for row in rows {
            let idx = *group_of.entry(row.tune_id).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            let group = &mut groups[idx];
            for name in [row.alias, row.name] {
                if !name.is_empty() && !group.contains(&name) {
                    group.push(name);
                }
            }
        }

        let mut by_key: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for group in &groups {
            for name in group {
                let key = normalize_tune_name(name);
                if key.is_empty() {
                    continue;
                }
                let entry = by_key.entry(key).or_default();
                for member in group {
                    if !entry.contains(member) {
                        entry.push(member.clone());
                    }
                }
            }
        }

        Self {
            by_key,
            tunes: groups.len(),
        }
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let rows: Vec<AliasRow> = read_dataset_rows(path)?;
        Ok(Self::from_rows(rows))
    }

    /// Group for a name, matched on its normalized form.
    pub fn lookup(&self, name: &str) -> Option<&[String]> {
        let key = normalize_tune_name(name);
        if key.is_empty() {
            return None;
        }
        self.by_key.get(&key).map(Vec::as_slice)
    }

    /// Number of distinct lookup keys
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of distinct tune_ids seen
    pub fn tune_count(&self) -> usize {
        self.tunes
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Where the cache gets a fresh index from.
pub trait AliasSource: Send + Sync {
    fn load(&self) -> Result<AliasIndex>;
}

/// aliases.csv on disk
#[derive(Debug, Clone)]
pub struct CsvAliasSource {
    pub path: PathBuf,
}

impl CsvAliasSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AliasSource for CsvAliasSource {
    fn load(&self) -> Result<AliasIndex> {
        AliasIndex::load_csv(&self.path)
    }
}

/// A fixed, already-built index.
impl AliasSource for AliasIndex {
    fn load(&self) -> Result<AliasIndex> {
        Ok(self.clone())
    }
}

// ============================================================================
// Cache
// ============================================================================

struct Loaded {
    index: Arc<AliasIndex>,
    loaded_at: Instant,
}

/// Time-boxed alias index shared by every search in the process.
pub struct AliasCache {
    source: Box<dyn AliasSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: RwLock<Option<Loaded>>,
    /// Held while loading so concurrent misses load once
    load_guard: Mutex<()>,
    loads: AtomicUsize,
}

impl AliasCache {
    pub fn new(source: Box<dyn AliasSource>, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Box<dyn AliasSource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            ttl,
            state: RwLock::new(None),
            load_guard: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Cache over aliases.csv with the default TTL
    pub fn from_csv(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(CsvAliasSource::new(path)), DEFAULT_ALIAS_TTL)
    }

    /// Cache over a fixed index; never goes stale in practice
    pub fn from_index(index: AliasIndex) -> Self {
        Self::new(Box::new(index), Duration::MAX)
    }

    /// How many times the source has been loaded
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn is_stale(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match state.as_ref() {
            None => true,
            Some(loaded) => self.clock.now().saturating_duration_since(loaded.loaded_at) > self.ttl,
        }
    }

    /// Reload if never loaded or older than the TTL. Returns whether a load ran.
    pub fn refresh_if_stale(&self) -> bool {
        if !self.is_stale() {
            return false;
        }
        let _guard = self.load_guard.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have finished loading while we waited
        if !self.is_stale() {
            return false;
        }
        self.reload();
        true
    }

    fn reload(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let index = match self.source.load() {
            Ok(index) => {
                info!(
                    "Loaded {} alias keys for {} tunes",
                    index.len(),
                    index.tune_count()
                );
                index
            }
            Err(TuneError::MissingDataset(path)) => {
                warn!(
                    "Alias dataset not found at {}; searching by name only",
                    path.display()
                );
                AliasIndex::default()
            }
            Err(e) => {
                warn!("Failed to load alias dataset: {}; searching by name only", e);
                AliasIndex::default()
            }
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = Some(Loaded {
            index: Arc::new(index),
            loaded_at: self.clock.now(),
        });
    }

    /// Current index, loading it first when missing or stale.
    pub fn index(&self) -> Arc<AliasIndex> {
        if self.refresh_if_stale() {
            debug!("Alias cache refreshed");
        }
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.index))
            .unwrap_or_default()
    }

    /// Every catalogued name for the tune, always including `tune_name` itself.
    pub fn get_aliases(&self, tune_name: &str) -> Vec<String> {
        let index = self.index();
        match index.lookup(tune_name) {
            Some(group) => {
                let mut aliases = group.to_vec();
                if !aliases.iter().any(|a| a == tune_name) {
                    aliases.push(tune_name.to_string());
                }
                aliases
            }
            None => vec![tune_name.to_string()],
        }
    }

    /// Aliases plus the mechanical spelling variants of each, deduplicated
    /// case-insensitively in first-seen order.
    pub fn get_all_variations(&self, tune_name: &str) -> Vec<String> {
        let aliases = self.get_aliases(tune_name);
        dedup_case_insensitive(aliases.iter().flat_map(|alias| common_variations(alias)))
    }
}

impl std::fmt::Debug for AliasCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasCache")
            .field("ttl", &self.ttl)
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
