//! Batch resolution of tune sets against a directory library.
//!
//! The directories are scanned once per batch (through `ScanCache`) and the
//! candidate list is shared read-only by every per-tune search. In parallel
//! mode a fixed pool of scoped worker threads pulls tunes from a job channel
//! and sends results back; the aggregating thread files each result under
//! its input position, so parallel and sequential runs return the same
//! mapping in the same order.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use crate::engine::{MatchEngine, SearchOptions, DEFAULT_THRESHOLD};
use crate::error::{Result, TuneError};
use crate::index::ScanCache;
use crate::models::{AudioFileCandidate, BatchStats, MatchResult, TuneSet};
use crate::scoring::SimilarityAlgorithm;

/// Files returned per tune unless overridden
pub const DEFAULT_OVERLOAD: usize = 1;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// `workers: None` means min(available parallelism, tunes)
    Parallel { workers: Option<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub threshold: f64,
    pub use_aliases: bool,
    /// Per-tune cap on matched files
    pub overload: usize,
    pub recursive: bool,
    pub algorithm: SimilarityAlgorithm,
    pub mode: ExecutionMode,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            use_aliases: true,
            overload: DEFAULT_OVERLOAD,
            recursive: true,
            algorithm: SimilarityAlgorithm::default(),
            mode: ExecutionMode::default(),
        }
    }
}

impl BatchOptions {
    /// Options for each per-tune search. Batch runs rank on name evidence
    /// only: no type re-scoring, so a composite hit stays below a close
    /// direct match.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            threshold: self.threshold,
            max_results: Some(self.overload),
            use_aliases: self.use_aliases,
            algorithm: self.algorithm,
            preferred_type: None,
            disambiguate: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.overload == 0 {
            return Err(TuneError::InvalidInput("overload must be at least 1".into()));
        }
        if self.mode == (ExecutionMode::Parallel { workers: Some(0) }) {
            return Err(TuneError::InvalidInput("workers must be at least 1".into()));
        }
        self.search_options().validate()
    }

    fn worker_count(&self, tunes: usize) -> usize {
        match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { workers } => workers
                .unwrap_or_else(|| {
                    std::thread::available_parallelism()
                        .map(|n| n.get())
                        .unwrap_or(4)
                })
                .min(tunes)
                .max(1),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TuneMatches {
    pub tune: String,
    pub matches: Vec<MatchResult>,
}

impl TuneMatches {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.matches.iter().map(|m| m.path.clone()).collect()
    }
}

/// Tune name → matched files, in input order. Serializes as a JSON object of
/// name → paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetResolution {
    pub tunes: Vec<TuneMatches>,
}

impl SetResolution {
    pub fn get(&self, tune: &str) -> Option<&[MatchResult]> {
        self.tunes
            .iter()
            .find(|t| t.tune == tune)
            .map(|t| t.matches.as_slice())
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.tunes
            .iter()
            .filter(|t| t.matches.is_empty())
            .map(|t| t.tune.as_str())
    }
}

impl Serialize for SetResolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tunes.len()))?;
        for t in &self.tunes {
            map.serialize_entry(&t.tune, &t.paths())?;
        }
        map.end()
    }
}

/// Every set of a batch plus run statistics
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub sets: Vec<SetResolution>,
    pub stats: BatchStats,
}

/// Notified once per resolved tune on the aggregating thread: input order in
/// sequential mode, completion order in parallel mode.
pub trait ResolveObserver {
    fn tune_resolved(&self, _tune: &str, _matches: &[MatchResult]) {}
}

impl ResolveObserver for () {}

// ============================================================================
// Resolver
// ============================================================================

pub struct BatchResolver<'a> {
    engine: MatchEngine<'a>,
    scans: &'a ScanCache,
}

impl<'a> BatchResolver<'a> {
    pub fn new(engine: MatchEngine<'a>, scans: &'a ScanCache) -> Self {
        Self { engine, scans }
    }

    /// Resolve one set of tunes against `directories`.
    pub fn resolve_set(
        &self,
        tunes: &[String],
        directories: &[PathBuf],
        opts: &BatchOptions,
        observer: &dyn ResolveObserver,
    ) -> Result<SetResolution> {
        opts.validate()?;
        let candidates = self.scans.scan(directories, opts.recursive);
        self.resolve_candidates(tunes, &candidates, opts, observer)
    }

    /// Resolve several sets, collecting statistics across all of them.
    pub fn resolve_sets(
        &self,
        sets: &[TuneSet],
        directories: &[PathBuf],
        opts: &BatchOptions,
        observer: &dyn ResolveObserver,
    ) -> Result<BatchReport> {
        opts.validate()?;
        let start = Instant::now();
        let mut report = BatchReport::default();

        for set in sets {
            let candidates = self.scans.scan(directories, opts.recursive);
            report.stats.files_scanned = report.stats.files_scanned.max(candidates.len());
            report.stats.workers = report
                .stats
                .workers
                .max(opts.worker_count(set.len()));

            let resolution = self.resolve_candidates(set.tunes(), &candidates, opts, observer)?;
            for tune in &resolution.tunes {
                report.stats.record_tune(tune.matches.len());
            }
            report.sets.push(resolution);
        }

        report.stats.finish(start.elapsed());
        info!(
            "Resolved {} sets ({} tunes) in {:.1}s",
            report.sets.len(),
            report.stats.tunes_requested,
            report.stats.elapsed_secs
        );
        Ok(report)
    }

    /// Resolve tunes against an already-scanned candidate list.
    pub fn resolve_candidates(
        &self,
        tunes: &[String],
        candidates: &[AudioFileCandidate],
        opts: &BatchOptions,
        observer: &dyn ResolveObserver,
    ) -> Result<SetResolution> {
        opts.validate()?;

        let mut unique: Vec<&str> = Vec::with_capacity(tunes.len());
        for tune in tunes {
            if !unique.contains(&tune.as_str()) {
                unique.push(tune);
            }
        }

        let search_opts = opts.search_options();
        let results = match opts.mode {
            ExecutionMode::Sequential => {
                self.resolve_sequential(&unique, candidates, &search_opts, observer)?
            }
            ExecutionMode::Parallel { .. } => {
                let workers = opts.worker_count(unique.len());
                self.resolve_parallel(&unique, candidates, &search_opts, workers, observer)?
            }
        };

        Ok(SetResolution {
            tunes: unique
                .into_iter()
                .zip(results)
                .map(|(tune, matches)| TuneMatches {
                    tune: tune.to_string(),
                    matches,
                })
                .collect(),
        })
    }

    fn resolve_sequential(
        &self,
        tunes: &[&str],
        candidates: &[AudioFileCandidate],
        opts: &SearchOptions,
        observer: &dyn ResolveObserver,
    ) -> Result<Vec<Vec<MatchResult>>> {
        let mut results = Vec::with_capacity(tunes.len());
        for tune in tunes {
            let matches = self.engine.search(tune, candidates, opts)?;
            observer.tune_resolved(tune, &matches);
            results.push(matches);
        }
        Ok(results)
    }

    fn resolve_parallel(
        &self,
        tunes: &[&str],
        candidates: &[AudioFileCandidate],
        opts: &SearchOptions,
        workers: usize,
        observer: &dyn ResolveObserver,
    ) -> Result<Vec<Vec<MatchResult>>> {
        debug!("Resolving {} tunes with {} workers", tunes.len(), workers);

        let (job_tx, job_rx) = unbounded::<(usize, &str)>();
        let (out_tx, out_rx) = unbounded::<(usize, Result<Vec<MatchResult>>)>();
        for (idx, tune) in tunes.iter().enumerate() {
            if job_tx.send((idx, *tune)).is_err() {
                break;
            }
        }
        drop(job_tx);

        let engine = self.engine;
        std::thread::scope(|s| {
            for worker_id in 0..workers {
                let rx = job_rx.clone();
                let tx = out_tx.clone();
                s.spawn(move || worker_loop(worker_id, rx, tx, engine, candidates, opts));
            }
            drop(out_tx);

            let mut slots: Vec<Option<Vec<MatchResult>>> = vec![None; tunes.len()];
            for (idx, result) in out_rx.iter() {
                let matches = result?;
                observer.tune_resolved(tunes[idx], &matches);
                slots[idx] = Some(matches);
            }
            Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
        })
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<(usize, &str)>,
    tx: Sender<(usize, Result<Vec<MatchResult>>)>,
    engine: MatchEngine<'_>,
    candidates: &[AudioFileCandidate],
    opts: &SearchOptions,
) {
    while let Ok((idx, tune)) = rx.recv() {
        let t0 = Instant::now();
        let result = engine.search(tune, candidates, opts);
        debug!(worker_id, "'{}' searched in {:?}", tune, t0.elapsed());
        if tx.send((idx, result)).is_err() {
            break;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::{AliasCache, AliasIndex};
    use crate::catalog::{Catalog, TypeKeywords};
    use crate::index::AudioExtensions;
    use crate::engine::COMPOSITE_REASON;
    use crate::models::{AliasRow, CatalogRow};
    use crate::scoring::COMPOSITE_MATCH_SCORE;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    const FILES: &[&str] = &[
        "01 - The Kesh.mp3",
        "02 - Castle Jig.mp3",
        "03 - Drowsy Maggie.mp3",
        "04 - Drowsy Maggie (live).mp3",
        "05 - Harvest Home.flac",
        "06 - Silver Spear.mp3",
        "07 - Carraroe Jig _ Kesh Jig _ Leaf Reel.m4a",
        "08 - Out on the Ocean.ogg",
    ];

    fn library() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in FILES {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    fn tunes() -> Vec<String> {
        [
            "The Kesh",
            "Drowsy Maggie",
            "Harvest Home",
            "Silver Spear",
            "Leaf Reel",
            "Out on the Ocean",
            "Morrison's Jig",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    struct Data {
        aliases: AliasCache,
        catalog: Catalog,
        keywords: TypeKeywords,
        scans: ScanCache,
    }

    fn data() -> Data {
        Data {
            aliases: AliasCache::from_index(AliasIndex::from_rows(vec![AliasRow {
                tune_id: "55".into(),
                alias: "Castle Jig".into(),
                name: "The Kesh".into(),
            }])),
            catalog: Catalog::empty(),
            keywords: TypeKeywords::default(),
            scans: ScanCache::new(AudioExtensions::default()),
        }
    }

    fn resolver(data: &Data) -> BatchResolver<'_> {
        BatchResolver::new(
            MatchEngine::new(&data.aliases, &data.catalog, &data.keywords),
            &data.scans,
        )
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<String>>,
    }

    impl ResolveObserver for Recorder {
        fn tune_resolved(&self, tune: &str, _matches: &[MatchResult]) {
            self.seen.borrow_mut().push(tune.to_string());
        }
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let dir = library();
        let data = data();
        let resolver = resolver(&data);
        let dirs = vec![dir.path().to_path_buf()];

        for overload in [1, 3] {
            let sequential = BatchOptions {
                overload,
                ..BatchOptions::default()
            };
            let expected = resolver.resolve_set(&tunes(), &dirs, &sequential, &()).unwrap();

            for workers in [None, Some(1), Some(3), Some(16)] {
                let parallel = BatchOptions {
                    mode: ExecutionMode::Parallel { workers },
                    ..sequential.clone()
                };
                let actual = resolver.resolve_set(&tunes(), &dirs, &parallel, &()).unwrap();
                assert_eq!(actual, expected, "workers {:?}, overload {}", workers, overload);
            }
        }
        assert_eq!(data.scans.walk_count(), 1);
    }

    #[test]
    fn test_resolution_content() {
        let dir = library();
        let data = data();
        let dirs = vec![dir.path().to_path_buf()];
        let opts = BatchOptions {
            overload: 3,
            ..BatchOptions::default()
        };
        let resolution = resolver(&data).resolve_set(&tunes(), &dirs, &opts, &()).unwrap();

        let names: Vec<&str> = resolution.tunes.iter().map(|t| t.tune.as_str()).collect();
        assert_eq!(names, tunes().iter().map(String::as_str).collect::<Vec<_>>());

        // Alias finds "Castle Jig"
        let kesh = resolution.get("The Kesh").unwrap();
        assert!(kesh.iter().any(|m| m.path.ends_with("02 - Castle Jig.mp3")));

        // Composite track
        let leaf = resolution.get("Leaf Reel").unwrap();
        assert_eq!(leaf.len(), 1);
        assert!(leaf[0].path.ends_with("07 - Carraroe Jig _ Kesh Jig _ Leaf Reel.m4a"));

        assert!(resolution.get("Morrison's Jig").unwrap().is_empty());
        assert_eq!(resolution.unmatched().collect::<Vec<_>>(), vec!["Morrison's Jig"]);
    }

    #[test]
    fn test_overload_caps_each_tune() {
        let dir = library();
        let data = data();
        let dirs = vec![dir.path().to_path_buf()];
        let resolution = resolver(&data)
            .resolve_set(&tunes(), &dirs, &BatchOptions::default(), &())
            .unwrap();
        assert!(resolution.tunes.iter().all(|t| t.matches.len() <= 1));
        assert_eq!(resolution.get("Drowsy Maggie").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_tunes_resolved_once() {
        let dir = library();
        let data = data();
        let dirs = vec![dir.path().to_path_buf()];
        let recorder = Recorder::default();
        let tunes = vec!["Silver Spear".to_string(), "Silver Spear".to_string()];
        let resolution = resolver(&data)
            .resolve_set(&tunes, &dirs, &BatchOptions::default(), &recorder)
            .unwrap();
        assert_eq!(resolution.tunes.len(), 1);
        assert_eq!(recorder.seen.borrow().len(), 1);
    }

    #[test]
    fn test_observer_sees_every_tune_in_parallel() {
        let dir = library();
        let data = data();
        let dirs = vec![dir.path().to_path_buf()];
        let recorder = Recorder::default();
        let opts = BatchOptions {
            mode: ExecutionMode::Parallel { workers: Some(4) },
            ..BatchOptions::default()
        };
        resolver(&data).resolve_set(&tunes(), &dirs, &opts, &recorder).unwrap();

        let mut seen = recorder.seen.borrow().clone();
        seen.sort();
        let mut expected = tunes();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_ambiguous_name_ranked_without_type_cues() {
        let data = Data {
            catalog: Catalog::from_rows(vec![
                CatalogRow {
                    tune_id: "10".into(),
                    name: "The Maid".into(),
                    tune_type: "reel".into(),
                    meter: None,
                    key: None,
                    mode: None,
                },
                CatalogRow {
                    tune_id: "11".into(),
                    name: "The Maid".into(),
                    tune_type: "jig".into(),
                    meter: None,
                    key: None,
                    mode: None,
                },
            ]),
            ..data()
        };
        let candidates: Vec<AudioFileCandidate> = [
            "/music/Reels/Sligo Maid _ The Maid _ Tarbolton.mp3",
            "/music/The Maids.mp3",
        ]
        .iter()
        .map(|p| AudioFileCandidate::new(PathBuf::from(p)))
        .collect();
        let tunes = vec!["The Maid".to_string()];

        let top = resolver(&data)
            .resolve_candidates(&tunes, &candidates, &BatchOptions::default(), &())
            .unwrap();
        let best = top.get("The Maid").unwrap();
        assert_eq!(best.len(), 1);
        assert!(best[0].path.ends_with("The Maids.mp3"));
        assert!(best[0].score > COMPOSITE_MATCH_SCORE);

        let opts = BatchOptions {
            overload: 2,
            ..BatchOptions::default()
        };
        let both = resolver(&data)
            .resolve_candidates(&tunes, &candidates, &opts, &())
            .unwrap();
        let both = both.get("The Maid").unwrap();
        assert_eq!(both.len(), 2);
        assert_eq!(both[1].score, COMPOSITE_MATCH_SCORE);
        assert_eq!(both[1].reason.as_deref(), Some(COMPOSITE_REASON));
    }

    #[test]
    fn test_invalid_batch_options() {
        let data = data();
        let resolver = resolver(&data);
        let bad = [
            BatchOptions {
                overload: 0,
                ..BatchOptions::default()
            },
            BatchOptions {
                mode: ExecutionMode::Parallel { workers: Some(0) },
                ..BatchOptions::default()
            },
            BatchOptions {
                threshold: 2.0,
                ..BatchOptions::default()
            },
        ];
        for opts in bad {
            assert!(resolver.resolve_set(&tunes(), &[], &opts, &()).is_err());
        }
    }

    #[test]
    fn test_resolve_sets_stats_and_json() {
        let dir = library();
        let data = data();
        let dirs = vec![dir.path().to_path_buf()];
        let sets = vec![
            TuneSet::new(vec!["The Kesh".into(), "Silver Spear".into()]).unwrap(),
            TuneSet::new(vec!["Morrison's Jig".into()]).unwrap(),
        ];
        let opts = BatchOptions {
            mode: ExecutionMode::Parallel { workers: Some(2) },
            ..BatchOptions::default()
        };

        let report = resolver(&data).resolve_sets(&sets, &dirs, &opts, &()).unwrap();
        assert_eq!(report.sets.len(), 2);
        assert_eq!(report.stats.tunes_requested, 3);
        assert_eq!(report.stats.tunes_matched, 2);
        assert_eq!(report.stats.tunes_unmatched, 1);
        assert_eq!(report.stats.files_scanned, FILES.len());
        assert_eq!(report.stats.workers, 2);

        let json = serde_json::to_value(&report.sets[0]).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["Silver Spear"].as_array().unwrap().len(), 1);
    }
}
