//! Match engine: score every candidate file against every spelling of a tune.
//!
//! For each candidate the best score over all search terms is kept, where a
//! term scores either its direct similarity to the derived file name or the
//! fixed composite score when the term is one of several tunes in the name.
//! Matches under the threshold are dropped, duplicates collapse to their best
//! score, ambiguous names are re-scored by type, and the rest is sorted.

use rustc_hash::FxHashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::aliases::AliasCache;
use crate::catalog::{adjust_for_type, Catalog, TypeKeywords};
use crate::error::{Result, TuneError};
use crate::index::{scan, AudioExtensions};
use crate::models::{AudioFileCandidate, MatchResult, TuneIdentity};
use crate::normalize::{common_variations, normalize_tune_name};
use crate::recordings::{search_by_album_context, RecordingsIndex};
use crate::scoring::{similarity_normalized, SimilarityAlgorithm, COMPOSITE_MATCH_SCORE};

/// Minimum score for a library search
pub const DEFAULT_THRESHOLD: f64 = 0.85;

pub const COMPOSITE_REASON: &str = "composite track";

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub threshold: f64,
    /// Per-query result cap (the "overload" of batch resolution)
    pub max_results: Option<usize>,
    pub use_aliases: bool,
    pub algorithm: SimilarityAlgorithm,
    /// Tune type to favour when the name is ambiguous ("reel", "slip jig")
    pub preferred_type: Option<String>,
    /// Re-score by type cues when the catalog has several tunes of this name
    pub disambiguate: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_results: None,
            use_aliases: true,
            algorithm: SimilarityAlgorithm::default(),
            preferred_type: None,
            disambiguate: true,
        }
    }
}

impl SearchOptions {
    /// Thresholds outside [0, 1] (and NaN) are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TuneError::InvalidThreshold(self.threshold));
        }
        if self.max_results == Some(0) {
            return Err(TuneError::InvalidInput(
                "max_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// One spelling of the query, prepared once per search.
#[derive(Debug, Clone)]
struct SearchTerm {
    lowered: String,
    normalized: String,
}

/// Read-only matcher over shared alias, catalog and keyword data.
/// Cheap to copy into worker threads.
#[derive(Debug, Clone, Copy)]
pub struct MatchEngine<'a> {
    aliases: &'a AliasCache,
    catalog: &'a Catalog,
    keywords: &'a TypeKeywords,
}

impl<'a> MatchEngine<'a> {
    pub fn new(aliases: &'a AliasCache, catalog: &'a Catalog, keywords: &'a TypeKeywords) -> Self {
        Self {
            aliases,
            catalog,
            keywords,
        }
    }

    /// Catalogued tunes sharing this name
    pub fn identities(&self, query: &str) -> Vec<TuneIdentity> {
        self.catalog.get_identities(query)
    }

    /// Spellings searched for `query`: catalog aliases and their variants, or
    /// the query's own mechanical variants only.
    pub fn search_variations(&self, query: &str, use_aliases: bool) -> Vec<String> {
        if use_aliases {
            self.aliases.get_all_variations(query)
        } else {
            common_variations(query)
        }
    }

    fn search_terms(&self, query: &str, use_aliases: bool) -> Vec<SearchTerm> {
        self.search_variations(query, use_aliases)
            .into_iter()
            .filter_map(|term| {
                let normalized = normalize_tune_name(&term);
                if normalized.is_empty() {
                    return None;
                }
                Some(SearchTerm {
                    lowered: term.to_lowercase(),
                    normalized,
                })
            })
            .collect()
    }

    /// Best score of one candidate over all terms, and whether it came from
    /// the composite check.
    fn score_candidate(
        &self,
        terms: &[SearchTerm],
        candidate: &AudioFileCandidate,
        threshold: f64,
        algorithm: SimilarityAlgorithm,
    ) -> Option<(f64, bool)> {
        if candidate.normalized_name.is_empty() {
            return None;
        }

        let mut best = 0.0_f64;
        let mut from_composite = false;
        for term in terms {
            let direct = similarity_normalized(&term.normalized, &candidate.normalized_name, algorithm);
            if direct > best {
                best = direct;
                from_composite = false;
            }
            // A composite hit can't beat a direct score already at or above it
            if best < COMPOSITE_MATCH_SCORE
                && candidate
                    .composite
                    .contains(&term.lowered, &term.normalized, threshold, algorithm)
            {
                best = COMPOSITE_MATCH_SCORE;
                from_composite = true;
            }
            if best >= 1.0 {
                break;
            }
        }
        Some((best, from_composite))
    }

    /// Threshold-passing direct matches, deduplicated, unsorted.
    fn direct_matches(
        &self,
        query: &str,
        candidates: &[AudioFileCandidate],
        opts: &SearchOptions,
    ) -> Vec<MatchResult> {
        if normalize_tune_name(query).is_empty() {
            return Vec::new();
        }
        let terms = self.search_terms(query, opts.use_aliases);
        debug!("Searching {} candidates with {} terms for '{}'", candidates.len(), terms.len(), query);

        let matches = candidates.iter().filter_map(|candidate| {
            let (score, from_composite) =
                self.score_candidate(&terms, candidate, opts.threshold, opts.algorithm)?;
            if score < opts.threshold {
                return None;
            }
            let reason = from_composite.then(|| COMPOSITE_REASON.to_string());
            Some(MatchResult::new(candidate, score, reason))
        });
        dedupe_by_path(matches)
    }

    /// Type re-scoring, stable sort by descending score, truncation.
    fn finish(&self, query: &str, mut matches: Vec<MatchResult>, opts: &SearchOptions) -> Vec<MatchResult> {
        if opts.disambiguate && !matches.is_empty() {
            let identities = self.catalog.get_identities(query);
            if identities.len() > 1 {
                debug!("'{}' is ambiguous: {} catalogued tunes", query, identities.len());
                for m in matches.iter_mut() {
                    let adjustment = adjust_for_type(
                        &m.path,
                        m.score,
                        &identities,
                        opts.preferred_type.as_deref(),
                        self.keywords,
                    );
                    m.score = adjustment.score;
                    if let Some(tag) = adjustment.verdict.reason_tag() {
                        m.add_reason(tag);
                    }
                }
            }
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(limit) = opts.max_results {
            matches.truncate(limit);
        }
        matches
    }

    /// Files matching `query`, best first. No match is an empty list.
    pub fn search(
        &self,
        query: &str,
        candidates: &[AudioFileCandidate],
        opts: &SearchOptions,
    ) -> Result<Vec<MatchResult>> {
        opts.validate()?;
        let matches = self.direct_matches(query, candidates, opts);
        Ok(self.finish(query, matches, opts))
    }

    /// Scan `directories` and search them.
    pub fn search_local_files(
        &self,
        query: &str,
        directories: &[PathBuf],
        recursive: bool,
        extensions: &AudioExtensions,
        opts: &SearchOptions,
    ) -> Result<Vec<MatchResult>> {
        opts.validate()?;
        let candidates = scan(directories, recursive, extensions);
        self.search(query, &candidates, opts)
    }

    /// Direct matches plus album-context matches from the recordings dataset.
    /// A path found directly keeps its direct score.
    pub fn find_tune_instances(
        &self,
        query: &str,
        candidates: &[AudioFileCandidate],
        opts: &SearchOptions,
        recordings: Option<&RecordingsIndex>,
    ) -> Result<Vec<MatchResult>> {
        opts.validate()?;
        let mut matches = self.direct_matches(query, candidates, opts);

        if let Some(recordings) = recordings.filter(|r| !r.is_empty()) {
            let names = if opts.use_aliases {
                self.aliases.get_aliases(query)
            } else {
                vec![query.to_string()]
            };
            let albums = recordings.find_albums_with_tune(&names);
            debug!("'{}' appears on {} recorded tracks", query, albums.len());

            let album_matches =
                search_by_album_context(&albums, candidates, opts.algorithm);
            let found: Vec<PathBuf> = matches.iter().map(|m| m.path.clone()).collect();
            matches.extend(
                album_matches
                    .into_iter()
                    .filter(|m| !found.contains(&m.path)),
            );
        }

        Ok(self.finish(query, matches, opts))
    }
}

/// Collapse results for the same path to the best score, at the first
/// position the path was seen.
fn dedupe_by_path<I>(matches: I) -> Vec<MatchResult>
where
    I: IntoIterator<Item = MatchResult>,
{
    let mut position: FxHashMap<PathBuf, usize> = FxHashMap::default();
    let mut unique: Vec<MatchResult> = Vec::new();
    for m in matches {
        match position.get(&m.path) {
            Some(&i) => {
                if m.score > unique[i].score {
                    unique[i] = m;
                }
            }
            None => {
                position.insert(m.path.clone(), unique.len());
                unique.push(m);
            }
        }
    }
    unique
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::AliasIndex;
    use crate::models::{AliasRow, CatalogRow, RecordingRow};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        aliases: AliasCache,
        catalog: Catalog,
        keywords: TypeKeywords,
    }

    impl Fixture {
        fn new() -> Self {
            let aliases = AliasIndex::from_rows(vec![
                AliasRow {
                    tune_id: "55".into(),
                    alias: "Castle Jig".into(),
                    name: "The Kesh".into(),
                },
            ]);
            let catalog = Catalog::from_rows(vec![
                catalog_row("10", "The Maid", "reel"),
                catalog_row("11", "The Maid", "jig"),
                catalog_row("55", "Kesh, The", "jig"),
            ]);
            Self {
                aliases: AliasCache::from_index(aliases),
                catalog,
                keywords: TypeKeywords::default(),
            }
        }

        fn engine(&self) -> MatchEngine<'_> {
            MatchEngine::new(&self.aliases, &self.catalog, &self.keywords)
        }
    }

    fn catalog_row(tune_id: &str, name: &str, tune_type: &str) -> CatalogRow {
        CatalogRow {
            tune_id: tune_id.into(),
            name: name.into(),
            tune_type: tune_type.into(),
            meter: None,
            key: None,
            mode: None,
        }
    }

    fn candidates(paths: &[&str]) -> Vec<AudioFileCandidate> {
        paths
            .iter()
            .map(|p| AudioFileCandidate::new(PathBuf::from(p)))
            .collect()
    }

    #[test]
    fn test_harvest_home_in_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("05 - Harvest Home.mp3"), b"").unwrap();
        fs::write(dir.path().join("Drowsy Maggie.mp3"), b"").unwrap();
        fs::write(dir.path().join("Harvest Home.txt"), b"").unwrap();

        let fixture = Fixture::new();
        let results = fixture
            .engine()
            .search_local_files(
                "The Harvest Home",
                &[dir.path().to_path_buf()],
                true,
                &AudioExtensions::default(),
                &SearchOptions::default(),
            )
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].path.ends_with("05 - Harvest Home.mp3"));
        assert!(results[0].score >= 0.85);
    }

    #[test]
    fn test_max_results_keeps_best() {
        let fixture = Fixture::new();
        let files = candidates(&[
            "/music/Silver Spear Reel.mp3",
            "/music/Drowsy Maggie.mp3",
            "/music/Silver Spears.mp3",
            "/music/01 - Silver Spear.mp3",
        ]);
        let opts = SearchOptions {
            use_aliases: false,
            ..SearchOptions::default()
        };

        let all = fixture.engine().search("Silver Spear", &files, &opts).unwrap();
        assert_eq!(all.len(), 3);

        let top = fixture
            .engine()
            .search("Silver Spear", &files, &SearchOptions { max_results: Some(2), ..opts })
            .unwrap();
        assert_eq!(top.len(), 2);
        assert!(top[0].path.ends_with("01 - Silver Spear.mp3"));
        assert_eq!(top[0].score, 1.0);
        assert!(top[1].path.ends_with("Silver Spears.mp3"));
        assert!(top[1].score < 1.0);
    }

    #[test]
    fn test_composite_match_scores_fixed() {
        let fixture = Fixture::new();
        let files = candidates(&["/music/Carraroe Jig _ Kesh Jig _ Leaf Reel.mp3"]);
        let results = fixture
            .engine()
            .search("Kesh Jig", &files, &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, COMPOSITE_MATCH_SCORE);
        assert_eq!(results[0].reason.as_deref(), Some(COMPOSITE_REASON));
    }

    #[test]
    fn test_aliases_widen_search() {
        let fixture = Fixture::new();
        let files = candidates(&["/music/Castle Jig.mp3"]);

        let with_aliases = fixture
            .engine()
            .search("The Kesh", &files, &SearchOptions::default())
            .unwrap();
        assert_eq!(with_aliases.len(), 1);

        let opts = SearchOptions {
            use_aliases: false,
            ..SearchOptions::default()
        };
        let without = fixture.engine().search("The Kesh", &files, &opts).unwrap();
        assert!(without.is_empty());
    }

    #[test]
    fn test_preferred_type_reorders() {
        let fixture = Fixture::new();
        let files = candidates(&["/music/Jigs/The Maid.mp3", "/music/Reels/The Maid.mp3"]);
        let opts = SearchOptions {
            preferred_type: Some("reel".into()),
            ..SearchOptions::default()
        };

        let results = fixture.engine().search("The Maid", &files, &opts).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].path.starts_with("/music/Reels"));
        assert!(results[0].score > results[1].score);
        assert_eq!(results[1].reason.as_deref(), Some("[type mismatch]"));

        // Without disambiguation both keep their raw score and order
        let plain = SearchOptions {
            disambiguate: false,
            ..opts
        };
        let results = fixture.engine().search("The Maid", &files, &plain).unwrap();
        assert!(results[0].path.starts_with("/music/Jigs"));
        assert_eq!(results[0].score, results[1].score);
    }

    #[test]
    fn test_duplicate_candidates_collapse() {
        let fixture = Fixture::new();
        let files = candidates(&["/music/Drowsy Maggie.mp3", "/music/Drowsy Maggie.mp3"]);
        let results = fixture
            .engine()
            .search("Drowsy Maggie", &files, &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_query_and_no_match() {
        let fixture = Fixture::new();
        let files = candidates(&["/music/Drowsy Maggie.mp3", "/music/The.mp3"]);
        let opts = SearchOptions::default();
        assert!(fixture.engine().search("", &files, &opts).unwrap().is_empty());
        assert!(fixture.engine().search("  ", &files, &opts).unwrap().is_empty());
        assert!(fixture
            .engine()
            .search("Morrison's Jig", &files, &opts)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let fixture = Fixture::new();
        let files = candidates(&["/music/Drowsy Maggie.mp3"]);
        for threshold in [-0.1, 1.5, f64::NAN] {
            let opts = SearchOptions {
                threshold,
                ..SearchOptions::default()
            };
            assert!(matches!(
                fixture.engine().search("Drowsy Maggie", &files, &opts),
                Err(TuneError::InvalidThreshold(_))
            ));
        }

        let opts = SearchOptions {
            max_results: Some(0),
            ..SearchOptions::default()
        };
        assert!(matches!(
            fixture.engine().search("Drowsy Maggie", &files, &opts),
            Err(TuneError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_find_tune_instances_merges_albums() {
        let fixture = Fixture::new();
        let recordings = RecordingsIndex::from_rows(vec![RecordingRow {
            tune_id: Some("55".into()),
            artist: "Altan".into(),
            recording: "Harvest Storm".into(),
            track: Some("3".into()),
            tune: "Castle Jig".into(),
        }]);
        let files = candidates(&[
            "/music/Altan/Harvest Storm/03 Track.mp3",
            "/music/Altan/Harvest Storm/04 The Kesh.mp3",
            "/music/Other/Drowsy Maggie.mp3",
        ]);

        let results = fixture
            .engine()
            .find_tune_instances("The Kesh", &files, &SearchOptions::default(), Some(&recordings))
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].path.ends_with("04 The Kesh.mp3"));
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].reason, None);
        assert!(results[1].path.ends_with("03 Track.mp3"));
        assert_eq!(results[1].score, 0.95);

        let direct_only = fixture
            .engine()
            .find_tune_instances("The Kesh", &files, &SearchOptions::default(), None)
            .unwrap();
        assert_eq!(direct_only.len(), 1);
    }

    #[test]
    fn test_possible_album_kept_below_threshold() {
        let fixture = Fixture::new();
        let recordings = RecordingsIndex::from_rows(vec![RecordingRow {
            tune_id: Some("55".into()),
            artist: "Altan".into(),
            recording: "Harvest Storm".into(),
            track: Some("3".into()),
            tune: "The Kesh".into(),
        }]);
        let files = candidates(&["/music/Altan/Island Angel/01 Track.mp3"]);
        let opts = SearchOptions {
            threshold: 0.8,
            ..SearchOptions::default()
        };

        let results = fixture
            .engine()
            .find_tune_instances("The Kesh", &files, &opts, Some(&recordings))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, crate::recordings::PARTIAL_ALBUM_SCORE);
        assert_eq!(
            results[0].reason.as_deref(),
            Some("Possible album: Altan - Harvest Storm")
        );
    }
}
