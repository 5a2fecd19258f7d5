//! Argument groups shared by `find-tune` and `resolve-sets`.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::aliases::{AliasCache, CsvAliasSource};
use crate::catalog::{Catalog, TypeKeywords};
use crate::config::{DataPaths, DATA_DIR_ENV, DEFAULT_DATA_DIR};
use crate::index::{AudioExtensions, DEFAULT_AUDIO_EXTENSIONS};
use crate::progress;
use crate::recordings::RecordingsIndex;
use crate::scoring::SimilarityAlgorithm;

// ============================================================================
// Datasets
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding aliases.csv, tunes.csv and recordings.csv
    #[arg(long, env = DATA_DIR_ENV, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Override the aliases file
    #[arg(long)]
    pub aliases: Option<PathBuf>,

    /// Override the tunes (catalog) file
    #[arg(long)]
    pub tunes: Option<PathBuf>,

    /// Override the recordings file
    #[arg(long)]
    pub recordings: Option<PathBuf>,

    /// Minutes before the alias index is reloaded
    #[arg(long, default_value = "60")]
    pub alias_ttl_minutes: u64,

    /// JSON object of extra type cues: {"reel": ["reel", "rl"], ...}
    #[arg(long, value_name = "FILE")]
    pub type_keywords: Option<PathBuf>,
}

impl DataArgs {
    pub fn paths(&self) -> DataPaths {
        DataPaths::in_dir(&self.data_dir).with_overrides(
            self.aliases.clone(),
            self.tunes.clone(),
            self.recordings.clone(),
        )
    }

    pub fn alias_cache(&self, paths: &DataPaths) -> AliasCache {
        AliasCache::new(
            Box::new(CsvAliasSource::new(&paths.aliases)),
            Duration::from_secs(self.alias_ttl_minutes.saturating_mul(60)),
        )
    }

    pub fn catalog(&self, paths: &DataPaths) -> Catalog {
        Catalog::load_or_empty(&paths.tunes)
    }

    pub fn recordings_index(&self, paths: &DataPaths) -> RecordingsIndex {
        RecordingsIndex::load_or_empty(&paths.recordings)
    }

    /// Default cue table, with the `--type-keywords` file merged over it.
    pub fn type_keywords(&self) -> Result<TypeKeywords> {
        let defaults = TypeKeywords::default();
        match &self.type_keywords {
            Some(path) => {
                let extra = TypeKeywords::from_json_file(path)
                    .with_context(|| format!("Failed to read type keywords {:?}", path))?;
                Ok(defaults.merge(extra))
            }
            None => Ok(defaults),
        }
    }
}

// ============================================================================
// Matching
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    /// Search only the given name and its spelling variants
    #[arg(long)]
    pub no_aliases: bool,

    /// Only look at files directly inside each directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Similarity algorithm
    #[arg(long, value_enum, default_value_t = SimilarityAlgorithm::Lcs)]
    pub algorithm: SimilarityAlgorithm,

    /// Comma-separated audio extensions to scan
    #[arg(long, default_value_t = DEFAULT_AUDIO_EXTENSIONS.join(","))]
    pub extensions: String,
}

impl MatchArgs {
    pub fn audio_extensions(&self) -> Result<AudioExtensions> {
        let exts = AudioExtensions::from_list(&self.extensions);
        if exts.is_empty() {
            anyhow::bail!("--extensions must name at least one extension");
        }
        Ok(exts)
    }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log-only mode: no progress bars, periodic progress lines instead
    #[arg(long)]
    pub log_only: bool,
}

impl LogArgs {
    pub fn init(&self) {
        progress::set_log_only(self.log_only);
        progress::init_logging(self.verbose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        matching: MatchArgs,
        #[command(flatten)]
        log: LogArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["test", "--data-dir", "/data"]).unwrap();
        let paths = cli.data.paths();
        assert_eq!(paths.aliases, PathBuf::from("/data/aliases.csv"));
        assert_eq!(paths.recordings, PathBuf::from("/data/recordings.csv"));
        assert_eq!(cli.data.alias_ttl_minutes, 60);
        assert_eq!(cli.matching.algorithm, SimilarityAlgorithm::Lcs);
        assert!(!cli.matching.no_aliases);
        assert!(cli.matching.audio_extensions().unwrap().contains(std::path::Path::new("a.flac")));
    }

    #[test]
    fn test_overrides() {
        let cli = TestCli::try_parse_from([
            "test",
            "--data-dir",
            "/data",
            "--tunes",
            "/elsewhere/tunes.csv",
            "--algorithm",
            "jaro-winkler",
            "--extensions",
            "mp3",
            "--no-aliases",
        ])
        .unwrap();
        let paths = cli.data.paths();
        assert_eq!(paths.tunes, PathBuf::from("/elsewhere/tunes.csv"));
        assert_eq!(paths.aliases, PathBuf::from("/data/aliases.csv"));
        assert_eq!(cli.matching.algorithm, SimilarityAlgorithm::JaroWinkler);
        assert!(cli.matching.no_aliases);
        assert!(!cli.matching.audio_extensions().unwrap().contains(std::path::Path::new("a.flac")));
    }

    #[test]
    fn test_matching_blocks_algorithm_flag() {
        let cli = TestCli::try_parse_from(["test", "--algorithm", "matching-blocks"]).unwrap();
        assert_eq!(cli.matching.algorithm, SimilarityAlgorithm::MatchingBlocks);
    }

    #[test]
    fn test_empty_extensions_rejected() {
        let cli = TestCli::try_parse_from(["test", "--extensions", " , "]).unwrap();
        assert!(cli.matching.audio_extensions().is_err());
    }
}
