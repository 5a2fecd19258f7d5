//! resolve-sets: match every tune of a set list against a music library.
//!
//! Usage: resolve-sets ~/Music [--target target.md] [--parallel] [--output sets.json]

use anyhow::{Context, Result};
use clap::Parser;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use tune_finder::batch::{BatchOptions, BatchResolver, ExecutionMode, SetResolution, DEFAULT_OVERLOAD};
use tune_finder::cli::{DataArgs, LogArgs, MatchArgs};
use tune_finder::engine::{MatchEngine, DEFAULT_THRESHOLD};
use tune_finder::index::ScanCache;
use tune_finder::models::TuneSet;
use tune_finder::progress::ResolveProgress;
use tune_finder::safety::validate_output_path;
use tune_finder::sets::read_set_list;

#[derive(Parser, Debug)]
#[command(name = "resolve-sets")]
#[command(about = "Resolve sets of Irish tunes to audio files in a music library")]
struct Args {
    /// Directories to search
    #[arg(default_value = ".")]
    directories: Vec<PathBuf>,

    /// Set list: one set per line, tunes separated by " / "
    #[arg(long, default_value = "target.md", conflicts_with = "tune")]
    target: PathBuf,

    /// Resolve these tunes as a single set instead of reading --target
    #[arg(long, value_name = "NAME")]
    tune: Vec<String>,

    /// Minimum similarity score (0.0 to 1.0)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Files to keep per tune
    #[arg(long, default_value_t = DEFAULT_OVERLOAD)]
    overload: usize,

    /// Search tunes on a pool of worker threads
    #[arg(long)]
    parallel: bool,

    /// Worker count for --parallel (defaults to available cores)
    #[arg(long, requires = "parallel")]
    workers: Option<usize>,

    /// Write the tune → files mapping as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write run statistics as JSON
    #[arg(long)]
    stats: Option<PathBuf>,

    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    matching: MatchArgs,

    #[command(flatten)]
    log: LogArgs,
}

fn load_sets(args: &Args) -> Result<Vec<TuneSet>> {
    if !args.tune.is_empty() {
        return Ok(vec![TuneSet::new(args.tune.clone())?]);
    }
    let sets = read_set_list(&args.target)
        .with_context(|| format!("Failed to read set list {:?}", args.target))?;
    if sets.is_empty() {
        anyhow::bail!("No sets found in {:?}", args.target);
    }
    Ok(sets)
}

fn print_set(index: usize, set: &SetResolution) {
    println!("\nSet {}:", index + 1);
    for t in &set.tunes {
        if t.matches.is_empty() {
            println!("  {}: (no match)", t.tune);
            continue;
        }
        println!("  {}:", t.tune);
        for m in &t.matches {
            println!("    [{:.2}] {}", m.score, m.path.display());
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.log.init();

    let paths = args.data.paths();
    let mut inputs: Vec<&Path> = paths.all().to_vec();
    if args.tune.is_empty() {
        inputs.push(&args.target);
    }
    let extensions = args.matching.audio_extensions()?;
    if let Some(ref stats) = args.stats {
        validate_output_path(stats, &inputs, &extensions)?;
    }
    if let Some(ref output) = args.output {
        let mut protected = inputs.clone();
        protected.extend(args.stats.as_deref());
        validate_output_path(output, &protected, &extensions)?;
    }

    let sets = load_sets(&args)?;
    // Repeats within a set are searched once
    let total: usize = sets
        .iter()
        .map(|set| set.tunes().iter().collect::<FxHashSet<_>>().len())
        .sum();
    info!("Loaded {} sets ({} tunes)", sets.len(), total);

    let opts = BatchOptions {
        threshold: args.threshold,
        use_aliases: !args.matching.no_aliases,
        overload: args.overload,
        recursive: !args.matching.no_recursive,
        algorithm: args.matching.algorithm,
        mode: if args.parallel {
            ExecutionMode::Parallel {
                workers: args.workers,
            }
        } else {
            ExecutionMode::Sequential
        },
    };
    opts.validate().context("Invalid batch options")?;

    let aliases = args.data.alias_cache(&paths);
    let catalog = args.data.catalog(&paths);
    let keywords = args.data.type_keywords()?;
    let scans = ScanCache::new(extensions);
    let resolver = BatchResolver::new(MatchEngine::new(&aliases, &catalog, &keywords), &scans);

    let progress = ResolveProgress::new(total as u64);
    let report = resolver
        .resolve_sets(&sets, &args.directories, &opts, &progress)
        .context("Batch resolution failed")?;
    progress.finish();

    for (i, set) in report.sets.iter().enumerate() {
        print_set(i, set);
    }

    report.stats.log_phase("resolve");
    report.stats.log_summary();

    if let Some(ref output) = args.output {
        let json = serde_json::to_string_pretty(&report.sets)?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write {:?}", output))?;
        info!("Wrote {} sets to {:?}", report.sets.len(), output);
    }
    if let Some(ref stats) = args.stats {
        report
            .stats
            .write_to_file(stats)
            .with_context(|| format!("Failed to write stats {:?}", stats))?;
    }

    Ok(())
}
