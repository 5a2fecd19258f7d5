//! find-tune: locate every recording of one tune in a music library.
//!
//! Usage: find-tune "The Kesh" ~/Music [--type jig] [--overload 3]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use tune_finder::cli::{DataArgs, LogArgs, MatchArgs};
use tune_finder::engine::{MatchEngine, SearchOptions};
use tune_finder::index;
use tune_finder::models::MatchResult;
use tune_finder::progress::{format_duration, scan_spinner};

/// Looser than the library default: a person is reading the list
const CLI_THRESHOLD: f64 = 0.8;

#[derive(Parser, Debug)]
#[command(name = "find-tune")]
#[command(about = "Find audio files of an Irish tune by name, aliases and album context")]
struct Args {
    /// Tune name to search for
    tune: String,

    /// Directories to search
    #[arg(default_value = ".")]
    directories: Vec<PathBuf>,

    /// Minimum similarity score (0.0 to 1.0)
    #[arg(long, default_value_t = CLI_THRESHOLD)]
    threshold: f64,

    /// Preferred tune type when the name is ambiguous (reel, jig, slip jig, ...)
    #[arg(long = "type", value_name = "TYPE")]
    tune_type: Option<String>,

    /// Maximum number of files to list (all by default)
    #[arg(long)]
    overload: Option<usize>,

    /// Print the albums the tune was recorded on
    #[arg(long)]
    show_albums: bool,

    /// Skip album-context matching through recordings.csv
    #[arg(long)]
    no_album_search: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Number of scan threads (0 = all cores)
    #[arg(long, default_value = "0")]
    workers: usize,

    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    matching: MatchArgs,

    #[command(flatten)]
    log: LogArgs,
}

fn print_results(query: &str, results: &[MatchResult]) {
    println!("\nMatches for '{}':", query);
    println!("{:-<80}", "");
    for r in results {
        match &r.reason {
            Some(reason) => println!("[{:.2}] {} ({})", r.score, r.path.display(), reason),
            None => println!("[{:.2}] {}", r.score, r.path.display()),
        }
    }
    println!("{:-<80}", "");
    println!("{} file(s)", results.len());
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.log.init();

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();
    let paths = args.data.paths();
    let aliases = args.data.alias_cache(&paths);
    let catalog = args.data.catalog(&paths);
    let keywords = args.data.type_keywords()?;
    let extensions = args.matching.audio_extensions()?;
    let engine = MatchEngine::new(&aliases, &catalog, &keywords);

    let preferred_type = args.tune_type.as_deref().map(|t| t.trim().to_lowercase());
    if let Some(tune_type) = &preferred_type {
        if keywords.cues_for(tune_type).is_none() {
            let mut known: Vec<&str> = keywords.types().collect();
            known.sort_unstable();
            warn!("Unknown tune type '{}'; known types: {}", tune_type, known.join(", "));
        }
    }

    let identities = engine.identities(&args.tune);
    if identities.len() > 1 {
        warn!(
            "'{}' names {} different tunes; use --type to prefer one",
            args.tune,
            identities.len()
        );
        for identity in &identities {
            eprintln!("  #{} {}: {}", identity.tune_id, identity.name, identity);
        }
    }

    let opts = SearchOptions {
        threshold: args.threshold,
        max_results: args.overload,
        use_aliases: !args.matching.no_aliases,
        algorithm: args.matching.algorithm,
        preferred_type,
        disambiguate: true,
    };
    opts.validate().context("Invalid search options")?;

    let spinner = scan_spinner(&args.directories);
    let candidates = index::scan(&args.directories, !args.matching.no_recursive, &extensions);
    spinner.finish_and_clear();
    info!("Scanned {} audio files", candidates.len());

    let recordings = if args.no_album_search && !args.show_albums {
        None
    } else {
        Some(args.data.recordings_index(&paths))
    };

    if args.show_albums {
        if let Some(recordings) = &recordings {
            let names = if opts.use_aliases {
                aliases.get_aliases(&args.tune)
            } else {
                vec![args.tune.clone()]
            };
            let albums = recordings.find_albums_with_tune(&names);
            println!("\nRecorded on {} album track(s):", albums.len());
            for album in &albums {
                let track = album
                    .track
                    .map(|t| format!(" (track {:02})", t))
                    .unwrap_or_default();
                println!(
                    "  {} - {}{}: {}",
                    album.artist, album.album, track, album.tune_as_listed
                );
            }
        }
    }

    let album_source = if args.no_album_search { None } else { recordings.as_ref() };
    let results = engine
        .find_tune_instances(&args.tune, &candidates, &opts, album_source)
        .with_context(|| format!("Search for '{}' failed", args.tune))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No files found for '{}'.", args.tune);
    } else {
        print_results(&args.tune, &results);
    }

    info!("Done in {}", format_duration(start.elapsed()));

    if results.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
