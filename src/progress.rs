//! Terminal feedback for the binaries.
//!
//! A spinner covers the library scan and `ResolveProgress` tracks tunes as
//! the batch resolver finishes them. In log-only mode nothing is drawn and
//! progress goes to the log every few tunes instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::batch::ResolveObserver;
use crate::models::MatchResult;

/// Tunes between progress lines in log-only mode
pub const LOG_EVERY: u64 = 25;

const RESOLVE_TEMPLATE: &str = "Resolving [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}";
const SCAN_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Install the stderr fmt subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Ignore a second init (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

fn styled(bar: ProgressBar, template: &str) -> ProgressBar {
    if is_log_only() {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    } else if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Spinner shown while the library directories are walked.
pub fn scan_spinner(directories: &[PathBuf]) -> ProgressBar {
    let spinner = styled(ProgressBar::new_spinner(), SCAN_TEMPLATE);
    if !is_log_only() {
        spinner.enable_steady_tick(Duration::from_millis(100));
    }
    let msg = match directories {
        [one] => format!("Scanning {}", one.display()),
        many => format!("Scanning {} directories", many.len()),
    };
    spinner.set_message(msg);
    spinner
}

/// Whether the `done`-th tune out of `total` gets a log line.
fn is_log_point(done: u64, total: u64, every: u64) -> bool {
    total > 0 && every > 0 && (done % every == 0 || done == total)
}

/// Progress for a batch run, fed by the resolver as each tune completes.
///
/// Tunes finish out of order in parallel mode, so only the count is
/// meaningful. The bar message shows the last tune finished.
pub struct ResolveProgress {
    bar: ProgressBar,
    done: AtomicU64,
    unmatched: AtomicU64,
    total: u64,
    started: Instant,
}

impl ResolveProgress {
    pub fn new(total: u64) -> Self {
        Self {
            bar: styled(ProgressBar::new(total), RESOLVE_TEMPLATE),
            done: AtomicU64::new(0),
            unmatched: AtomicU64::new(0),
            total,
            started: Instant::now(),
        }
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn unmatched(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }

    /// Clear the bar and log how the run went.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        info!(
            "Resolved {}/{} tunes in {} ({} without a file)",
            self.done(),
            self.total,
            format_duration(self.started.elapsed()),
            self.unmatched()
        );
    }
}

impl ResolveObserver for ResolveProgress {
    fn tune_resolved(&self, tune: &str, matches: &[MatchResult]) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if matches.is_empty() {
            self.unmatched.fetch_add(1, Ordering::Relaxed);
            debug!("No file for '{}'", tune);
        }
        self.bar.inc(1);
        self.bar.set_message(tune.to_string());
        if is_log_only() && is_log_point(done, self.total, LOG_EVERY) {
            let pct = 100.0 * done as f64 / self.total as f64;
            info!("[resolve] {}/{} ({:.1}%)", done, self.total, pct);
        }
    }
}
