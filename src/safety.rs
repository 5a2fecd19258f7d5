//! Safety checks before writing result files.
//!
//! Result and stats files are written next to the datasets and the music
//! library, so a mistyped `--output` must never clobber one of them.

use anyhow::{bail, Result};
use std::path::Path;

use crate::index::AudioExtensions;

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output must be a `.json` file
/// - Output cannot be any of the protected inputs (datasets, set list)
/// - Output cannot carry an audio extension
///
/// # Arguments
/// * `output` - The output path that will be created/overwritten
/// * `protected` - Input paths that must not match the output
/// * `audio` - Audio extensions in use for the scan
pub fn validate_output_path(output: &Path, protected: &[&Path], audio: &AudioExtensions) -> Result<()> {
    let is_json = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !is_json {
        bail!(
            "Safety check failed: output file '{}' must end in .json",
            output.display()
        );
    }

    if audio.contains(output) {
        bail!(
            "Safety check failed: output '{}' looks like an audio file",
            output.display()
        );
    }

    let output_abs = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());
    for source in protected {
        let source_abs = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
        if output == *source || output_abs == source_abs {
            bail!(
                "Safety check failed: output '{}' cannot be the same as input '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}
