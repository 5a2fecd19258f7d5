//! Set-list files: one set per line, tunes separated by " / ".
//!
//! ```text
//! # Sets to learn
//! Jim Ward's Jig / Blarney Pilgrim / The Cook in the Kitchen
//! - Out on the Ocean / Geese in the Bog
//! ```
//!
//! Blank lines and `#` comments are skipped; a leading markdown bullet is
//! ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::{Result, TuneError};
use crate::models::TuneSet;

pub const TUNE_SEPARATOR: &str = " / ";

static LIST_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+]\s+").unwrap());

pub fn parse_set_list(text: &str) -> Vec<TuneSet> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = LIST_BULLET.replace(line, "");
            let tunes: Vec<String> = line
                .split(TUNE_SEPARATOR)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            TuneSet::new(tunes).ok()
        })
        .collect()
}

pub fn read_set_list(path: &Path) -> Result<Vec<TuneSet>> {
    if !path.is_file() {
        return Err(TuneError::InvalidInput(format!(
            "set list '{}' not found",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(parse_set_list(&text))
}
