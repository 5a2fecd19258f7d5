//! Tune-name normalization and mechanical spelling variations.
//!
//! Every comparison in the crate goes through `normalize_tune_name`, so
//! "The Kesh", "Kesh, The" and "the-kesh" all meet at "kesh, the".
//!
//! CRITICAL: normalization must stay idempotent. Alias keys, catalog lookups
//! and candidate names are all stored in normalized form.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::Path;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Apostrophe variants removed with no replacement: straight, curly, backtick.
pub static APOSTROPHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"['\u{2018}\u{2019}`]").unwrap());

/// Punctuation removed with no replacement.
pub static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,.!?;:]").unwrap());

/// Hyphens and underscores become word breaks.
pub static WORD_JOINERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]").unwrap());

/// Regex to collapse any whitespace run into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Article already rotated to the end: "Kesh, The", "kesh ,the"
pub static TRAILING_THE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*the$").unwrap());

/// Leading track index in a file stem: "03 - ", "12_", "7 "
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[-_\s]*").unwrap());

/// Whole-word "and" in either casing used by titles.
static AND_LOWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\band\b").unwrap());
static AND_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bAnd\b").unwrap());

/// Possessive "'s" (straight or curly apostrophe).
static POSSESSIVE_LOWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"['\u{2019}]s\b").unwrap());
static POSSESSIVE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"['\u{2019}]S\b").unwrap());

/// Word ending in a bare "s" that may have lost its apostrophe: "Cooleys" → "Cooley's".
/// Double "ss" is left alone ("Miss", "Cross").
static BARE_POSSESSIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-rt-z])s\b").unwrap());

pub const LEADING_THE: &str = "the ";
pub const ROTATED_THE: &str = ", the";

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Canonicalize a tune name for comparison.
///
/// Lowercase and trim, drop apostrophes, drop `, . ! ? ; :`, map `-`/`_` to
/// spaces, collapse whitespace, then rotate a leading "the " to a trailing
/// ", the". A name that already ends in ", the" keeps that suffix, which is
/// what makes the function idempotent.
///
/// Empty input normalizes to the empty string; callers treat that as a name
/// that never matches anything.
pub fn normalize_tune_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let without_apostrophes = APOSTROPHES.replace_all(&lowered, "");

    // Detect the rotated article before comma removal would destroy it
    let (body, mut rotated) = match TRAILING_THE.find(&without_apostrophes) {
        Some(m) => (&without_apostrophes[..m.start()], true),
        None => (&without_apostrophes[..], false),
    };

    let body = PUNCTUATION.replace_all(body, "");
    let body = WORD_JOINERS.replace_all(&body, " ");
    let body = MULTI_SPACE.replace_all(&body, " ");
    let mut body = body.trim();

    while let Some(rest) = body.strip_prefix(LEADING_THE) {
        body = rest.trim_start();
        rotated = true;
    }

    match (rotated, body.is_empty()) {
        (true, true) => "the".to_string(),
        (true, false) => format!("{}{}", body, ROTATED_THE),
        (false, _) => body.to_string(),
    }
}

/// Rotate a single leading "the " to a trailing ", the" without any other cleanup.
/// Used where the input is only lowercased and trimmed (catalog name matching).
pub fn rotate_leading_the(name: &str) -> String {
    match name.strip_prefix(LEADING_THE) {
        Some(rest) => format!("{}{}", rest, ROTATED_THE),
        None => name.to_string(),
    }
}

/// Human-readable tune name from an audio file path.
///
/// "05 - Harvest_Home.mp3" → "Harvest Home". Casing is kept; the result is
/// normalized separately when compared.
pub fn derive_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let name = TRACK_NUMBER_PREFIX.replace(&stem, "");
    let name = WORD_JOINERS.replace_all(&name, " ");
    MULTI_SPACE.replace_all(&name, " ").trim().to_string()
}

// ============================================================================
// VARIATIONS
// ============================================================================

/// Keep the first spelling of every case-insensitively distinct string.
pub fn dedup_case_insensitive<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: FxHashSet<String> = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

/// Spellings of a tune name that are likely to show up in file names.
///
/// The name itself, its normalized form, with/without a leading "The",
/// `&`/`and` swapped both ways and `'s`/`s` swapped both ways. No catalog
/// lookup happens here; see `AliasCache::get_all_variations` for that.
pub fn common_variations(tune_name: &str) -> Vec<String> {
    let trimmed = tune_name.trim();
    if trimmed.is_empty() {
        return vec![tune_name.to_string()];
    }

    let mut variations = vec![tune_name.to_string(), normalize_tune_name(trimmed)];

    let lower = trimmed.to_lowercase();
    if lower.starts_with(LEADING_THE) {
        if let Some(rest) = trimmed.get(LEADING_THE.len()..) {
            variations.push(rest.trim_start().to_string());
        }
    } else {
        variations.push(format!("The {}", trimmed));
    }

    if trimmed.contains('&') {
        variations.push(trimmed.replace('&', "and"));
        variations.push(trimmed.replace('&', "And"));
    }
    if AND_LOWER.is_match(trimmed) {
        variations.push(AND_LOWER.replace_all(trimmed, "&").to_string());
    }
    if AND_TITLE.is_match(trimmed) {
        variations.push(AND_TITLE.replace_all(trimmed, "&").to_string());
    }

    if POSSESSIVE_LOWER.is_match(trimmed) {
        variations.push(POSSESSIVE_LOWER.replace_all(trimmed, "s").to_string());
    }
    if POSSESSIVE_TITLE.is_match(trimmed) {
        variations.push(POSSESSIVE_TITLE.replace_all(trimmed, "S").to_string());
    }
    if BARE_POSSESSIVE.is_match(trimmed) {
        variations.push(BARE_POSSESSIVE.replace_all(trimmed, "${1}'s").to_string());
    }

    dedup_case_insensitive(variations)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "The Kesh",
        "Kesh, The",
        "Kitty's Wedding",
        "  Drowsy   Maggie  ",
        "The Maid Behind the Bar",
        "Out on the Ocean!",
        "the-silver_spear",
        "Jim Ward’s Jig",
        "-leading hyphen",
        "The The",
        ", the",
        "the",
        "",
        "Boys of Ballisodare, The",
        "Rolling Waves; Or, The Humours",
        "Hunter`s Jig",
    ];

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_tune_name("Drowsy Maggie"), "drowsy maggie");
        assert_eq!(normalize_tune_name("  Drowsy   Maggie  "), "drowsy maggie");
        assert_eq!(normalize_tune_name("Out on the Ocean!"), "out on the ocean");
        assert_eq!(normalize_tune_name("the-silver_spear"), "silver spear, the");
    }

    #[test]
    fn test_normalize_apostrophes_removed() {
        assert_eq!(normalize_tune_name("Kitty's Wedding"), "kittys wedding");
        assert_eq!(normalize_tune_name("Jim Ward’s Jig"), "jim wards jig");
        assert_eq!(normalize_tune_name("Hunter`s Jig"), "hunters jig");
        assert_eq!(normalize_tune_name("Cooley‘s"), "cooleys");
    }

    #[test]
    fn test_normalize_article_rotation() {
        assert_eq!(normalize_tune_name("The Kesh"), "kesh, the");
        assert_eq!(normalize_tune_name("Kesh, The"), "kesh, the");
        assert_eq!(normalize_tune_name("The Kesh"), normalize_tune_name("Kesh, The"));
        assert_eq!(
            normalize_tune_name("Boys of Ballisodare, The"),
            normalize_tune_name("The Boys of Ballisodare")
        );
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_tune_name(""), "");
        assert_eq!(normalize_tune_name("   "), "");
        assert_eq!(normalize_tune_name("?!"), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for sample in SAMPLES {
            let once = normalize_tune_name(sample);
            let twice = normalize_tune_name(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name(Path::new("/music/05 - Harvest Home.mp3")), "Harvest Home");
        assert_eq!(derive_name(Path::new("12_The_Kesh.flac")), "The Kesh");
        assert_eq!(derive_name(Path::new("Drowsy  Maggie.MP3")), "Drowsy Maggie");
        assert_eq!(
            derive_name(Path::new("03-Carraroe Jig - Kesh Jig.m4a")),
            "Carraroe Jig Kesh Jig"
        );
        assert_eq!(derive_name(Path::new("/music/")), "music");
    }

    #[test]
    fn test_rotate_leading_the() {
        assert_eq!(rotate_leading_the("the kesh"), "kesh, the");
        assert_eq!(rotate_leading_the("kesh, the"), "kesh, the");
        assert_eq!(rotate_leading_the("theme"), "theme");
    }

    #[test]
    fn test_variations_the_handling() {
        let variations = common_variations("The Butterfly");
        assert_eq!(variations[0], "The Butterfly");
        assert!(variations.contains(&"Butterfly".to_string()));
        assert!(variations.contains(&"butterfly, the".to_string()));

        let variations = common_variations("Butterfly");
        assert!(variations.contains(&"The Butterfly".to_string()));
    }

    #[test]
    fn test_variations_and_ampersand() {
        let variations = common_variations("Maid & the Farmer");
        assert!(variations.contains(&"Maid and the Farmer".to_string()));
        // "Maid And the Farmer" differs only by case from the "and" form
        assert!(!variations.contains(&"Maid And the Farmer".to_string()));

        let variations = common_variations("Tom and Jerry");
        assert!(variations.contains(&"Tom & Jerry".to_string()));

        // "and" inside a word is not a conjunction
        let variations = common_variations("Grand Spey");
        assert!(!variations.iter().any(|v| v.contains('&')));
    }

    fn contains_ignore_case(variations: &[String], wanted: &str) -> bool {
        variations.iter().any(|v| v.eq_ignore_ascii_case(wanted))
    }

    #[test]
    fn test_variations_possessive() {
        // The normalized "cooleys" comes first and absorbs "Cooleys"
        let variations = common_variations("Cooley's");
        assert!(contains_ignore_case(&variations, "Cooleys"));

        let variations = common_variations("Cooleys");
        assert!(variations.contains(&"Cooley's".to_string()));

        let variations = common_variations("Miss Monaghan");
        assert!(!contains_ignore_case(&variations, "Mis's Monaghan"));
    }

    #[test]
    fn test_variations_case_insensitive_dedup() {
        for name in ["The Butterfly", "harvest home", "Tom and Jerry", "Cooley's"] {
            let variations = common_variations(name);
            let lowered: FxHashSet<String> = variations.iter().map(|v| v.to_lowercase()).collect();
            assert_eq!(lowered.len(), variations.len(), "case duplicates in {:?}", variations);
        }
    }

    #[test]
    fn test_variations_empty_name() {
        assert_eq!(common_variations(""), vec![String::new()]);
    }

    #[test]
    fn test_dedup_keeps_first_casing() {
        let deduped = dedup_case_insensitive(vec![
            "The Kesh".to_string(),
            "the kesh".to_string(),
            "Kesh".to_string(),
        ]);
        assert_eq!(deduped, vec!["The Kesh".to_string(), "Kesh".to_string()]);
    }
}
