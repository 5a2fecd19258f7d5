//! Similarity scoring between tune names.
//!
//! This module contains:
//! - The name similarity ratio (LCS by default, strsim alternatives)
//! - Composite-title splitting for recorded sets ("Carraroe Jig / Kesh Jig / Leaf Reel")
//! - `contains_as_component` on top of both

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::normalize::normalize_tune_name;

// ============================================================================
// Score Constants
// ============================================================================

/// Fixed confidence for a name found inside a composite title.
/// Clears the usual thresholds but never outranks a near-exact direct match.
pub const COMPOSITE_MATCH_SCORE: f64 = 0.9;

/// Separators between tune names in a composite title, applied in this order.
pub const COMPOSITE_SEPARATORS: [&str; 6] = [" _ ", " / ", " - ", ", ", " & ", " and "];

// ============================================================================
// Similarity
// ============================================================================

/// String similarity algorithm used for the slow path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityAlgorithm {
    /// 2 * longest common subsequence / total length. Never below
    /// `matching-blocks`, and noticeably higher on unrelated names
    /// ("tarbolton lodge" / "boys of ballisodare": 0.47 vs 0.41).
    #[default]
    Lcs,
    /// Ratcliff/Obershelp: 2 * matched chars / total length, where matches are
    /// found by taking the longest common block and recursing on either side
    MatchingBlocks,
    /// strsim normalized Levenshtein
    Levenshtein,
    /// strsim Jaro-Winkler
    JaroWinkler,
}

/// Similarity of two raw tune names in [0, 1].
///
/// Both names are normalized first; equal normalized forms score exactly 1.0.
pub fn similarity(a: &str, b: &str, algorithm: SimilarityAlgorithm) -> f64 {
    similarity_normalized(&normalize_tune_name(a), &normalize_tune_name(b), algorithm)
}

/// Similarity of two already-normalized names.
///
/// Arguments are put in lexicographic order before scoring so the result is
/// bit-for-bit symmetric for every algorithm.
pub fn similarity_normalized(a: &str, b: &str, algorithm: SimilarityAlgorithm) -> f64 {
    if a == b {
        return 1.0;
    }
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let score = match algorithm {
        SimilarityAlgorithm::Lcs => lcs_ratio(first, second),
        SimilarityAlgorithm::MatchingBlocks => matching_blocks_ratio(first, second),
        SimilarityAlgorithm::Levenshtein => strsim::normalized_levenshtein(first, second),
        SimilarityAlgorithm::JaroWinkler => strsim::jaro_winkler(first, second),
    };
    score.clamp(0.0, 1.0)
}

/// Longest common subsequence length over chars, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// 2 * LCS / (|a| + |b|). Two empty strings are identical.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common block as (start in a, start in b, length). Ties go to the
/// earliest start in `a`, then in `b`.
fn longest_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let k = curr[j + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (i, j, k) = longest_block(a, b);
    if k == 0 {
        return 0;
    }
    k + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + k..], &b[j + k..])
}

/// 2 * M / (|a| + |b|) with M from recursive longest-block matching.
pub fn matching_blocks_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

// ============================================================================
// Composite Titles
// ============================================================================

/// Split a composite title on every separator in turn (full cartesian split),
/// trimming fragments and dropping empty ones.
pub fn split_composite(composite: &str) -> Vec<String> {
    let mut parts: Vec<String> = vec![composite.to_string()];
    for sep in COMPOSITE_SEPARATORS {
        parts = parts
            .iter()
            .flat_map(|part| part.split(sep).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// A derived file name prepared for repeated composite checks.
/// Computed once per candidate and shared across every search term.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeTitle {
    lowered: String,
    /// Normalized fragments after the cartesian split
    fragments: Vec<String>,
}

impl CompositeTitle {
    pub fn new(composite: &str) -> Self {
        Self {
            lowered: composite.to_lowercase(),
            fragments: split_composite(composite)
                .iter()
                .map(|f| normalize_tune_name(f))
                .collect(),
        }
    }

    /// `target_lower` is the raw target lowercased, `target_norm` its normalized form.
    pub fn contains(
        &self,
        target_lower: &str,
        target_norm: &str,
        threshold: f64,
        algorithm: SimilarityAlgorithm,
    ) -> bool {
        if target_norm.is_empty() || target_lower.trim().is_empty() {
            return false;
        }
        if self.lowered.contains(target_lower) {
            return true;
        }
        self.fragments
            .iter()
            .any(|fragment| similarity_normalized(target_norm, fragment, algorithm) >= threshold)
    }
}

/// Whether `target` names one of the tunes run together in `composite`.
/// An empty target never matches.
pub fn contains_as_component(
    target: &str,
    composite: &str,
    threshold: f64,
    algorithm: SimilarityAlgorithm,
) -> bool {
    CompositeTitle::new(composite).contains(
        &target.to_lowercase(),
        &normalize_tune_name(target),
        threshold,
        algorithm,
    )
}

// ============================================================================
// TESTS
// ============================================================================
