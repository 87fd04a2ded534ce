//! Near-duplicate detection for caption text.
//!
//! The thresholds here (30% length ratio, 3-word cutoff, 0.70 word overlap)
//! were tuned against real caption streams. Downstream dedup behavior depends
//! on them exactly, false positives and negatives included, so they
//! are pinned by tests and must not be "improved" casually.

use std::collections::HashSet;

const LENGTH_RATIO: f64 = 0.30;
const FEW_WORDS: usize = 3;
const WORD_OVERLAP: f64 = 0.70;

/// Heuristic near-duplication check, three branches:
///
/// 1. lengths differing by more than 30% of the shorter string → not similar;
/// 2. either side has ≤ 3 words → similar iff one is a substring of the other;
/// 3. otherwise similar iff the fraction of `a`'s words that also occur in
///    `b`, relative to the longer word count, exceeds 0.70.
pub fn is_similar_text(a: &str, b: &str) -> bool {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return false;
    }

    let shorter = len_a.min(len_b);
    if len_a.abs_diff(len_b) as f64 > shorter as f64 * LENGTH_RATIO {
        return false;
    }

    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();

    if words_a.len() <= FEW_WORDS || words_b.len() <= FEW_WORDS {
        return a.contains(b) || b.contains(a);
    }

    let b_set: HashSet<&str> = words_b.iter().copied().collect();
    let overlap = words_a.iter().filter(|w| b_set.contains(*w)).count();
    let longer = words_a.len().max(words_b.len());

    overlap as f64 / longer as f64 > WORD_OVERLAP
}
