//! Sliding-window n-gram extraction.
//!
//! Both extractors are pure: the output depends only on the input string and
//! the parameters. Empty input produces no features; input shorter than the
//! window (after padding) produces exactly one feature, the padded input.

use std::collections::HashMap;
use std::iter::repeat;

/// Separator between a repeated feature and its occurrence number.
pub const ORDINAL_SEPARATOR: char = '\u{1F}';

/// Character n-grams of `text`, padded with `boundary_length` copies of
/// `boundary` on each side.
pub fn character_ngrams(text: &str, n: usize, boundary_length: usize, boundary: char) -> Vec<String> {
    if text.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut chars: Vec<char> = Vec::with_capacity(text.len() + 2 * boundary_length);
    chars.extend(repeat(boundary).take(boundary_length));
    chars.extend(text.chars());
    chars.extend(repeat(boundary).take(boundary_length));

    if chars.len() <= n {
        return vec![chars.into_iter().collect()];
    }
    let mut out = Vec::with_capacity(chars.len() - n + 1);
    out.extend(chars.windows(n).map(|window| window.iter().collect::<String>()));
    out
}

/// Word n-grams of `text`. Words are whitespace-separated and joined with a
/// single space inside each feature; padding adds whole `boundary` words.
pub fn word_ngrams(text: &str, n: usize, boundary_length: usize, boundary: char) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let sentinel = boundary.to_string();
    let mut padded: Vec<&str> = Vec::with_capacity(words.len() + 2 * boundary_length);
    padded.extend(repeat(sentinel.as_str()).take(boundary_length));
    padded.extend(words);
    padded.extend(repeat(sentinel.as_str()).take(boundary_length));

    if padded.len() <= n {
        return vec![padded.join(" ")];
    }
    let mut out = Vec::with_capacity(padded.len() - n + 1);
    out.extend(padded.windows(n).map(|window| window.join(" ")));
    out
}

/// Make repeated features distinct by tagging the k-th repeat with `k`.
///
/// After this step a string's feature set has exactly as many members as its
/// n-gram sequence, so set sizes equal sequence lengths.
pub fn attach_ordinals(features: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(features.len());
    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let count = seen.entry(feature.clone()).or_insert(0);
        if *count == 0 {
            out.push(feature);
        } else {
            out.push(format!("{feature}{ORDINAL_SEPARATOR}{count}"));
        }
        *count += 1;
    }
    out
}
