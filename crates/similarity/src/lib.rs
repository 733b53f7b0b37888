//! Set-similarity metrics over n-gram feature sets.
//!
//! Besides the score itself, every metric knows how to invert its formula for
//! a threshold `t`: the smallest and largest candidate size that can still
//! reach `t` against a query of size `x`, and the minimum number of shared
//! features `tau` two strings of sizes `x` and `y` must have. The matcher uses
//! these bounds to skip whole length buckets and to prune candidates while
//! merging posting lists.
//!
//! Bounds are rounded with a small tolerance so that products such as
//! `0.7 * 10` that land a hair above an integer do not tighten a bound by one.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimilarityError {
    #[error("invalid parameter: unknown similarity metric {0:?} (expected one of dice, jaccard, cosine, overlap, exact, hamming)")]
    UnknownMetric(String),
    #[error("invalid parameter: threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// Supported similarity metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Similarity {
    /// `2n / (x + y)`
    Dice,
    /// `n / (x + y - n)`
    #[default]
    Jaccard,
    /// `n / sqrt(x * y)`
    Cosine,
    /// `n / min(x, y)`
    Overlap,
    /// `1` when both sets are identical, `0` otherwise.
    Exact,
    /// `1 - |x - y| / max(x, y)`; depends on sizes only.
    Hamming,
}

impl Similarity {
    pub const ALL: [Similarity; 6] = [
        Similarity::Dice,
        Similarity::Jaccard,
        Similarity::Cosine,
        Similarity::Overlap,
        Similarity::Exact,
        Similarity::Hamming,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Similarity::Dice => "dice",
            Similarity::Jaccard => "jaccard",
            Similarity::Cosine => "cosine",
            Similarity::Overlap => "overlap",
            Similarity::Exact => "exact",
            Similarity::Hamming => "hamming",
        }
    }

    /// Score for set sizes `x`, `y` sharing `n` features. Empty sets score 0.
    pub fn score(&self, x: usize, y: usize, n: usize) -> f64 {
        if x == 0 || y == 0 {
            return 0.0;
        }
        let n = n.min(x).min(y) as f64;
        let (xf, yf) = (x as f64, y as f64);
        match self {
            Similarity::Dice => 2.0 * n / (xf + yf),
            Similarity::Jaccard => n / (xf + yf - n),
            Similarity::Cosine => n / (xf * yf).sqrt(),
            Similarity::Overlap => n / xf.min(yf),
            Similarity::Exact => {
                if x == y && n == xf {
                    1.0
                } else {
                    0.0
                }
            }
            Similarity::Hamming => 1.0 - (xf - yf).abs() / xf.max(yf),
        }
    }

    /// Smallest candidate size that can reach `t` against a query of size `x`.
    pub fn min_size(&self, x: usize, t: f64) -> usize {
        let xf = x as f64;
        match self {
            Similarity::Dice => ceil(t / (2.0 - t) * xf),
            Similarity::Jaccard | Similarity::Hamming => ceil(t * xf),
            Similarity::Cosine => ceil(t * t * xf),
            Similarity::Overlap => 1,
            Similarity::Exact => x,
        }
    }

    /// Largest candidate size that can reach `t` against a query of size `x`.
    ///
    /// Overlap is unbounded above; callers clamp to the largest installed size.
    pub fn max_size(&self, x: usize, t: f64) -> usize {
        let xf = x as f64;
        match self {
            Similarity::Dice => floor((2.0 - t) / t * xf),
            Similarity::Jaccard | Similarity::Hamming => floor(xf / t),
            Similarity::Cosine => floor(xf / (t * t)),
            Similarity::Overlap => usize::MAX,
            Similarity::Exact => x,
        }
    }

    /// Minimum shared features (`tau`) for sizes `x`, `y` to reach `t`.
    /// Never below 1: a candidate must share a feature to be retrieved at all.
    pub fn min_overlap(&self, x: usize, y: usize, t: f64) -> usize {
        let (xf, yf) = (x as f64, y as f64);
        let tau = match self {
            Similarity::Dice => ceil(0.5 * t * (xf + yf)),
            Similarity::Jaccard => ceil(t * (xf + yf) / (1.0 + t)),
            Similarity::Cosine => ceil(t * (xf * yf).sqrt()),
            Similarity::Overlap => ceil(t * xf.min(yf)),
            Similarity::Exact => x,
            Similarity::Hamming => 1,
        };
        tau.max(1)
    }

    /// Score two feature sequences directly. Duplicates count once.
    pub fn similarity<T: Eq + Hash>(&self, a: &[T], b: &[T]) -> f64 {
        let left: HashSet<&T> = a.iter().collect();
        let right: HashSet<&T> = b.iter().collect();
        let shared = left.intersection(&right).count();
        self.score(left.len(), right.len(), shared)
    }
}

fn ceil(value: f64) -> usize {
    let rounded = (value - EPSILON).ceil();
    if rounded <= 0.0 {
        0
    } else {
        rounded as usize
    }
}

fn floor(value: f64) -> usize {
    let rounded = (value + EPSILON).floor();
    if rounded <= 0.0 {
        0
    } else if rounded >= usize::MAX as f64 {
        usize::MAX
    } else {
        rounded as usize
    }
}

/// Checks `t` is a usable threshold.
pub fn validate_threshold(t: f64) -> Result<f64, SimilarityError> {
    if t.is_finite() && t > 0.0 && t <= 1.0 {
        Ok(t)
    } else {
        Err(SimilarityError::InvalidThreshold(t))
    }
}

impl FromStr for Similarity {
    type Err = SimilarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Similarity::ALL
            .into_iter()
            .find(|metric| metric.name() == wanted)
            .ok_or_else(|| SimilarityError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: [f64; 6] = [0.1, 0.3, 0.5, 0.7, 0.9, 1.0];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn parse_names_case_insensitively() {
        assert_eq!("Jaccard".parse::<Similarity>().unwrap(), Similarity::Jaccard);
        assert_eq!(" dice ".parse::<Similarity>().unwrap(), Similarity::Dice);
        for metric in Similarity::ALL {
            assert_eq!(metric.to_string().parse::<Similarity>().unwrap(), metric);
        }
    }

    #[test]
    fn parse_unknown_metric_is_invalid_parameter() {
        let err = "levenshtein".parse::<Similarity>().unwrap_err();
        assert_eq!(err, SimilarityError::UnknownMetric("levenshtein".into()));
    }

    #[test]
    fn threshold_validation() {
        assert!(validate_threshold(0.7).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        for bad in [0.0, -0.1, 1.01, f64::NAN, f64::INFINITY] {
            assert!(validate_threshold(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn score_formulas() {
        assert!(approx(Similarity::Dice.score(4, 6, 3), 0.6));
        assert!(approx(Similarity::Jaccard.score(4, 6, 3), 3.0 / 7.0));
        assert!(approx(Similarity::Cosine.score(4, 9, 3), 0.5));
        assert!(approx(Similarity::Overlap.score(4, 6, 3), 0.75));
        assert!(approx(Similarity::Exact.score(4, 4, 4), 1.0));
        assert!(approx(Similarity::Exact.score(4, 4, 3), 0.0));
        assert!(approx(Similarity::Hamming.score(4, 8, 1), 0.5));
    }

    #[test]
    fn empty_sets_score_zero() {
        for metric in Similarity::ALL {
            assert_eq!(metric.score(0, 5, 0), 0.0);
            assert_eq!(metric.score(0, 0, 0), 0.0);
        }
    }

    #[test]
    fn scores_stay_in_unit_interval_and_hit_one_only_on_identity() {
        for metric in Similarity::ALL {
            for x in 1..=12 {
                for y in 1..=12 {
                    for n in 0..=x.min(y) {
                        let s = metric.score(x, y, n);
                        assert!((0.0..=1.0).contains(&s), "{metric} {x} {y} {n} -> {s}");
                        let is_one = approx(s, 1.0);
                        match metric {
                            Similarity::Hamming => assert_eq!(is_one, x == y),
                            // n / min(x, y) saturates whenever the smaller set is contained.
                            Similarity::Overlap => assert_eq!(is_one, n == x.min(y)),
                            _ => assert_eq!(is_one, x == y && y == n, "{metric} {x} {y} {n}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn size_bounds_bracket_the_query_size() {
        for metric in Similarity::ALL {
            for &t in &THRESHOLDS {
                for x in 1..=40 {
                    let lo = metric.min_size(x, t);
                    let hi = metric.max_size(x, t);
                    assert!(lo <= x && x <= hi, "{metric} t={t} x={x} [{lo}, {hi}]");
                }
            }
        }
    }

    #[test]
    fn jaccard_bounds_match_closed_form() {
        assert_eq!(Similarity::Jaccard.min_size(10, 0.7), 7);
        assert_eq!(Similarity::Jaccard.max_size(10, 0.7), 14);
        assert_eq!(Similarity::Jaccard.min_overlap(5, 5, 0.7), 5);
        assert_eq!(Similarity::Jaccard.min_overlap(10, 10, 0.5), 7);
    }

    #[test]
    fn bounds_are_not_tighter_than_reachable_scores() {
        // Any (y, n) pair that reaches t must satisfy the size and overlap bounds.
        for metric in [
            Similarity::Dice,
            Similarity::Jaccard,
            Similarity::Cosine,
            Similarity::Overlap,
            Similarity::Hamming,
        ] {
            for &t in &THRESHOLDS {
                for x in 1..=20 {
                    for y in 1..=45 {
                        for n in 1..=x.min(y) {
                            if metric.score(x, y, n) + 1e-12 >= t {
                                assert!(metric.min_size(x, t) <= y, "{metric} min t={t} x={x} y={y}");
                                assert!(y <= metric.max_size(x, t), "{metric} max t={t} x={x} y={y}");
                                assert!(
                                    metric.min_overlap(x, y, t) <= n,
                                    "{metric} tau t={t} x={x} y={y} n={n}"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn full_threshold_requires_identity_for_set_metrics() {
        for metric in [Similarity::Dice, Similarity::Jaccard, Similarity::Cosine] {
            assert_eq!(metric.min_size(6, 1.0), 6);
            assert_eq!(metric.max_size(6, 1.0), 6);
            assert_eq!(metric.min_overlap(6, 6, 1.0), 6);
        }
    }

    #[test]
    fn similarity_counts_distinct_features() {
        let a = ["hum", "ume", "mer", "eru", "rus"];
        let b = ["hum", "ume", "mer", "era", "ral"];
        assert!(approx(Similarity::Jaccard.similarity(&a, &b), 3.0 / 7.0));
        assert!(approx(Similarity::Exact.similarity(&a, &a), 1.0));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let metric: Similarity = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(metric, Similarity::Cosine);
        assert_eq!(serde_json::to_string(&Similarity::Hamming).unwrap(), "\"hamming\"");
    }
}
