use index::IndexError;
use serde::{Deserialize, Serialize};
use similarity::{validate_threshold, Similarity, SimilarityError};
use thiserror::Error;

/// Searcher configuration.
///
/// `MatchConfig` is cheap to clone and serde-friendly so it can be embedded
/// in higher-level configs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchConfig {
    /// Similarity metric used for bounds and scoring.
    #[serde(default)]
    pub similarity: Similarity,
    /// Minimum score a candidate must reach, in (0, 1].
    #[serde(default = "MatchConfig::default_threshold")]
    pub threshold: f64,
    /// Capacity of the query cache; 0 disables caching.
    #[serde(default)]
    pub cache_capacity: usize,
}

impl MatchConfig {
    pub(crate) fn default_threshold() -> f64 {
        0.7
    }

    pub fn new(similarity: Similarity, threshold: f64) -> Self {
        Self {
            similarity,
            threshold,
            cache_capacity: 0,
        }
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Validate the configuration. Called once at searcher construction.
    pub fn validate(&self) -> Result<(), MatchError> {
        validate_threshold(self.threshold)?;
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig::new(Similarity::default(), Self::default_threshold())
    }
}

/// A term retrieved for a query, with its exact similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub term: String,
    pub score: f64,
}

/// Errors produced by the matching layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    /// Invalid searcher parameter (threshold, metric, cache size).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(transparent)]
    Similarity(#[from] SimilarityError),
    /// Errors bubbled up from the index (and through it, the store).
    #[error(transparent)]
    Index(#[from] IndexError),
}
