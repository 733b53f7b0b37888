//! Configuration and error types for n-gram extraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit the sliding window moves over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NgramMode {
    /// Windows of `size` characters.
    #[default]
    Character,
    /// Windows of `size` whitespace-separated words, joined by a single space.
    Word,
}

/// Settings shared by install and query so both sides produce identical features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgramConfig {
    /// Number of characters (or words) per feature.
    #[serde(default = "default_size")]
    pub size: usize,
    /// Sentinels added on each side before windowing. Zero disables padding.
    ///
    /// Padding makes prefix and suffix n-grams distinct from inner ones,
    /// which raises precision for short strings.
    #[serde(default)]
    pub boundary_length: usize,
    /// Sentinel used for padding (a whole sentinel word in word mode).
    #[serde(default = "default_boundary_char")]
    pub boundary_char: char,
    #[serde(default)]
    pub mode: NgramMode,
}

fn default_size() -> usize {
    3
}

fn default_boundary_char() -> char {
    '$'
}

impl Default for NgramConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            boundary_length: 0,
            boundary_char: default_boundary_char(),
            mode: NgramMode::Character,
        }
    }
}

impl NgramConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_boundary_length(mut self, boundary_length: usize) -> Self {
        self.boundary_length = boundary_length;
        self
    }

    pub fn with_boundary_char(mut self, boundary_char: char) -> Self {
        self.boundary_char = boundary_char;
        self
    }

    pub fn with_mode(mut self, mode: NgramMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), NgramError> {
        if self.size == 0 {
            return Err(NgramError::InvalidSize { size: self.size });
        }
        if self.boundary_char.is_whitespace() && self.mode == NgramMode::Word {
            return Err(NgramError::InvalidBoundary {
                boundary: self.boundary_char,
            });
        }
        Ok(())
    }
}

/// Errors raised by an invalid extractor configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NgramError {
    #[error("invalid parameter: n-gram size must be at least 1 (got {size})")]
    InvalidSize { size: usize },
    #[error("invalid parameter: boundary {boundary:?} would be lost by whitespace word splitting")]
    InvalidBoundary { boundary: char },
}
