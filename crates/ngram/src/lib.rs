//! N-gram feature extraction for approximate string matching.
//!
//! An [`NgramExtractor`] turns a normalised string into the features used by
//! the feature index and the matcher. Install and query must use the same
//! [`NgramConfig`]; the index records it and refuses mismatches.
//!
//! ```
//! use ngram::{NgramConfig, NgramExtractor};
//!
//! let extractor = NgramExtractor::new(NgramConfig::default()).unwrap();
//! assert_eq!(extractor.extract("humerus"), vec!["hum", "ume", "mer", "eru", "rus"]);
//! ```

mod config;
mod extract;

pub use config::{NgramConfig, NgramError, NgramMode};
pub use extract::{attach_ordinals, character_ngrams, word_ngrams, ORDINAL_SEPARATOR};

/// Validated extractor bound to one [`NgramConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgramExtractor {
    cfg: NgramConfig,
}

impl NgramExtractor {
    pub fn new(cfg: NgramConfig) -> Result<Self, NgramError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Character extractor of size `n` without padding.
    pub fn character(n: usize) -> Result<Self, NgramError> {
        Self::new(NgramConfig::new().with_size(n))
    }

    pub fn config(&self) -> &NgramConfig {
        &self.cfg
    }

    /// Ordered n-gram sequence; repeats are kept as-is.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let NgramConfig {
            size,
            boundary_length,
            boundary_char,
            mode,
        } = self.cfg;
        match mode {
            NgramMode::Character => character_ngrams(text, size, boundary_length, boundary_char),
            NgramMode::Word => word_ngrams(text, size, boundary_length, boundary_char),
        }
    }

    /// Distinct features: the n-gram sequence with repeats tagged by
    /// occurrence number. Its length is the string's size bucket.
    pub fn features(&self, text: &str) -> Vec<String> {
        attach_ordinals(self.extract(text))
    }

    /// Size bucket of `text`, i.e. `features(text).len()`.
    pub fn feature_count(&self, text: &str) -> usize {
        self.extract(text).len()
    }
}

impl Default for NgramExtractor {
    fn default() -> Self {
        Self {
            cfg: NgramConfig::default(),
        }
    }
}
