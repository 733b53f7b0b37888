//! Configuration for text normalisation and tokenization.
//!
//! # Examples
//!
//! ```rust
//! use canonical::{CanonicalConfig, Tokenizer};
//!
//! let config = CanonicalConfig::default();
//! assert!(config.lowercase);
//! assert!(config.normalize_unicode);
//! assert!(!config.strip_diacritics);
//! assert_eq!(config.tokenizer, Tokenizer::Alphanumeric);
//! ```

use serde::{Deserialize, Serialize};

/// How input text is split into tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tokenizer {
    /// Runs of letters and digits form words; every other visible character
    /// is a punctuation token of its own.
    #[default]
    Alphanumeric,
    /// Whitespace-delimited chunks, punctuation left attached.
    Whitespace,
}

/// Normalisation applied to dictionary terms and query spans alike.
///
/// Terms and queries must go through the same settings, otherwise features
/// extracted at install time will not line up with those of the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalConfig {
    /// Locale-free Unicode lowercasing.
    #[serde(default = "default_true")]
    pub lowercase: bool,

    /// NFKC normalisation before other transforms. Merges composed and
    /// decomposed forms ("é" vs "e" + U+0301) and compatibility characters
    /// such as ligatures and full-width digits.
    #[serde(default = "default_true")]
    pub normalize_unicode: bool,

    /// Drop combining marks after canonical decomposition ("Ménière" ->
    /// "meniere").
    #[serde(default)]
    pub strip_diacritics: bool,

    #[serde(default)]
    pub tokenizer: Tokenizer,
}

fn default_true() -> bool {
    true
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            normalize_unicode: true,
            strip_diacritics: false,
            tokenizer: Tokenizer::default(),
        }
    }
}

impl CanonicalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn with_normalize_unicode(mut self, normalize_unicode: bool) -> Self {
        self.normalize_unicode = normalize_unicode;
        self
    }

    pub fn with_strip_diacritics(mut self, strip_diacritics: bool) -> Self {
        self.strip_diacritics = strip_diacritics;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: CanonicalConfig = serde_json::from_str(r#"{"strip_diacritics": true}"#).unwrap();
        assert!(cfg.lowercase);
        assert!(cfg.normalize_unicode);
        assert!(cfg.strip_diacritics);
        assert_eq!(cfg.tokenizer, Tokenizer::Alphanumeric);
    }

    #[test]
    fn tokenizer_names_are_snake_case() {
        let cfg: CanonicalConfig = serde_json::from_str(r#"{"tokenizer": "whitespace"}"#).unwrap();
        assert_eq!(cfg.tokenizer, Tokenizer::Whitespace);
        assert_eq!(
            serde_json::to_string(&Tokenizer::Alphanumeric).unwrap(),
            "\"alphanumeric\""
        );
    }
}
