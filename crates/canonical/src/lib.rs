//! Facet canonical text layer.
//!
//! Dictionary terms and query spans are normalised by the same function
//! before feature extraction, so both sides of a match agree on case,
//! Unicode form and spacing:
//!
//! - Unicode NFKC normalisation (on by default)
//! - locale-free lowercasing (on by default)
//! - optional diacritic stripping
//! - whitespace collapsed to single spaces
//!
//! Tokenization runs on the raw input and reports byte offsets into it; the
//! resolver normalises each candidate span afterwards. No I/O, no locale
//! dependence: the same text and config give the same output everywhere.

mod config;
mod normalize;
mod token;

pub use crate::config::{CanonicalConfig, Tokenizer};
pub use crate::normalize::{collapse_whitespace, normalize, strip_diacritics};
pub use crate::token::{tokenize, Token, TokenKind};

/// Bundles a [`CanonicalConfig`] with the two operations it drives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canonicalizer {
    cfg: CanonicalConfig,
}

impl Canonicalizer {
    pub fn new(cfg: CanonicalConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &CanonicalConfig {
        &self.cfg
    }

    pub fn normalize(&self, text: &str) -> String {
        normalize(text, &self.cfg)
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        tokenize(text, self.cfg.tokenizer)
    }
}
