use matcher::MatchError;
use store::StoreError;
use thiserror::Error;

/// Errors from the concept dictionary and resolver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConceptError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("corrupt dictionary entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}
