//! # Facet Concepts (`concepts`)
//!
//! Maps approximate string matches back to concepts.
//!
//! - [`ConceptDictionary`] stores surface term -> CUI and CUI -> semantic
//!   types over any [`store::KvStore`].
//! - [`Resolver`] cuts candidate spans of up to `window` tokens from a
//!   tokenized text, searches each normalised span with a
//!   [`matcher::Simstring`], attaches concepts, and resolves overlapping
//!   spans with an [`OverlapPolicy`].
//!
//! Terms the matcher returns but the dictionary does not know are dropped;
//! missing keys are ordinary empty results throughout.

mod dictionary;
mod error;
mod resolver;
mod semtypes;
mod span;

pub use dictionary::{
    ConceptDictionary, ConceptEntry, ConceptRecord, DictionaryReport, TermEntry,
    DICTIONARY_SCHEMA_VERSION,
};
pub use error::ConceptError;
pub use resolver::{resolve_overlaps, ConceptMatch, OverlapPolicy, Resolver, ResolverConfig};
pub use semtypes::{expand_semtypes, semtype_name, ACCEPTED_SEMTYPES, DEFAULT_SEMTYPES_KEYWORD};
pub use span::{generate_spans, is_negation, is_stopword, Span, SpanStrategy, NEGATIONS, STOPWORDS};
