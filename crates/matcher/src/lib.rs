//! # Facet Matcher (`matcher`)
//!
//! Approximate string search over a [`index::FeatureIndex`].
//!
//! A query is split into the same n-gram features the index was built with.
//! The configured [`Similarity`] metric then bounds which size buckets can
//! hold a match and how many features a candidate must share with the query
//! (`tau`). Posting lists for each bucket are merged with CP-Merge and every
//! survivor is scored exactly; candidates at or above the threshold are
//! returned best first.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use index::{FeatureIndex, IndexConfig};
//! use matcher::{MatchConfig, Simstring};
//! use ngram::NgramExtractor;
//! use similarity::Similarity;
//! use store::InMemoryStore;
//!
//! let index = FeatureIndex::open(
//!     Arc::new(InMemoryStore::new()),
//!     NgramExtractor::character(3)?,
//!     IndexConfig::default(),
//! )?;
//! index.insert_batch(&["humerus", "femur"])?;
//!
//! let searcher = Simstring::new(Arc::new(index), &MatchConfig::new(Similarity::Jaccard, 0.7))?;
//! for hit in searcher.search("humerus")? {
//!     println!("{} {:.3}", hit.term, hit.score);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Searches are read-only and a [`Simstring`] can be shared across threads;
//! [`Simstring::search_many`] fans a batch of queries out over rayon.

mod cache;
mod engine;
mod metrics;
mod types;

pub use cache::{CacheStats, QueryCache};
pub use engine::Simstring;
pub use metrics::MatchMetrics;
pub use similarity::Similarity;
pub use types::{Candidate, MatchConfig, MatchError};
