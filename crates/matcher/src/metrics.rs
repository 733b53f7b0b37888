// Metrics hooks for the matcher.
//
// A `MatchMetrics` implementation is handed to a searcher with
// `Simstring::with_metrics`; every search then reports its latency, result
// count and whether it was served from the query cache. Instrumentation stays
// decoupled from any specific metrics backend.
use std::time::Duration;

use similarity::Similarity;

/// Metrics observer for searches.
pub trait MatchMetrics: Send + Sync {
    /// Record the outcome of one search.
    ///
    /// `candidates` is the number of terms returned after scoring.
    fn record_search(
        &self,
        similarity: Similarity,
        latency: Duration,
        candidates: usize,
        cache_hit: bool,
    );
}
