//! LRU cache in front of the feature index.
//!
//! The cache is owned by whoever builds the searcher and injected explicitly.
//! Results go stale once new terms are installed, so install must finish
//! with [`QueryCache::invalidate`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use similarity::Similarity;

use crate::types::{Candidate, MatchError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    similarity: Similarity,
    threshold_bits: u64,
}

/// Hit/miss counters since construction or the last invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct QueryCache {
    entries: Mutex<LruCache<CacheKey, Arc<Vec<Candidate>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Result<Self, MatchError> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            MatchError::InvalidParameter("query cache capacity must be greater than zero".into())
        })?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn get(&self, query: &str, similarity: Similarity, threshold: f64) -> Option<Arc<Vec<Candidate>>> {
        let key = CacheKey {
            query: query.to_string(),
            similarity,
            threshold_bits: threshold.to_bits(),
        };
        let found = self.entries.lock().get(&key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn put(&self, query: &str, similarity: Similarity, threshold: f64, candidates: Arc<Vec<Candidate>>) {
        let key = CacheKey {
            query: query.to_string(),
            similarity,
            threshold_bits: threshold.to_bits(),
        };
        self.entries.lock().put(key, candidates);
    }

    /// Drop every cached result and reset the counters.
    pub fn invalidate(&self) {
        self.entries.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        tracing::debug!("query cache invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(term: &str) -> Arc<Vec<Candidate>> {
        Arc::new(vec![Candidate {
            term: term.into(),
            score: 1.0,
        }])
    }

    #[test]
    fn zero_capacity_is_invalid() {
        assert!(matches!(
            QueryCache::new(0),
            Err(MatchError::InvalidParameter(_))
        ));
    }

    #[test]
    fn keys_include_metric_and_threshold() {
        let cache = QueryCache::new(8).unwrap();
        cache.put("humerus", Similarity::Jaccard, 0.7, hit("humerus"));

        assert!(cache.get("humerus", Similarity::Jaccard, 0.7).is_some());
        assert!(cache.get("humerus", Similarity::Jaccard, 0.8).is_none());
        assert!(cache.get("humerus", Similarity::Dice, 0.7).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = QueryCache::new(2).unwrap();
        cache.put("a", Similarity::Jaccard, 0.7, hit("a"));
        cache.put("b", Similarity::Jaccard, 0.7, hit("b"));
        assert!(cache.get("a", Similarity::Jaccard, 0.7).is_some());
        cache.put("c", Similarity::Jaccard, 0.7, hit("c"));
        assert!(cache.get("b", Similarity::Jaccard, 0.7).is_none());
        assert!(cache.get("a", Similarity::Jaccard, 0.7).is_some());
    }

    #[test]
    fn invalidate_clears_entries_and_counters() {
        let cache = QueryCache::new(4).unwrap();
        cache.put("a", Similarity::Jaccard, 0.7, hit("a"));
        let _ = cache.get("a", Similarity::Jaccard, 0.7);
        cache.invalidate();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
