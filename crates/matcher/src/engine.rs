use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;

use index::FeatureIndex;
use rayon::prelude::*;
use similarity::{validate_threshold, Similarity};
use tracing::{debug, trace};

use crate::cache::QueryCache;
use crate::metrics::MatchMetrics;
use crate::types::{Candidate, MatchConfig, MatchError};


/// Scores within this distance below the threshold still pass.
const SCORE_TOLERANCE: f64 = 1e-9;

/// Approximate string searcher over a [`FeatureIndex`].
///
/// For each candidate size admitted by the metric, the posting lists of the
/// query's features are merged with CP-Merge: only strings sharing at least
/// `tau` features can reach the threshold, so the shortest `x - tau + 1`
/// lists produce every candidate and the remaining lists are only searched.
#[derive(Clone)]
pub struct Simstring {
    index: Arc<FeatureIndex>,
    similarity: Similarity,
    threshold: f64,
    cache: Option<Arc<QueryCache>>,
    metrics: Option<Arc<dyn MatchMetrics>>,
}

impl Simstring {
    pub fn new(index: Arc<FeatureIndex>, cfg: &MatchConfig) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self {
            index,
            similarity: cfg.similarity,
            threshold: cfg.threshold,
            cache: None,
            metrics: None,
        })
    }

    /// Serve repeated queries from `cache`.
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn index(&self) -> &Arc<FeatureIndex> {
        &self.index
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn cache(&self) -> Option<&Arc<QueryCache>> {
        self.cache.as_ref()
    }

    /// Search with the configured threshold.
    pub fn search(&self, query: &str) -> Result<Vec<Candidate>, MatchError> {
        self.search_with_threshold(query, self.threshold)
    }

    /// All installed terms scoring at least `threshold` against `query`,
    /// best first. Ties are ordered by term.
    pub fn search_with_threshold(
        &self,
        query: &str,
        threshold: f64,
    ) -> Result<Vec<Candidate>, MatchError> {
        let threshold = validate_threshold(threshold)?;
        let span = tracing::debug_span!(
            "simstring.search",
            similarity = self.similarity.name(),
            threshold
        );
        let _guard = span.enter();
        let start = Instant::now();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(query, self.similarity, threshold) {
                self.record(start, hit.len(), true);
                return Ok(hit.as_ref().clone());
            }
        }

        let candidates = self.run_search(query, threshold)?;
        if let Some(cache) = &self.cache {
            cache.put(query, self.similarity, threshold, Arc::new(candidates.clone()));
        }
        self.record(start, candidates.len(), false);
        Ok(candidates)
    }

    /// Run independent queries in parallel. Results keep the input order.
    pub fn search_many<S: AsRef<str> + Sync>(
        &self,
        queries: &[S],
    ) -> Result<Vec<Vec<Candidate>>, MatchError> {
        queries
            .par_iter()
            .map(|query| self.search(query.as_ref()))
            .collect()
    }

    /// Candidate sizes for a query of `size` features, clamped to the largest
    /// installed size. Empty when nothing can match.
    pub fn candidate_range(&self, size: usize, threshold: f64) -> RangeInclusive<usize> {
        let lo = self.similarity.min_size(size, threshold).max(1);
        let hi = self
            .similarity
            .max_size(size, threshold)
            .min(self.index.global_max_features());
        lo..=hi
    }

    fn run_search(&self, query: &str, threshold: f64) -> Result<Vec<Candidate>, MatchError> {
        let extractor = self.index.extractor();
        let features = extractor.features(query);
        let x = features.len();
        if x == 0 {
            return Ok(Vec::new());
        }

        let range = self.candidate_range(x, threshold);
        debug!(
            query,
            features = x,
            min_size = *range.start(),
            max_size = *range.end(),
            "searching size buckets"
        );

        let mut results = Vec::new();
        for y in range {
            let tau = self.similarity.min_overlap(x, y, threshold);
            if tau > x.min(y) {
                continue;
            }
            for term in self.overlap_join(&features, y, tau)? {
                let score = self
                    .similarity
                    .similarity(&features, &extractor.features(&term));
                trace!(term = %term, size = y, score, "scored candidate");
                if score + SCORE_TOLERANCE >= threshold {
                    results.push(Candidate { term, score });
                }
            }
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.term.cmp(&b.term))
        });
        Ok(results)
    }

    /// Terms of `size` features present in at least `tau` of the query's
    /// posting lists.
    ///
    /// Every posting list is fetched up front so the lists can be ordered by
    /// length; on networked backends this costs one round trip per feature.
    fn overlap_join(
        &self,
        features: &[String],
        size: usize,
        tau: usize,
    ) -> Result<Vec<String>, MatchError> {
        let mut lists = features
            .iter()
            .map(|feature| self.index.lookup(size, feature))
            .collect::<Result<Vec<_>, _>>()?;
        lists.sort_by_key(Vec::len);

        let total = lists.len();
        if tau == 0 || tau > total {
            return Ok(Vec::new());
        }
        let split = total - tau + 1;

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for list in &lists[..split] {
            for term in list {
                *counts.entry(term.as_str()).or_default() += 1;
            }
        }

        let mut matched = Vec::new();
        let mut pending: Vec<(&str, usize)> = Vec::with_capacity(counts.len());
        for (term, count) in counts {
            if count >= tau {
                matched.push(term.to_string());
            } else {
                pending.push((term, count));
            }
        }

        for (offset, list) in lists[split..].iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            let remaining = total - split - offset - 1;
            pending.retain_mut(|(term, count)| {
                if list
                    .binary_search_by(|entry| entry.as_str().cmp(term))
                    .is_ok()
                {
                    *count += 1;
                }
                if *count >= tau {
                    matched.push((*term).to_string());
                    return false;
                }
                *count + remaining >= tau
            });
        }

        Ok(matched)
    }

    fn record(&self, start: Instant, candidates: usize, cache_hit: bool) {
        let latency = start.elapsed();
        debug!(
            candidates,
            cache_hit,
            elapsed_micros = latency.as_micros() as u64,
            "search complete"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_search(self.similarity, latency, candidates, cache_hit);
        }
    }
}
