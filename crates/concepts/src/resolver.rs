use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use canonical::{Canonicalizer, Token};
use matcher::Simstring;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dictionary::ConceptDictionary;
use crate::error::ConceptError;
use crate::semtypes::expand_semtypes;
use crate::span::{generate_spans, Span, SpanStrategy};

/// Which of two overlapping matches survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Highest similarity first, longer span breaks ties.
    #[default]
    Score,
    /// Longest span first, similarity breaks ties.
    Length,
}

impl FromStr for OverlapPolicy {
    type Err = ConceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "score" => Ok(OverlapPolicy::Score),
            "length" => Ok(OverlapPolicy::Length),
            other => Err(ConceptError::InvalidParameter(format!(
                "unknown overlap policy {other:?} (expected score or length)"
            ))),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverlapPolicy::Score => "score",
            OverlapPolicy::Length => "length",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum tokens per candidate span.
    #[serde(default = "ResolverConfig::default_window")]
    pub window: usize,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    /// Minimum span length in characters.
    #[serde(default = "ResolverConfig::default_min_match_length")]
    pub min_match_length: usize,
    /// Keep one group per overlapping region instead of all of them.
    #[serde(default = "ResolverConfig::default_best_match")]
    pub best_match: bool,
    /// Semantic types to keep; `None` keeps everything. The entry
    /// `"default"` stands for the clinical accepted set.
    #[serde(default)]
    pub accepted_semtypes: Option<Vec<String>>,
    #[serde(default)]
    pub span_strategy: SpanStrategy,
}

impl ResolverConfig {
    fn default_window() -> usize {
        5
    }

    fn default_min_match_length() -> usize {
        3
    }

    fn default_best_match() -> bool {
        true
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_overlap_policy(mut self, overlap_policy: OverlapPolicy) -> Self {
        self.overlap_policy = overlap_policy;
        self
    }

    pub fn with_min_match_length(mut self, min_match_length: usize) -> Self {
        self.min_match_length = min_match_length;
        self
    }

    pub fn with_best_match(mut self, best_match: bool) -> Self {
        self.best_match = best_match;
        self
    }

    pub fn with_accepted_semtypes<S: Into<String>>(
        mut self,
        semtypes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.accepted_semtypes = Some(semtypes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_span_strategy(mut self, span_strategy: SpanStrategy) -> Self {
        self.span_strategy = span_strategy;
        self
    }

    pub fn validate(&self) -> Result<(), ConceptError> {
        if self.window == 0 {
            return Err(ConceptError::InvalidParameter(
                "resolver window must be at least one token".into(),
            ));
        }
        if let Some(semtypes) = &self.accepted_semtypes {
            if expand_semtypes(semtypes).is_empty() {
                return Err(ConceptError::InvalidParameter(
                    "accepted_semtypes is empty; omit it to accept every type".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            window: Self::default_window(),
            overlap_policy: OverlapPolicy::default(),
            min_match_length: Self::default_min_match_length(),
            best_match: Self::default_best_match(),
            accepted_semtypes: None,
            span_strategy: SpanStrategy::default(),
        }
    }
}

/// A dictionary concept found in the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMatch {
    /// Byte offset (inclusive) of the span in the source text.
    pub start: usize,
    /// Byte offset (exclusive).
    pub end: usize,
    /// Normalised span text that was searched.
    pub ngram: String,
    /// Installed term it matched.
    pub term: String,
    pub cui: String,
    pub similarity: f64,
    pub semtypes: Vec<String>,
    /// `term` is the preferred name of `cui`.
    pub preferred: bool,
}

impl ConceptMatch {
    fn span_len(&self) -> usize {
        self.end - self.start
    }

    fn rank(&self) -> f64 {
        self.similarity + if self.preferred { 1.0 } else { 0.0 }
    }

    fn overlaps(&self, other: &ConceptMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Turns token spans into concept matches.
pub struct Resolver {
    cfg: ResolverConfig,
    accepted: Option<BTreeSet<String>>,
    canonicalizer: Canonicalizer,
    dictionary: Arc<ConceptDictionary>,
}

impl Resolver {
    pub fn new(
        cfg: ResolverConfig,
        canonicalizer: Canonicalizer,
        dictionary: Arc<ConceptDictionary>,
    ) -> Result<Self, ConceptError> {
        cfg.validate()?;
        let accepted = cfg.accepted_semtypes.as_deref().map(expand_semtypes);
        Ok(Self {
            cfg,
            accepted,
            canonicalizer,
            dictionary,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.cfg
    }

    pub fn dictionary(&self) -> &Arc<ConceptDictionary> {
        &self.dictionary
    }

    /// Tokenize `text` with the resolver's canonicalizer, then
    /// [`extract`](Self::extract).
    pub fn extract_text(
        &self,
        text: &str,
        searcher: &Simstring,
    ) -> Result<Vec<Vec<ConceptMatch>>, ConceptError> {
        let tokens = self.canonicalizer.tokenize(text);
        self.extract(text, &tokens, searcher)
    }

    /// Match every candidate span of `tokens` and group the results per
    /// span. Each group is ordered best first; groups are in text order.
    pub fn extract(
        &self,
        text: &str,
        tokens: &[Token],
        searcher: &Simstring,
    ) -> Result<Vec<Vec<ConceptMatch>>, ConceptError> {
        let spans = generate_spans(
            text,
            tokens,
            self.cfg.window,
            self.cfg.min_match_length,
            self.cfg.span_strategy,
        );
        let groups = spans
            .par_iter()
            .map(|span| self.match_span(text, span, searcher))
            .collect::<Result<Vec<_>, _>>()?;
        let groups: Vec<Vec<ConceptMatch>> =
            groups.into_iter().filter(|g| !g.is_empty()).collect();

        debug!(
            tokens = tokens.len(),
            spans = spans.len(),
            groups = groups.len(),
            best_match = self.cfg.best_match,
            "spans resolved"
        );
        if self.cfg.best_match {
            Ok(resolve_overlaps(groups, self.cfg.overlap_policy))
        } else {
            Ok(groups)
        }
    }

    fn match_span(
        &self,
        text: &str,
        span: &Span,
        searcher: &Simstring,
    ) -> Result<Vec<ConceptMatch>, ConceptError> {
        let Some(raw) = text.get(span.start..span.end) else {
            return Ok(Vec::new());
        };
        let ngram = self.canonicalizer.normalize(raw);
        if ngram.is_empty() {
            return Ok(Vec::new());
        }

        let mut best: BTreeMap<String, ConceptMatch> = BTreeMap::new();
        for candidate in searcher.search(&ngram)? {
            if candidate.score <= 0.0 {
                continue;
            }
            for entry in self.dictionary.lookup_term(&candidate.term)? {
                let semtypes: Vec<String> = match self.dictionary.lookup_concept(&entry.cui)? {
                    Some(record) => record.semtypes.into_iter().collect(),
                    None => Vec::new(),
                };
                let semtypes = match &self.accepted {
                    Some(accepted) => {
                        let kept: Vec<String> = semtypes
                            .into_iter()
                            .filter(|s| accepted.contains(s))
                            .collect();
                        if kept.is_empty() {
                            continue;
                        }
                        kept
                    }
                    None => semtypes,
                };
                let found = ConceptMatch {
                    start: span.start,
                    end: span.end,
                    ngram: ngram.clone(),
                    term: candidate.term.clone(),
                    cui: entry.cui,
                    similarity: candidate.score,
                    semtypes,
                    preferred: entry.preferred,
                };
                let replace = match best.get(&found.cui) {
                    Some(existing) => {
                        found.similarity > existing.similarity
                            || (found.similarity == existing.similarity
                                && found.preferred
                                && !existing.preferred)
                    }
                    None => true,
                };
                if replace {
                    best.insert(found.cui.clone(), found);
                }
            }
        }

        let mut group: Vec<ConceptMatch> = best.into_values().collect();
        group.sort_by(|a, b| b.rank().total_cmp(&a.rank()).then_with(|| a.cui.cmp(&b.cui)));
        Ok(group)
    }
}

/// Keep the best group per overlapping region.
///
/// Groups are visited in `policy` order and kept unless their span overlaps
/// an already kept one; spans are half-open, so touching spans do not
/// overlap. Ties keep input order. The result is in text order.
pub fn resolve_overlaps(
    groups: Vec<Vec<ConceptMatch>>,
    policy: OverlapPolicy,
) -> Vec<Vec<ConceptMatch>> {
    let mut ordered: Vec<Vec<ConceptMatch>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    ordered.sort_by(|a, b| compare_heads(&b[0], &a[0], policy));

    let mut kept: Vec<Vec<ConceptMatch>> = Vec::with_capacity(ordered.len());
    for group in ordered {
        if kept.iter().any(|k| k[0].overlaps(&group[0])) {
            continue;
        }
        kept.push(group);
    }
    kept.sort_by_key(|g| (g[0].start, g[0].end));
    kept
}

fn compare_heads(a: &ConceptMatch, b: &ConceptMatch, policy: OverlapPolicy) -> Ordering {
    match policy {
        OverlapPolicy::Score => a
            .similarity
            .total_cmp(&b.similarity)
            .then_with(|| a.span_len().cmp(&b.span_len())),
        OverlapPolicy::Length => a
            .span_len()
            .cmp(&b.span_len())
            .then_with(|| a.similarity.total_cmp(&b.similarity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::TermEntry;
    use canonical::TokenKind;
    use index::{FeatureIndex, IndexConfig};
    use matcher::{MatchConfig, Similarity};
    use ngram::NgramExtractor;
    use store::{InMemoryStore, Serializer};

    const TEXT: &str = "fracture of the humerus bone";

    fn fixture(entries: &[TermEntry], extra_terms: &[&str]) -> (Arc<ConceptDictionary>, Simstring) {
        let index = FeatureIndex::open(
            Arc::new(InMemoryStore::new()),
            NgramExtractor::character(3).unwrap(),
            IndexConfig::default(),
        )
        .unwrap();
        let mut terms: Vec<&str> = entries.iter().map(|e| e.term.as_str()).collect();
        terms.extend_from_slice(extra_terms);
        index.insert_batch(&terms).unwrap();

        let dictionary =
            ConceptDictionary::open(Arc::new(InMemoryStore::new()), Serializer::Json).unwrap();
        dictionary.add_batch(entries, 16).unwrap();

        let searcher = Simstring::new(
            Arc::new(index),
            &MatchConfig::new(Similarity::Jaccard, 0.7),
        )
        .unwrap();
        (Arc::new(dictionary), searcher)
    }

    fn resolver(cfg: ResolverConfig, dictionary: Arc<ConceptDictionary>) -> Resolver {
        Resolver::new(cfg, Canonicalizer::default(), dictionary).unwrap()
    }

    fn matched(start: usize, end: usize, cui: &str, similarity: f64) -> ConceptMatch {
        ConceptMatch {
            start,
            end,
            ngram: String::new(),
            term: String::new(),
            cui: cui.into(),
            similarity,
            semtypes: Vec::new(),
            preferred: false,
        }
    }

    fn humerus() -> TermEntry {
        TermEntry::new("humerus", "C0020164")
            .with_semtypes(["T023"])
            .with_preferred(true)
    }

    #[test]
    fn finds_exact_concept_in_sentence() {
        let (dictionary, searcher) = fixture(&[humerus()], &[]);
        let groups = resolver(ResolverConfig::default(), dictionary)
            .extract_text(TEXT, &searcher)
            .unwrap();

        assert_eq!(groups.len(), 1);
        let hit = &groups[0][0];
        assert_eq!(&TEXT[hit.start..hit.end], "humerus");
        assert_eq!(hit.cui, "C0020164");
        assert_eq!(hit.similarity, 1.0);
        assert_eq!(hit.semtypes, vec!["T023"]);
        assert!(hit.preferred);
    }

    #[test]
    fn caller_tokens_with_bad_offsets_are_skipped() {
        let (dictionary, searcher) = fixture(&[humerus()], &[]);
        let text = "é humerus";
        let tokens = vec![
            // Starts inside the two-byte 'é'.
            Token {
                text: "é".into(),
                start: 1,
                end: 2,
                kind: TokenKind::Word,
            },
            Token {
                text: "humerus".into(),
                start: 3,
                end: 10,
                kind: TokenKind::Word,
            },
            Token {
                text: "bone".into(),
                start: 11,
                end: 15,
                kind: TokenKind::Word,
            },
        ];
        let groups = resolver(ResolverConfig::default(), dictionary)
            .extract(text, &tokens, &searcher)
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(&text[groups[0][0].start..groups[0][0].end], "humerus");
    }

    #[test]
    fn indexed_terms_without_concepts_are_dropped() {
        let (dictionary, searcher) = fixture(&[humerus()], &["fracture"]);
        let groups = resolver(ResolverConfig::default(), dictionary)
            .extract_text(TEXT, &searcher)
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0].term, "humerus");
    }

    #[test]
    fn semtype_filter_removes_unaccepted_concepts() {
        let (dictionary, searcher) = fixture(
            &[
                humerus(),
                TermEntry::new("fracture", "C0016658").with_semtypes(["T999"]),
            ],
            &[],
        );
        let all = resolver(ResolverConfig::default(), dictionary.clone())
            .extract_text(TEXT, &searcher)
            .unwrap();
        assert_eq!(all.len(), 2);

        let clinical = resolver(
            ResolverConfig::default().with_accepted_semtypes(["default"]),
            dictionary,
        )
        .extract_text(TEXT, &searcher)
        .unwrap();
        assert_eq!(clinical.len(), 1);
        assert_eq!(clinical[0][0].cui, "C0020164");
    }

    #[test]
    fn overlap_policy_decides_between_nested_spans() {
        let entries = [
            humerus(),
            TermEntry::new("humerus bone", "C0222660").with_semtypes(["T023"]),
        ];
        let (dictionary, searcher) = fixture(&entries, &[]);

        let everything = resolver(
            ResolverConfig::default().with_best_match(false),
            dictionary.clone(),
        )
        .extract_text(TEXT, &searcher)
        .unwrap();
        let spans: Vec<&str> = everything
            .iter()
            .map(|g| &TEXT[g[0].start..g[0].end])
            .collect();
        assert_eq!(spans, vec!["the humerus bone", "humerus", "humerus bone"]);

        let by_score = resolver(ResolverConfig::default(), dictionary.clone())
            .extract_text(TEXT, &searcher)
            .unwrap();
        assert_eq!(by_score.len(), 1);
        assert_eq!(&TEXT[by_score[0][0].start..by_score[0][0].end], "humerus bone");
        assert_eq!(by_score[0][0].similarity, 1.0);

        let by_length = resolver(
            ResolverConfig::default().with_overlap_policy(OverlapPolicy::Length),
            dictionary,
        )
        .extract_text(TEXT, &searcher)
        .unwrap();
        assert_eq!(by_length.len(), 1);
        assert_eq!(&TEXT[by_length[0][0].start..by_length[0][0].end], "the humerus bone");
        assert!((by_length[0][0].similarity - 10.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn score_policy_keeps_higher_similarity() {
        let groups = vec![vec![matched(0, 10, "C1", 0.6)], vec![matched(0, 7, "C2", 0.9)]];
        let kept = resolve_overlaps(groups.clone(), OverlapPolicy::Score);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0][0].cui, "C2");

        let kept = resolve_overlaps(groups, OverlapPolicy::Length);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0][0].cui, "C1");
    }

    #[test]
    fn disjoint_and_touching_spans_all_survive() {
        let groups = vec![
            vec![matched(10, 15, "C3", 0.8)],
            vec![matched(0, 5, "C1", 0.9)],
            vec![matched(5, 10, "C2", 0.7)],
        ];
        let kept = resolve_overlaps(groups, OverlapPolicy::Score);
        let cuis: Vec<&str> = kept.iter().map(|g| g[0].cui.as_str()).collect();
        assert_eq!(cuis, vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn group_prefers_preferred_terms_and_one_match_per_cui() {
        let entries = [
            TermEntry::new("fracture", "C0016658").with_semtypes(["T037"]),
            TermEntry::new("fractures", "C0016658"),
            TermEntry::new("fracture", "C0332671").with_preferred(true),
        ];
        let (dictionary, searcher) = fixture(&entries, &[]);
        let groups = resolver(ResolverConfig::default().with_window(1), dictionary)
            .extract_text("fracture", &searcher)
            .unwrap();
        assert_eq!(groups.len(), 1);
        let cuis: Vec<&str> = groups[0].iter().map(|m| m.cui.as_str()).collect();
        assert_eq!(cuis, vec!["C0332671", "C0016658"]);
        assert_eq!(groups[0][1].term, "fracture");
        assert_eq!(groups[0][1].similarity, 1.0);
    }

    #[test]
    fn config_validation() {
        assert!(ResolverConfig::default().validate().is_ok());
        assert!(matches!(
            ResolverConfig::default().with_window(0).validate(),
            Err(ConceptError::InvalidParameter(_))
        ));
        let empty: [&str; 0] = [];
        assert!(ResolverConfig::default()
            .with_accepted_semtypes(empty)
            .validate()
            .is_err());
        assert_eq!("LENGTH".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Length);
        assert!("longest".parse::<OverlapPolicy>().is_err());
    }
}
