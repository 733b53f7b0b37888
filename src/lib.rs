//! Workspace umbrella crate for Facet, a medical concept extractor.
//!
//! [`Facet`] wires the workspace crates into one pipeline:
//!
//! 1. a key/value backend from [`store`], split into an index namespace and a
//!    dictionary namespace;
//! 2. the [`index::FeatureIndex`] of n-gram features per installed term;
//! 3. the [`concepts::ConceptDictionary`] mapping terms to CUIs and semantic
//!    types;
//! 4. a [`matcher::Simstring`] CP-Merge searcher, optionally cached;
//! 5. the [`concepts::Resolver`] that cuts token windows from text and keeps
//!    the best non-overlapping concept matches.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//!
//! use facet::{Facet, FacetConfig};
//!
//! let facet = Facet::open(FacetConfig::default())?;
//! facet.install(Path::new("terms.txt"), &AtomicBool::new(false))?;
//! for group in facet.match_text("fracture of the left humerus")? {
//!     println!("{} -> {}", group[0].ngram, group[0].cui);
//! }
//! # Ok::<(), facet::FacetError>(())
//! ```

pub mod config;
pub mod format;
pub mod install;

pub use canonical::{CanonicalConfig, Canonicalizer, Token, Tokenizer};
pub use concepts::{
    ConceptDictionary, ConceptError, ConceptMatch, OverlapPolicy, Resolver, ResolverConfig,
    SpanStrategy, TermEntry,
};
pub use config::{ConfigLoadError, FacetConfig, InstallConfig, SourceFormat, StoreSection};
pub use format::{format_reports, MatchReport, OutputFormat};
pub use index::{FeatureIndex, IndexError};
pub use install::{InstallReport, SourceRows};
pub use matcher::{Candidate, MatchConfig, MatchError, QueryCache, Simstring};
pub use ngram::{NgramConfig, NgramError, NgramExtractor};
pub use similarity::{Similarity, SimilarityError};
pub use store::{AccessMode, BackendConfig, KvStore, StoreError};

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rayon::prelude::*;
use store::NamespacedStore;
use tracing::{debug, info, info_span, warn};

/// Key prefix of the feature index inside the shared backend.
pub const INDEX_NAMESPACE: &str = "ix/";
/// Key prefix of the concept dictionary inside the shared backend.
pub const DICTIONARY_NAMESPACE: &str = "cd/";

/// Errors surfaced by the Facet pipeline.
#[derive(Debug)]
pub enum FacetError {
    Config(ConfigLoadError),
    Store(StoreError),
    Ngram(NgramError),
    Index(IndexError),
    Match(MatchError),
    Concept(ConceptError),
    /// A dictionary source could not be read.
    Source { path: PathBuf, reason: String },
    Format(String),
}

impl fmt::Display for FacetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetError::Config(err) => write!(f, "configuration error: {err}"),
            FacetError::Store(err) => write!(f, "store failure: {err}"),
            FacetError::Ngram(err) => write!(f, "n-gram configuration failure: {err}"),
            FacetError::Index(err) => write!(f, "feature index failure: {err}"),
            FacetError::Match(err) => write!(f, "matching failed: {err}"),
            FacetError::Concept(err) => write!(f, "concept resolution failed: {err}"),
            FacetError::Source { path, reason } => {
                write!(f, "cannot read source {}: {reason}", path.display())
            }
            FacetError::Format(reason) => write!(f, "output formatting failed: {reason}"),
        }
    }
}

impl Error for FacetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FacetError::Config(err) => Some(err),
            FacetError::Store(err) => Some(err),
            FacetError::Ngram(err) => Some(err),
            FacetError::Index(err) => Some(err),
            FacetError::Match(err) => Some(err),
            FacetError::Concept(err) => Some(err),
            FacetError::Source { .. } | FacetError::Format(_) => None,
        }
    }
}

impl From<ConfigLoadError> for FacetError {
    fn from(value: ConfigLoadError) -> Self {
        FacetError::Config(value)
    }
}

impl From<StoreError> for FacetError {
    fn from(value: StoreError) -> Self {
        FacetError::Store(value)
    }
}

impl From<NgramError> for FacetError {
    fn from(value: NgramError) -> Self {
        FacetError::Ngram(value)
    }
}

impl From<IndexError> for FacetError {
    fn from(value: IndexError) -> Self {
        FacetError::Index(value)
    }
}

impl From<MatchError> for FacetError {
    fn from(value: MatchError) -> Self {
        FacetError::Match(value)
    }
}

impl From<ConceptError> for FacetError {
    fn from(value: ConceptError) -> Self {
        FacetError::Concept(value)
    }
}

impl FacetError {
    /// The underlying store error, however deeply it was wrapped.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            FacetError::Store(err)
            | FacetError::Index(IndexError::Store(err))
            | FacetError::Match(MatchError::Index(IndexError::Store(err)))
            | FacetError::Concept(ConceptError::Store(err))
            | FacetError::Concept(ConceptError::Match(MatchError::Index(IndexError::Store(err)))) => {
                Some(err)
            }
            _ => None,
        }
    }
}

/// An opened extraction pipeline. Cheap to share behind an [`Arc`];
/// matching takes `&self`.
pub struct Facet {
    cfg: FacetConfig,
    store: Arc<dyn KvStore>,
    canonicalizer: Canonicalizer,
    index: Arc<FeatureIndex>,
    dictionary: Arc<ConceptDictionary>,
    searcher: Simstring,
    resolver: Resolver,
}

impl Facet {
    /// Validate `cfg`, open its backend and build the pipeline.
    pub fn open(cfg: FacetConfig) -> Result<Self, FacetError> {
        cfg.validate()?;
        let store = cfg.store.backend.open(cfg.store.mode)?;
        Self::with_store(cfg, store)
    }

    /// Build the pipeline over an already opened backend. `cfg.store.backend`
    /// and `cfg.store.mode` are ignored.
    pub fn with_store(cfg: FacetConfig, store: Arc<dyn KvStore>) -> Result<Self, FacetError> {
        cfg.validate()?;
        let extractor = NgramExtractor::new(cfg.ngram.clone())?;
        let index_store: Arc<dyn KvStore> =
            Arc::new(NamespacedStore::new(store.clone(), INDEX_NAMESPACE));
        let index = Arc::new(FeatureIndex::open(
            index_store,
            extractor,
            cfg.store
                .index_config()
                .with_batch_size(cfg.install.batch_size),
        )?);

        let dictionary_store: Arc<dyn KvStore> =
            Arc::new(NamespacedStore::new(store.clone(), DICTIONARY_NAMESPACE));
        let dictionary = Arc::new(ConceptDictionary::open(
            dictionary_store,
            cfg.store.dictionary_serializer(),
        )?);

        let mut searcher = Simstring::new(index.clone(), &cfg.matcher)?;
        if cfg.matcher.cache_capacity > 0 {
            searcher = searcher.with_cache(Arc::new(QueryCache::new(cfg.matcher.cache_capacity)?));
        }

        let canonicalizer = Canonicalizer::new(cfg.canonical.clone());
        let resolver = Resolver::new(cfg.resolver.clone(), canonicalizer.clone(), dictionary.clone())?;

        info!(
            backend = store.backend_name(),
            mode = ?store.mode(),
            similarity = searcher.similarity().name(),
            threshold = searcher.threshold(),
            terms = index.term_count()?,
            "facet opened"
        );
        Ok(Self {
            cfg,
            store,
            canonicalizer,
            index,
            dictionary,
            searcher,
            resolver,
        })
    }

    pub fn config(&self) -> &FacetConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<FeatureIndex> {
        &self.index
    }

    pub fn dictionary(&self) -> &Arc<ConceptDictionary> {
        &self.dictionary
    }

    pub fn searcher(&self) -> &Simstring {
        &self.searcher
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Install the dictionary source at `path` in the configured layout.
    pub fn install(&self, path: &Path, abort: &AtomicBool) -> Result<InstallReport, FacetError> {
        let rows = install::read_source(path, &self.cfg.install)?;
        info!(
            path = %path.display(),
            rows = rows.entries.len(),
            skipped = rows.skipped,
            "dictionary source read"
        );
        let mut report = self.install_entries(&rows.entries, abort)?;
        report.rows_read += rows.skipped;
        report.rows_skipped += rows.skipped;
        Ok(report)
    }

    /// Install in-memory rows.
    pub fn install_entries(
        &self,
        entries: &[TermEntry],
        abort: &AtomicBool,
    ) -> Result<InstallReport, FacetError> {
        if !self.store.is_persistent() {
            warn!(
                backend = self.store.backend_name(),
                "installing into a non-persistent backend; the dictionary is lost on exit"
            );
        }
        let result = install::install_entries(
            &self.dictionary,
            &self.index,
            &self.canonicalizer,
            entries,
            self.cfg.install.batch_size,
            abort,
        );
        // Partially written batches still change what searches return.
        if let Some(cache) = self.searcher.cache() {
            cache.invalidate();
        }
        self.index.reload()?;
        result
    }

    /// Concept matches in `text`, grouped per span in text order.
    pub fn match_text(&self, text: &str) -> Result<Vec<Vec<ConceptMatch>>, FacetError> {
        let span = info_span!("facet.match", bytes = text.len());
        let _guard = span.enter();
        let groups = self.resolver.extract_text(text, &self.searcher)?;
        debug!(groups = groups.len(), "text matched");
        Ok(groups)
    }

    /// [`match_text`](Self::match_text) over many texts in parallel; results
    /// keep the input order.
    pub fn match_many<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
    ) -> Result<Vec<Vec<Vec<ConceptMatch>>>, FacetError> {
        texts
            .par_iter()
            .map(|text| self.match_text(text.as_ref()))
            .collect()
    }

    /// Approximate dictionary terms for a single query string.
    pub fn search(&self, query: &str) -> Result<Vec<Candidate>, FacetError> {
        let normalised = self.canonicalizer.normalize(query);
        Ok(self.searcher.search(&normalised)?)
    }
}
