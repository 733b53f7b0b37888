//! Inverted feature index for approximate string search.
//!
//! Every installed term is filed under `(size, feature)` for each of its
//! features, where `size` is the term's feature count. The value is the sorted
//! set of terms sharing that feature at that size:
//!
//! ```text
//! "5:hum" -> {"humer", "humus", ...}
//! "7:hum" -> {"humerus", ...}
//! ```
//!
//! Entries are sets, so installing a term twice changes nothing. Lookups of a
//! missing `(size, feature)` pair return an empty list.
//!
//! The index also records the largest installed size (used to clamp search
//! ranges for metrics without an upper bound) and the n-gram settings it was
//! built with; reopening with different settings is rejected because the
//! features would no longer line up.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ngram::{NgramConfig, NgramError, NgramExtractor};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use store::{Compression, KvStore, Serializer, StoreError, WriteBatch};
use thiserror::Error;
use tracing::{debug, info};

pub const INDEX_SCHEMA_VERSION: u32 = 1;

const META_KEY: &[u8] = b"__index_meta__";
const GLOBAL_MAX_KEY: &[u8] = b"__global_max_features__";
const TERM_COUNT_KEY: &[u8] = b"__term_count__";
const TERM_PREFIX: &str = "__term__:";

/// Errors raised by the feature index.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ngram(#[from] NgramError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("corrupt index entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Storage settings for index values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Encoding of the candidate sets.
    #[serde(default)]
    pub serializer: Serializer,
    #[serde(default)]
    pub compression: Compression,
    /// Keys written per backend round trip during install.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    500
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            serializer: Serializer::default(),
            compression: Compression::default(),
            batch_size: default_batch_size(),
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.batch_size == 0 {
            return Err(IndexError::InvalidParameter(
                "index batch_size must be greater than zero".into(),
            ));
        }
        if let Compression::Zstd { level } = self.compression {
            if !(1..=22).contains(&level) {
                return Err(IndexError::InvalidParameter(format!(
                    "zstd level must be in 1..=22, got {level}"
                )));
            }
        }
        Ok(())
    }
}

/// Settings persisted alongside the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexMeta {
    version: u32,
    ngram: NgramConfig,
}

/// Outcome of one [`FeatureIndex::insert_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Terms not previously installed.
    pub inserted: usize,
    /// Terms skipped because they were already installed (or empty).
    pub skipped: usize,
    /// Index entries written.
    pub keys_written: usize,
}

/// Inverted index over a [`KvStore`].
pub struct FeatureIndex {
    store: Arc<dyn KvStore>,
    extractor: NgramExtractor,
    cfg: IndexConfig,
    global_max: AtomicUsize,
}

impl FeatureIndex {
    /// Open (or initialise) an index in `store`.
    ///
    /// A writable store without metadata is stamped with the extractor's
    /// settings. A store stamped with different settings is rejected.
    pub fn open(
        store: Arc<dyn KvStore>,
        extractor: NgramExtractor,
        cfg: IndexConfig,
    ) -> Result<Self, IndexError> {
        cfg.validate()?;
        let expected = IndexMeta {
            version: INDEX_SCHEMA_VERSION,
            ngram: extractor.config().clone(),
        };
        match store.get(META_KEY)? {
            Some(bytes) => {
                let found: IndexMeta =
                    serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt {
                        key: String::from_utf8_lossy(META_KEY).into_owned(),
                        reason: e.to_string(),
                    })?;
                if found != expected {
                    return Err(IndexError::InvalidParameter(format!(
                        "index was built with {:?} (schema {}), opened with {:?} (schema {})",
                        found.ngram, found.version, expected.ngram, expected.version
                    )));
                }
            }
            None if store.mode().is_writable() => {
                let bytes = serde_json::to_vec(&expected).map_err(StoreError::codec)?;
                store.put(META_KEY, &bytes)?;
            }
            None => {}
        }

        let index = Self {
            store,
            extractor,
            cfg,
            global_max: AtomicUsize::new(0),
        };
        index.reload()?;
        Ok(index)
    }

    pub fn extractor(&self) -> &NgramExtractor {
        &self.extractor
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Re-read cached metadata after another handle installed terms.
    pub fn reload(&self) -> Result<(), IndexError> {
        let max = self.read_counter(GLOBAL_MAX_KEY)?;
        self.global_max.store(max, Ordering::Release);
        Ok(())
    }

    /// Largest feature count of any installed term (0 for an empty index).
    pub fn global_max_features(&self) -> usize {
        self.global_max.load(Ordering::Acquire)
    }

    /// Number of distinct installed terms.
    pub fn term_count(&self) -> Result<usize, IndexError> {
        self.read_counter(TERM_COUNT_KEY)
    }

    pub fn contains_term(&self, term: &str) -> Result<bool, IndexError> {
        Ok(self.store.contains(term_key(term).as_bytes())?)
    }

    /// Candidate terms of `size` features containing `feature`, sorted.
    pub fn lookup(&self, size: usize, feature: &str) -> Result<Vec<String>, IndexError> {
        let key = entry_key(size, feature);
        match self.store.get(key.as_bytes())? {
            Some(bytes) => Ok(self.decode_entry(&key, &bytes)?.into_iter().collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Install one term. Returns `false` when it was already present.
    pub fn insert(&self, term: &str) -> Result<bool, IndexError> {
        Ok(self.insert_batch(&[term])?.inserted == 1)
    }

    /// Install a batch of terms.
    ///
    /// Features are extracted in parallel. Entries are merged in memory, then
    /// each touched key is read, unioned and written back through a
    /// [`WriteBatch`]. Term markers are written after their entries, so a term
    /// marked as installed always has complete entries.
    pub fn insert_batch<S: AsRef<str> + Sync>(&self, terms: &[S]) -> Result<InsertReport, IndexError> {
        let started = Instant::now();
        self.store.mode().ensure_writable("insert_batch")?;

        let mut report = InsertReport::default();
        let mut fresh: BTreeSet<&str> = BTreeSet::new();
        for term in terms {
            let term = term.as_ref();
            if term.is_empty() || !fresh.insert(term) {
                report.skipped += 1;
            }
        }
        let mut pending = Vec::with_capacity(fresh.len());
        for term in fresh {
            if self.contains_term(term)? {
                report.skipped += 1;
            } else {
                pending.push(term);
            }
        }
        if pending.is_empty() {
            return Ok(report);
        }

        let extracted: Vec<(&str, Vec<String>)> = pending
            .par_iter()
            .map(|term| (*term, self.extractor.features(term)))
            .collect();

        let mut additions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut batch_max = 0usize;
        for (term, features) in &extracted {
            let size = features.len();
            batch_max = batch_max.max(size);
            for feature in features {
                additions
                    .entry(entry_key(size, feature))
                    .or_default()
                    .insert((*term).to_string());
            }
        }

        let mut batch = WriteBatch::new(self.store.as_ref(), self.cfg.batch_size)?;
        for (key, added) in additions {
            let mut entry = match self.store.get(key.as_bytes())? {
                Some(bytes) => self.decode_entry(&key, &bytes)?,
                None => BTreeSet::new(),
            };
            let before = entry.len();
            entry.extend(added);
            if entry.len() != before {
                let bytes = self.encode_entry(&entry)?;
                batch.add(key.into_bytes(), bytes)?;
                report.keys_written += 1;
            }
        }
        for (term, features) in &extracted {
            batch.add(term_key(term).into_bytes(), features.len().to_string().into_bytes())?;
        }
        report.inserted = extracted.len();

        let previous_terms = self.term_count()?;
        batch.add(
            TERM_COUNT_KEY.to_vec(),
            (previous_terms + report.inserted).to_string().into_bytes(),
        )?;
        let global_max = self.global_max_features().max(batch_max);
        if global_max > self.read_counter(GLOBAL_MAX_KEY)? {
            batch.add(GLOBAL_MAX_KEY.to_vec(), global_max.to_string().into_bytes())?;
        }
        batch.commit()?;
        self.global_max.fetch_max(global_max, Ordering::AcqRel);

        info!(
            backend = self.store.backend_name(),
            inserted = report.inserted,
            skipped = report.skipped,
            keys = report.keys_written,
            global_max_features = global_max,
            elapsed_micros = started.elapsed().as_micros() as u64,
            "feature index batch installed"
        );
        Ok(report)
    }

    fn read_counter(&self, key: &[u8]) -> Result<usize, IndexError> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(0);
        };
        let text = std::str::from_utf8(&bytes).map_err(|e| self.corrupt(key, e))?;
        text.parse::<usize>().map_err(|e| self.corrupt(key, e))
    }

    fn corrupt<E: std::fmt::Display>(&self, key: &[u8], err: E) -> IndexError {
        IndexError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: err.to_string(),
        }
    }

    fn encode_entry(&self, entry: &BTreeSet<String>) -> Result<Vec<u8>, IndexError> {
        let encoded = self.cfg.serializer.encode(entry)?;
        Ok(self.cfg.compression.compress(encoded)?)
    }

    fn decode_entry(&self, key: &str, bytes: &[u8]) -> Result<BTreeSet<String>, IndexError> {
        let decompressed = self
            .cfg
            .compression
            .decompress(bytes)
            .map_err(|e| self.corrupt(key.as_bytes(), e))?;
        let entry: BTreeSet<String> = self
            .cfg
            .serializer
            .decode(&decompressed)
            .map_err(|e| self.corrupt(key.as_bytes(), e))?;
        debug!(key, candidates = entry.len(), "index entry decoded");
        Ok(entry)
    }
}

fn entry_key(size: usize, feature: &str) -> String {
    format!("{size}:{feature}")
}

fn term_key(term: &str) -> String {
    format!("{TERM_PREFIX}{term}")
}
