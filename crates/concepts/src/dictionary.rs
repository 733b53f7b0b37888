//! Concept dictionary: surface term -> concepts, concept -> record.
//!
//! ```text
//! "t:humerus"   -> [{cui: C0020164, preferred: true}]
//! "c:C0020164"  -> {cui, preferred_term: "humerus", semtypes: [T023]}
//! ```
//!
//! Both key families are sets keyed by CUI, so re-adding a row is a no-op.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use store::{KvStore, Serializer, StoreError, WriteBatch};
use tracing::info;

use crate::error::ConceptError;

const META_KEY: &[u8] = b"__dictionary_meta__";
const TERM_PREFIX: &str = "t:";
const CONCEPT_PREFIX: &str = "c:";
pub const DICTIONARY_SCHEMA_VERSION: u32 = 1;

/// One source row: a surface term naming a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub cui: String,
    pub semtypes: Vec<String>,
    pub preferred: bool,
}

impl TermEntry {
    pub fn new(term: impl Into<String>, cui: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            cui: cui.into(),
            semtypes: Vec::new(),
            preferred: false,
        }
    }

    pub fn with_semtypes<S: Into<String>>(mut self, semtypes: impl IntoIterator<Item = S>) -> Self {
        self.semtypes = semtypes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_preferred(mut self, preferred: bool) -> Self {
        self.preferred = preferred;
        self
    }
}

/// A concept a surface term maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptEntry {
    pub cui: String,
    /// The term is the concept's preferred name.
    pub preferred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub cui: String,
    pub preferred_term: Option<String>,
    pub semtypes: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DictionaryReport {
    /// Rows that changed the dictionary.
    pub rows_added: usize,
    pub terms_written: usize,
    pub concepts_written: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DictionaryMeta {
    version: u32,
    serializer: Serializer,
}

pub struct ConceptDictionary {
    store: Arc<dyn KvStore>,
    serializer: Serializer,
}

impl ConceptDictionary {
    /// Open (or initialise) a dictionary in `store`.
    ///
    /// Values are structured records, so `serializer` must be able to encode
    /// them; a store stamped with another serializer is rejected.
    pub fn open(store: Arc<dyn KvStore>, serializer: Serializer) -> Result<Self, ConceptError> {
        if !serializer.supports_records() {
            return Err(ConceptError::InvalidParameter(format!(
                "{} serializer cannot encode concept records",
                serializer.name()
            )));
        }
        let expected = DictionaryMeta {
            version: DICTIONARY_SCHEMA_VERSION,
            serializer,
        };
        match store.get(META_KEY)? {
            Some(bytes) => {
                let found: DictionaryMeta =
                    serde_json::from_slice(&bytes).map_err(|e| ConceptError::Corrupt {
                        key: String::from_utf8_lossy(META_KEY).into_owned(),
                        reason: e.to_string(),
                    })?;
                if found != expected {
                    return Err(ConceptError::InvalidParameter(format!(
                        "dictionary was written with {} (schema {}), opened with {} (schema {})",
                        found.serializer.name(),
                        found.version,
                        expected.serializer.name(),
                        expected.version
                    )));
                }
            }
            None if store.mode().is_writable() => {
                let bytes = serde_json::to_vec(&expected).map_err(StoreError::codec)?;
                store.put(META_KEY, &bytes)?;
            }
            None => {}
        }
        Ok(Self { store, serializer })
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Add one row. Returns `false` when the dictionary already had it.
    pub fn add(&self, entry: &TermEntry) -> Result<bool, ConceptError> {
        let report = self.add_batch(std::slice::from_ref(entry), 1)?;
        Ok(report.rows_added == 1)
    }

    /// Merge `entries` into the dictionary, writing through a
    /// [`WriteBatch`] of `batch_size`.
    pub fn add_batch(&self, entries: &[TermEntry], batch_size: usize) -> Result<DictionaryReport, ConceptError> {
        let started = Instant::now();
        self.store.mode().ensure_writable("add_batch")?;

        let mut report = DictionaryReport::default();
        let mut terms: BTreeMap<&str, Vec<ConceptEntry>> = BTreeMap::new();
        let mut concepts: BTreeMap<&str, ConceptRecord> = BTreeMap::new();
        let mut dirty_terms: BTreeSet<&str> = BTreeSet::new();
        let mut dirty_concepts: BTreeSet<&str> = BTreeSet::new();
        for entry in entries {
            if entry.term.is_empty() || entry.cui.is_empty() {
                continue;
            }
            if !terms.contains_key(entry.term.as_str()) {
                terms.insert(entry.term.as_str(), self.lookup_term(&entry.term)?);
            }
            if !concepts.contains_key(entry.cui.as_str()) {
                let existing = self.lookup_concept(&entry.cui)?.unwrap_or_else(|| ConceptRecord {
                    cui: entry.cui.clone(),
                    preferred_term: None,
                    semtypes: BTreeSet::new(),
                });
                concepts.insert(entry.cui.as_str(), existing);
            }

            let mut changed = false;
            if let Some(stored) = terms.get_mut(entry.term.as_str()) {
                if merge_entry(stored, &entry.cui, entry.preferred) {
                    dirty_terms.insert(entry.term.as_str());
                    changed = true;
                }
            }
            if let Some(concept) = concepts.get_mut(entry.cui.as_str()) {
                if merge_concept(concept, entry) {
                    dirty_concepts.insert(entry.cui.as_str());
                    changed = true;
                }
            }
            if changed {
                report.rows_added += 1;
            }
        }

        let mut batch = WriteBatch::new(self.store.as_ref(), batch_size)?;
        for term in dirty_terms {
            if let Some(stored) = terms.get(term) {
                batch.add(term_key(term).into_bytes(), self.serializer.encode(stored)?)?;
                report.terms_written += 1;
            }
        }
        for cui in dirty_concepts {
            if let Some(concept) = concepts.get(cui) {
                batch.add(concept_key(cui).into_bytes(), self.serializer.encode(concept)?)?;
                report.concepts_written += 1;
            }
        }
        batch.commit()?;

        info!(
            backend = self.store.backend_name(),
            rows = entries.len(),
            added = report.rows_added,
            terms = report.terms_written,
            concepts = report.concepts_written,
            elapsed_micros = started.elapsed().as_micros() as u64,
            "concept dictionary batch installed"
        );
        Ok(report)
    }

    /// Concepts named by `term`. Unknown terms give an empty list.
    pub fn lookup_term(&self, term: &str) -> Result<Vec<ConceptEntry>, ConceptError> {
        let key = term_key(term);
        match self.store.get(key.as_bytes())? {
            Some(bytes) => self.decode(&key, &bytes),
            None => Ok(Vec::new()),
        }
    }

    pub fn lookup_concept(&self, cui: &str) -> Result<Option<ConceptRecord>, ConceptError> {
        let key = concept_key(cui);
        match self.store.get(key.as_bytes())? {
            Some(bytes) => self.decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T, ConceptError> {
        self.serializer
            .decode(bytes)
            .map_err(|e| ConceptError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

fn merge_entry(stored: &mut Vec<ConceptEntry>, cui: &str, preferred: bool) -> bool {
    match stored.iter_mut().find(|existing| existing.cui == cui) {
        Some(existing) if preferred && !existing.preferred => {
            existing.preferred = true;
            true
        }
        Some(_) => false,
        None => {
            stored.push(ConceptEntry {
                cui: cui.to_string(),
                preferred,
            });
            stored.sort_by(|a, b| a.cui.cmp(&b.cui));
            true
        }
    }
}

// The first preferred row names the concept.
fn merge_concept(concept: &mut ConceptRecord, entry: &TermEntry) -> bool {
    let before = concept.semtypes.len();
    concept
        .semtypes
        .extend(entry.semtypes.iter().filter(|s| !s.is_empty()).cloned());
    let mut changed = concept.semtypes.len() != before;
    if entry.preferred && concept.preferred_term.is_none() {
        concept.preferred_term = Some(entry.term.clone());
        changed = true;
    }
    changed
}

fn term_key(term: &str) -> String {
    format!("{TERM_PREFIX}{term}")
}

fn concept_key(cui: &str) -> String {
    format!("{CONCEPT_PREFIX}{cui}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{AccessMode, InMemoryStore};

    fn dictionary(serializer: Serializer) -> ConceptDictionary {
        ConceptDictionary::open(Arc::new(InMemoryStore::new()), serializer).unwrap()
    }

    fn humerus() -> TermEntry {
        TermEntry::new("humerus", "C0020164")
            .with_semtypes(["T023"])
            .with_preferred(true)
    }

    #[test]
    fn rows_resolve_in_both_directions() {
        let dict = dictionary(Serializer::Json);
        let report = dict
            .add_batch(
                &[
                    humerus(),
                    TermEntry::new("humeri", "C0020164").with_semtypes(["T023"]),
                    TermEntry::new("fracture", "C0016658").with_semtypes(["T037"]),
                ],
                2,
            )
            .unwrap();
        assert_eq!(report.rows_added, 3);
        assert_eq!(report.terms_written, 3);
        assert_eq!(report.concepts_written, 2);

        assert_eq!(
            dict.lookup_term("humerus").unwrap(),
            vec![ConceptEntry {
                cui: "C0020164".into(),
                preferred: true
            }]
        );
        let record = dict.lookup_concept("C0020164").unwrap().unwrap();
        assert_eq!(record.preferred_term.as_deref(), Some("humerus"));
        assert_eq!(record.semtypes, BTreeSet::from(["T023".to_string()]));
    }

    #[test]
    fn unknown_keys_are_empty_not_errors() {
        let dict = dictionary(Serializer::Bincode);
        assert!(dict.lookup_term("ulna").unwrap().is_empty());
        assert!(dict.lookup_concept("C0041600").unwrap().is_none());
    }

    #[test]
    fn re_adding_rows_changes_nothing() {
        let dict = dictionary(Serializer::Bincode);
        assert!(dict.add(&humerus()).unwrap());
        assert!(!dict.add(&humerus()).unwrap());
        assert_eq!(dict.lookup_term("humerus").unwrap().len(), 1);
    }

    #[test]
    fn synonyms_and_homonyms_merge() {
        let dict = dictionary(Serializer::Json);
        dict.add(&TermEntry::new("cold", "C0009443").with_semtypes(["T047"]))
            .unwrap();
        dict.add(&TermEntry::new("cold", "C0009264").with_semtypes(["T070"]))
            .unwrap();
        dict.add(&TermEntry::new("common cold", "C0009443").with_preferred(true))
            .unwrap();

        let cuis: Vec<String> = dict
            .lookup_term("cold")
            .unwrap()
            .into_iter()
            .map(|e| e.cui)
            .collect();
        assert_eq!(cuis, vec!["C0009264", "C0009443"]);
        let record = dict.lookup_concept("C0009443").unwrap().unwrap();
        assert_eq!(record.preferred_term.as_deref(), Some("common cold"));
    }

    #[test]
    fn delimited_serializer_is_rejected() {
        let err = ConceptDictionary::open(Arc::new(InMemoryStore::new()), Serializer::delimited())
            .err()
            .expect("delimited values cannot hold records");
        assert!(matches!(err, ConceptError::InvalidParameter(_)));
    }

    #[test]
    fn reopening_with_another_serializer_fails() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        ConceptDictionary::open(store.clone(), Serializer::Json).unwrap();
        assert!(matches!(
            ConceptDictionary::open(store, Serializer::Bincode),
            Err(ConceptError::InvalidParameter(_))
        ));
    }

    #[test]
    fn read_only_dictionary_refuses_writes() {
        let store = InMemoryStore::new();
        ConceptDictionary::open(Arc::new(store.clone()), Serializer::Json)
            .unwrap()
            .add(&humerus())
            .unwrap();

        let reader =
            ConceptDictionary::open(Arc::new(store.reopen(AccessMode::ReadOnly)), Serializer::Json)
                .unwrap();
        assert_eq!(reader.lookup_term("humerus").unwrap().len(), 1);
        assert!(matches!(
            reader.add(&TermEntry::new("femur", "C0015811")),
            Err(ConceptError::Store(StoreError::AccessDenied { .. }))
        ));
    }
}
