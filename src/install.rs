//! Dictionary installation: read a term source, normalise it, and write it
//! into the concept dictionary and the feature index in batches.
//!
//! Two source layouts are understood:
//!
//! - **triples**: `term|cui|T047,T191|Y` per line. The semantic type and
//!   preferred columns are optional; `#` starts a comment line.
//! - **umls**: a `META` directory with `MRSTY.RRF` (CUI to TUI) and
//!   `MRCONSO.RRF` (CUI, language, preferred flag, string).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use canonical::Canonicalizer;
use concepts::{ConceptDictionary, TermEntry};
use index::FeatureIndex;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{InstallConfig, SourceFormat};
use crate::FacetError;

const MRCONSO: &str = "MRCONSO.RRF";
const MRSTY: &str = "MRSTY.RRF";

// MRCONSO.RRF / MRSTY.RRF column positions.
const CONSO_CUI: usize = 0;
const CONSO_LAT: usize = 1;
const CONSO_ISPREF: usize = 6;
const CONSO_STR: usize = 14;
const STY_CUI: usize = 0;
const STY_TUI: usize = 1;

/// Rows parsed from a source, before normalisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRows {
    pub entries: Vec<TermEntry>,
    /// Malformed or filtered-out lines.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallReport {
    pub rows_read: usize,
    pub rows_skipped: usize,
    /// Terms newly added to the feature index.
    pub terms_indexed: usize,
    pub concepts_written: usize,
    pub batches: usize,
    /// Stopped early because the abort flag was raised.
    pub aborted: bool,
    pub elapsed: Duration,
}

/// Read `path` in the layout selected by `cfg`.
pub fn read_source(path: &Path, cfg: &InstallConfig) -> Result<SourceRows, FacetError> {
    match cfg.source_format {
        SourceFormat::Triples => read_triples(path, cfg.delimiter),
        SourceFormat::Umls => read_umls(path, &cfg.language),
    }
}

pub fn read_triples(path: &Path, delimiter: char) -> Result<SourceRows, FacetError> {
    let mut reader = rrf_reader(path, delimiter)?;
    let mut rows = SourceRows::default();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| source_error(path, e))?;
        let term = record.get(0).map(str::trim).unwrap_or_default();
        let cui = record.get(1).map(str::trim).unwrap_or_default();
        if term.is_empty() || cui.is_empty() {
            warn!(path = %path.display(), line = line + 1, "skipping row without term and cui");
            rows.skipped += 1;
            continue;
        }
        let semtypes = record
            .get(2)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let preferred = matches!(
            record.get(3).map(str::trim),
            Some("Y" | "y" | "1" | "true")
        );
        rows.entries.push(
            TermEntry::new(term, cui)
                .with_semtypes(semtypes)
                .with_preferred(preferred),
        );
    }
    Ok(rows)
}

/// Read `MRSTY.RRF` and `MRCONSO.RRF` from `dir`, keeping strings in
/// `language`.
pub fn read_umls(dir: &Path, language: &str) -> Result<SourceRows, FacetError> {
    let sty_path = dir.join(MRSTY);
    let mut semtypes: HashMap<String, Vec<String>> = HashMap::new();
    for record in rrf_reader(&sty_path, '|')?.records() {
        let record = record.map_err(|e| source_error(&sty_path, e))?;
        if let (Some(cui), Some(tui)) = (record.get(STY_CUI), record.get(STY_TUI)) {
            semtypes
                .entry(cui.to_string())
                .or_default()
                .push(tui.to_string());
        }
    }
    info!(path = %sty_path.display(), concepts = semtypes.len(), "semantic types loaded");

    let conso_path = dir.join(MRCONSO);
    let mut rows = SourceRows::default();
    for record in rrf_reader(&conso_path, '|')?.records() {
        let record = record.map_err(|e| source_error(&conso_path, e))?;
        if record.len() <= CONSO_STR {
            rows.skipped += 1;
            continue;
        }
        if record.get(CONSO_LAT) != Some(language) {
            rows.skipped += 1;
            continue;
        }
        let cui = record.get(CONSO_CUI).unwrap_or_default();
        let term = record.get(CONSO_STR).unwrap_or_default();
        let entry = TermEntry::new(term, cui)
            .with_semtypes(semtypes.get(cui).into_iter().flatten().cloned())
            .with_preferred(record.get(CONSO_ISPREF) == Some("Y"));
        rows.entries.push(entry);
    }
    Ok(rows)
}

/// Normalise `entries` and write them in batches of `batch_size`.
///
/// `abort` is checked before every batch; batches already written stay
/// installed.
pub fn install_entries(
    dictionary: &ConceptDictionary,
    index: &FeatureIndex,
    canonicalizer: &Canonicalizer,
    entries: &[TermEntry],
    batch_size: usize,
    abort: &AtomicBool,
) -> Result<InstallReport, FacetError> {
    if batch_size == 0 {
        return Err(FacetError::Config(crate::config::ConfigLoadError::Validation(
            "install.batch_size must be greater than zero".into(),
        )));
    }
    let started = Instant::now();
    let mut report = InstallReport {
        rows_read: entries.len(),
        ..InstallReport::default()
    };

    let normalised = normalise_entries(canonicalizer, entries);
    report.rows_skipped = entries.len() - normalised.len();

    for chunk in normalised.chunks(batch_size) {
        if abort.load(Ordering::Relaxed) {
            warn!(batches = report.batches, "install aborted");
            report.aborted = true;
            break;
        }
        let batch_started = Instant::now();
        let written = dictionary.add_batch(chunk, batch_size)?;
        let terms: Vec<&str> = chunk.iter().map(|e| e.term.as_str()).collect();
        let inserted = index.insert_batch(&terms)?;

        report.batches += 1;
        report.terms_indexed += inserted.inserted;
        report.concepts_written += written.concepts_written;
        info!(
            batch = report.batches,
            rows = chunk.len(),
            terms_indexed = inserted.inserted,
            concepts_written = written.concepts_written,
            elapsed_micros = batch_started.elapsed().as_micros() as u64,
            "install batch committed"
        );
    }

    report.elapsed = started.elapsed();
    info!(
        rows_read = report.rows_read,
        rows_skipped = report.rows_skipped,
        terms_indexed = report.terms_indexed,
        batches = report.batches,
        aborted = report.aborted,
        elapsed_micros = report.elapsed.as_micros() as u64,
        "install finished"
    );
    Ok(report)
}

// Lowercases and normalises terms in parallel, drops empties and folds
// repeated (term, cui) rows together in first-seen order.
fn normalise_entries(canonicalizer: &Canonicalizer, entries: &[TermEntry]) -> Vec<TermEntry> {
    let normalised: Vec<TermEntry> = entries
        .par_iter()
        .map(|entry| TermEntry {
            term: canonicalizer.normalize(&entry.term),
            cui: entry.cui.trim().to_string(),
            semtypes: entry.semtypes.clone(),
            preferred: entry.preferred,
        })
        .collect();

    let mut positions: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut out: Vec<TermEntry> = Vec::with_capacity(normalised.len());
    for entry in normalised {
        if entry.term.is_empty() || entry.cui.is_empty() {
            continue;
        }
        let key = (entry.term.clone(), entry.cui.clone());
        match positions.get(&key) {
            Some(&at) => {
                let merged = &mut out[at];
                merged.preferred |= entry.preferred;
                for semtype in entry.semtypes {
                    if !merged.semtypes.contains(&semtype) {
                        merged.semtypes.push(semtype);
                    }
                }
            }
            None => {
                positions.insert(key, out.len());
                out.push(entry);
            }
        }
    }
    out
}

fn rrf_reader(path: &Path, delimiter: char) -> Result<csv::Reader<std::fs::File>, FacetError> {
    let delimiter = u8::try_from(delimiter).map_err(|_| FacetError::Source {
        path: path.to_path_buf(),
        reason: format!("delimiter {delimiter:?} is not a single byte"),
    })?;
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| source_error(path, e))
}

fn source_error(path: &Path, err: csv::Error) -> FacetError {
    FacetError::Source {
        path: PathBuf::from(path),
        reason: err.to_string(),
    }
}
