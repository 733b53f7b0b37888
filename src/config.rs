//! YAML configuration for the Facet pipeline.
//!
//! Every stage reads its section from one file; missing sections and fields
//! take their defaults, so an empty `version: "1"` document is a working
//! in-memory configuration.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "umls-2024aa"
//!
//! ngram:
//!   size: 3
//!   boundary_length: 0
//!   mode: character
//!
//! matcher:
//!   similarity: jaccard
//!   threshold: 0.7
//!   cache_capacity: 4096
//!
//! resolver:
//!   window: 5
//!   overlap_policy: score
//!   min_match_length: 3
//!   best_match: true
//!   accepted_semtypes: [default]
//!   span_strategy: token_sequences
//!
//! canonical:
//!   lowercase: true
//!   normalize_unicode: true
//!   strip_diacritics: true
//!   tokenizer: alphanumeric
//!
//! store:
//!   backend:
//!     kind: redb
//!     path: "/var/lib/facet/umls.redb"
//!   mode: read_write
//!   serializer:
//!     kind: bincode
//!   compression:
//!     codec: zstd
//!     level: 3
//!
//! install:
//!   batch_size: 500
//!   language: ENG
//!   source_format: umls
//!
//! output:
//!   format: json
//! ```

use std::fs;
use std::path::Path;

use canonical::CanonicalConfig;
use concepts::ResolverConfig;
use index::IndexConfig;
use matcher::MatchConfig;
use ngram::NgramConfig;
use serde::{Deserialize, Serialize};
use store::{AccessMode, BackendConfig, Compression, Serializer};
use thiserror::Error;

use crate::format::OutputFormat;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration for installing and matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacetConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub ngram: NgramConfig,

    #[serde(default)]
    pub matcher: MatchConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub canonical: CanonicalConfig,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub output: OutputSection,
}

impl FacetConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: FacetConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn with_ngram(mut self, ngram: NgramConfig) -> Self {
        self.ngram = ngram;
        self
    }

    pub fn with_matcher(mut self, matcher: MatchConfig) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_canonical(mut self, canonical: CanonicalConfig) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_store(mut self, store: StoreSection) -> Self {
        self.store = store;
        self
    }

    pub fn with_install(mut self, install: InstallConfig) -> Self {
        self.install = install;
        self
    }

    /// Check every section; the first problem found is reported.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.ngram.validate().map_err(validation)?;
        self.matcher.validate().map_err(validation)?;
        self.resolver.validate().map_err(validation)?;
        self.store.index_config().validate().map_err(validation)?;
        self.install.validate()?;
        Ok(())
    }
}

impl Default for FacetConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            ngram: NgramConfig::default(),
            matcher: MatchConfig::default(),
            resolver: ResolverConfig::default(),
            canonical: CanonicalConfig::default(),
            store: StoreSection::default(),
            install: InstallConfig::default(),
            output: OutputSection::default(),
        }
    }
}

/// Where the feature index and the concept dictionary live, and how their
/// values are encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StoreSection {
    /// In-memory unless set; installs into it are lost on exit.
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub mode: AccessMode,

    /// Index value encoding. The dictionary falls back to JSON when this is
    /// `delimited`, which cannot hold records.
    #[serde(default)]
    pub serializer: Serializer,

    #[serde(default)]
    pub compression: Compression,
}

impl StoreSection {
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub(crate) fn index_config(&self) -> IndexConfig {
        IndexConfig::new()
            .with_serializer(self.serializer)
            .with_compression(self.compression)
    }

    pub(crate) fn dictionary_serializer(&self) -> Serializer {
        if self.serializer.supports_records() {
            self.serializer
        } else {
            Serializer::Json
        }
    }
}

/// Dictionary source layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// One `term|cui|semtypes[|preferred]` row per line.
    #[default]
    Triples,
    /// A UMLS `META` directory holding `MRCONSO.RRF` and `MRSTY.RRF`.
    Umls,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallConfig {
    /// Rows per install batch; also the store write batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// UMLS language code kept from MRCONSO.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub source_format: SourceFormat,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl InstallConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_source_format(mut self, source_format: SourceFormat) -> Self {
        self.source_format = source_format;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.batch_size == 0 {
            return Err(ConfigLoadError::Validation(
                "install.batch_size must be greater than zero".into(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "install.language must not be empty".into(),
            ));
        }
        if !self.delimiter.is_ascii() || self.delimiter.is_ascii_whitespace() {
            return Err(ConfigLoadError::Validation(format!(
                "install.delimiter must be a visible ASCII character, got {:?}",
                self.delimiter
            )));
        }
        Ok(())
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            language: default_language(),
            source_format: SourceFormat::default(),
            delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub format: OutputFormat,
}

fn validation<E: std::fmt::Display>(err: E) -> ConfigLoadError {
    ConfigLoadError::Validation(err.to_string())
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_batch_size() -> usize {
    500
}
fn default_language() -> String {
    "ENG".to_string()
}
fn default_delimiter() -> char {
    '|'
}

#[cfg(test)]
mod tests {
    use super::*;
    use concepts::OverlapPolicy;
    use similarity::Similarity;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = FacetConfig::from_yaml("version: \"1\"\n").unwrap();
        assert_eq!(config.ngram.size, 3);
        assert_eq!(config.ngram.boundary_length, 0);
        assert_eq!(config.matcher.similarity, Similarity::Jaccard);
        assert_eq!(config.matcher.threshold, 0.7);
        assert_eq!(config.resolver.window, 5);
        assert_eq!(config.resolver.overlap_policy, OverlapPolicy::Score);
        assert_eq!(config.store.backend, BackendConfig::InMemory);
        assert_eq!(config.install.batch_size, 500);
        assert_eq!(config.install.language, "ENG");
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
version: "1.0"
name: "production"
ngram:
  size: 4
  boundary_length: 1
matcher:
  similarity: cosine
  threshold: 0.85
  cache_capacity: 128
resolver:
  window: 3
  overlap_policy: length
  accepted_semtypes: [default, T999]
  span_strategy: filtered
canonical:
  strip_diacritics: true
  tokenizer: whitespace
store:
  backend:
    kind: sqlite
    path: "/tmp/facet.sqlite"
  mode: read_only
  serializer:
    kind: delimited
  compression:
    codec: zstd
install:
  batch_size: 1000
  source_format: umls
output:
  format: csv
"#;
        let config = FacetConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("production"));
        assert_eq!(config.ngram.size, 4);
        assert_eq!(config.matcher.similarity, Similarity::Cosine);
        assert_eq!(config.matcher.cache_capacity, 128);
        assert_eq!(config.resolver.overlap_policy, OverlapPolicy::Length);
        assert_eq!(config.store.backend, BackendConfig::sqlite("/tmp/facet.sqlite"));
        assert_eq!(config.store.mode, AccessMode::ReadOnly);
        assert_eq!(config.store.serializer, Serializer::delimited());
        assert_eq!(config.store.dictionary_serializer(), Serializer::Json);
        assert_eq!(config.store.compression, Compression::zstd());
        assert_eq!(config.install.source_format, SourceFormat::Umls);
        assert_eq!(config.output.format, OutputFormat::Csv);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"version: \"1.0\"\nmatcher:\n  similarity: dice\n")
            .unwrap();
        let config = FacetConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.matcher.similarity, Similarity::Dice);
    }

    #[test]
    fn test_output_format_xml() {
        let config = FacetConfig::from_yaml("version: \"1\"\noutput:\n  format: xml\n").unwrap();
        assert_eq!(config.output.format, OutputFormat::Xml);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = FacetConfig::from_file("/nonexistent/facet.yaml").unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileRead(_)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (yaml, needle) in [
            ("version: \"2\"\n", "unsupported config version"),
            ("matcher:\n  threshold: 1.5\n", "threshold"),
            ("matcher:\n  threshold: 0\n", "threshold"),
            ("ngram:\n  size: 0\n", "size"),
            ("resolver:\n  window: 0\n", "window"),
            ("install:\n  batch_size: 0\n", "batch_size"),
            (
                "store:\n  compression:\n    codec: zstd\n    level: 40\n",
                "zstd level",
            ),
        ] {
            let err = FacetConfig::from_yaml(yaml).expect_err(yaml);
            assert!(
                err.to_string().contains(needle),
                "{yaml:?} -> {err}"
            );
        }
    }

    #[test]
    fn test_unknown_metric_is_parse_error() {
        let err = FacetConfig::from_yaml("matcher:\n  similarity: levenshtein\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::YamlParse(_)));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = FacetConfig::default().with_install(
            InstallConfig::default()
                .with_batch_size(64)
                .with_source_format(SourceFormat::Umls),
        );
        let yaml = config.to_yaml().unwrap();
        assert_eq!(FacetConfig::from_yaml(&yaml).unwrap(), config);
    }
}
