mod common;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use common::{installed, HUMERUS};
use facet::{
    AccessMode, ConfigLoadError, Facet, FacetConfig, FacetError, IndexError, KvStore,
    MatchConfig, NgramConfig, Similarity, StoreError, TermEntry,
};

#[test]
fn read_only_store_rejects_install_but_still_matches() {
    let (_writer, store) = installed(FacetConfig::default());
    let read_only: Arc<dyn KvStore> = Arc::new(store.reopen(AccessMode::ReadOnly));
    let facet = Facet::with_store(FacetConfig::default(), read_only).unwrap();

    let err = facet
        .install_entries(
            &[TermEntry::new("radius", "C0034627")],
            &AtomicBool::new(false),
        )
        .unwrap_err();
    assert!(
        matches!(err.store_error(), Some(StoreError::AccessDenied { .. })),
        "{err}"
    );

    let groups = facet.match_text("humerus").unwrap();
    assert_eq!(groups[0][0].cui, HUMERUS);
    assert!(!facet.index().contains_term("radius").unwrap());
}

#[test]
fn out_of_range_threshold_is_a_config_error() {
    for threshold in [0.0, -0.1, 1.5, f64::NAN] {
        let cfg = FacetConfig::default().with_matcher(MatchConfig::new(Similarity::Cosine, threshold));
        let err = Facet::open(cfg).err().expect("threshold should be rejected");
        assert!(
            matches!(err, FacetError::Config(ConfigLoadError::Validation(_))),
            "{threshold}: {err}"
        );
    }
}

#[test]
fn reopening_with_other_ngram_settings_is_rejected() {
    let (_facet, store) = installed(FacetConfig::default());
    let shared: Arc<dyn KvStore> = Arc::new(store);

    let cfg = FacetConfig::default().with_ngram(NgramConfig::default().with_size(4));
    let err = Facet::with_store(cfg, shared).err().expect("settings mismatch");
    assert!(
        matches!(err, FacetError::Index(IndexError::InvalidParameter(_))),
        "{err}"
    );
}

#[test]
fn missing_source_names_the_path() {
    let facet = Facet::open(FacetConfig::default()).unwrap();
    let err = facet
        .install(Path::new("/nonexistent/terms.txt"), &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, FacetError::Source { .. }));
    assert!(err.to_string().contains("/nonexistent/terms.txt"));
}

#[test]
fn raised_abort_flag_installs_nothing() {
    let facet = Facet::open(FacetConfig::default()).unwrap();
    let report = facet
        .install_entries(&common::dictionary(), &AtomicBool::new(true))
        .unwrap();
    assert!(report.aborted);
    assert_eq!(report.terms_indexed, 0);
    assert!(facet.match_text("humerus").unwrap().is_empty());
}

#[cfg(feature = "backend-redb")]
#[test]
fn second_redb_handle_is_unavailable() {
    use facet::{BackendConfig, StoreSection};

    let dir = tempfile::TempDir::new().unwrap();
    let cfg = FacetConfig::default().with_store(
        StoreSection::default().with_backend(BackendConfig::redb(dir.path().join("facet.redb"))),
    );

    let _first = Facet::open(cfg.clone()).unwrap();
    let err = Facet::open(cfg).err().expect("file is already open");
    assert!(
        matches!(err, FacetError::Store(StoreError::Unavailable { .. })),
        "{err}"
    );
}

#[test]
fn errors_expose_their_source() {
    use std::error::Error;

    let cfg = FacetConfig::default().with_matcher(MatchConfig::new(Similarity::Dice, 2.0));
    let err = Facet::open(cfg).err().expect("invalid threshold");
    assert!(err.source().is_some());
}
