#![allow(dead_code)]

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use facet::{Facet, FacetConfig, KvStore, TermEntry};
use store::InMemoryStore;

pub const HUMERUS: &str = "C0020164";
pub const FRACTURE: &str = "C0016658";
pub const FEVER: &str = "C0015967";

pub fn dictionary() -> Vec<TermEntry> {
    vec![
        TermEntry::new("Humerus", HUMERUS)
            .with_semtypes(["T023"])
            .with_preferred(true),
        TermEntry::new("humeral bone", HUMERUS).with_semtypes(["T023"]),
        TermEntry::new("Fracture", FRACTURE)
            .with_semtypes(["T037"])
            .with_preferred(true),
        TermEntry::new("fever", FEVER)
            .with_semtypes(["T184"])
            .with_preferred(true),
    ]
}

/// An in-memory facet with [`dictionary`] installed.
pub fn installed(cfg: FacetConfig) -> (Facet, InMemoryStore) {
    let store = InMemoryStore::new();
    let shared: Arc<dyn KvStore> = Arc::new(store.clone());
    let facet = Facet::with_store(cfg, shared).expect("facet should open");
    facet
        .install_entries(&dictionary(), &AtomicBool::new(false))
        .expect("install should succeed");
    (facet, store)
}
