use std::collections::BTreeSet;

/// Clinical semantic types kept by default, with their UMLS names.
pub const ACCEPTED_SEMTYPES: &[(&str, &str)] = &[
    ("T029", "Body Location or Region"),
    ("T023", "Body Part, Organ, or Organ Component"),
    ("T031", "Body Substance"),
    ("T060", "Diagnostic Procedure"),
    ("T047", "Disease or Syndrome"),
    ("T074", "Medical Device"),
    ("T200", "Clinical Drug"),
    ("T203", "Drug Delivery Device"),
    ("T033", "Finding"),
    ("T184", "Sign or Symptom"),
    ("T034", "Laboratory or Test Result"),
    ("T058", "Health Care Activity"),
    ("T059", "Laboratory Procedure"),
    ("T037", "Injury or Poisoning"),
    ("T061", "Therapeutic or Preventive Procedure"),
    ("T048", "Mental or Behavioral Dysfunction"),
    ("T046", "Pathologic Function"),
    ("T121", "Pharmacologic Substance"),
    ("T201", "Clinical Attribute"),
    ("T130", "Indicator, Reagent, or Diagnostic Aid"),
    ("T195", "Antibiotic"),
    ("T039", "Physiologic Function"),
    ("T040", "Organism Function"),
    ("T041", "Mental Process"),
    ("T170", "Intellectual Product"),
    ("T191", "Neoplastic Process"),
];

/// Keyword standing for the whole [`ACCEPTED_SEMTYPES`] set in config lists.
pub const DEFAULT_SEMTYPES_KEYWORD: &str = "default";

pub fn semtype_name(code: &str) -> Option<&'static str> {
    ACCEPTED_SEMTYPES
        .iter()
        .find(|(tui, _)| *tui == code)
        .map(|(_, name)| *name)
}

/// Expand a configured list into a set of codes. `"default"` pulls in
/// every accepted clinical type; other entries are taken verbatim.
pub fn expand_semtypes<S: AsRef<str>>(configured: &[S]) -> BTreeSet<String> {
    let mut codes = BTreeSet::new();
    for entry in configured {
        let entry = entry.as_ref().trim();
        if entry.eq_ignore_ascii_case(DEFAULT_SEMTYPES_KEYWORD) {
            codes.extend(ACCEPTED_SEMTYPES.iter().map(|(tui, _)| tui.to_string()));
        } else if !entry.is_empty() {
            codes.insert(entry.to_string());
        }
    }
    codes
}
