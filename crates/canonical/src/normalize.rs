use unicode_categories::UnicodeCategories;
use unicode_normalization::UnicodeNormalization;

use crate::config::CanonicalConfig;

/// Normalise `text` for matching: NFKC, lowercasing, optional diacritic
/// stripping, and whitespace collapsed to single spaces.
///
/// Output depends only on `text` and `cfg`.
pub fn normalize(text: &str, cfg: &CanonicalConfig) -> String {
    let mut out: String = if cfg.normalize_unicode {
        text.nfkc().collect()
    } else {
        text.to_string()
    };
    if cfg.lowercase {
        out = out.to_lowercase();
    }
    if cfg.strip_diacritics {
        out = strip_diacritics(&out);
    }
    collapse_whitespace(&out)
}

/// Remove combining marks after canonical decomposition, then recompose.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|ch| !ch.is_mark_nonspacing())
        .nfc()
        .collect()
}

/// Collapse runs of Unicode whitespace into one ASCII space and trim the
/// ends.
///
/// ```rust
/// use canonical::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("  humerus\t\n bone "), "humerus bone");
/// assert_eq!(collapse_whitespace("hello\u{00A0}world"), "hello world");
/// assert_eq!(collapse_whitespace("   "), "");
/// ```
pub fn collapse_whitespace(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    for segment in text.split_whitespace() {
        if !collapsed.is_empty() {
            collapsed.push(' ');
        }
        collapsed.push_str(segment);
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_lowercases_and_collapses() {
        let cfg = CanonicalConfig::default();
        assert_eq!(normalize("  Fracture of the\tHUMERUS ", &cfg), "fracture of the humerus");
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        let cfg = CanonicalConfig::default();
        // full-width digits and the "fi" ligature
        assert_eq!(normalize("ｔ１ ﬁbula", &cfg), "t1 fibula");
        // decomposed and precomposed accents agree
        assert_eq!(
            normalize("Me\u{0301}nie\u{0300}re", &cfg),
            normalize("Ménière", &cfg)
        );
    }

    #[test]
    fn diacritics_stripped_only_on_request() {
        let keep = CanonicalConfig::default();
        let strip = CanonicalConfig::default().with_strip_diacritics(true);
        assert_eq!(normalize("Ménière's disease", &keep), "ménière's disease");
        assert_eq!(normalize("Ménière's disease", &strip), "meniere's disease");
    }

    #[test]
    fn disabled_transforms_leave_text_alone() {
        let cfg = CanonicalConfig::default()
            .with_lowercase(false)
            .with_normalize_unicode(false);
        assert_eq!(normalize("ＨＢＡ1c", &cfg), "ＨＢＡ1c");
    }
}
