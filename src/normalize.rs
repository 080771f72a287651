use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Canonical comparison form of a cell: NFC-composed with every whitespace
/// character removed, including the ones inside the text.
pub fn normalize_text(value: &str) -> String {
    value.nfc().filter(|c| !c.is_whitespace()).collect()
}

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^0-9A-Z]").expect("static pattern"))
}

/// Reduce a spec code to its upper-case ASCII alphanumeric skeleton.
pub fn fuzzy_key(spec_code: &str) -> String {
    if spec_code.is_empty() {
        return String::new();
    }
    non_alphanumeric()
        .replace_all(&spec_code.to_uppercase(), "")
        .into_owned()
}

/// Suffix rule for fuzzy keys, in either direction. Empty keys never match.
pub fn fuzzy_keys_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.ends_with(b) || b.ends_with(a)
}
