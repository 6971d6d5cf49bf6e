//! Title/author normalization for the dedup key: lowercase, fold
//! common Latin diacritics to their ASCII base letter, collapse
//! whitespace, strip a trailing edition/subtitle suffix class.
//!
//! No extra diacritics crate is pulled in — the fold table below covers
//! the common Latin-1/Latin Extended-A range, which is what indexer
//! titles actually use.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Matches a trailing edition/subtitle tag: `" (unabridged)"`,
/// `": a novel"`, `" [retail]"`, or `" (... edition)"`.
static EDITION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(\(unabridged\)|:\s*a novel|\[[^\]]*\]|\([^)]*edition[^)]*\))\s*$").unwrap()
});

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ĭ' | 'į' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ŭ' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ñ' | 'ń' | 'ņ' => 'n',
        'ç' | 'ć' | 'č' => 'c',
        'š' => 's',
        'ž' => 'z',
        other => other,
    }
}

/// Applies the dedup-key normalization exactly once: lowercase, fold,
/// strip edition suffix, collapse whitespace.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let folded: String = lowered.chars().map(fold_char).collect();
    let stripped = EDITION_SUFFIX.replace(&folded, "");
    WHITESPACE.replace_all(stripped.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_and_collapses_whitespace() {
        assert_eq!(normalize("Café  du   Monde"), "cafe du monde");
    }

    #[test]
    fn strips_unabridged_suffix() {
        assert_eq!(normalize("Dune (Unabridged)"), "dune");
    }

    #[test]
    fn strips_a_novel_suffix() {
        assert_eq!(normalize("Dune: A Novel"), "dune");
    }

    /// Property guard: swapping edition-suffix classes across an
    /// otherwise-identical title pair must still dedup to the same
    /// key.
    #[test]
    fn edition_suffix_swap_still_dedups() {
        let a = normalize("Dune (Unabridged)");
        let b = normalize("Dune: A Novel");
        let c = normalize("Dune [Retail]");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
