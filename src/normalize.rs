// 🔤 Normalizer - Canonical supplier names
// Trim + colapsar espacios + mayúsculas: join key entre roster y filenames

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Canonicalize free text for name comparisons
///
/// - Leading/trailing whitespace removed
/// - Internal whitespace runs collapsed to a single space
/// - Upper-cased
///
/// # Examples:
/// ```
/// use payment_dispatch::normalize;
/// assert_eq!(normalize("  acme   s.a. "), "ACME S.A.");
/// ```
pub fn normalize<S: AsRef<str>>(text: S) -> String {
    WHITESPACE_RUN
        .replace_all(text.as_ref().trim(), " ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_uppercases() {
        assert_eq!(normalize("  acme sa  "), "ACME SA");
    }

    #[test]
    fn test_collapses_internal_whitespace() {
        assert_eq!(normalize("acme\t\t s.a.\n  argentina"), "ACME S.A. ARGENTINA");
    }

    #[test]
    fn test_empty_and_blank() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t "), "");
    }

    #[test]
    fn test_non_ascii_letters() {
        assert_eq!(normalize("razón  social"), "RAZÓN SOCIAL");
    }

    #[test]
    fn test_idempotent() {
        let inputs = ["  a  b ", "ACME", "x\ty\nz", "ñandú  s.r.l.", ""];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
            assert!(!once.starts_with(' ') && !once.ends_with(' '));
            assert!(!once.contains("  "));
            assert_eq!(once, once.to_uppercase());
        }
    }
}
