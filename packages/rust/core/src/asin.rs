//! Product identifier recognition: validation, extraction from free text,
//! and column lookup across the naming variants found in bulk exports.

use std::sync::LazyLock;

use regex::Regex;

use goalforge_shared::Asin;

// ---------------------------------------------------------------------------
// Column name variants
// ---------------------------------------------------------------------------

/// Identifier column names seen in bulk exports, in lookup order.
pub const ASIN_COLUMN_VARIANTS: &[&str] = &[
    "ASIN",
    "Advertised ASIN",
    "Product ASIN",
    "ASIN (Informational only)",
    "advertised_asin",
    "product_asin",
];

/// Campaign name columns, in lookup order.
pub const CAMPAIGN_COLUMN_VARIANTS: &[&str] = &[
    "Campaign Name",
    "Campaign Name (Informational only)",
    "Campaign",
];

/// Entity / record-type columns, in lookup order.
pub const ENTITY_COLUMN_VARIANTS: &[&str] = &["Entity", "Record Type"];

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `B` followed by nine alphanumerics, word-bounded.
static ASIN_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(B[0-9A-Z]{9})\b").expect("asin-in-text regex"));

/// `asin="B0XXXXXXXX"` inside a targeting expression; quotes optional.
static TARGET_ASIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)asin="?([A-Z0-9]{10})"?"#).expect("target asin regex"));

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

/// True iff `s`, trimmed, is exactly 10 alphanumeric characters.
pub fn is_valid_identifier(s: &str) -> bool {
    Asin::is_valid(s)
}

/// First identifier embedded in free text such as a campaign name.
pub fn extract_from_text(text: &str) -> Option<Asin> {
    ASIN_IN_TEXT_RE
        .captures(text)
        .and_then(|caps| Asin::parse(&caps[1]))
}

/// Every identifier referenced by a targeting expression, in order.
pub fn extract_target_asins(expression: &str) -> Vec<Asin> {
    TARGET_ASIN_RE
        .captures_iter(expression)
        .filter_map(|caps| Asin::parse(&caps[1]))
        .collect()
}

/// Index of the first column matching one of `variants`
/// (case-insensitive, surrounding whitespace ignored). Variants are tried
/// in order, so earlier variants win over later ones.
pub fn locate_column(columns: &[String], variants: &[&str]) -> Option<usize> {
    variants.iter().find_map(|variant| {
        columns
            .iter()
            .position(|col| col.trim().eq_ignore_ascii_case(variant.trim()))
    })
}

/// Name of the identifier column, if any known variant is present.
/// Callers must fail fast with the full column list when this is `None`.
pub fn locate_identifier_column<'a>(columns: &'a [String], variants: &[&str]) -> Option<&'a str> {
    locate_column(columns, variants).map(|idx| columns[idx].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn validates_identifiers() {
        assert!(is_valid_identifier("B012345678"));
        assert!(is_valid_identifier(" b012345678 "));
        assert!(!is_valid_identifier("B01234567"));
        assert!(!is_valid_identifier("B0123-5678"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn extracts_from_campaign_name() {
        let asin = extract_from_text("SKU-B012345678-Perpetua-SP-Manual").expect("found");
        assert_eq!(asin.as_str(), "B012345678");
        assert!(extract_from_text("no id here").is_none());
    }

    #[test]
    fn extraction_is_case_insensitive_and_bounded() {
        let asin = extract_from_text("sku1 - jn - b0abcdefgh [sp_auto]").expect("found");
        assert_eq!(asin.as_str(), "B0ABCDEFGH");
        // Embedded in a longer token: no word boundary.
        assert!(extract_from_text("XB012345678").is_none());
        assert!(extract_from_text("B0123456789").is_none());
    }

    #[test]
    fn extracts_target_expressions() {
        let found = extract_target_asins(r#"asin="B000000001""#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_str(), "B000000001");

        let found = extract_target_asins("ASIN=b000000002 or asin-expanded=\"B000000003\"");
        assert_eq!(
            found.iter().map(Asin::as_str).collect::<Vec<_>>(),
            vec!["B000000002"]
        );

        assert!(extract_target_asins("category=\"12345\"").is_empty());
    }

    #[test]
    fn locates_identifier_column_case_insensitively() {
        let columns = cols(&["Campaign Name", "advertised asin", "Bid"]);
        assert_eq!(
            locate_identifier_column(&columns, ASIN_COLUMN_VARIANTS),
            Some("advertised asin")
        );
        assert_eq!(locate_column(&columns, ASIN_COLUMN_VARIANTS), Some(1));
    }

    #[test]
    fn earlier_variant_wins() {
        let columns = cols(&["Product ASIN", "ASIN"]);
        assert_eq!(locate_identifier_column(&columns, ASIN_COLUMN_VARIANTS), Some("ASIN"));
    }

    #[test]
    fn missing_identifier_column() {
        let columns = cols(&["Campaign Name", "Bid"]);
        assert!(locate_identifier_column(&columns, ASIN_COLUMN_VARIANTS).is_none());
    }
}
