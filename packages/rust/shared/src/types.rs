//! Core domain types: product identifiers, the identifier/label listing,
//! and the closed campaign taxonomy.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Required length of a product identifier.
pub const ASIN_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Asin
// ---------------------------------------------------------------------------

/// A canonical (uppercase) 10-character alphanumeric product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asin(String);

impl Asin {
    /// True iff `s`, once trimmed, is exactly 10 ASCII alphanumeric characters.
    pub fn is_valid(s: &str) -> bool {
        let trimmed = s.trim();
        trimmed.len() == ASIN_LEN && trimmed.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Validate and canonicalize free text into an identifier.
    pub fn parse(s: &str) -> Option<Self> {
        if Self::is_valid(s) {
            Some(Self(s.trim().to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// Borrow the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Asin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// AsinSkuMap
// ---------------------------------------------------------------------------

/// Ordered, de-duplicated identifier → label (SKU) listing for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsinSkuMap {
    entries: IndexMap<Asin, String>,
}

impl AsinSkuMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair. The first label seen for an identifier wins;
    /// returns `false` when the identifier was already present.
    pub fn insert(&mut self, asin: Asin, sku: impl Into<String>) -> bool {
        if self.entries.contains_key(&asin) {
            return false;
        }
        self.entries.insert(asin, sku.into());
        true
    }

    pub fn get(&self, asin: &Asin) -> Option<&str> {
        self.entries.get(asin).map(String::as_str)
    }

    /// Look up by raw text (trimmed, case-insensitive).
    pub fn lookup(&self, raw: &str) -> Option<&Asin> {
        let asin = Asin::parse(raw)?;
        self.entries.get_key_value(&asin).map(|(k, _)| k)
    }

    pub fn contains(&self, asin: &Asin) -> bool {
        self.entries.contains_key(asin)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate pairs in listing order.
    pub fn iter(&self) -> impl Iterator<Item = (&Asin, &str)> {
        self.entries.iter().map(|(a, s)| (a, s.as_str()))
    }

    pub fn asins(&self) -> impl Iterator<Item = &Asin> {
        self.entries.keys()
    }
}

impl FromIterator<(Asin, String)> for AsinSkuMap {
    fn from_iter<I: IntoIterator<Item = (Asin, String)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (asin, sku) in iter {
            map.insert(asin, sku);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Campaign taxonomy
// ---------------------------------------------------------------------------

/// Coarse campaign segment derived from a campaign name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    BrandedPat,
    BrandedKw,
    CompetitorKw,
    CompetitorPat,
    UnbrandedKw,
    Auto,
    Unknown,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::BrandedPat => "branded_pat",
            Segment::BrandedKw => "branded_kw",
            Segment::CompetitorKw => "competitor_kw",
            Segment::CompetitorPat => "competitor_pat",
            Segment::UnbrandedKw => "unbranded_kw",
            Segment::Auto => "auto",
            Segment::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword match type, or product-attribute targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Phrase,
    Broad,
    Pat,
}

impl MatchType {
    /// Find the first match-type token in `text` (case-insensitive),
    /// checked in the order EXACT, PHRASE, BROAD, PAT.
    pub fn from_text(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        if upper.contains("EXACT") {
            Some(MatchType::Exact)
        } else if upper.contains("PHRASE") {
            Some(MatchType::Phrase)
        } else if upper.contains("BROAD") {
            Some(MatchType::Broad)
        } else if upper.contains("PAT") {
            Some(MatchType::Pat)
        } else {
            None
        }
    }
}

/// Fine-grained aggregation bucket: brand segment × match type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKey {
    BrandedExact,
    BrandedPhrase,
    BrandedBroad,
    BrandedPat,
    UnbrandedExact,
    UnbrandedPhrase,
    UnbrandedBroad,
    CompetitorExact,
    CompetitorPhrase,
    CompetitorBroad,
    CompetitorPat,
    Auto,
    Unknown,
}

impl CampaignKey {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignKey::BrandedExact => "branded_exact",
            CampaignKey::BrandedPhrase => "branded_phrase",
            CampaignKey::BrandedBroad => "branded_broad",
            CampaignKey::BrandedPat => "branded_pat",
            CampaignKey::UnbrandedExact => "unbranded_exact",
            CampaignKey::UnbrandedPhrase => "unbranded_phrase",
            CampaignKey::UnbrandedBroad => "unbranded_broad",
            CampaignKey::CompetitorExact => "competitor_exact",
            CampaignKey::CompetitorPhrase => "competitor_phrase",
            CampaignKey::CompetitorBroad => "competitor_broad",
            CampaignKey::CompetitorPat => "competitor_pat",
            CampaignKey::Auto => "auto",
            CampaignKey::Unknown => "unknown",
        }
    }

    pub fn is_pat(self) -> bool {
        matches!(self, CampaignKey::BrandedPat | CampaignKey::CompetitorPat)
    }
}

impl fmt::Display for CampaignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asin_parse_canonicalizes() {
        let asin = Asin::parse("  b012345678 ").expect("valid");
        assert_eq!(asin.as_str(), "B012345678");
        assert!(Asin::parse("B01234567").is_none());
        assert!(Asin::parse("B01234567-").is_none());
        assert!(Asin::parse("").is_none());
    }

    #[test]
    fn listing_keeps_first_label() {
        let mut map = AsinSkuMap::new();
        let asin = Asin::parse("B000000001").unwrap();
        assert!(map.insert(asin.clone(), "SKU1"));
        assert!(!map.insert(asin.clone(), "SKU2"));
        assert_eq!(map.get(&asin), Some("SKU1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn listing_lookup_is_case_insensitive() {
        let map: AsinSkuMap = [(Asin::parse("B000000001").unwrap(), "SKU1".to_string())]
            .into_iter()
            .collect();
        assert_eq!(map.lookup(" b000000001").map(Asin::as_str), Some("B000000001"));
        assert!(map.lookup("B000000002").is_none());
    }

    #[test]
    fn match_type_precedence() {
        assert_eq!(MatchType::from_text("negativeExact"), Some(MatchType::Exact));
        assert_eq!(MatchType::from_text("Phrase"), Some(MatchType::Phrase));
        assert_eq!(MatchType::from_text("SP - PAT"), Some(MatchType::Pat));
        assert_eq!(MatchType::from_text("auto"), None);
    }

    #[test]
    fn campaign_key_names() {
        assert_eq!(CampaignKey::CompetitorPhrase.to_string(), "competitor_phrase");
        assert!(CampaignKey::BrandedPat.is_pat());
        assert!(!CampaignKey::Auto.is_pat());
    }
}
