//! Keyword/target extraction from a (trimmed) bulk export.
//!
//! Rows are classified by campaign name and folded into one
//! [`AggregateRecord`] per listed product. Every collection is an
//! order-preserving set: the first occurrence wins, later duplicates are
//! ignored.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use goalforge_shared::{
    Asin, AsinSkuMap, CampaignKey, DEFAULT_BATCH_SIZE, MatchType, Result, Segment,
};
use goalforge_tabular::TabularSource;

use crate::asin::{
    ASIN_COLUMN_VARIANTS, CAMPAIGN_COLUMN_VARIANTS, ENTITY_COLUMN_VARIANTS, extract_from_text,
    extract_target_asins, locate_column,
};
use crate::classify::{detect_campaign_key, detect_segment};
use crate::pipeline::ProgressReporter;

/// Keyword text columns, in lookup order.
pub const KEYWORD_COLUMN_VARIANTS: &[&str] =
    &["Keyword Text", "Keyword", "Keyword or Product Targeting"];

/// Match type columns, in lookup order.
pub const MATCH_TYPE_COLUMN_VARIANTS: &[&str] = &["Match Type", "MatchType", "Keyword Match Type"];

/// Targeting expression columns, in lookup order.
pub const TARGET_COLUMN_VARIANTS: &[&str] = &[
    "Product Targeting Expression",
    "Targeting Expression",
    "Resolved Product Targeting Expression (Informational only)",
    "Target",
];

// ---------------------------------------------------------------------------
// Aggregate model
// ---------------------------------------------------------------------------

/// Exclusions attached to one campaign key of one product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Negatives {
    pub exact: IndexSet<String>,
    pub phrase: IndexSet<String>,
    pub asins: IndexSet<String>,
}

impl Negatives {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.phrase.is_empty() && self.asins.is_empty()
    }
}

/// Everything collected for one product.
///
/// Keyword buckets are keyed by their exact/phrase/broad campaign key; the
/// two PAT keys hold target identifiers and [`CampaignKey::Auto`] holds
/// auto-campaign keywords. Negative buckets are created on first use.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateRecord {
    pub asin: Asin,
    pub sku: String,
    pub buckets: BTreeMap<CampaignKey, IndexSet<String>>,
    pub negatives: BTreeMap<CampaignKey, Negatives>,
}

impl AggregateRecord {
    pub fn new(asin: Asin, sku: impl Into<String>) -> Self {
        Self {
            asin,
            sku: sku.into(),
            buckets: BTreeMap::new(),
            negatives: BTreeMap::new(),
        }
    }

    /// Items of a bucket; empty when nothing was collected.
    pub fn bucket(&self, key: CampaignKey) -> impl Iterator<Item = &str> {
        self.buckets
            .get(&key)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn bucket_len(&self, key: CampaignKey) -> usize {
        self.buckets.get(&key).map_or(0, IndexSet::len)
    }

    /// Append to a bucket; returns `false` for a duplicate.
    pub fn push(&mut self, key: CampaignKey, item: impl Into<String>) -> bool {
        self.buckets.entry(key).or_default().insert(item.into())
    }

    pub fn negatives(&self, key: CampaignKey) -> Option<&Negatives> {
        self.negatives.get(&key)
    }

    pub fn negatives_mut(&mut self, key: CampaignKey) -> &mut Negatives {
        self.negatives.entry(key).or_default()
    }

    /// True when any keyword or target bucket is non-empty.
    pub fn has_content(&self) -> bool {
        self.buckets.values().any(|set| !set.is_empty())
    }
}

/// Per-product aggregates in listing order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Aggregates {
    records: IndexMap<Asin, AggregateRecord>,
}

impl Aggregates {
    /// One empty record per listed product.
    pub fn for_listing(listing: &AsinSkuMap) -> Self {
        Self {
            records: listing
                .iter()
                .map(|(asin, sku)| (asin.clone(), AggregateRecord::new(asin.clone(), sku)))
                .collect(),
        }
    }

    pub fn get(&self, asin: &Asin) -> Option<&AggregateRecord> {
        self.records.get(asin)
    }

    fn get_mut(&mut self, asin: &Asin) -> Option<&mut AggregateRecord> {
        self.records.get_mut(asin)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregateRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when at least one product has keyword or target content.
    pub fn has_any_content(&self) -> bool {
        self.records.values().any(AggregateRecord::has_content)
    }

    /// Only the products that collected something.
    pub fn with_content(&self) -> Aggregates {
        Aggregates {
            records: self
                .records
                .iter()
                .filter(|(_, rec)| rec.has_content())
                .map(|(asin, rec)| (asin.clone(), rec.clone()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Row-level counters for one extraction run. Passed explicitly so that
/// independent runs never share state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub rows_scanned: usize,
    pub keyword_rows: usize,
    pub target_rows: usize,
    pub negative_rows: usize,
    /// Rows whose identifier could not be resolved against the listing.
    pub unmatched_rows: usize,
    pub unknown_segment_rows: usize,
    /// Rows whose campaign name lacked the required marker.
    pub missing_marker_rows: usize,
    /// Rows with neither keyword text nor a targeting expression.
    pub missing_text_rows: usize,
    /// Rows classified fine but with no bucket to land in.
    pub unrouted_rows: usize,
    pub segment_rows: BTreeMap<Segment, usize>,
    pub sheets_skipped: Vec<String>,
}

// ---------------------------------------------------------------------------
// Row view
// ---------------------------------------------------------------------------

/// The cells of one export row the aggregator cares about.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportRow<'a> {
    pub asin: &'a str,
    pub campaign: &'a str,
    pub entity: &'a str,
    pub keyword: &'a str,
    pub match_type: &'a str,
    pub target: &'a str,
}

/// Resolved column positions for one sheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportColumns {
    asin: Option<usize>,
    campaign: Option<usize>,
    entity: Option<usize>,
    keyword: Option<usize>,
    match_type: Option<usize>,
    target: Option<usize>,
}

impl ExportColumns {
    pub fn resolve(header: &[String]) -> Self {
        Self {
            asin: locate_column(header, ASIN_COLUMN_VARIANTS),
            campaign: locate_column(header, CAMPAIGN_COLUMN_VARIANTS),
            entity: locate_column(header, ENTITY_COLUMN_VARIANTS),
            keyword: locate_column(header, KEYWORD_COLUMN_VARIANTS),
            match_type: locate_column(header, MATCH_TYPE_COLUMN_VARIANTS),
            target: locate_column(header, TARGET_COLUMN_VARIANTS),
        }
    }

    /// A sheet is worth scanning only if it can yield keywords or targets.
    pub fn is_usable(&self) -> bool {
        self.keyword.is_some() || self.target.is_some()
    }

    pub fn view<'a>(&self, row: &'a [String]) -> ExportRow<'a> {
        let cell = |idx: Option<usize>| -> &'a str {
            idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
        };
        ExportRow {
            asin: cell(self.asin),
            campaign: cell(self.campaign),
            entity: cell(self.entity),
            keyword: cell(self.keyword),
            match_type: cell(self.match_type),
            target: cell(self.target),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Extraction options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Campaign-name token a row must carry to be processed.
    pub required_marker: Option<String>,
    /// Rows per streamed batch; 0 means the default.
    pub batch_size: usize,
}

/// Folds export rows into per-product aggregates.
pub struct Aggregator<'a> {
    listing: &'a AsinSkuMap,
    marker: Option<String>,
    aggregates: Aggregates,
}

impl<'a> Aggregator<'a> {
    pub fn new(listing: &'a AsinSkuMap, options: &ExtractOptions) -> Self {
        Self {
            listing,
            marker: options
                .required_marker
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_uppercase),
            aggregates: Aggregates::for_listing(listing),
        }
    }

    /// Resolve the product a row belongs to: explicit column, then an
    /// identifier embedded in the campaign name, then any listed identifier
    /// appearing anywhere in the campaign name.
    fn resolve_asin(&self, row: &ExportRow<'_>) -> Option<Asin> {
        if let Some(asin) = self.listing.lookup(row.asin) {
            return Some(asin.clone());
        }
        if let Some(asin) = extract_from_text(row.campaign).filter(|a| self.listing.contains(a)) {
            return Some(asin);
        }
        let campaign = row.campaign.to_uppercase();
        self.listing
            .asins()
            .find(|asin| campaign.contains(asin.as_str()))
            .cloned()
    }

    /// Process one row, updating `summary`.
    pub fn ingest(&mut self, row: &ExportRow<'_>, summary: &mut ExtractSummary) {
        summary.rows_scanned += 1;

        if let Some(marker) = &self.marker {
            if !row.campaign.to_uppercase().contains(marker.as_str()) {
                summary.missing_marker_rows += 1;
                return;
            }
        }

        let keyword = row.keyword.trim();
        let target = row.target.trim();
        if keyword.is_empty() && target.is_empty() {
            summary.missing_text_rows += 1;
            return;
        }

        let Some(asin) = self.resolve_asin(row) else {
            summary.unmatched_rows += 1;
            return;
        };

        let segment = detect_segment(row.campaign);
        *summary.segment_rows.entry(segment).or_default() += 1;
        if segment == Segment::Unknown {
            summary.unknown_segment_rows += 1;
            return;
        }

        let negative = row.match_type.to_lowercase().contains("negative")
            || row.entity.to_lowercase().contains("negative");

        let Some(record) = self.aggregates.get_mut(&asin) else {
            summary.unmatched_rows += 1;
            return;
        };

        if !keyword.is_empty() {
            summary.keyword_rows += 1;
            ingest_keyword(record, row, keyword, segment, negative, summary);
        } else {
            summary.target_rows += 1;
            ingest_target(record, row, target, segment, negative, summary);
        }
    }

    pub fn finish(self) -> Aggregates {
        self.aggregates
    }
}

fn ingest_keyword(
    record: &mut AggregateRecord,
    row: &ExportRow<'_>,
    keyword: &str,
    segment: Segment,
    negative: bool,
    summary: &mut ExtractSummary,
) {
    if negative {
        summary.negative_rows += 1;
        let key = detect_campaign_key(row.campaign, None);
        let negatives = record.negatives_mut(key);
        if row.match_type.to_lowercase().contains("exact") {
            negatives.exact.insert(keyword.to_string());
        } else {
            negatives.phrase.insert(keyword.to_string());
        }
        return;
    }

    let key = if segment == Segment::Auto {
        CampaignKey::Auto
    } else {
        detect_campaign_key(row.campaign, MatchType::from_text(row.match_type))
    };
    if key.is_pat() || key == CampaignKey::Unknown {
        summary.unrouted_rows += 1;
        return;
    }
    record.push(key, keyword);
}

fn ingest_target(
    record: &mut AggregateRecord,
    row: &ExportRow<'_>,
    target: &str,
    segment: Segment,
    negative: bool,
    summary: &mut ExtractSummary,
) {
    let asins = extract_target_asins(target);
    if asins.is_empty() {
        summary.unrouted_rows += 1;
        return;
    }

    if negative {
        summary.negative_rows += 1;
        let key = detect_campaign_key(row.campaign, None);
        let negatives = record.negatives_mut(key);
        negatives
            .asins
            .extend(asins.into_iter().map(|a| a.to_string()));
        return;
    }

    let key = if segment == Segment::BrandedPat {
        CampaignKey::BrandedPat
    } else {
        CampaignKey::CompetitorPat
    };
    for asin in asins {
        record.push(key, asin.to_string());
    }
}

/// Scan every usable sheet of `source` and aggregate per listed product.
#[instrument(skip_all, fields(products = listing.len()))]
pub fn extract_keywords(
    source: &mut dyn TabularSource,
    listing: &AsinSkuMap,
    options: &ExtractOptions,
    summary: &mut ExtractSummary,
    progress: &dyn ProgressReporter,
) -> Result<Aggregates> {
    let batch_size = if options.batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        options.batch_size
    };
    let mut aggregator = Aggregator::new(listing, options);

    for sheet in source.sheet_names() {
        let header = source.header(&sheet)?;
        let columns = ExportColumns::resolve(&header);
        if !columns.is_usable() {
            debug!(sheet = %sheet, "no keyword or targeting columns, skipping sheet");
            summary.sheets_skipped.push(sheet);
            continue;
        }

        for batch in source.batches(&sheet, batch_size)? {
            for row in batch? {
                aggregator.ingest(&columns.view(&row), summary);
            }
            progress.rows_scanned(&sheet, summary.rows_scanned);
        }
    }

    let aggregates = aggregator.finish();
    for (segment, rows) in &summary.segment_rows {
        debug!(segment = %segment, rows, "segment rows");
    }
    info!(
        rows = summary.rows_scanned,
        keywords = summary.keyword_rows,
        targets = summary.target_rows,
        negatives = summary.negative_rows,
        unmatched = summary.unmatched_rows,
        unknown_segment = summary.unknown_segment_rows,
        missing_marker = summary.missing_marker_rows,
        "extraction complete"
    );
    if !aggregates.has_any_content() {
        warn!("no keywords or targets were extracted for any product");
    }
    Ok(aggregates)
}
