//! Bulk export trimmer.
//!
//! Streams every sheet of a bulk export in fixed-size batches and keeps only
//! the rows that belong to listed products, plus metadata rows depending on
//! [`MetadataPolicy`]. Read-only metric columns are dropped on the way out.

use std::path::Path;

use indexmap::IndexSet;
use tracing::{debug, info, instrument, warn};

use goalforge_shared::{AsinSkuMap, DEFAULT_BATCH_SIZE, GoalforgeError, MetadataPolicy, Result};
use goalforge_tabular::{Row, Table, TabularFormat, TabularSource, open_source, write_table};

use crate::asin::{
    ASIN_COLUMN_VARIANTS, CAMPAIGN_COLUMN_VARIANTS, ENTITY_COLUMN_VARIANTS, extract_from_text,
    locate_column,
};
use crate::pipeline::ProgressReporter;

/// Entity values that survive the entity filter (case-insensitive).
pub const ENTITY_ALLOW_LIST: &[&str] = &[
    "Keyword",
    "Negative Keyword",
    "Campaign Negative Keyword",
    "Product Targeting",
    "Negative Product Targeting",
    "Campaign Negative Product Targeting",
];

/// Computed performance columns the upload format rejects.
pub const METRIC_COLUMNS: &[&str] = &[
    "Impressions",
    "Clicks",
    "Click-through Rate",
    "Spend",
    "Sales",
    "Orders",
    "Units",
    "Conversion Rate",
    "ACOS",
    "CPC",
    "ROAS",
];

/// Sheet name used for XLSX output.
pub const TRIMMED_SHEET_NAME: &str = "Sponsored Products Campaigns";

/// Trimmer options.
#[derive(Debug, Clone, Copy)]
pub struct TrimOptions {
    /// Rows per streamed batch.
    pub batch_size: usize,
    pub metadata: MetadataPolicy,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            metadata: MetadataPolicy::default(),
        }
    }
}

/// Counters reported after a trim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrimStats {
    pub source_rows: usize,
    pub retained_rows: usize,
    /// Retained rows with no identifier.
    pub metadata_rows: usize,
    /// Rows whose identifier was recovered from the campaign name.
    pub recovered_rows: usize,
    pub entity_dropped_rows: usize,
    /// Rows whose identifier is not listed (or blank under `Drop`).
    pub unmatched_rows: usize,
    /// Identifier column of the first processed sheet.
    pub identifier_column: String,
    pub dropped_columns: Vec<String>,
    pub sheets_processed: Vec<String>,
    pub sheets_skipped: Vec<String>,
    pub source_bytes: u64,
    pub output_bytes: u64,
}

impl TrimStats {
    pub fn size_reduction_percent(&self) -> f64 {
        if self.source_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.output_bytes as f64 / self.source_bytes as f64) * 100.0
    }
}

/// Trimmed rows plus their statistics.
#[derive(Debug, Clone)]
pub struct TrimOutcome {
    pub table: Table,
    pub stats: TrimStats,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Sheet layout
// ---------------------------------------------------------------------------

/// Column roles and output projection for one sheet.
#[derive(Debug)]
struct SheetPlan {
    name: String,
    identifier: usize,
    entity: Option<usize>,
    campaign: Option<usize>,
    /// (source column, output column) for every kept column.
    projection: Vec<(usize, usize)>,
}

/// Output names of the identifier, entity and campaign columns.
///
/// Each role maps onto a single output column named after the first sheet
/// that has it, so sheets spelling a role differently ("ASIN" and
/// "Advertised ASIN") still share one column and the output trims cleanly
/// a second time.
#[derive(Debug, Default)]
struct RoleColumns {
    identifier: Option<String>,
    entity: Option<String>,
    campaign: Option<String>,
}

impl RoleColumns {
    /// Source index and output name of every role column present in `header`.
    fn claim(
        &mut self,
        header: &[String],
        identifier: usize,
        entity: Option<usize>,
        campaign: Option<usize>,
    ) -> Vec<(usize, String)> {
        let mut claimed = vec![(
            identifier,
            self.identifier
                .get_or_insert_with(|| header[identifier].clone())
                .clone(),
        )];
        if let Some(idx) = entity {
            let name = self.entity.get_or_insert_with(|| header[idx].clone());
            claimed.push((idx, name.clone()));
        }
        if let Some(idx) = campaign {
            let name = self.campaign.get_or_insert_with(|| header[idx].clone());
            claimed.push((idx, name.clone()));
        }
        claimed
    }
}

fn same_column(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn is_metric_column(name: &str) -> bool {
    let name = name.trim();
    METRIC_COLUMNS.iter().any(|m| m.eq_ignore_ascii_case(name))
}

fn is_allowed_entity(entity: &str) -> bool {
    ENTITY_ALLOW_LIST
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(entity))
}

// ---------------------------------------------------------------------------
// Trim
// ---------------------------------------------------------------------------

/// Trim every sheet of `source` against `listing`.
///
/// Fails with a schema error listing every discovered column when no sheet
/// has an identifier column. An empty result is reported as a warning.
#[instrument(skip_all, fields(products = listing.len(), batch_size = options.batch_size))]
pub fn trim_source(
    source: &mut dyn TabularSource,
    listing: &AsinSkuMap,
    options: &TrimOptions,
    progress: &dyn ProgressReporter,
) -> Result<TrimOutcome> {
    let batch_size = options.batch_size.max(1);
    let mut stats = TrimStats::default();

    // --- Phase 1: Headers ---
    let mut all_columns: IndexSet<String> = IndexSet::new();
    let mut output_columns: IndexSet<String> = IndexSet::new();
    let mut dropped: IndexSet<String> = IndexSet::new();
    let mut roles = RoleColumns::default();
    let mut plans = Vec::new();

    for sheet in source.sheet_names() {
        let header = source.header(&sheet)?;
        all_columns.extend(header.iter().cloned());

        let Some(identifier) = locate_column(&header, ASIN_COLUMN_VARIANTS) else {
            debug!(sheet = %sheet, "no identifier column, skipping sheet");
            stats.sheets_skipped.push(sheet);
            continue;
        };
        let entity = locate_column(&header, ENTITY_COLUMN_VARIANTS);
        let campaign = locate_column(&header, CAMPAIGN_COLUMN_VARIANTS);

        let role_names = roles.claim(&header, identifier, entity, campaign);
        if stats.identifier_column.is_empty() {
            stats.identifier_column = role_names[0].1.clone();
        }

        let mut projection = Vec::with_capacity(header.len());
        for (idx, column) in header.iter().enumerate() {
            if is_metric_column(column) {
                dropped.insert(column.clone());
                continue;
            }
            let name = match role_names.iter().find(|(role_idx, _)| *role_idx == idx) {
                Some((_, name)) => name.clone(),
                None if role_names.iter().any(|(_, name)| same_column(name, column)) => {
                    debug!(sheet = %sheet, column = %column, "column shadowed by a role column");
                    continue;
                }
                None => column.clone(),
            };
            let (out, _) = output_columns.insert_full(name);
            projection.push((idx, out));
        }

        plans.push(SheetPlan {
            name: sheet,
            identifier,
            entity,
            campaign,
            projection,
        });
    }

    if plans.is_empty() {
        return Err(GoalforgeError::schema(
            format!(
                "no identifier column found on any sheet (looked for {})",
                ASIN_COLUMN_VARIANTS.join(", ")
            ),
            all_columns.into_iter().collect(),
        ));
    }
    stats.dropped_columns = dropped.into_iter().collect();

    // --- Phase 2: Stream ---
    let width = output_columns.len();
    let mut table = Table::new(output_columns.into_iter().collect());

    for plan in &plans {
        debug!(sheet = %plan.name, "trimming sheet");
        for batch in source.batches(&plan.name, batch_size)? {
            let batch = batch?;
            for mut row in batch {
                stats.source_rows += 1;
                if keep_row(&mut row, plan, listing, options.metadata, &mut stats) {
                    let mut out = vec![String::new(); width];
                    for &(src, dst) in &plan.projection {
                        if let Some(cell) = row.get_mut(src) {
                            out[dst] = std::mem::take(cell);
                        }
                    }
                    table.push_row(out);
                    stats.retained_rows += 1;
                }
            }
            progress.rows_scanned(&plan.name, stats.source_rows);
        }
        stats.sheets_processed.push(plan.name.clone());
    }

    let mut warnings = Vec::new();
    if stats.retained_rows == 0 {
        let message = "no rows matched the listing; output contains only the header".to_string();
        warn!("{message}");
        warnings.push(message);
    }

    info!(
        source_rows = stats.source_rows,
        retained = stats.retained_rows,
        metadata = stats.metadata_rows,
        recovered = stats.recovered_rows,
        entity_dropped = stats.entity_dropped_rows,
        unmatched = stats.unmatched_rows,
        identifier_column = %stats.identifier_column,
        "trim complete"
    );
    Ok(TrimOutcome {
        table,
        stats,
        warnings,
    })
}

/// Decide whether a row survives; normalizes the identifier cell in place.
fn keep_row(
    row: &mut Row,
    plan: &SheetPlan,
    listing: &AsinSkuMap,
    metadata: MetadataPolicy,
    stats: &mut TrimStats,
) -> bool {
    if let Some(entity) = plan.entity.and_then(|i| row.get(i)) {
        let entity = entity.trim();
        let blank_ok = metadata == MetadataPolicy::Retain;
        if !(is_allowed_entity(entity) || (entity.is_empty() && blank_ok)) {
            stats.entity_dropped_rows += 1;
            return false;
        }
    }

    let Some(cell) = row.get_mut(plan.identifier) else {
        return false;
    };
    let normalized = cell.trim().to_uppercase();
    *cell = normalized.clone();

    let resolved = if normalized.is_empty() {
        let recovered = plan
            .campaign
            .and_then(|i| row.get(i))
            .and_then(|name| extract_from_text(name));
        if recovered.is_some() {
            stats.recovered_rows += 1;
        }
        recovered.map(|a| a.to_string()).unwrap_or_default()
    } else {
        normalized
    };

    if resolved.is_empty() {
        return match metadata {
            MetadataPolicy::Retain => {
                stats.metadata_rows += 1;
                true
            }
            MetadataPolicy::Drop => {
                stats.unmatched_rows += 1;
                false
            }
        };
    }

    if listing.lookup(&resolved).is_some() {
        true
    } else {
        stats.unmatched_rows += 1;
        false
    }
}

/// Trim `bulk` into `output`, recording file sizes before and after.
#[instrument(skip_all, fields(bulk = %bulk.display(), output = %output.display()))]
pub fn trim_bulk_file(
    bulk: &Path,
    listing: &AsinSkuMap,
    output: &Path,
    options: &TrimOptions,
    progress: &dyn ProgressReporter,
) -> Result<TrimOutcome> {
    TabularFormat::for_output(output)?;
    let mut source = open_source(bulk)?;
    let source_bytes = std::fs::metadata(bulk)
        .map_err(|e| GoalforgeError::io(bulk, e))?
        .len();

    let mut outcome = trim_source(source.as_mut(), listing, options, progress)?;

    write_table(output, &outcome.table, TRIMMED_SHEET_NAME)?;
    outcome.stats.source_bytes = source_bytes;
    outcome.stats.output_bytes = std::fs::metadata(output)
        .map_err(|e| GoalforgeError::io(output, e))?
        .len();

    debug!(dropped_columns = ?outcome.stats.dropped_columns, "metric columns removed");
    info!(
        source_bytes,
        output_bytes = outcome.stats.output_bytes,
        reduction_pct = outcome.stats.size_reduction_percent(),
        "trimmed export written"
    );
    Ok(outcome)
}
