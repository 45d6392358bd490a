//! End-to-end stages: bulk export → trimmed export → aggregates → goal sheet.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use goalforge_shared::{Asin, GoalConfig, GoalforgeError, Result};
use goalforge_tabular::{TabularFormat, open_source, write_table};

use crate::extractor::{ExtractOptions, ExtractSummary, extract_keywords};
use crate::generator::{GOAL_SHEET_NAME, GoalSheet, generate_goals, generate_template};
use crate::listing::{load_asin_sku_map, load_negative_asins};
use crate::trimmer::{TrimOptions, TrimStats, trim_bulk_file};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each streamed batch with the running row count.
    fn rows_scanned(&self, sheet: &str, rows: usize);
    /// Called once per product after its goal rows are built.
    fn product_generated(&self, asin: &str, current: usize, total: usize);
    /// Called when a stage completes.
    fn done(&self, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn rows_scanned(&self, _sheet: &str, _rows: usize) {}
    fn product_generated(&self, _asin: &str, _current: usize, _total: usize) {}
    fn done(&self, _message: &str) {}
}

// ---------------------------------------------------------------------------
// trim
// ---------------------------------------------------------------------------

/// Inputs for [`run_trim`].
#[derive(Debug, Clone)]
pub struct TrimRequest {
    pub bulk: PathBuf,
    pub listing: PathBuf,
    pub output: PathBuf,
    pub options: TrimOptions,
}

/// Result of [`run_trim`].
#[derive(Debug)]
pub struct TrimReport {
    pub output: PathBuf,
    pub products: usize,
    pub stats: TrimStats,
    /// Non-fatal conditions (e.g. nothing matched).
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// Load the listing and trim the bulk export against it.
#[instrument(skip_all, fields(bulk = %request.bulk.display()))]
pub fn run_trim(request: &TrimRequest, progress: &dyn ProgressReporter) -> Result<TrimReport> {
    let start = Instant::now();

    // --- Phase 1: Listing ---
    progress.phase("Loading listing");
    let listing = load_asin_sku_map(&request.listing)?;
    if listing.is_empty() {
        return Err(GoalforgeError::validation(format!(
            "{} contains no valid identifiers",
            request.listing.display()
        )));
    }

    // --- Phase 2: Trim ---
    progress.phase("Trimming bulk export");
    let outcome = trim_bulk_file(
        &request.bulk,
        &listing,
        &request.output,
        &request.options,
        progress,
    )?;

    let report = TrimReport {
        output: request.output.clone(),
        products: listing.len(),
        stats: outcome.stats,
        warnings: outcome.warnings,
        elapsed: start.elapsed(),
    };
    info!(
        retained = report.stats.retained_rows,
        source = report.stats.source_rows,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "trim complete"
    );
    progress.done(&format!(
        "Trimmed {} → {} rows",
        report.stats.source_rows, report.stats.retained_rows
    ));
    Ok(report)
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

/// Inputs for [`run_generate`].
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub listing: PathBuf,
    /// Export to aggregate from; `None` selects template mode.
    pub export: Option<PathBuf>,
    /// Optional global negative identifier list.
    pub negatives: Option<PathBuf>,
    pub output: PathBuf,
    pub goals: GoalConfig,
    pub extract: ExtractOptions,
}

/// Result of [`run_generate`].
#[derive(Debug)]
pub struct GenerateReport {
    pub output: PathBuf,
    /// True when every product received the empty 12-entry template.
    pub template: bool,
    pub products: usize,
    pub goal_rows: usize,
    pub product_rows: usize,
    pub global_negatives: usize,
    /// Present when an export was scanned.
    pub summary: Option<ExtractSummary>,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// Aggregate an export (if any) and write the goal sheet.
///
/// Falls back to template mode, with a warning, when the export yields no
/// keyword or target data for any product.
#[instrument(skip_all, fields(output = %request.output.display()))]
pub fn run_generate(
    request: &GenerateRequest,
    progress: &dyn ProgressReporter,
) -> Result<GenerateReport> {
    let start = Instant::now();
    request.goals.validate()?;
    TabularFormat::for_output(&request.output)?;

    // --- Phase 1: Inputs ---
    progress.phase("Loading listing");
    let listing = load_asin_sku_map(&request.listing)?;
    if listing.is_empty() {
        return Err(GoalforgeError::validation(format!(
            "{} contains no valid identifiers",
            request.listing.display()
        )));
    }
    let global_negatives: Vec<Asin> = match &request.negatives {
        Some(path) => load_negative_asins(path)?,
        None => Vec::new(),
    };
    if !global_negatives.is_empty() {
        info!(count = global_negatives.len(), "global negatives loaded");
    }

    let mut warnings = Vec::new();

    // --- Phase 2: Aggregate ---
    let (sheet, summary): (GoalSheet, Option<ExtractSummary>) = match &request.export {
        Some(export) => {
            progress.phase("Extracting keywords");
            let mut source = open_source(export)?;
            let mut summary = ExtractSummary::default();
            let aggregates = extract_keywords(
                source.as_mut(),
                &listing,
                &request.extract,
                &mut summary,
                progress,
            )?;

            // --- Phase 3: Synthesize ---
            progress.phase("Generating goals");
            if aggregates.has_any_content() {
                let sheet = generate_goals(&aggregates, &request.goals, &global_negatives, progress);
                (sheet, Some(summary))
            } else {
                let message = format!(
                    "no keyword or target data found in {}; writing empty template",
                    export.display()
                );
                warn!("{message}");
                warnings.push(message);
                (generate_template(&listing, &request.goals, progress), Some(summary))
            }
        }
        None => {
            progress.phase("Generating template");
            (generate_template(&listing, &request.goals, progress), None)
        }
    };

    // --- Phase 4: Write ---
    progress.phase("Writing goal sheet");
    write_table(&request.output, &sheet.table, GOAL_SHEET_NAME)?;

    let report = GenerateReport {
        output: request.output.clone(),
        template: sheet.template,
        products: sheet.products,
        goal_rows: sheet.goal_rows,
        product_rows: sheet.product_rows,
        global_negatives: global_negatives.len(),
        summary,
        warnings,
        elapsed: start.elapsed(),
    };
    info!(
        products = report.products,
        goal_rows = report.goal_rows,
        template = report.template,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "goal sheet written"
    );
    progress.done(&format!(
        "Wrote {} goal rows for {} products",
        report.goal_rows, report.products
    ));
    Ok(report)
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

/// Inputs for [`run_extract`].
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub listing: PathBuf,
    pub export: PathBuf,
    /// JSON destination.
    pub output: PathBuf,
    pub extract: ExtractOptions,
}

/// Result of [`run_extract`].
#[derive(Debug)]
pub struct ExtractReport {
    pub output: PathBuf,
    /// Products with at least one keyword or target.
    pub products_with_content: usize,
    pub summary: ExtractSummary,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// Aggregate an export and dump the non-empty records as pretty JSON.
#[instrument(skip_all, fields(export = %request.export.display()))]
pub fn run_extract(
    request: &ExtractRequest,
    progress: &dyn ProgressReporter,
) -> Result<ExtractReport> {
    let start = Instant::now();

    progress.phase("Loading listing");
    let listing = load_asin_sku_map(&request.listing)?;

    progress.phase("Extracting keywords");
    let mut source = open_source(&request.export)?;
    let mut summary = ExtractSummary::default();
    let aggregates = extract_keywords(
        source.as_mut(),
        &listing,
        &request.extract,
        &mut summary,
        progress,
    )?;

    let populated = aggregates.with_content();
    let mut warnings = Vec::new();
    if populated.is_empty() {
        warnings.push(format!(
            "no keyword or target data found in {}",
            request.export.display()
        ));
    }

    let json = serde_json::to_string_pretty(&populated)
        .map_err(|e| GoalforgeError::validation(format!("failed to serialize aggregates: {e}")))?;
    if let Some(parent) = request.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| GoalforgeError::io(parent, e))?;
        }
    }
    std::fs::write(&request.output, json).map_err(|e| GoalforgeError::io(&request.output, e))?;

    let report = ExtractReport {
        output: request.output.clone(),
        products_with_content: populated.len(),
        summary,
        warnings,
        elapsed: start.elapsed(),
    };
    progress.done(&format!(
        "Extracted data for {} products",
        report.products_with_content
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn generate_without_export_writes_template() {
        let tmp = tempfile::tempdir().unwrap();
        let listing = write(tmp.path(), "listing.csv", "ASIN,SKU\nB000000001,SKU1\n");
        let request = GenerateRequest {
            listing,
            export: None,
            negatives: None,
            output: tmp.path().join("goals.csv"),
            goals: GoalConfig::default(),
            extract: ExtractOptions::default(),
        };
        let report = run_generate(&request, &SilentProgress).unwrap();
        assert!(report.template);
        assert_eq!(report.goal_rows, 12);
        assert_eq!(report.product_rows, 12);
        assert!(report.summary.is_none());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn generate_with_empty_export_falls_back_with_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let listing = write(tmp.path(), "listing.csv", "ASIN,SKU\nB000000001,SKU1\n");
        let export = write(
            tmp.path(),
            "export.csv",
            "Entity,Campaign Name,ASIN,Keyword Text,Match Type\n",
        );
        let request = GenerateRequest {
            listing,
            export: Some(export),
            negatives: None,
            output: tmp.path().join("goals.csv"),
            goals: GoalConfig::default(),
            extract: ExtractOptions::default(),
        };
        let report = run_generate(&request, &SilentProgress).unwrap();
        assert!(report.template);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.summary.unwrap().rows_scanned, 0);
    }

    #[test]
    fn generate_rejects_missing_negatives_file() {
        let tmp = tempfile::tempdir().unwrap();
        let listing = write(tmp.path(), "listing.csv", "B000000001,SKU1\n");
        let request = GenerateRequest {
            listing,
            export: None,
            negatives: Some(tmp.path().join("missing.txt")),
            output: tmp.path().join("goals.csv"),
            goals: GoalConfig::default(),
            extract: ExtractOptions::default(),
        };
        let err = run_generate(&request, &SilentProgress).unwrap_err();
        assert!(matches!(err, GoalforgeError::NotFound { .. }));
    }

    #[test]
    fn extract_writes_only_populated_products() {
        let tmp = tempfile::tempdir().unwrap();
        let listing = write(
            tmp.path(),
            "listing.csv",
            "ASIN,SKU\nB000000001,SKU1\nB000000002,SKU2\n",
        );
        let export = write(
            tmp.path(),
            "export.csv",
            "Entity,Campaign Name,ASIN,Keyword Text,Match Type\n\
             Keyword,SKU1 - JN - B000000001 [SP_MANUAL_EXACT],B000000001,widget,Exact\n",
        );
        let request = ExtractRequest {
            listing,
            export,
            output: tmp.path().join("out").join("aggregates.json"),
            extract: ExtractOptions::default(),
        };
        let report = run_extract(&request, &SilentProgress).unwrap();
        assert_eq!(report.products_with_content, 1);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&request.output).unwrap()).unwrap();
        assert_eq!(json["B000000001"]["sku"], "SKU1");
        assert_eq!(json["B000000001"]["buckets"]["unbranded_exact"][0], "widget");
        assert!(json.get("B000000002").is_none());
    }
}
