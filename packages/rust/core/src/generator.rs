//! Goal row synthesis.
//!
//! Each product expands into up to twelve single-campaign goals. A goal row
//! is always immediately followed by a product row binding it to the
//! product's identifier and label.

use indexmap::IndexSet;
use tracing::{debug, info, instrument};

use goalforge_shared::{Asin, AsinSkuMap, CampaignKey, GoalConfig, GoalKinds};
use goalforge_tabular::{Row, Table};

use crate::extractor::{AggregateRecord, Aggregates};
use crate::pipeline::ProgressReporter;

/// Maximum goal name length accepted by the destination platform.
pub const GOAL_NAME_MAX_CHARS: usize = 60;

/// Sheet name used for XLSX output.
pub const GOAL_SHEET_NAME: &str = "Goals";

/// Record type of the row that binds a goal to a product.
pub const PRODUCT_RECORD_TYPE: &str = "Product";

const LIST_DELIMITER: &str = ",";

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

/// The 23 output columns, in upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalColumn {
    RecordId,
    RecordType,
    Marketplace,
    GoalName,
    GoalId,
    Status,
    StartDate,
    DailyBudget,
    TargetAcos,
    SmartPilotMode,
    SmartPilotStrategy,
    Reserved,
    ExactKeywords,
    PhraseKeywords,
    BroadKeywords,
    PatTargets,
    NegativeExact,
    NegativePhrase,
    Reserved2,
    MinBid,
    MaxBid,
    ProductAsin,
    ProductSku,
}

/// Header text for every [`GoalColumn`], in the same order.
pub const GOAL_COLUMNS: [&str; 23] = [
    "Record ID",
    "Record Type",
    "Marketplace",
    "Goal Name",
    "Goal ID",
    "Status",
    "Start Date",
    "Daily Budget",
    "Target ACoS",
    "Smart Pilot Mode",
    "Smart Pilot Strategy",
    "Reserved",
    "Exact Keywords",
    "Phrase Keywords",
    "Broad Keywords",
    "PAT Targets",
    "Negative Exact",
    "Negative Phrase",
    "Reserved2",
    "Min Bid",
    "Max Bid",
    "Product ASIN",
    "Product SKU",
];

impl GoalColumn {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn header(self) -> &'static str {
        GOAL_COLUMNS[self.index()]
    }
}

/// A fixed-width output row under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalRow(Row);

impl GoalRow {
    fn new() -> Self {
        Self(vec![String::new(); GOAL_COLUMNS.len()])
    }

    fn set(&mut self, column: GoalColumn, value: impl Into<String>) {
        self.0[column.index()] = value.into();
    }

    pub fn into_row(self) -> Row {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Campaign taxonomy
// ---------------------------------------------------------------------------

/// Keyword-targeted or product-targeted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalKind {
    Keyword,
    Targeting,
}

impl GoalKind {
    pub fn record_type(self) -> &'static str {
        match self {
            GoalKind::Keyword => "SingleCampaign_KW",
            GoalKind::Targeting => "SingleCampaign_PAT",
        }
    }

    pub fn allowed_by(self, kinds: GoalKinds) -> bool {
        matches!(
            (kinds, self),
            (GoalKinds::All, _)
                | (GoalKinds::Keyword, GoalKind::Keyword)
                | (GoalKinds::Targeting, GoalKind::Targeting)
        )
    }
}

/// One of the twelve campaign entries synthesized per product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignEntry {
    /// Tag used in the goal name, e.g. `BRANDED_EXACT`.
    pub name: &'static str,
    /// Aggregate bucket feeding this entry.
    pub key: CampaignKey,
    pub kind: GoalKind,
    /// Share of a 100-unit budget.
    pub weight: u32,
    /// Target ACoS percentage.
    pub target_acos: u32,
}

impl CampaignEntry {
    const fn new(
        name: &'static str,
        key: CampaignKey,
        kind: GoalKind,
        weight: u32,
        target_acos: u32,
    ) -> Self {
        Self {
            name,
            key,
            kind,
            weight,
            target_acos,
        }
    }

    /// Column that receives the bucket contents.
    pub fn list_column(&self) -> GoalColumn {
        match self.key {
            CampaignKey::BrandedPhrase
            | CampaignKey::UnbrandedPhrase
            | CampaignKey::CompetitorPhrase => GoalColumn::PhraseKeywords,
            CampaignKey::BrandedBroad
            | CampaignKey::UnbrandedBroad
            | CampaignKey::CompetitorBroad => GoalColumn::BroadKeywords,
            CampaignKey::BrandedPat | CampaignKey::CompetitorPat => GoalColumn::PatTargets,
            _ => GoalColumn::ExactKeywords,
        }
    }

    /// `max(min_budget, weight)`.
    pub fn budget(&self, config: &GoalConfig) -> u32 {
        config.min_budget.max(self.weight)
    }
}

/// The fixed twelve-entry table, in emission order. Weights sum to 100.
pub const CAMPAIGN_ENTRIES: [CampaignEntry; 12] = [
    CampaignEntry::new("BRANDED_EXACT", CampaignKey::BrandedExact, GoalKind::Keyword, 1, 20),
    CampaignEntry::new("BRANDED_PHRASE", CampaignKey::BrandedPhrase, GoalKind::Keyword, 1, 20),
    CampaignEntry::new("BRANDED_BROAD", CampaignKey::BrandedBroad, GoalKind::Keyword, 1, 20),
    CampaignEntry::new("BRANDED_PAT", CampaignKey::BrandedPat, GoalKind::Targeting, 2, 20),
    CampaignEntry::new("MANUAL_EXACT", CampaignKey::UnbrandedExact, GoalKind::Keyword, 16, 60),
    CampaignEntry::new("MANUAL_PHRASE", CampaignKey::UnbrandedPhrase, GoalKind::Keyword, 16, 60),
    CampaignEntry::new("MANUAL_BROAD", CampaignKey::UnbrandedBroad, GoalKind::Keyword, 16, 60),
    CampaignEntry::new("COMPETITOR_EXACT", CampaignKey::CompetitorExact, GoalKind::Keyword, 8, 60),
    CampaignEntry::new("COMPETITOR_PHRASE", CampaignKey::CompetitorPhrase, GoalKind::Keyword, 8, 60),
    CampaignEntry::new("COMPETITOR_BROAD", CampaignKey::CompetitorBroad, GoalKind::Keyword, 7, 60),
    CampaignEntry::new("COMPETITOR_PAT", CampaignKey::CompetitorPat, GoalKind::Targeting, 7, 60),
    CampaignEntry::new("AUTO", CampaignKey::Auto, GoalKind::Keyword, 17, 60),
];

/// `{label} - JN - {identifier} [SP_{entry}]`, cut to 60 characters.
pub fn goal_name(sku: &str, asin: &Asin, entry: &str) -> String {
    format!("{sku} - JN - {asin} [SP_{entry}]")
        .chars()
        .take(GOAL_NAME_MAX_CHARS)
        .collect()
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// The synthesized output table and its counters.
#[derive(Debug, Clone)]
pub struct GoalSheet {
    pub table: Table,
    pub products: usize,
    pub goal_rows: usize,
    pub product_rows: usize,
    /// True when built by [`generate_template`].
    pub template: bool,
}

impl GoalSheet {
    fn new(template: bool) -> Self {
        Self {
            table: Table::new(GOAL_COLUMNS.iter().map(|c| c.to_string()).collect()),
            products: 0,
            goal_rows: 0,
            product_rows: 0,
            template,
        }
    }

    fn push_pair(&mut self, goal: GoalRow, asin: &Asin, sku: &str, config: &GoalConfig) {
        self.table.push_row(goal.into_row());
        self.table.push_row(product_row(asin, sku, config).into_row());
        self.goal_rows += 1;
        self.product_rows += 1;
    }
}

fn join<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items.into_iter().collect::<Vec<_>>().join(LIST_DELIMITER)
}

fn goal_row(entry: &CampaignEntry, sku: &str, asin: &Asin, config: &GoalConfig) -> GoalRow {
    let mut row = GoalRow::new();
    row.set(GoalColumn::RecordType, entry.kind.record_type());
    row.set(GoalColumn::GoalName, goal_name(sku, asin, entry.name));
    row.set(GoalColumn::Status, config.status.as_str());
    row.set(GoalColumn::DailyBudget, entry.budget(config).to_string());
    row.set(GoalColumn::TargetAcos, entry.target_acos.to_string());
    row.set(GoalColumn::MinBid, format!("{:.2}", config.min_bid));
    row.set(GoalColumn::MaxBid, format!("{:.2}", config.max_bid));
    row
}

fn product_row(asin: &Asin, sku: &str, config: &GoalConfig) -> GoalRow {
    let mut row = GoalRow::new();
    row.set(GoalColumn::RecordType, PRODUCT_RECORD_TYPE);
    row.set(GoalColumn::Status, config.status.as_str());
    row.set(GoalColumn::ProductAsin, asin.as_str());
    row.set(GoalColumn::ProductSku, sku);
    row
}

/// Goal row for one populated entry of one product.
fn populated_goal_row(
    entry: &CampaignEntry,
    record: &AggregateRecord,
    config: &GoalConfig,
    global_negatives: &[Asin],
) -> GoalRow {
    let mut row = goal_row(entry, &record.sku, &record.asin, config);
    row.set(entry.list_column(), join(record.bucket(entry.key)));

    let negatives = record.negatives(entry.key);
    let mut negative_exact: IndexSet<&str> = negatives
        .map(|n| n.exact.iter().map(String::as_str).collect())
        .unwrap_or_default();
    if entry.kind == GoalKind::Targeting {
        if let Some(n) = negatives {
            negative_exact.extend(n.asins.iter().map(String::as_str));
        }
        negative_exact.extend(global_negatives.iter().map(Asin::as_str));
    }
    row.set(GoalColumn::NegativeExact, join(negative_exact));
    if let Some(n) = negatives {
        row.set(GoalColumn::NegativePhrase, join(n.phrase.iter().map(String::as_str)));
    }
    row
}

/// Build goal rows for every product with collected data.
///
/// Entries with an empty bucket are omitted. Global negatives are appended
/// to the negative-exact field of every targeting goal.
#[instrument(skip_all, fields(products = aggregates.len(), global_negatives = global_negatives.len()))]
pub fn generate_goals(
    aggregates: &Aggregates,
    config: &GoalConfig,
    global_negatives: &[Asin],
    progress: &dyn ProgressReporter,
) -> GoalSheet {
    let mut sheet = GoalSheet::new(false);
    let total = aggregates.len();

    for (idx, record) in aggregates.iter().enumerate() {
        let before = sheet.goal_rows;
        for entry in CAMPAIGN_ENTRIES
            .iter()
            .filter(|e| e.kind.allowed_by(config.kinds))
        {
            if record.bucket_len(entry.key) == 0 {
                continue;
            }
            let row = populated_goal_row(entry, record, config, global_negatives);
            sheet.push_pair(row, &record.asin, &record.sku, config);
        }
        if sheet.goal_rows > before {
            sheet.products += 1;
        }
        debug!(asin = %record.asin, goals = sheet.goal_rows - before, "product synthesized");
        progress.product_generated(record.asin.as_str(), idx + 1, total);
    }

    info!(
        products = sheet.products,
        goal_rows = sheet.goal_rows,
        "goal rows synthesized"
    );
    sheet
}

/// Build every entry, empty, for every listed product.
#[instrument(skip_all, fields(products = listing.len()))]
pub fn generate_template(
    listing: &AsinSkuMap,
    config: &GoalConfig,
    progress: &dyn ProgressReporter,
) -> GoalSheet {
    let mut sheet = GoalSheet::new(true);
    let total = listing.len();

    for (idx, (asin, sku)) in listing.iter().enumerate() {
        for entry in CAMPAIGN_ENTRIES
            .iter()
            .filter(|e| e.kind.allowed_by(config.kinds))
        {
            sheet.push_pair(goal_row(entry, sku, asin, config), asin, sku, config);
        }
        sheet.products += 1;
        progress.product_generated(asin.as_str(), idx + 1, total);
    }

    info!(
        products = sheet.products,
        goal_rows = sheet.goal_rows,
        "template synthesized"
    );
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{Aggregator, ExportRow, ExtractOptions, ExtractSummary};
    use crate::pipeline::SilentProgress;
    use goalforge_shared::{GoalStatus, MIN_BUDGET_FLOOR};

    fn asin(s: &str) -> Asin {
        Asin::parse(s).unwrap()
    }

    fn listing() -> AsinSkuMap {
        [(asin("B000000001"), "SKU1".to_string())].into_iter().collect()
    }

    fn aggregate(rows: &[ExportRow<'_>]) -> Aggregates {
        let listing = listing();
        let mut agg = Aggregator::new(&listing, &ExtractOptions::default());
        let mut summary = ExtractSummary::default();
        for row in rows {
            agg.ingest(row, &mut summary);
        }
        agg.finish()
    }

    fn keyword<'a>(campaign: &'a str, keyword: &'a str, match_type: &'a str) -> ExportRow<'a> {
        ExportRow {
            asin: "B000000001",
            campaign,
            entity: "Keyword",
            keyword,
            match_type,
            target: "",
        }
    }

    fn goal_rows(sheet: &GoalSheet) -> Vec<&Row> {
        sheet.table.rows.iter().step_by(2).collect()
    }

    fn cell(row: &Row, column: GoalColumn) -> &str {
        &row[column.index()]
    }

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: u32 = CAMPAIGN_ENTRIES.iter().map(|e| e.weight).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn header_matches_column_enum() {
        assert_eq!(GoalColumn::RecordId.header(), "Record ID");
        assert_eq!(GoalColumn::TargetAcos.header(), "Target ACoS");
        assert_eq!(GoalColumn::PatTargets.header(), "PAT Targets");
        assert_eq!(GoalColumn::ProductSku.index(), 22);
    }

    #[test]
    fn names_are_truncated_to_sixty_chars() {
        let long_sku = "S".repeat(80);
        let name = goal_name(&long_sku, &asin("B000000001"), "COMPETITOR_PHRASE");
        assert_eq!(name.chars().count(), GOAL_NAME_MAX_CHARS);

        let short = goal_name("SKU1", &asin("B000000001"), "AUTO");
        assert_eq!(short, "SKU1 - JN - B000000001 [SP_AUTO]");
    }

    #[test]
    fn single_bucket_yields_one_pair() {
        let aggregates = aggregate(&[keyword(
            "SKU1 - JN - B000000001 [SP_BRANDED_EXACT] - exact",
            "buy now",
            "Exact",
        )]);
        let sheet = generate_goals(&aggregates, &GoalConfig::default(), &[], &SilentProgress);

        assert_eq!(sheet.table.len(), 2);
        assert_eq!(sheet.goal_rows, 1);
        let goal = &sheet.table.rows[0];
        let product = &sheet.table.rows[1];
        assert_eq!(cell(goal, GoalColumn::RecordType), "SingleCampaign_KW");
        assert_eq!(cell(goal, GoalColumn::GoalName), "SKU1 - JN - B000000001 [SP_BRANDED_EXACT]");
        assert_eq!(cell(goal, GoalColumn::ExactKeywords), "buy now");
        assert_eq!(cell(goal, GoalColumn::DailyBudget), "5");
        assert_eq!(cell(goal, GoalColumn::TargetAcos), "20");
        assert_eq!(cell(goal, GoalColumn::MinBid), "0.20");
        assert_eq!(cell(goal, GoalColumn::MaxBid), "2.00");
        assert_eq!(cell(product, GoalColumn::RecordType), "Product");
        assert_eq!(cell(product, GoalColumn::ProductAsin), "B000000001");
        assert_eq!(cell(product, GoalColumn::ProductSku), "SKU1");
    }

    #[test]
    fn budget_is_max_of_floor_and_weight() {
        let listing = listing();
        let sheet = generate_template(&listing, &GoalConfig::default(), &SilentProgress);
        for (row, entry) in goal_rows(&sheet).into_iter().zip(CAMPAIGN_ENTRIES.iter()) {
            let budget: u32 = cell(row, GoalColumn::DailyBudget).parse().unwrap();
            assert_eq!(budget, MIN_BUDGET_FLOOR.max(entry.weight), "{}", entry.name);
        }
    }

    #[test]
    fn template_emits_every_entry_paired() {
        let listing: AsinSkuMap = [
            (asin("B000000001"), "SKU1".to_string()),
            (asin("B000000002"), "SKU2".to_string()),
        ]
        .into_iter()
        .collect();
        let sheet = generate_template(&listing, &GoalConfig::default(), &SilentProgress);
        assert!(sheet.template);
        assert_eq!(sheet.table.len(), 48);
        for pair in sheet.table.rows.chunks(2) {
            assert_ne!(cell(&pair[0], GoalColumn::RecordType), PRODUCT_RECORD_TYPE);
            assert_eq!(cell(&pair[1], GoalColumn::RecordType), PRODUCT_RECORD_TYPE);
            assert!(cell(&pair[0], GoalColumn::GoalName).contains(cell(&pair[1], GoalColumn::ProductAsin)));
            assert_eq!(pair[0].len(), 23);
        }
    }

    #[test]
    fn kinds_filter_limits_entries() {
        let listing = listing();
        let config = GoalConfig {
            kinds: GoalKinds::Targeting,
            status: GoalStatus::Paused,
            ..Default::default()
        };
        let sheet = generate_template(&listing, &config, &SilentProgress);
        let rows = goal_rows(&sheet);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| cell(r, GoalColumn::RecordType) == "SingleCampaign_PAT"));
        assert!(sheet.table.rows.iter().all(|r| cell(r, GoalColumn::Status) == "Paused"));
    }

    #[test]
    fn targeting_goals_carry_all_negative_identifiers() {
        let target = |expr: &'static str, entity: &'static str| ExportRow {
            asin: "B000000001",
            campaign: "SKU1 [SP_COMPETITOR_PAT]",
            entity,
            target: expr,
            ..Default::default()
        };
        let aggregates = aggregate(&[
            target(r#"asin="B0000000AA""#, "Product Targeting"),
            target(r#"asin="B0000000BB""#, "Product Targeting"),
            target(r#"asin="B0000000CC""#, "Negative Product Targeting"),
        ]);
        let globals = vec![asin("B0000000CC"), asin("B0000000DD")];
        let sheet = generate_goals(&aggregates, &GoalConfig::default(), &globals, &SilentProgress);

        assert_eq!(sheet.goal_rows, 1);
        let goal = &sheet.table.rows[0];
        assert_eq!(cell(goal, GoalColumn::RecordType), "SingleCampaign_PAT");
        assert_eq!(cell(goal, GoalColumn::PatTargets), "B0000000AA,B0000000BB");
        assert_eq!(cell(goal, GoalColumn::NegativeExact), "B0000000CC,B0000000DD");
        assert_eq!(cell(goal, GoalColumn::DailyBudget), "7");
    }

    #[test]
    fn keyword_goals_ignore_global_negatives() {
        let aggregates = aggregate(&[
            keyword("SKU1 [SP_MANUAL_BROAD]", "widget", "Broad"),
            keyword("SKU1 [SP_MANUAL_BROAD]", "free", "Negative Exact"),
            keyword("SKU1 [SP_MANUAL_BROAD]", "used widget", "Negative Phrase"),
        ]);
        let globals = vec![asin("B0000000DD")];
        let sheet = generate_goals(&aggregates, &GoalConfig::default(), &globals, &SilentProgress);

        let goal = &sheet.table.rows[0];
        assert_eq!(cell(goal, GoalColumn::BroadKeywords), "widget");
        assert_eq!(cell(goal, GoalColumn::NegativeExact), "free");
        assert_eq!(cell(goal, GoalColumn::NegativePhrase), "used widget");
        assert_eq!(cell(goal, GoalColumn::DailyBudget), "16");
    }

    #[test]
    fn auto_keywords_go_to_exact_column() {
        let aggregates = aggregate(&[keyword("SKU1 [SP_AUTO]", "close match", "")]);
        let sheet = generate_goals(&aggregates, &GoalConfig::default(), &[], &SilentProgress);
        let goal = &sheet.table.rows[0];
        assert_eq!(cell(goal, GoalColumn::GoalName), "SKU1 - JN - B000000001 [SP_AUTO]");
        assert_eq!(cell(goal, GoalColumn::ExactKeywords), "close match");
        assert_eq!(cell(goal, GoalColumn::DailyBudget), "17");
    }
}
