//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use goalforge_core::extractor::{ExtractOptions, ExtractSummary};
use goalforge_core::pipeline::{
    ExtractRequest, GenerateReport, GenerateRequest, ProgressReporter, TrimReport, TrimRequest,
    run_extract, run_generate, run_trim,
};
use goalforge_core::trimmer::TrimOptions;
use goalforge_shared::{
    AppConfig, GoalConfig, GoalKinds, GoalStatus, MetadataPolicy, init_config, load_config,
    load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// goalforge: bulk export trimming and goal sheet generation.
#[derive(Parser)]
#[command(
    name = "goalforge",
    version,
    about = "Trim Amazon Ads bulk exports and generate Perpetua goal sheets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.goalforge/goalforge.toml.
    #[arg(long, global = true, env = "GOALFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Goal status accepted on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum StatusArg {
    Enabled,
    Paused,
}

impl From<StatusArg> for GoalStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Enabled => GoalStatus::Enabled,
            StatusArg::Paused => GoalStatus::Paused,
        }
    }
}

/// Trimming flags shared by `trim` and `all`.
#[derive(Args, Debug, Default)]
pub(crate) struct TrimArgs {
    /// Rows per streamed batch (overrides config).
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Drop rows without an identifier instead of keeping them.
    #[arg(long)]
    pub drop_metadata: bool,
}

/// Goal synthesis flags shared by `generate` and `all`.
#[derive(Args, Debug, Default)]
pub(crate) struct GoalArgs {
    /// Global negative identifier list applied to every PAT goal.
    #[arg(long)]
    pub negatives: Option<PathBuf>,

    /// Status for goal and product rows.
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Minimum bid.
    #[arg(long)]
    pub min_bid: Option<f64>,

    /// Maximum bid.
    #[arg(long)]
    pub max_bid: Option<f64>,

    /// Only emit keyword goals.
    #[arg(long, conflicts_with = "pat_only")]
    pub kw_only: bool,

    /// Only emit product-targeting goals.
    #[arg(long)]
    pub pat_only: bool,

    /// Campaign-name token a row must carry to be aggregated (e.g. PERPETUA).
    #[arg(long)]
    pub marker: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Trim a bulk export down to the listed products.
    Trim {
        /// Bulk export (CSV or XLSX).
        #[arg(long)]
        bulk: PathBuf,

        /// Identifier/SKU listing (CSV or XLSX).
        #[arg(long)]
        listing: PathBuf,

        /// Trimmed output (CSV or XLSX).
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        trim: TrimArgs,
    },

    /// Generate a goal sheet; without --export every product gets an empty template.
    Generate {
        /// Identifier/SKU listing (CSV or XLSX).
        #[arg(long)]
        listing: PathBuf,

        /// Bulk export (ideally trimmed) to aggregate keywords and targets from.
        #[arg(long)]
        export: Option<PathBuf>,

        /// Goal sheet output (CSV or XLSX).
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        goals: GoalArgs,
    },

    /// Trim a bulk export, then generate goals from the trimmed file.
    All {
        /// Bulk export (CSV or XLSX).
        #[arg(long)]
        bulk: PathBuf,

        /// Identifier/SKU listing (CSV or XLSX).
        #[arg(long)]
        listing: PathBuf,

        /// Where to write the trimmed export.
        #[arg(long)]
        trimmed: PathBuf,

        /// Goal sheet output (CSV or XLSX).
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        trim: TrimArgs,

        #[command(flatten)]
        goals: GoalArgs,
    },

    /// Dump per-product keyword/target aggregates as JSON.
    Extract {
        /// Identifier/SKU listing (CSV or XLSX).
        #[arg(long)]
        listing: PathBuf,

        /// Bulk export to aggregate.
        #[arg(long)]
        export: PathBuf,

        /// JSON output path.
        #[arg(short, long)]
        output: PathBuf,

        /// Campaign-name token a row must carry to be aggregated.
        #[arg(long)]
        marker: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "goalforge=info",
        1 => "goalforge=debug",
        _ => "goalforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Flags override file values which override defaults.
fn trim_options(config: &AppConfig, args: &TrimArgs) -> Result<TrimOptions> {
    let batch_size = args.batch_size.unwrap_or(config.trim.batch_size);
    if batch_size == 0 {
        return Err(eyre!("--batch-size must be positive"));
    }
    let metadata = if args.drop_metadata {
        MetadataPolicy::Drop
    } else {
        config.trim.metadata_rows
    };
    Ok(TrimOptions {
        batch_size,
        metadata,
    })
}

fn goal_config(config: &AppConfig, args: &GoalArgs) -> GoalConfig {
    let mut goals = config.goals.clone();
    if let Some(status) = args.status {
        goals.status = status.into();
    }
    if let Some(min_bid) = args.min_bid {
        goals.min_bid = min_bid;
    }
    if let Some(max_bid) = args.max_bid {
        goals.max_bid = max_bid;
    }
    if args.kw_only {
        goals.kinds = GoalKinds::Keyword;
    } else if args.pat_only {
        goals.kinds = GoalKinds::Targeting;
    }
    goals
}

fn extract_options(config: &AppConfig, marker: Option<&str>) -> ExtractOptions {
    ExtractOptions {
        required_marker: marker
            .map(str::to_string)
            .or_else(|| config.extract.required_marker.clone()),
        batch_size: config.trim.batch_size,
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Trim {
            bulk,
            listing,
            output,
            trim,
        } => {
            let config = resolve_config(config_path)?;
            cmd_trim(bulk, listing, output, trim_options(&config, &trim)?).map(|_| ())
        }
        Command::Generate {
            listing,
            export,
            output,
            goals,
        } => {
            let config = resolve_config(config_path)?;
            cmd_generate(&config, listing, export, output, &goals)
        }
        Command::All {
            bulk,
            listing,
            trimmed,
            output,
            trim,
            goals,
        } => {
            let config = resolve_config(config_path)?;
            cmd_trim(
                bulk,
                listing.clone(),
                trimmed.clone(),
                trim_options(&config, &trim)?,
            )?;
            cmd_generate(&config, listing, Some(trimmed), output, &goals)
        }
        Command::Extract {
            listing,
            export,
            output,
            marker,
        } => {
            let config = resolve_config(config_path)?;
            cmd_extract(listing, export, output, extract_options(&config, marker.as_deref()))
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_trim(
    bulk: PathBuf,
    listing: PathBuf,
    output: PathBuf,
    options: TrimOptions,
) -> Result<TrimReport> {
    info!(
        bulk = %bulk.display(),
        batch_size = options.batch_size,
        metadata = ?options.metadata,
        "trimming bulk export"
    );

    let request = TrimRequest {
        bulk,
        listing,
        output,
        options,
    };
    let reporter = CliProgress::new();
    let report = run_trim(&request, &reporter)?;

    let stats = &report.stats;
    println!();
    println!("  Bulk export trimmed");
    println!("  Products:    {}", report.products);
    println!("  ID column:   {}", stats.identifier_column);
    println!("  Rows:        {} → {}", stats.source_rows, stats.retained_rows);
    println!("  Metadata:    {}", stats.metadata_rows);
    println!("  Recovered:   {}", stats.recovered_rows);
    println!("  Entity drop: {}", stats.entity_dropped_rows);
    println!("  Unmatched:   {}", stats.unmatched_rows);
    if !stats.dropped_columns.is_empty() {
        println!("  Dropped:     {}", stats.dropped_columns.join(", "));
    }
    if !stats.sheets_skipped.is_empty() {
        println!("  Skipped:     {}", stats.sheets_skipped.join(", "));
    }
    println!(
        "  Size:        {:.1} MB → {:.1} MB ({:.1}% smaller)",
        megabytes(stats.source_bytes),
        megabytes(stats.output_bytes),
        stats.size_reduction_percent()
    );
    println!("  Output:      {}", report.output.display());
    println!("  Time:        {:.1}s", report.elapsed.as_secs_f64());
    print_warnings(&report.warnings);
    println!();

    Ok(report)
}

fn cmd_generate(
    config: &AppConfig,
    listing: PathBuf,
    export: Option<PathBuf>,
    output: PathBuf,
    args: &GoalArgs,
) -> Result<()> {
    let goals = goal_config(config, args);
    info!(
        template = export.is_none(),
        min_bid = goals.min_bid,
        max_bid = goals.max_bid,
        kinds = ?goals.kinds,
        "generating goals"
    );

    let request = GenerateRequest {
        listing,
        export,
        negatives: args.negatives.clone(),
        output,
        goals,
        extract: extract_options(config, args.marker.as_deref()),
    };
    let reporter = CliProgress::new();
    let report = run_generate(&request, &reporter)?;

    print_generate_report(&report);
    Ok(())
}

fn cmd_extract(
    listing: PathBuf,
    export: PathBuf,
    output: PathBuf,
    extract: ExtractOptions,
) -> Result<()> {
    let request = ExtractRequest {
        listing,
        export,
        output,
        extract,
    };
    let reporter = CliProgress::new();
    let report = run_extract(&request, &reporter)?;

    println!();
    println!("  Aggregates extracted");
    println!("  Products: {}", report.products_with_content);
    print_summary(&report.summary);
    println!("  Output:   {}", report.output.display());
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    print_warnings(&report.warnings);
    println!();
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn print_generate_report(report: &GenerateReport) {
    println!();
    if report.template {
        println!("  Empty goal template generated");
    } else {
        println!("  Goal sheet generated");
    }
    println!("  Products:  {}", report.products);
    println!("  Goals:     {}", report.goal_rows);
    println!("  Rows:      {}", report.goal_rows + report.product_rows);
    if report.global_negatives > 0 {
        println!("  Negatives: {} global (PAT goals)", report.global_negatives);
    }
    if let Some(summary) = &report.summary {
        print_summary(summary);
    }
    println!("  Output:    {}", report.output.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    print_warnings(&report.warnings);
    println!();
}

fn print_summary(summary: &ExtractSummary) {
    println!("  Scanned:   {}", summary.rows_scanned);
    println!("  Keywords:  {}", summary.keyword_rows);
    println!("  Targets:   {}", summary.target_rows);
    println!("  Negatives: {}", summary.negative_rows);
    println!("  Unmatched: {}", summary.unmatched_rows);
    if summary.missing_marker_rows > 0 {
        println!("  No marker: {}", summary.missing_marker_rows);
    }
    for (segment, rows) in &summary.segment_rows {
        println!("    {segment:<15} {rows}");
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  Warning:   {warning}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn rows_scanned(&self, sheet: &str, rows: usize) {
        self.spinner.set_message(format!("Scanning {sheet}: {rows} rows"));
    }

    fn product_generated(&self, asin: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Generating [{current}/{total}] {asin}"));
    }

    fn done(&self, _message: &str) {
        self.spinner.finish_and_clear();
    }
}
