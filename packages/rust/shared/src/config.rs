//! Application configuration for goalforge.
//!
//! User config lives at `~/.goalforge/goalforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GoalforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "goalforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".goalforge";

/// Default number of rows per streamed batch.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Floor applied to every synthesized daily budget.
pub const MIN_BUDGET_FLOOR: u32 = 5;

// ---------------------------------------------------------------------------
// Config structs (matching goalforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bulk trimming settings.
    #[serde(default)]
    pub trim: TrimConfig,

    /// Keyword/target extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Goal synthesis settings.
    #[serde(default)]
    pub goals: GoalConfig,
}

/// What to do with rows whose identifier is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPolicy {
    /// Keep them verbatim (header-like and campaign-level rows).
    #[default]
    Retain,
    /// Require a non-empty, matched identifier on every kept row.
    Drop,
}

/// `[trim]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimConfig {
    /// Rows per streamed batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Metadata-row retention policy.
    #[serde(default)]
    pub metadata_rows: MetadataPolicy,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            metadata_rows: MetadataPolicy::default(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// `[extract]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Campaign-name token every processed row must carry (e.g. `PERPETUA`).
    /// Unset means every campaign qualifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_marker: Option<String>,
}

/// Goal status written on goal and product rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    #[default]
    Enabled,
    Paused,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Enabled => "Enabled",
            GoalStatus::Paused => "Paused",
        }
    }
}

/// Which goal kinds to synthesize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKinds {
    #[default]
    All,
    Keyword,
    Targeting,
}

/// `[goals]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalConfig {
    /// Lower bid bound.
    #[serde(default = "default_min_bid")]
    pub min_bid: f64,

    /// Upper bid bound.
    #[serde(default = "default_max_bid")]
    pub max_bid: f64,

    /// Status for emitted rows.
    #[serde(default)]
    pub status: GoalStatus,

    /// Minimum daily budget per goal.
    #[serde(default = "default_min_budget")]
    pub min_budget: u32,

    /// Goal kind filter.
    #[serde(default)]
    pub kinds: GoalKinds,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            min_bid: default_min_bid(),
            max_bid: default_max_bid(),
            status: GoalStatus::default(),
            min_budget: default_min_budget(),
            kinds: GoalKinds::default(),
        }
    }
}

fn default_min_bid() -> f64 {
    0.20
}
fn default_max_bid() -> f64 {
    2.00
}
fn default_min_budget() -> u32 {
    MIN_BUDGET_FLOOR
}

impl GoalConfig {
    /// Reject bid bounds that the destination platform would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.min_bid < 0.0 || self.max_bid < 0.0 {
            return Err(GoalforgeError::validation("bids must be >= 0"));
        }
        if self.min_bid > self.max_bid {
            return Err(GoalforgeError::validation(format!(
                "min_bid {:.2} exceeds max_bid {:.2}",
                self.min_bid, self.max_bid
            )));
        }
        if self.min_budget == 0 {
            return Err(GoalforgeError::validation("min_budget must be >= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.goalforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GoalforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.goalforge/goalforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GoalforgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        GoalforgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    if config.trim.batch_size == 0 {
        return Err(GoalforgeError::config("trim.batch_size must be positive"));
    }
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GoalforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GoalforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GoalforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
