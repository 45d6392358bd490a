//! Shared types, error model, and configuration for goalforge.
//!
//! This crate is the foundation depended on by all other goalforge crates.
//! It provides:
//! - [`GoalforgeError`]: the unified error type
//! - Domain types ([`Asin`], [`AsinSkuMap`], [`Segment`], [`MatchType`], [`CampaignKey`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_BATCH_SIZE, ExtractConfig, GoalConfig, GoalKinds, GoalStatus,
    MIN_BUDGET_FLOOR, MetadataPolicy, TrimConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{GoalforgeError, Result};
pub use types::{ASIN_LEN, Asin, AsinSkuMap, CampaignKey, MatchType, Segment};
