//! Configuration for the auction bidder.
//!
//! This module provides:
//! - Environment profiles (development, staging, production) and endpoints
//! - Bot runtime configuration (thresholds, assets, timing)
//! - Loading from environment variables with an optional TOML overlay

mod bot;
mod env;

pub use bot::{
    AssetsConfig, BotConfig, CollateralAsset, OracleConfig, Pricing, RebalanceConfig, RiskConfig,
    ScannerConfig, Secret, TransactionConfig,
};
pub use env::{expand_env, parse_flag, Environment};
