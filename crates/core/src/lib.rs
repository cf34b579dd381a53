//! Auction bidder core logic.
//!
//! This crate provides the per-pass logic of the bidder:
//! - Configuration from environment variables and optional TOML
//! - Market snapshot of oracle prices and risk contexts
//! - Collateral ratio evaluation and the liquidation decision
//! - Paginated position scanning with unsigned liquidations
//! - Stash loan rebalancing
//! - Collateral auction bidding funded from the stash loan
//! - Oracle price sanity check against a market price API

mod bidder;
pub mod config;
mod error;
mod market;
mod price_check;
mod rebalance;
mod risk;
mod runner;
mod scanner;

pub use bidder::{available_debit, AuctionBidder, BidSummary, PlacedBid, SkipReason};
pub use config::{
    AssetsConfig, BotConfig, CollateralAsset, Environment, OracleConfig, Pricing, RebalanceConfig,
    RiskConfig, ScannerConfig, Secret, TransactionConfig,
};
pub use error::{BidderError, ConfigError, Result};
pub use market::{MarketData, MarketSnapshot};
pub use price_check::{PriceComparison, PriceDeviationCheck};
pub use rebalance::{RebalancePlan, RebalancePolicy, Rebalancer};
pub use risk::{decide, evaluate, EvaluatedPosition, RiskContext, RiskDecision};
pub use runner::{RunSummary, Runner};
pub use scanner::{LiquidationAttempt, PositionScanner, RiskReport};
