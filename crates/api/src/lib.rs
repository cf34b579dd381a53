//! External HTTP API clients for the auction bidder.
//!
//! This crate provides:
//! - CoinGecko: off-chain market prices for oracle sanity checks

mod coingecko;

pub use coingecko::{CoinGeckoClient, MarketPriceSource, DEFAULT_BASE_URL};
