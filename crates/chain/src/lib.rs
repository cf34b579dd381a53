//! Chain interaction layer for the auction bidder.
//!
//! This crate provides:
//! - Primitive chain types (tokens, accounts, calls, hashes)
//! - Fixed-point conversion between raw balances and decimals
//! - The [`ChainBackend`] trait with an HTTP JSON-RPC implementation
//! - Typed storage reads for loans, CDP params, auctions and balances
//! - Oracle price and liquid-staking rate queries
//! - Local sr25519 signing, extrinsic encoding, submission and status tracking

mod backend;
mod client;
mod error;
mod extrinsic;
pub mod fixed_point;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod oracle;
mod rpc;
mod tx;
pub mod types;
mod wallet;

pub use backend::{ChainBackend, StorageEntry, StorageQuery, TxStatus, TxSubscription};
pub use client::{
    queries, AuctionInfo, ChainClient, CollateralAuction, CollateralParams, Position, PositionEntry,
    WinningBid,
};
pub use error::{ChainError, Result};
pub use extrinsic::{Extrinsic, KeyPair, SignedBy, SigningParams};
pub use fixed_point::FixedPointError;
pub use oracle::{fetch_all_oracle_prices, liquid_staking_rate, OraclePrice};
pub use rpc::{http_url, HttpBackend, DEFAULT_POLL_INTERVAL};
pub use tx::{
    Confirmation, PendingTransaction, Submission, TxOrchestrator, TxOutcome, DEFAULT_TX_TIMEOUT,
};
pub use types::{
    AccountId, AuctionId, Balance, Call, CurrencyId, ProxyType, StorageKey, Token, H256, SS58_PREFIX,
};
pub use wallet::{TokenBalance, Wallet};
