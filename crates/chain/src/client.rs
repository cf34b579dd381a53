//! Typed read access to the runtime storage the agent needs.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::backend::{ChainBackend, StorageEntry, StorageQuery};
use crate::error::{ChainError, Result};
use crate::fixed_point::{from_chain, PRICE_PRECISION};
use crate::types::{
    balance, option_balance, AccountId, AuctionId, Balance, CurrencyId, StorageKey, Token,
};

/// Loan position of one owner in one collateral currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub owner: AccountId,
    pub currency: Token,
    pub collateral: Balance,
    pub debit: Balance,
}

/// Position with the storage key it was read from (the paging cursor).
#[derive(Debug, Clone)]
pub struct PositionEntry {
    pub key: StorageKey,
    pub position: Position,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPosition {
    #[serde(with = "balance")]
    collateral: Balance,
    #[serde(with = "balance")]
    debit: Balance,
}

/// `cdpEngine.collateralParams` record. Only the liquidation ratio is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralParams {
    #[serde(default, with = "option_balance")]
    pub liquidation_ratio: Option<u128>,
    #[serde(default, with = "option_balance")]
    pub required_collateral_ratio: Option<u128>,
    #[serde(default, with = "option_balance")]
    pub liquidation_penalty: Option<u128>,
    #[serde(default, with = "option_balance")]
    pub maximum_total_debit_value: Option<Balance>,
}

impl CollateralParams {
    pub fn liquidation_ratio(&self) -> Result<Option<Decimal>> {
        self.liquidation_ratio
            .map(|r| from_chain(r, PRICE_PRECISION))
            .transpose()
            .map_err(Into::into)
    }
}

/// Collateral auction record from `auctionManager.collateralAuctions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralAuction {
    pub refund_recipient: AccountId,
    pub currency_id: CurrencyId,
    #[serde(with = "balance")]
    pub initial_amount: Balance,
    /// Collateral remaining in the auction
    #[serde(with = "balance")]
    pub amount: Balance,
    /// Stable-coin amount the auction seeks to raise
    #[serde(with = "balance")]
    pub target: Balance,
    pub start_time: u64,
}

/// Winning bid: bidder and amount.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WinningBid(pub AccountId, #[serde(with = "balance")] pub Balance);

/// Generic auction record from `auction.auctions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuctionInfo {
    pub bid: Option<WinningBid>,
    pub start: u64,
    pub end: Option<u64>,
}

impl AuctionInfo {
    pub fn winner(&self) -> Option<&AccountId> {
        self.bid.as_ref().map(|b| &b.0)
    }
}

/// Storage reader over a [`ChainBackend`].
#[derive(Debug, Clone)]
pub struct ChainClient {
    backend: Arc<dyn ChainBackend>,
}

fn decode<T: DeserializeOwned>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ChainError::Decode(format!("{what}: {e}")))
}

fn decode_arg<T: DeserializeOwned>(entry: &StorageEntry, index: usize) -> Result<T> {
    let arg = entry
        .args
        .get(index)
        .cloned()
        .ok_or_else(|| ChainError::Decode(format!("storage key {} missing argument {index}", entry.key)))?;
    decode("storage key argument", arg)
}

pub mod queries {
    //! Storage locations read by the agent.

    use super::*;

    pub fn positions(token: Token) -> StorageQuery {
        StorageQuery::new("loans", "positions").key(CurrencyId::from(token))
    }

    pub fn position(token: Token, who: &AccountId) -> StorageQuery {
        positions(token).key(who)
    }

    pub fn debit_exchange_rate(token: Token) -> StorageQuery {
        StorageQuery::new("cdpEngine", "debitExchangeRate").key(CurrencyId::from(token))
    }

    pub fn collateral_params(token: Token) -> StorageQuery {
        StorageQuery::new("cdpEngine", "collateralParams").key(CurrencyId::from(token))
    }

    pub fn collateral_auctions() -> StorageQuery {
        StorageQuery::new("auctionManager", "collateralAuctions")
    }

    pub fn auction(id: AuctionId) -> StorageQuery {
        StorageQuery::new("auction", "auctions").key(id)
    }

    pub fn total_issuance(token: Token) -> StorageQuery {
        StorageQuery::new("tokens", "totalIssuance").key(CurrencyId::from(token))
    }

    pub fn total_staking_currency() -> StorageQuery {
        StorageQuery::new("homaLite", "totalStakingCurrency")
    }

    pub fn token_account(who: &AccountId, token: Token) -> StorageQuery {
        StorageQuery::new("tokens", "accounts").key(who).key(CurrencyId::from(token))
    }

    pub fn system_account(who: &AccountId) -> StorageQuery {
        StorageQuery::new("system", "account").key(who)
    }
}

impl ChainClient {
    pub fn new(backend: Arc<dyn ChainBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn ChainBackend> {
        &self.backend
    }

    /// Read a value and decode it, `None` when the slot is empty.
    pub async fn read<T: DeserializeOwned>(&self, query: &StorageQuery) -> Result<Option<T>> {
        match self.backend.storage(query).await? {
            None | Some(Value::Null) => Ok(None),
            Some(v) => decode(&query.to_string(), v).map(Some),
        }
    }

    /// Loan position of `who` in `token`. Absent records read as an empty position.
    pub async fn position(&self, token: Token, who: &AccountId) -> Result<Position> {
        let raw: RawPosition = self.read(&queries::position(token, who)).await?.unwrap_or_default();
        Ok(Position {
            owner: who.clone(),
            currency: token,
            collateral: raw.collateral,
            debit: raw.debit,
        })
    }

    /// One page of positions in `token`, in storage key order, after `start_key`.
    #[instrument(skip(self, start_key), fields(start = ?start_key))]
    pub async fn positions_page(
        &self,
        token: Token,
        page_size: u32,
        start_key: Option<&StorageKey>,
    ) -> Result<Vec<PositionEntry>> {
        let entries = self
            .backend
            .storage_entries_paged(&queries::positions(token), page_size, start_key)
            .await?;
        debug!(count = entries.len(), "Fetched position page");

        let mut page = Vec::with_capacity(entries.len());
        for entry in entries {
            let owner: AccountId = decode_arg(&entry, 1)?;
            let raw: RawPosition = match entry.value.clone() {
                Some(Value::Null) | None => RawPosition::default(),
                Some(v) => decode("loans.positions", v)?,
            };
            page.push(PositionEntry {
                key: entry.key,
                position: Position {
                    owner,
                    currency: token,
                    collateral: raw.collateral,
                    debit: raw.debit,
                },
            });
        }
        Ok(page)
    }

    /// Debit exchange rate (debit units to stable coin). `None` when not set.
    pub async fn debit_exchange_rate(&self, token: Token) -> Result<Option<Decimal>> {
        let raw: Option<Balance> = self
            .read::<RawBalance>(&queries::debit_exchange_rate(token))
            .await?
            .map(|b| b.0);
        Ok(raw.map(|r| from_chain(r, PRICE_PRECISION)).transpose()?)
    }

    pub async fn collateral_params(&self, token: Token) -> Result<Option<CollateralParams>> {
        self.read(&queries::collateral_params(token)).await
    }

    /// Every active collateral auction. Entries with an empty value are skipped.
    pub async fn collateral_auctions(&self) -> Result<Vec<(AuctionId, CollateralAuction)>> {
        let entries = self.backend.storage_entries(&queries::collateral_auctions()).await?;
        let mut auctions = Vec::with_capacity(entries.len());
        for entry in entries {
            let id: AuctionId = decode_arg(&entry, 0)?;
            match entry.value {
                Some(Value::Null) | None => {
                    warn!(auction_id = %id, "Collateral auction record empty, skipping");
                }
                Some(v) => auctions.push((id, decode("auctionManager.collateralAuctions", v)?)),
            }
        }
        Ok(auctions)
    }

    pub async fn auction_info(&self, id: AuctionId) -> Result<Option<AuctionInfo>> {
        self.read(&queries::auction(id)).await
    }

    pub async fn total_issuance(&self, token: Token) -> Result<Balance> {
        Ok(self
            .read::<RawBalance>(&queries::total_issuance(token))
            .await?
            .map_or(0, |b| b.0))
    }

    pub async fn total_staking_currency(&self) -> Result<Balance> {
        Ok(self
            .read::<RawBalance>(&queries::total_staking_currency())
            .await?
            .map_or(0, |b| b.0))
    }

    /// Raw RPC passthrough.
    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        self.backend.rpc(method, params).await
    }
}

#[derive(Debug, Deserialize)]
struct RawBalance(#[serde(with = "balance")] Balance);
