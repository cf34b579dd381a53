//! On-chain oracle prices and the liquid-staking exchange rate.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::client::ChainClient;
use crate::error::{ChainError, Result};
use crate::fixed_point::{div, from_chain, PRICE_PRECISION};
use crate::types::{balance, CurrencyId, Token};

/// Price feed entry for one token.
#[derive(Debug, Clone, PartialEq)]
pub struct OraclePrice {
    pub token: Token,
    /// Price in the stable coin
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawTimestamped {
    #[serde(with = "balance")]
    value: u128,
    /// Milliseconds since the epoch
    timestamp: i64,
}

/// Fetch every price the oracle `provider` currently holds.
///
/// Currencies the agent does not know, and empty feeds, are skipped.
#[instrument(skip(client))]
pub async fn fetch_all_oracle_prices(
    client: &ChainClient,
    provider: &str,
) -> Result<HashMap<Token, OraclePrice>> {
    let result = client.rpc("oracle_getAllValues", json!([provider])).await?;
    let rows: Vec<(Value, Option<RawTimestamped>)> = serde_json::from_value(result)
        .map_err(|e| ChainError::Decode(format!("oracle_getAllValues: {e}")))?;

    let mut prices = HashMap::with_capacity(rows.len());
    for (currency, feed) in rows {
        let token = match serde_json::from_value::<CurrencyId>(currency.clone()) {
            Ok(id) => id.as_token(),
            Err(_) => {
                debug!(%currency, "Ignoring oracle price for unknown currency");
                continue;
            }
        };
        let Some(feed) = feed else {
            warn!(%token, "Oracle has no value");
            continue;
        };
        let timestamp = Utc
            .timestamp_millis_opt(feed.timestamp)
            .single()
            .ok_or_else(|| ChainError::Decode(format!("invalid oracle timestamp {}", feed.timestamp)))?;
        let value = from_chain(feed.value, PRICE_PRECISION)?;
        prices.insert(token, OraclePrice { token, value, timestamp });
    }
    debug!(count = prices.len(), "Fetched oracle prices");
    Ok(prices)
}

/// Liquid-staking exchange rate: staked base currency per liquid token.
///
/// Errors when the liquid token has no issuance.
pub async fn liquid_staking_rate(client: &ChainClient, liquid: Token) -> Result<Decimal> {
    let (staked, issuance) = tokio::try_join!(
        client.total_staking_currency(),
        client.total_issuance(liquid),
    )?;
    let staked = from_chain(staked, crate::fixed_point::BALANCE_PRECISION)?;
    let issuance = from_chain(issuance, crate::fixed_point::BALANCE_PRECISION)?;
    Ok(div(staked, issuance)?)
}
