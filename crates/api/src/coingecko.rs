//! CoinGecko market price client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Source of off-chain market prices.
#[async_trait]
pub trait MarketPriceSource: Send + Sync {
    /// Price of the asset with market id `id` (e.g. `"kusama"`), quoted in `quote` (e.g. `"usd"`).
    async fn fetch_price(&self, id: &str, quote: &str) -> Result<Decimal>;
}

/// CoinGecko `/simple/price` client. Callers pass CoinGecko ids.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into() }
    }

    fn price_url(&self) -> String {
        format!("{}/simple/price", self.base_url.trim_end_matches('/'))
    }
}

/// Pull `body[id][quote]` out of a `/simple/price` response.
fn extract_price(body: &Value, id: &str, quote: &str) -> Option<Decimal> {
    let price = body.get(id)?.get(quote)?;
    match price {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) => s.parse::<Decimal>().ok(),
        _ => None,
    }
    .filter(|p| !p.is_zero())
}

#[async_trait]
impl MarketPriceSource for CoinGeckoClient {
    #[instrument(skip(self))]
    async fn fetch_price(&self, id: &str, quote: &str) -> Result<Decimal> {
        let quote = quote.to_lowercase();
        let response = self
            .client
            .get(self.price_url())
            .query(&[("ids", id), ("vs_currencies", quote.as_str())])
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        match extract_price(&body, id, &quote) {
            Some(price) if !status.is_client_error() && !status.is_server_error() => {
                debug!(id, %price, "Fetched market price");
                Ok(price)
            }
            _ => Err(anyhow!("Price fetch failed ({status}): {body}")),
        }
    }
}
