//! Per-pass market snapshot: oracle prices and risk contexts.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

use bidder_chain::{fetch_all_oracle_prices, liquid_staking_rate, ChainClient, OraclePrice, Token};

use crate::config::{CollateralAsset, Pricing};
use crate::error::{BidderError, Result};
use crate::risk::RiskContext;

/// Prices and contexts read at the start of one pass.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub prices: HashMap<Token, OraclePrice>,
    /// Liquid-staking rates of pegged tokens
    pub peg_rates: HashMap<Token, Decimal>,
    /// Assets with complete data. Incomplete ones are left out.
    pub contexts: BTreeMap<Token, RiskContext>,
}

impl MarketSnapshot {
    pub fn context(&self, token: Token) -> Result<&RiskContext> {
        self.contexts
            .get(&token)
            .ok_or_else(|| BidderError::DataAbsence(format!("no risk context for {token}")))
    }
}

/// Builds [`MarketSnapshot`]s for the configured collateral assets.
#[derive(Debug, Clone)]
pub struct MarketData {
    client: ChainClient,
    provider: String,
    assets: Vec<CollateralAsset>,
}

impl MarketData {
    pub fn new(client: ChainClient, provider: impl Into<String>, assets: Vec<CollateralAsset>) -> Self {
        Self { client, provider: provider.into(), assets }
    }

    /// Read oracle prices, peg rates and protocol parameters.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<MarketSnapshot> {
        let prices = fetch_all_oracle_prices(&self.client, &self.provider).await?;
        let mut snapshot = MarketSnapshot { prices, ..Default::default() };

        for asset in &self.assets {
            let token = asset.token;

            let Some(rate) = self.client.debit_exchange_rate(token).await? else {
                warn!(%token, "No debit exchange rate, skipping asset");
                continue;
            };
            let liquidation_ratio = match self.client.collateral_params(token).await? {
                Some(params) => params.liquidation_ratio()?,
                None => None,
            };
            let Some(liquidation_ratio) = liquidation_ratio else {
                warn!(%token, "No liquidation ratio, skipping asset");
                continue;
            };

            let context = match asset.pricing {
                Pricing::Oracle => {
                    let Some(price) = snapshot.prices.get(&token) else {
                        warn!(%token, "No oracle price, skipping asset");
                        continue;
                    };
                    RiskContext::direct(token, price.value, rate, liquidation_ratio)
                }
                Pricing::Pegged { base } => {
                    let Some(base_price) = snapshot.prices.get(&base).map(|p| p.value) else {
                        warn!(%token, %base, "No oracle price for peg base, skipping asset");
                        continue;
                    };
                    let peg_rate = match snapshot.peg_rates.get(&token) {
                        Some(r) => *r,
                        None => {
                            let r = liquid_staking_rate(&self.client, token).await?;
                            snapshot.peg_rates.insert(token, r);
                            r
                        }
                    };
                    RiskContext::pegged(token, base_price, peg_rate, rate, liquidation_ratio)?
                }
            };
            debug!(
                %token,
                oracle_price = %context.oracle_price,
                debit_exchange_rate = %context.debit_exchange_rate,
                liquidation_ratio = %context.liquidation_ratio,
                "Risk context"
            );
            snapshot.contexts.insert(token, context);
        }
        Ok(snapshot)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::AssetsConfig;
    use bidder_chain::mock::MockBackend;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn market(backend: MockBackend) -> MarketData {
        MarketData::new(
            ChainClient::new(Arc::new(backend)),
            "Acala",
            AssetsConfig::default().collateral,
        )
    }

    #[tokio::test]
    async fn test_load_contexts() {
        let snapshot = market(market_backend()).load().await.unwrap();

        let ksm = snapshot.context(Token::Ksm).unwrap();
        assert_eq!(ksm.oracle_price, dec!(300));
        assert_eq!(ksm.liquidation_ratio, dec!(1.5));
        assert_eq!(ksm.liquidation_price_multiplier, Decimal::ONE);

        let lksm = snapshot.context(Token::Lksm).unwrap();
        assert_eq!(lksm.oracle_price, dec!(60));
        assert_eq!(lksm.liquidation_price_multiplier, dec!(5));
        assert_eq!(lksm.debit_exchange_rate, dec!(0.1));
        assert_eq!(snapshot.peg_rates[&Token::Lksm], dec!(0.2));
    }

    #[tokio::test]
    async fn test_missing_data_omits_asset() {
        let backend = MockBackend::new()
            .with_rpc("oracle_getAllValues", serde_json::json!([]))
            .with_storage(bidder_chain::queries::debit_exchange_rate(Token::Ksm), "1");
        let snapshot = market(backend).load().await.unwrap();
        assert!(snapshot.contexts.is_empty());
        assert!(matches!(
            snapshot.context(Token::Lksm),
            Err(BidderError::DataAbsence(_))
        ));
    }
}
