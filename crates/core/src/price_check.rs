//! Oracle sanity check against an off-chain market price.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use bidder_api::MarketPriceSource;
use bidder_chain::fixed_point::relative_diff;
use bidder_chain::Token;

use crate::risk::RiskContext;

/// Oracle price next to the market price for one token.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceComparison {
    pub token: Token,
    pub oracle: Decimal,
    pub market: Decimal,
    pub diff: Decimal,
    pub alert: bool,
}

pub struct PriceDeviationCheck {
    source: Arc<dyn MarketPriceSource>,
    threshold: Decimal,
    quote: String,
}

impl std::fmt::Debug for PriceDeviationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceDeviationCheck")
            .field("threshold", &self.threshold)
            .field("quote", &self.quote)
            .finish_non_exhaustive()
    }
}

impl PriceDeviationCheck {
    pub fn new(source: Arc<dyn MarketPriceSource>, threshold: Decimal, quote: impl Into<String>) -> Self {
        Self { source, threshold, quote: quote.into() }
    }

    /// Compare each context's oracle price with the market price of tokens
    /// that have a market id. Market API failures are logged and skipped.
    pub async fn check<'a, F>(&self, contexts: &BTreeMap<Token, RiskContext>, market_id: F) -> Vec<PriceComparison>
    where
        F: Fn(Token) -> Option<&'a str>,
    {
        let mut comparisons = Vec::new();
        for (token, ctx) in contexts {
            let Some(id) = market_id(*token) else {
                continue;
            };
            let market = match self.source.fetch_price(id, &self.quote).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(%token, error = %e, "Market price unavailable");
                    continue;
                }
            };
            let Some(diff) = relative_diff(ctx.oracle_price, market) else {
                continue;
            };

            let alert = diff > self.threshold;
            if alert {
                error!(%token, oracle = %ctx.oracle_price, market = %market, %diff, "Oracle price deviation");
            } else {
                debug!(%token, oracle = %ctx.oracle_price, market = %market, %diff, "Oracle price in range");
            }
            comparisons.push(PriceComparison { token: *token, oracle: ctx.oracle_price, market, diff, alert });
        }
        comparisons
    }
}
