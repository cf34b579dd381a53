//! One bidder pass: scan, rebalance, bid.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use bidder_api::MarketPriceSource;
use bidder_chain::{AccountId, ChainClient, TxOrchestrator, TxOutcome, Wallet};

use crate::bidder::{available_debit, AuctionBidder, BidSummary};
use crate::config::{BotConfig, Environment};
use crate::error::Result;
use crate::market::MarketData;
use crate::price_check::{PriceComparison, PriceDeviationCheck};
use crate::rebalance::{RebalancePolicy, Rebalancer};
use crate::risk::{evaluate, EvaluatedPosition};
use crate::scanner::{PositionScanner, RiskReport};

/// What one pass did.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(skip)]
    pub prices: Vec<PriceComparison>,
    pub report: RiskReport,
    #[serde(skip)]
    pub rebalance: Option<TxOutcome>,
    pub own_position: EvaluatedPosition,
    /// Stable coin the stash loan can still borrow, after bidding
    pub available: Decimal,
    pub bids: BidSummary,
}

/// Wires the components together for a single stateless pass.
pub struct Runner {
    config: BotConfig,
    stash: AccountId,
    client: ChainClient,
    wallet: Wallet,
    tx: TxOrchestrator,
    market: MarketData,
    scanner: PositionScanner,
    rebalancer: Rebalancer,
    bidder: AuctionBidder,
    price_check: Option<PriceDeviationCheck>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("stash", &self.stash)
            .field("endpoint", &self.client.backend().endpoint())
            .field("dry_run", &self.tx.is_dry_run())
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(config: BotConfig, client: ChainClient, tx: TxOrchestrator) -> Result<Self> {
        let stash = config.stash()?.clone();
        let wallet = Wallet::new(client.clone());
        let market = MarketData::new(
            client.clone(),
            config.oracle.provider.clone(),
            config.assets.collateral.clone(),
        );
        let scanner = PositionScanner::new(client.clone(), tx.clone(), config.scanner.page_size);
        let rebalancer = Rebalancer::new(
            RebalancePolicy::new(config.rebalance.clone()),
            wallet.clone(),
            tx.clone(),
            stash.clone(),
            config.assets.stable,
        );
        let bidder = AuctionBidder::new(client.clone(), tx.clone(), stash.clone(), config.assets.own_collateral);

        Ok(Self {
            config,
            stash,
            client,
            wallet,
            tx,
            market,
            scanner,
            rebalancer,
            bidder,
            price_check: None,
        })
    }

    /// Compare oracle prices with `source` at the start of each pass.
    pub fn with_market_prices(mut self, source: Arc<dyn MarketPriceSource>) -> Self {
        self.price_check = Some(PriceDeviationCheck::new(
            source,
            self.config.risk.alert_oracle_price_diff,
            self.config.oracle.quote.clone(),
        ));
        self
    }

    /// Startup checks. In live mode, warns when the signer is low on fees.
    pub async fn preflight(&self) -> Result<()> {
        if self.tx.is_dry_run() || !self.tx.has_signer() {
            return Ok(());
        }
        let signer = self.tx.signer_account()?;
        let balance = self.wallet.query_native_balance(signer).await?.available_decimal()?;
        if balance <= self.config.transaction.signer_min_balance {
            warn!(%signer, signer_balance = %balance, stash = %self.stash, "Signer balance low");
        } else {
            debug!(%signer, signer_balance = %balance, stash = %self.stash, "Signer");
        }
        Ok(())
    }

    /// Run one pass.
    ///
    /// A failed rebalance is logged and the pass continues with the loan as
    /// it was. Chain read failures abort the pass.
    #[instrument(skip_all, fields(stash = %self.stash, dry_run = self.tx.is_dry_run()))]
    pub async fn run(&self) -> Result<RunSummary> {
        let snapshot = self.market.load().await?;

        let prices = match &self.price_check {
            Some(check) => check.check(&snapshot.contexts, |t| self.config.market_id(t)).await,
            None => Vec::new(),
        };

        let report = self.scanner.scan(&snapshot.contexts).await?;
        report.log_summary();

        let own_currency = self.config.assets.own_collateral;
        let ctx = snapshot.context(own_currency)?;
        let position = self.client.position(own_currency, &self.stash).await?;

        let rebalance = match self.rebalancer.run(&position, ctx.debit_exchange_rate).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_action_scoped() => {
                error!(error = %e, "Rebalance failed");
                None
            }
            Err(e) => return Err(e),
        };
        let position = match &rebalance {
            Some(outcome) if !outcome.is_skipped() => self.client.position(own_currency, &self.stash).await?,
            _ => position,
        };

        let own_position = evaluate(&position, ctx)?;
        let available = available_debit(
            own_position.collateral_value,
            own_position.debit_value,
            self.config.risk.min_collateral_ratio,
        )?;
        self.log_own_position(&own_position, available);

        let bids = self.bidder.run(available, ctx.debit_exchange_rate).await?;

        Ok(RunSummary {
            prices,
            report,
            rebalance,
            own_position,
            available: bids.remaining,
            bids,
        })
    }

    fn log_own_position(&self, own: &EvaluatedPosition, available: Decimal) {
        let dangerous = own
            .collateral_ratio
            .is_some_and(|r| r < self.config.risk.alert_collateral_ratio);
        if dangerous {
            error!(
                collateral_ratio = ?own.collateral_ratio,
                alert_ratio = %self.config.risk.alert_collateral_ratio,
                "Collateral ratio dangerous"
            );
        }
        if dangerous || self.config.environment == Environment::Development {
            info!(
                collateral = %own.collateral,
                collateral_value = %own.collateral_value,
                debit_value = %own.debit_value,
                collateral_ratio = ?own.collateral_ratio,
                available_amount = %available,
                "Own position"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidder::SkipReason;
    use crate::error::BidderError;
    use crate::market::test_support::{market_backend, E12};
    use bidder_chain::mock::MockBackend;
    use bidder_chain::{queries, AuctionId, Call, KeyPair, Token};
    use rust_decimal_macros::dec;
    use serde_json::json;

    const STASH: &str = "t6X8qpY26nsi6WDMkhbyaTz6cLtNBt7xfs4H9k94D3kM1Lm";
    const OTHER: &str = "rXMrmePtNnyZ61hvpjfEEZ1zmKzueUnTqijDncTzE8Wa2sJ";

    fn stash() -> AccountId {
        AccountId::parse(STASH).unwrap()
    }

    fn config() -> BotConfig {
        BotConfig { stash: Some(stash()), ..BotConfig::default() }
    }

    /// Stash loan: 100 LKSM (at 60) against 10000 debit units (at 0.1), ratio 6.
    /// One open auction with a 500 target.
    fn backend() -> MockBackend {
        market_backend()
            .with_storage(
                queries::position(Token::Lksm, &stash()),
                json!({"collateral": (100 * E12).to_string(), "debit": (10_000 * E12).to_string()}),
            )
            .with_entry(
                queries::collateral_auctions().key(AuctionId(7)),
                Some(json!({
                    "refundRecipient": OTHER,
                    "currencyId": {"token": "KSM"},
                    "initialAmount": (10 * E12).to_string(),
                    "amount": (10 * E12).to_string(),
                    "target": (500 * E12).to_string(),
                    "startTime": 100
                })),
            )
            .with_storage(
                queries::auction(AuctionId(7)),
                json!({"bid": [OTHER, (400 * E12).to_string()], "start": 1, "end": null}),
            )
    }

    fn proxy() -> KeyPair {
        KeyPair::from_uri("//Proxy").unwrap()
    }

    fn runner(backend: Arc<MockBackend>, dry_run: bool) -> Runner {
        let client = ChainClient::new(backend.clone());
        let tx = TxOrchestrator::new(backend, Some(proxy())).with_dry_run(dry_run);
        Runner::new(config(), client, tx).unwrap()
    }

    #[tokio::test]
    async fn test_full_pass_bids() {
        let backend = Arc::new(backend());
        let summary = runner(backend.clone(), false).run().await.unwrap();

        assert_eq!(summary.own_position.collateral_value, dec!(6000));
        assert_eq!(summary.own_position.debit_value, dec!(1000));
        assert_eq!(summary.own_position.collateral_ratio, Some(dec!(6)));
        assert!(summary.rebalance.is_none());
        assert!(summary.report.liquidations.is_empty());

        assert_eq!(summary.bids.bids.len(), 1);
        assert_eq!(summary.bids.bids[0].amount, dec!(500));
        // 6000 / 2.6 - 1000 - 500
        assert!(summary.available > dec!(807.69) && summary.available < dec!(807.70));

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(matches!(submitted[0].call(), Call::BatchAll { calls } if calls.len() == 2));
    }

    #[tokio::test]
    async fn test_dry_run_submits_nothing() {
        let backend = Arc::new(backend());
        let summary = runner(backend.clone(), true).run().await.unwrap();
        assert_eq!(summary.bids.bids.len(), 1);
        assert_eq!(summary.bids.bids[0].tx_hash, None);
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_underwater_loan_skips_bids() {
        let backend = Arc::new(backend());
        // ratio 2: below the 2.6 target, nothing to borrow
        backend.set_storage(
            queries::position(Token::Lksm, &stash()),
            json!({"collateral": (100 * E12).to_string(), "debit": (30_000 * E12).to_string()}),
        );
        let summary = runner(backend.clone(), false).run().await.unwrap();
        assert!(summary.bids.bids.is_empty());
        assert_eq!(summary.bids.skipped, vec![(AuctionId(7), SkipReason::NoFundsAvailable)]);
        assert!(summary.available < Decimal::ZERO);
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rebalance_before_bidding() {
        let backend = Arc::new(
            backend().with_storage(
                queries::token_account(&stash(), Token::Lksm),
                json!({"free": (2 * E12).to_string()}),
            ),
        );
        let summary = runner(backend.clone(), false).run().await.unwrap();
        assert!(matches!(summary.rebalance, Some(TxOutcome::Finalized { .. })));

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].signer(), Some(proxy().account()));
        assert!(matches!(submitted[0].call(), Call::Proxy { call, .. } if matches!(**call, Call::AdjustLoan { .. })));
        assert!(matches!(submitted[1].call(), Call::BatchAll { .. }));
    }

    #[tokio::test]
    async fn test_missing_own_context() {
        let backend = Arc::new(MockBackend::new().with_rpc("oracle_getAllValues", json!([])));
        let err = runner(backend, true).run().await.unwrap_err();
        assert!(matches!(err, BidderError::DataAbsence(_)));
    }

    #[tokio::test]
    async fn test_preflight() {
        let signer = proxy().account().clone();
        let backend = Arc::new(
            MockBackend::new()
                .with_storage(queries::system_account(&signer), json!({"data": {"free": "500000000000"}})),
        );
        runner(backend.clone(), false).preflight().await.unwrap();
        runner(backend, true).preflight().await.unwrap();
    }

    #[test]
    fn test_requires_stash() {
        let backend = Arc::new(MockBackend::new());
        let client = ChainClient::new(backend.clone());
        let tx = TxOrchestrator::new(backend, None);
        let err = Runner::new(BotConfig::default(), client, tx).unwrap_err();
        assert!(matches!(err, BidderError::Config(_)));
    }
}
