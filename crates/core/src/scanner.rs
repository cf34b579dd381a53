//! Position scanner.
//!
//! Pages through every loan position of each collateral asset, evaluates it
//! and submits a forced liquidation for each one below its liquidation
//! ratio. Liquidations are submitted while paging continues and waited on
//! together at the end; each stands alone, so one failing never affects the
//! others or the report.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use bidder_chain::{AccountId, Call, ChainClient, Confirmation, Submission, Token, TxOrchestrator, H256};

use crate::error::Result;
use crate::risk::{evaluate, EvaluatedPosition, RiskContext};

/// Outcome of one forced liquidation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationAttempt {
    pub account: AccountId,
    pub currency: Token,
    /// Extrinsic hash, absent in dry runs and when submission failed
    pub tx_hash: Option<H256>,
    pub error: Option<String>,
}

impl LiquidationAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated result of one scan.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    /// At-risk positions per asset, most at risk first
    pub positions: BTreeMap<Token, Vec<EvaluatedPosition>>,
    pub liquidations: Vec<LiquidationAttempt>,
    pub pages_fetched: usize,
    pub positions_scanned: usize,
}

impl RiskReport {
    /// Log a per-asset summary, and the full report at debug level.
    pub fn log_summary(&self) {
        for (token, positions) in &self.positions {
            match positions.first() {
                Some(riskiest) => info!(
                    %token,
                    at_risk = positions.len(),
                    riskiest = %riskiest.account,
                    collateral_ratio = ?riskiest.collateral_ratio,
                    liquidation_price = ?riskiest.liquidation_price,
                    "Risk report"
                ),
                None => info!(%token, at_risk = 0, "Risk report"),
            }
        }
        let failed = self.liquidations.iter().filter(|l| !l.succeeded()).count();
        info!(
            scanned = self.positions_scanned,
            pages = self.pages_fetched,
            liquidations = self.liquidations.len(),
            failed,
            "Scan complete"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(self) {
                Ok(json) => debug!(report = %json, "Risk report detail"),
                Err(e) => warn!(error = %e, "Failed to serialize risk report"),
            }
        }
    }
}

/// Liquidation submitted but not yet confirmed.
struct InFlight {
    account: AccountId,
    currency: Token,
    submission: Submission,
}

#[derive(Debug, Clone)]
pub struct PositionScanner {
    client: ChainClient,
    tx: TxOrchestrator,
    page_size: u32,
}

impl PositionScanner {
    pub fn new(client: ChainClient, tx: TxOrchestrator, page_size: u32) -> Self {
        Self { client, tx, page_size: page_size.max(1) }
    }

    /// Scan every asset in `contexts`, in order, one page at a time.
    #[instrument(skip_all, fields(assets = contexts.len(), page_size = self.page_size))]
    pub async fn scan(&self, contexts: &BTreeMap<Token, RiskContext>) -> Result<RiskReport> {
        let mut report = RiskReport::default();
        let mut in_flight = Vec::new();

        for (token, ctx) in contexts {
            let at_risk = self.scan_asset(*token, ctx, &mut report, &mut in_flight).await?;
            report.positions.insert(*token, at_risk);
        }

        let waits = in_flight.into_iter().map(|f| async move {
            let result = self.tx.wait(f.submission, Confirmation::Accepted).await;
            (f.account, f.currency, result)
        });
        for (account, currency, result) in join_all(waits).await {
            let attempt = match result {
                Ok(outcome) => LiquidationAttempt { account, currency, tx_hash: outcome.hash(), error: None },
                Err(e) => {
                    warn!(%account, %currency, error = %e, "Liquidation failed");
                    LiquidationAttempt { account, currency, tx_hash: None, error: Some(e.to_string()) }
                }
            };
            report.liquidations.push(attempt);
        }
        Ok(report)
    }

    async fn scan_asset(
        &self,
        token: Token,
        ctx: &RiskContext,
        report: &mut RiskReport,
        in_flight: &mut Vec<InFlight>,
    ) -> Result<Vec<EvaluatedPosition>> {
        let mut at_risk = Vec::new();
        let mut cursor = None;

        loop {
            let page = self.client.positions_page(token, self.page_size, cursor.as_ref()).await?;
            report.pages_fetched += 1;
            report.positions_scanned += page.len();
            let full_page = page.len() == self.page_size as usize;

            for entry in &page {
                let eval = evaluate(&entry.position, ctx)?;
                if eval.should_liquidate() {
                    warn!(
                        account = %eval.account,
                        collateral_currency = %token,
                        collateral_value = %eval.collateral_value,
                        debit_value = %eval.debit_value,
                        collateral_ratio = ?eval.collateral_ratio,
                        liquidation_ratio = %eval.liquidation_ratio,
                        "Trigger liquidate"
                    );
                    self.submit_liquidation(token, &eval.account, report, in_flight).await;
                }
                if eval.is_reported() {
                    at_risk.push(eval);
                }
            }

            match page.last() {
                Some(last) if full_page => cursor = Some(last.key.clone()),
                _ => break,
            }
        }

        // Reported positions always carry a ratio.
        at_risk.sort_by(|a, b| a.collateral_ratio.cmp(&b.collateral_ratio));
        debug!(%token, at_risk = at_risk.len(), "Asset scanned");
        Ok(at_risk)
    }

    async fn submit_liquidation(
        &self,
        token: Token,
        account: &AccountId,
        report: &mut RiskReport,
        in_flight: &mut Vec<InFlight>,
    ) {
        let call = Call::Liquidate { currency_id: token.into(), who: account.clone() };
        info!(call = %call.to_human(), "Submitting unsigned liquidation");
        match self.tx.submit_unsigned(call).await {
            Ok(submission) => in_flight.push(InFlight {
                account: account.clone(),
                currency: token,
                submission,
            }),
            Err(e) => {
                warn!(%account, currency = %token, error = %e, "Liquidation submission failed");
                report.liquidations.push(LiquidationAttempt {
                    account: account.clone(),
                    currency: token,
                    tx_hash: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}
