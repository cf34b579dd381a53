//! Own-loan rebalancing: deposit idle collateral and repay idle stable coin.

use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use bidder_chain::fixed_point::{self, BALANCE_PRECISION};
use bidder_chain::{
    AccountId, Balance, Call, Confirmation, Position, ProxyType, Token, TxOrchestrator, TxOutcome, Wallet,
};

use crate::config::RebalanceConfig;
use crate::error::Result;

/// A planned `adjustLoan` on the stash loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePlan {
    /// Collateral to deposit, whole units
    pub deposit: Decimal,
    /// Stable coin to repay, whole units
    pub repay: Decimal,
    /// Raw collateral adjustment (positive)
    pub collateral_adjustment: i128,
    /// Raw debit adjustment (negative or zero)
    pub debit_adjustment: i128,
}

/// Decides whether and how much to rebalance.
#[derive(Debug, Clone)]
pub struct RebalancePolicy {
    config: RebalanceConfig,
}

impl RebalancePolicy {
    pub fn new(config: RebalanceConfig) -> Self {
        Self { config }
    }

    /// Plan a deposit of all idle collateral plus a repay of idle stable coin
    /// minus the buffer. Nothing happens unless one of the balances clears its
    /// dust threshold.
    ///
    /// The repay is clamped at zero, rounded down, converted to debit units
    /// and capped at the loan's current debit.
    pub fn plan(
        &self,
        collateral_available: Decimal,
        stable_available: Decimal,
        debit_exchange_rate: Decimal,
        current_debit: Balance,
    ) -> Result<Option<RebalancePlan>> {
        let deposit_due = collateral_available >= self.config.deposit_dust;
        let repay_due = stable_available >= self.config.repay_dust;
        if !deposit_due && !repay_due {
            return Ok(None);
        }

        let deposit = collateral_available.max(Decimal::ZERO);
        let repay = fixed_point::round_down(
            (stable_available - self.config.repay_buffer).max(Decimal::ZERO),
            self.config.repay_decimals,
        );

        let debit = fixed_point::div(repay, debit_exchange_rate)?;
        let debit_raw = fixed_point::to_chain(debit, BALANCE_PRECISION)?.min(current_debit);
        let collateral_raw = fixed_point::to_chain(deposit, BALANCE_PRECISION)?;

        if debit_raw == 0 && collateral_raw == 0 {
            return Ok(None);
        }

        Ok(Some(RebalancePlan {
            deposit,
            repay,
            collateral_adjustment: i128::try_from(collateral_raw)
                .map_err(|_| bidder_chain::FixedPointError::Overflow(deposit.to_string(), BALANCE_PRECISION))?,
            debit_adjustment: -i128::try_from(debit_raw)
                .map_err(|_| bidder_chain::FixedPointError::Overflow(debit.to_string(), BALANCE_PRECISION))?,
        }))
    }
}

/// Executes rebalance plans through the proxy account.
#[derive(Debug, Clone)]
pub struct Rebalancer {
    policy: RebalancePolicy,
    wallet: Wallet,
    tx: TxOrchestrator,
    stash: AccountId,
    stable: Token,
}

impl Rebalancer {
    pub fn new(policy: RebalancePolicy, wallet: Wallet, tx: TxOrchestrator, stash: AccountId, stable: Token) -> Self {
        Self { policy, wallet, tx, stash, stable }
    }

    /// Rebalance the stash loan `position`. `None` when nothing was due.
    ///
    /// Waits for finality so the following position read sees the result.
    #[instrument(skip_all, fields(currency = %position.currency))]
    pub async fn run(&self, position: &Position, debit_exchange_rate: Decimal) -> Result<Option<TxOutcome>> {
        let collateral = self.wallet.query_balance(&self.stash, position.currency).await?;
        let stable = self.wallet.query_balance(&self.stash, self.stable).await?;
        let collateral_available = collateral.available_decimal()?;
        let stable_available = stable.available_decimal()?;
        debug!(%collateral_available, %stable_available, "Stash balances");

        let Some(plan) = self.policy.plan(
            collateral_available,
            stable_available,
            debit_exchange_rate,
            position.debit,
        )?
        else {
            return Ok(None);
        };

        info!(
            deposit = %plan.deposit,
            repay = %plan.repay,
            debit_adjustment = plan.debit_adjustment,
            "adjustLoan"
        );
        let call = Call::proxy(
            &self.stash,
            ProxyType::Loan,
            Call::AdjustLoan {
                currency_id: position.currency.into(),
                collateral_adjustment: plan.collateral_adjustment,
                debit_adjustment: plan.debit_adjustment,
            },
        );
        let outcome = self.tx.sign_and_send(call, Confirmation::Finalized).await?;
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidder_chain::mock::MockBackend;
    use bidder_chain::{queries, ChainClient, KeyPair};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    const E12: u128 = 1_000_000_000_000;
    const STASH: &str = "t6X8qpY26nsi6WDMkhbyaTz6cLtNBt7xfs4H9k94D3kM1Lm";

    fn policy() -> RebalancePolicy {
        RebalancePolicy::new(RebalanceConfig::default())
    }

    #[test]
    fn test_below_dust_does_nothing() {
        let plan = policy().plan(dec!(0.05), dec!(99), dec!(0.1), 1_000 * E12).unwrap();
        assert_eq!(plan, None);
    }

    #[test]
    fn test_repay_with_buffer_and_rounding() {
        let plan = policy()
            .plan(Decimal::ZERO, dec!(121.123456), dec!(0.1), 10_000 * E12)
            .unwrap()
            .unwrap();
        assert_eq!(plan.repay, dec!(100.1234));
        assert_eq!(plan.deposit, Decimal::ZERO);
        assert_eq!(plan.collateral_adjustment, 0);
        // 100.1234 / 0.1 = 1001.234 debit units
        assert_eq!(plan.debit_adjustment, -1_001_234_000_000_000);
    }

    #[test]
    fn test_deposit_only_clamps_repay() {
        let plan = policy().plan(dec!(0.5), dec!(10), dec!(0.1), 10_000 * E12).unwrap().unwrap();
        assert_eq!(plan.deposit, dec!(0.5));
        assert_eq!(plan.repay, Decimal::ZERO);
        assert_eq!(plan.collateral_adjustment, 500_000_000_000);
        assert_eq!(plan.debit_adjustment, 0);
    }

    #[test]
    fn test_repay_capped_at_debit() {
        let plan = policy().plan(Decimal::ZERO, dec!(1021), dec!(1), 5 * E12).unwrap().unwrap();
        assert_eq!(plan.debit_adjustment, -5 * E12 as i128);
    }

    #[test]
    fn test_zero_rate_errors() {
        assert!(policy().plan(Decimal::ZERO, dec!(500), Decimal::ZERO, E12).is_err());
    }

    #[tokio::test]
    async fn test_rebalance_submits_proxied_adjust_loan() {
        let stash = AccountId::parse(STASH).unwrap();
        let backend = Arc::new(
            MockBackend::new()
                .with_storage(queries::token_account(&stash, Token::Lksm), json!({"free": (2 * E12).to_string()}))
                .with_storage(queries::token_account(&stash, Token::Kusd), json!({"free": (221 * E12).to_string()})),
        );
        let client = ChainClient::new(backend.clone());
        let tx = TxOrchestrator::new(backend.clone(), Some(KeyPair::from_uri("//Proxy").unwrap()));
        let rebalancer = Rebalancer::new(policy(), Wallet::new(client), tx, stash.clone(), Token::Kusd);

        let position = Position { owner: stash.clone(), currency: Token::Lksm, collateral: 100 * E12, debit: 10_000 * E12 };
        let outcome = rebalancer.run(&position, dec!(0.1)).await.unwrap().unwrap();
        assert!(matches!(outcome, TxOutcome::Finalized { .. }));

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].is_signed());
        assert_eq!(
            submitted[0].call(),
            &Call::proxy(
                &stash,
                ProxyType::Loan,
                Call::AdjustLoan {
                    currency_id: Token::Lksm.into(),
                    collateral_adjustment: 2 * E12 as i128,
                    debit_adjustment: -2_000 * E12 as i128,
                },
            )
        );
    }

    #[tokio::test]
    async fn test_rebalance_nothing_due() {
        let stash = AccountId::parse(STASH).unwrap();
        let backend = Arc::new(MockBackend::new());
        let client = ChainClient::new(backend.clone());
        let tx = TxOrchestrator::new(backend.clone(), None);
        let rebalancer = Rebalancer::new(policy(), Wallet::new(client), tx, stash.clone(), Token::Kusd);

        let position = Position { owner: stash, currency: Token::Lksm, collateral: 0, debit: 0 };
        assert!(rebalancer.run(&position, dec!(0.1)).await.unwrap().is_none());
        assert!(backend.submitted().is_empty());
    }
}
