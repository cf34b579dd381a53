//! Collateral ratio and liquidation price evaluation.
//!
//! Every value here is recomputed from a fresh [`RiskContext`] each pass;
//! nothing is carried over between evaluations.

use rust_decimal::Decimal;
use serde::Serialize;

use bidder_chain::fixed_point::{self, BALANCE_PRECISION};
use bidder_chain::{AccountId, FixedPointError, Position, Token};

/// Per-asset pricing inputs, built once per pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskContext {
    pub token: Token,
    /// Effective collateral price in the stable coin
    pub oracle_price: Decimal,
    pub debit_exchange_rate: Decimal,
    pub liquidation_ratio: Decimal,
    /// Converts a price in the peg base back to this token (1 for direct prices)
    pub liquidation_price_multiplier: Decimal,
}

impl RiskContext {
    /// Context for a token the oracle prices directly.
    pub fn direct(token: Token, oracle_price: Decimal, debit_exchange_rate: Decimal, liquidation_ratio: Decimal) -> Self {
        Self {
            token,
            oracle_price,
            debit_exchange_rate,
            liquidation_ratio,
            liquidation_price_multiplier: Decimal::ONE,
        }
    }

    /// Context for a token priced as `base_price * peg_rate`.
    pub fn pegged(
        token: Token,
        base_price: Decimal,
        peg_rate: Decimal,
        debit_exchange_rate: Decimal,
        liquidation_ratio: Decimal,
    ) -> Result<Self, FixedPointError> {
        Ok(Self {
            token,
            oracle_price: fixed_point::mul(base_price, peg_rate)?,
            debit_exchange_rate,
            liquidation_ratio,
            liquidation_price_multiplier: fixed_point::div(Decimal::ONE, peg_rate)?,
        })
    }
}

/// What to do about a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskDecision {
    /// Below the liquidation ratio
    Liquidate,
    /// At risk, reported
    Watch,
    /// Above twice the liquidation ratio, or no debt
    Safe,
}

/// A position valued against its context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedPosition {
    pub account: AccountId,
    pub collateral_currency: Token,
    pub collateral: Decimal,
    pub collateral_value: Decimal,
    pub debit_value: Decimal,
    /// `None` when there is no debt
    pub collateral_ratio: Option<Decimal>,
    /// `None` when there is no collateral
    pub liquidation_price: Option<Decimal>,
    pub liquidation_ratio: Decimal,
    pub decision: RiskDecision,
}

impl EvaluatedPosition {
    /// Whether the position belongs in the risk report.
    pub fn is_reported(&self) -> bool {
        self.decision != RiskDecision::Safe
    }

    pub fn should_liquidate(&self) -> bool {
        self.decision == RiskDecision::Liquidate
    }
}

/// Classify a collateral ratio against the liquidation ratio.
pub fn decide(collateral_ratio: Option<Decimal>, liquidation_ratio: Decimal) -> RiskDecision {
    match collateral_ratio {
        None => RiskDecision::Safe,
        Some(ratio) if ratio < liquidation_ratio => RiskDecision::Liquidate,
        Some(ratio) if ratio > liquidation_ratio * Decimal::TWO => RiskDecision::Safe,
        Some(_) => RiskDecision::Watch,
    }
}

/// Value `position` against `ctx`.
///
/// ```text
/// collateral_value  = collateral * oracle_price
/// debit_value       = debit * debit_exchange_rate
/// collateral_ratio  = collateral_value / debit_value
/// liquidation_price = debit_value * liquidation_ratio / collateral * multiplier
/// ```
pub fn evaluate(position: &Position, ctx: &RiskContext) -> Result<EvaluatedPosition, FixedPointError> {
    let collateral = fixed_point::from_chain(position.collateral, BALANCE_PRECISION)?;
    let debit = fixed_point::from_chain(position.debit, BALANCE_PRECISION)?;

    let collateral_value = fixed_point::mul(collateral, ctx.oracle_price)?;
    let debit_value = fixed_point::mul(debit, ctx.debit_exchange_rate)?;

    let collateral_ratio = if debit_value.is_zero() {
        None
    } else {
        Some(fixed_point::div(collateral_value, debit_value)?)
    };

    let liquidation_price = if collateral.is_zero() {
        None
    } else {
        let at_liquidation = fixed_point::mul(debit_value, ctx.liquidation_ratio)?;
        let per_unit = fixed_point::div(at_liquidation, collateral)?;
        Some(fixed_point::mul(per_unit, ctx.liquidation_price_multiplier)?)
    };

    Ok(EvaluatedPosition {
        account: position.owner.clone(),
        collateral_currency: position.currency,
        collateral,
        collateral_value,
        debit_value,
        collateral_ratio,
        liquidation_price,
        liquidation_ratio: ctx.liquidation_ratio,
        decision: decide(collateral_ratio, ctx.liquidation_ratio),
    })
}
