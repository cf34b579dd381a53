//! Fixed-point conversions between raw chain integers and exact decimals.
//!
//! Balances on chain are integers with an implied precision of 12 decimals;
//! oracle prices, exchange rates and ratios carry 18. All risk math runs on
//! [`Decimal`] and only converts back to integers when building a call.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Precision of token balances and debit amounts.
pub const BALANCE_PRECISION: u32 = 12;

/// Precision of oracle prices, exchange rates and ratios.
pub const PRICE_PRECISION: u32 = 18;

/// Pre-computed powers of 10 up to 10^18
const POW10: [u64; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixedPointError {
    #[error("value {0} does not fit precision {1}")]
    Overflow(String, u32),
    #[error("unsupported precision {0}")]
    Precision(u32),
    #[error("negative value {0} where an unsigned amount is required")]
    Negative(Decimal),
    #[error("division by zero")]
    DivisionByZero,
}

#[inline]
fn scale(precision: u32) -> Result<Decimal, FixedPointError> {
    POW10
        .get(precision as usize)
        .map(|p| Decimal::from(*p))
        .ok_or(FixedPointError::Precision(precision))
}

/// Interpret a raw chain integer with the given precision.
///
/// Example: `from_chain(10_000_000_000_000, 12)` = 10
pub fn from_chain(raw: u128, precision: u32) -> Result<Decimal, FixedPointError> {
    let signed = i128::try_from(raw).map_err(|_| FixedPointError::Overflow(raw.to_string(), precision))?;
    Decimal::try_from_i128_with_scale(signed, precision)
        .map(|d| d.normalize())
        .map_err(|_| FixedPointError::Overflow(raw.to_string(), precision))
}

/// Convert back to a raw chain integer, truncating digits below the precision.
pub fn to_chain(value: Decimal, precision: u32) -> Result<u128, FixedPointError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(FixedPointError::Negative(value));
    }
    let scaled = value
        .checked_mul(scale(precision)?)
        .ok_or_else(|| FixedPointError::Overflow(value.to_string(), precision))?;
    scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| FixedPointError::Overflow(value.to_string(), precision))
}

/// Signed variant of [`to_chain`], truncating toward zero.
pub fn to_chain_signed(value: Decimal, precision: u32) -> Result<i128, FixedPointError> {
    let scaled = value
        .checked_mul(scale(precision)?)
        .ok_or_else(|| FixedPointError::Overflow(value.to_string(), precision))?;
    scaled
        .trunc()
        .to_i128()
        .ok_or_else(|| FixedPointError::Overflow(value.to_string(), precision))
}

/// Round toward zero to `dp` decimal places.
#[inline]
pub fn round_down(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::ToZero)
}

/// `a * b`, erroring instead of panicking on overflow.
#[inline]
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal, FixedPointError> {
    a.checked_mul(b)
        .ok_or_else(|| FixedPointError::Overflow(format!("{a} * {b}"), PRICE_PRECISION))
}

/// `a / b`; division by zero is an error.
#[inline]
pub fn div(a: Decimal, b: Decimal) -> Result<Decimal, FixedPointError> {
    if b.is_zero() {
        return Err(FixedPointError::DivisionByZero);
    }
    a.checked_div(b)
        .ok_or_else(|| FixedPointError::Overflow(format!("{a} / {b}"), PRICE_PRECISION))
}

/// Relative difference `|a - b| / b`. Returns `None` when `b` is zero.
pub fn relative_diff(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.is_zero() {
        return None;
    }
    ((a - b).abs()).checked_div(b.abs())
}
