//! Fixed-point helpers shared by the validator and the execution engine.
//!
//! Everything here is pure arithmetic over u128 with checked operators, so
//! the trigger logic above it never has to think about overflow or scale
//! juggling. Prices are 8-decimal USD, amounts are native token decimals,
//! percentages are basis points.

use crate::engine::types::{BPS_DENOMINATOR, DcaUnit};
use crate::error::{EngineError, Result};

pub fn pow10(decimals: u8) -> u128 {
    10u128.pow(decimals as u32)
}

/// `a * b / d`, erroring on overflow or a zero divisor.
pub fn mul_div(a: u128, b: u128, d: u128, ctx: &'static str) -> Result<u128> {
    if d == 0 {
        return Err(EngineError::Arithmetic(ctx));
    }
    a.checked_mul(b)
        .map(|n| n / d)
        .ok_or(EngineError::Arithmetic(ctx))
}

/// Convert a value denominated in stable-token units (e.g. `1_500_000000`
/// against a 6-decimal stable) to the 8-decimal USD scale, using the stable
/// token's own live price. With a $1.00 stable this is a pure rescale.
pub fn stable_units_to_usd(
    value: u128,
    stable_price: u128,
    stable_decimals: u8,
) -> Result<u128> {
    mul_div(value, stable_price, pow10(stable_decimals), "stable_units_to_usd")
}

/// `base` reduced by `bps` basis points.
pub fn bps_below(base: u128, bps: u64, ctx: &'static str) -> Result<u128> {
    let keep = BPS_DENOMINATOR
        .checked_sub(bps as u128)
        .ok_or(EngineError::Arithmetic(ctx))?;
    mul_div(base, keep, BPS_DENOMINATOR, ctx)
}

/// `base` raised by `bps` basis points.
pub fn bps_above(base: u128, bps: u64, ctx: &'static str) -> Result<u128> {
    let keep = BPS_DENOMINATOR
        .checked_add(bps as u128)
        .ok_or(EngineError::Arithmetic(ctx))?;
    mul_div(base, keep, BPS_DENOMINATOR, ctx)
}

/// Oracle-implied output for swapping `amount_in` of the `from` asset into
/// the `to` asset, both priced in 8-decimal USD, decimal-aware.
pub fn implied_amount_out(
    amount_in: u128,
    from_price: u128,
    to_price: u128,
    from_decimals: u8,
    to_decimals: u8,
) -> Result<u128> {
    if to_price == 0 {
        return Err(EngineError::Arithmetic("implied_amount_out"));
    }
    // Multiply by the from-price first; the intermediate stays well inside
    // u128 for realistic amounts and only then gets rescaled.
    let value = amount_in
        .checked_mul(from_price)
        .ok_or(EngineError::Arithmetic("implied_amount_out"))?;
    let out = if to_decimals >= from_decimals {
        let scaled = value
            .checked_mul(pow10(to_decimals - from_decimals))
            .ok_or(EngineError::Arithmetic("implied_amount_out"))?;
        scaled / to_price
    } else {
        value / to_price / pow10(from_decimals - to_decimals)
    };
    Ok(out)
}

/// Direction-aware slippage band. A fill at or above the oracle-implied
/// output always passes; a worse fill passes only while the shortfall stays
/// within `max_bps` of the implied amount. The boundary itself passes.
pub fn check_slippage(implied: u128, actual: u128, max_bps: u64) -> Result<()> {
    if actual >= implied {
        return Ok(());
    }
    let shortfall = implied - actual;
    let lhs = shortfall
        .checked_mul(BPS_DENOMINATOR)
        .ok_or(EngineError::Arithmetic("check_slippage"))?;
    let rhs = implied
        .checked_mul(max_bps as u128)
        .ok_or(EngineError::Arithmetic("check_slippage"))?;
    if lhs <= rhs {
        Ok(())
    } else {
        Err(EngineError::SlippageExceeded {
            implied,
            actual,
            max_bps,
        })
    }
}

/// One execution call's cap on how much of the remaining side it may move.
/// An unset schedule means the whole remainder is available.
pub fn dca_slice(remaining: u128, unit: DcaUnit, value: u128) -> Result<u128> {
    let slice = match unit {
        DcaUnit::Unset => remaining,
        DcaUnit::Percent => mul_div(remaining, value, BPS_DENOMINATOR, "dca_slice")?,
        DcaUnit::Fixed => value,
    };
    Ok(slice.min(remaining))
}

/// Volume-weighted average entry price after buying `added` units at `price`
/// on top of an `existing` position carried at `entry`.
pub fn weighted_entry(existing: u128, entry: u128, added: u128, price: u128) -> Result<u128> {
    let total = existing
        .checked_add(added)
        .ok_or(EngineError::Arithmetic("weighted_entry"))?;
    if total == 0 {
        return Ok(price);
    }
    let old_value = existing
        .checked_mul(entry)
        .ok_or(EngineError::Arithmetic("weighted_entry"))?;
    let new_value = added
        .checked_mul(price)
        .ok_or(EngineError::Arithmetic("weighted_entry"))?;
    let sum = old_value
        .checked_add(new_value)
        .ok_or(EngineError::Arithmetic("weighted_entry"))?;
    Ok(sum / total)
}

/// Stable-denominated value of an invest-token amount at `price` (8-dec USD),
/// expressed in stable native units.
pub fn invest_value_in_stable(
    amount: u128,
    invest_price: u128,
    stable_price: u128,
    invest_decimals: u8,
    stable_decimals: u8,
) -> Result<u128> {
    implied_amount_out(amount, invest_price, stable_price, invest_decimals, stable_decimals)
}
