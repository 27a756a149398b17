//! Fixed-point asset amounts.
//!
//! ## Overview
//!
//! All monetary quantities are integer raw units tagged with an asset id.
//! There is no floating point anywhere in the engine: amount arithmetic
//! uses `u128` intermediates and documented rounding so that every replica
//! computes identical results.
//!
//! ## Scale
//!
//! Each asset has its own decimal precision; the engine never needs to
//! know it. The conversion helpers at the bottom of this module exist for
//! test setups and display only.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use ssz_rs::prelude::*;

use crate::error::{MarketError, Result as MarketResult};

/// Opaque asset handle.
pub type AssetId = u64;

/// Opaque account handle.
pub type AccountId = u64;

/// The core asset of the chain, in which deferred fees are denominated.
pub const CORE_ASSET: AssetId = 0;

/// Largest representable amount of any single asset.
pub const MAX_SHARE_SUPPLY: u64 = 1_000_000_000_000_000;

/// Denominator for collateral ratios (a ratio of 1.75 is stored as 1750).
pub const COLLATERAL_RATIO_DENOM: u16 = 1000;

/// Denominator for fee percentages (1% is stored as 100).
pub const HUNDRED_PERCENT: u16 = 10_000;

/// An amount of a specific asset.
///
/// Amounts are always non-negative; operations that would underflow
/// return an error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, SimpleSerialize)]
pub struct Asset {
    /// Amount in raw units
    pub amount: u64,

    /// The asset the amount is denominated in
    pub asset_id: AssetId,
}

impl Asset {
    /// Create a new amount
    #[inline]
    pub fn new(amount: u64, asset_id: AssetId) -> Self {
        Self { amount, asset_id }
    }

    /// Zero of the given asset
    #[inline]
    pub fn zero(asset_id: AssetId) -> Self {
        Self { amount: 0, asset_id }
    }

    /// Add two amounts of the same asset
    pub fn checked_add(self, other: Asset) -> MarketResult<Asset> {
        self.require_same_asset(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .filter(|a| *a <= MAX_SHARE_SUPPLY)
            .ok_or(MarketError::Overflow)?;
        Ok(Asset::new(amount, self.asset_id))
    }

    /// Subtract an amount of the same asset
    pub fn checked_sub(self, other: Asset) -> MarketResult<Asset> {
        self.require_same_asset(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MarketError::Overflow)?;
        Ok(Asset::new(amount, self.asset_id))
    }

    fn require_same_asset(self, other: Asset) -> MarketResult<()> {
        if self.asset_id != other.asset_id {
            return Err(MarketError::AssetMismatch {
                expected: self.asset_id,
                actual: other.asset_id,
            });
        }
        Ok(())
    }
}

impl PartialOrd for Asset {
    /// Amounts of different assets are not comparable.
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.asset_id != other.asset_id {
            return None;
        }
        Some(self.amount.cmp(&other.amount))
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

/// Convert a decimal string into raw units of an asset with the given
/// number of decimal places.
///
/// Returns `None` for negative, malformed or out of range inputs.
///
/// # Example
///
/// ```
/// use marginbook::types::parse_amount;
///
/// assert_eq!(parse_amount("8.5", 4), Some(85_000));
/// assert_eq!(parse_amount("1", 0), Some(1));
/// assert_eq!(parse_amount("-1", 4), None);
/// ```
pub fn parse_amount(s: &str, precision: u32) -> Option<u64> {
    let decimal = Decimal::from_str(s).ok()?;
    if decimal.is_sign_negative() {
        return None;
    }
    let scale = Decimal::from(10u64.checked_pow(precision)?);
    let scaled = decimal.checked_mul(scale)?;
    let raw = scaled.round_dp(0).to_u64()?;
    if raw > MAX_SHARE_SUPPLY {
        return None;
    }
    Some(raw)
}

/// Render raw units of an asset with the given precision as a decimal
/// string.
///
/// # Example
///
/// ```
/// use marginbook::types::format_amount;
///
/// assert_eq!(format_amount(85_000, 4), "8.5000");
/// assert_eq!(format_amount(1, 0), "1");
/// ```
pub fn format_amount(amount: u64, precision: u32) -> String {
    let scale = Decimal::from(10u64.pow(precision));
    let value = Decimal::from(amount) / scale;
    format!("{:.prec$}", value, prec = precision as usize)
}

// ============================================================================
// Unit Tests
// ============================================================================
