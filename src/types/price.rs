//! Rational prices.
//!
//! ## Representation
//!
//! A price is an ordered pair of amounts, `base / quote`, and carries
//! direction: selling `base` for `quote` is not the same price object as
//! selling `quote` for `base`. The numeric value of a price is the
//! rational `base.amount / quote.amount`; for a sell order whose
//! `sell_price` has base equal to the asset being sold, a higher value
//! means the seller gives away more per unit received, so books iterate
//! from the highest value down.
//!
//! ## Rounding
//!
//! Multiplying an amount by a price truncates. Matching code always
//! orients the truncation in the maker's favor; nothing in this module
//! ever rounds up.
//!
//! All comparisons cross-multiply in `u128`, so they are exact for any
//! representable amounts.

use std::cmp::Ordering;

use ssz_rs::prelude::*;

use crate::error::{MarketError, Result as MarketResult};
use crate::types::asset::{Asset, AssetId, COLLATERAL_RATIO_DENOM, MAX_SHARE_SUPPLY};

/// The ratio between two asset amounts, with direction.
#[derive(Debug, Clone, Copy, Default, SimpleSerialize)]
pub struct Price {
    /// Amount of the asset being offered
    pub base: Asset,

    /// Amount of the asset wanted in return
    pub quote: Asset,
}

impl Price {
    /// Create a new price
    #[inline]
    pub fn new(base: Asset, quote: Asset) -> Self {
        Self { base, quote }
    }

    /// The same ratio in the opposite direction
    #[inline]
    pub fn inverse(self) -> Self {
        Self { base: self.quote, quote: self.base }
    }

    /// Check that the price can be used as a match price: positive
    /// amounts on both sides, two distinct assets.
    pub fn validate(&self) -> MarketResult<()> {
        if self.base.asset_id == self.quote.asset_id {
            return Err(MarketError::Precondition("price must span two distinct assets"));
        }
        if self.base.amount == 0 || self.quote.amount == 0 {
            return Err(MarketError::Precondition("price amounts must be positive"));
        }
        Ok(())
    }

    /// The highest representable price selling `base_id` for `quote_id`.
    /// Used as a range sentinel when scanning a book from its best offer.
    pub fn max(base_id: AssetId, quote_id: AssetId) -> Self {
        Self::new(Asset::new(MAX_SHARE_SUPPLY, base_id), Asset::new(1, quote_id))
    }

    /// The lowest positive price selling `base_id` for `quote_id`.
    pub fn min(base_id: AssetId, quote_id: AssetId) -> Self {
        Self::new(Asset::new(1, base_id), Asset::new(MAX_SHARE_SUPPLY, quote_id))
    }

    /// The price at which a debt position becomes subject to a margin
    /// call, given its debt, collateral and the maintenance collateral
    /// ratio from the feed.
    ///
    /// The result is oriented base = collateral, quote = debt. A position
    /// is under collateralized when the inverse of its call price is at
    /// or above the feed's settlement price.
    ///
    /// # Example
    ///
    /// ```
    /// use marginbook::types::{Asset, Price};
    ///
    /// // 100 debt (asset 2) against 1100 collateral (asset 1) at 1.75x
    /// let cp = Price::call_price(Asset::new(100, 2), Asset::new(1100, 1), 1750);
    /// assert_eq!(cp.base, Asset::new(1_100_000, 1));
    /// assert_eq!(cp.quote, Asset::new(175_000, 2));
    /// ```
    pub fn call_price(debt: Asset, collateral: Asset, maintenance_collateral_ratio: u16) -> Self {
        let mut num = collateral.amount as u128 * COLLATERAL_RATIO_DENOM as u128;
        let mut den = debt.amount as u128 * maintenance_collateral_ratio as u128;
        // shrink toward a representable ratio, preserving the value as
        // closely as the fixed range allows
        while num > MAX_SHARE_SUPPLY as u128 || den > MAX_SHARE_SUPPLY as u128 {
            num = (num >> 1) + 1;
            den = (den >> 1) + 1;
        }
        Self::new(
            Asset::new(num as u64, collateral.asset_id),
            Asset::new(den as u64, debt.asset_id),
        )
    }

    #[inline]
    fn same_pair(&self, other: &Price) -> bool {
        self.base.asset_id == other.base.asset_id && self.quote.asset_id == other.quote.asset_id
    }

    /// Exact rational comparison of two prices on the same pair.
    pub(crate) fn value_cmp(&self, other: &Price) -> Ordering {
        let lhs = self.base.amount as u128 * other.quote.amount as u128;
        let rhs = other.base.amount as u128 * self.quote.amount as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialEq for Price {
    /// Rational equality: `100/200` equals `1/2` on the same pair.
    fn eq(&self, other: &Self) -> bool {
        self.same_pair(other) && self.value_cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Price {
    /// Prices on different pairs are not comparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.same_pair(other) {
            return None;
        }
        Some(self.value_cmp(other))
    }
}

impl Asset {
    /// Multiply an amount by a price, truncating.
    ///
    /// Works in both directions: an amount of the base asset yields the
    /// quote asset and vice versa.
    ///
    /// # Example
    ///
    /// ```
    /// use marginbook::types::{Asset, Price};
    ///
    /// let p = Price::new(Asset::new(100, 1), Asset::new(200, 2));
    /// assert_eq!(Asset::new(50, 1).checked_mul(&p).unwrap(), Asset::new(100, 2));
    /// assert_eq!(Asset::new(100, 2).checked_mul(&p).unwrap(), Asset::new(50, 1));
    /// ```
    pub fn checked_mul(self, p: &Price) -> MarketResult<Asset> {
        let (from, to) = if self.asset_id == p.base.asset_id {
            (p.base, p.quote)
        } else if self.asset_id == p.quote.asset_id {
            (p.quote, p.base)
        } else {
            return Err(MarketError::AssetMismatch {
                expected: p.base.asset_id,
                actual: self.asset_id,
            });
        };
        if from.amount == 0 {
            return Err(MarketError::Precondition("cannot multiply by a null price"));
        }
        let result = self.amount as u128 * to.amount as u128 / from.amount as u128;
        if result > MAX_SHARE_SUPPLY as u128 {
            return Err(MarketError::Overflow);
        }
        Ok(Asset::new(result as u64, to.asset_id))
    }

    /// Form the price `self / quote`, reduced to lowest terms.
    pub fn divide(self, quote: Asset) -> MarketResult<Price> {
        if self.asset_id == quote.asset_id {
            return Err(MarketError::Precondition("price must span two distinct assets"));
        }
        if quote.amount == 0 {
            return Err(MarketError::Precondition("price quote amount must be positive"));
        }
        let g = gcd(self.amount, quote.amount);
        Ok(Price::new(
            Asset::new(self.amount / g, self.asset_id),
            Asset::new(quote.amount / g, quote.asset_id),
        ))
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    // gcd(0, b) is b, so a zero numerator reduces to 0/1
    a.max(1)
}

// ============================================================================
// Unit Tests
// ============================================================================
