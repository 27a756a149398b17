//! Ordered index keys for the three price-sorted books.
//!
//! ## Ordering
//!
//! Each key compares by asset pair first, then by the rational value of
//! the price, then by id. Because the pair is compared before any
//! amounts, the rational comparison only ever runs between prices on the
//! same pair, where cross-multiplication in `u128` is exact.
//!
//! - Limit orders: price value descending, so the most generous offer of
//!   a pair is first.
//! - Call orders: call price value ascending, so the least collateralized
//!   position of a pair is first.
//! - Collateral bids: price value descending, keyed by the debt asset, so
//!   the bid putting up the most collateral per covered debt is first.

use std::cmp::Ordering;

use crate::types::order::{CallOrder, CollateralBid, LimitOrder};
use crate::types::price::Price;
use crate::types::AssetId;

fn pair(p: &Price) -> (AssetId, AssetId) {
    (p.base.asset_id, p.quote.asset_id)
}

/// Key for the limit order book, best offer first.
#[derive(Debug, Clone, Copy)]
pub struct LimitKey {
    pub price: Price,
    pub id: u64,
}

impl LimitKey {
    pub fn of(order: &LimitOrder) -> Self {
        Self { price: order.sell_price, id: order.id }
    }
}

impl Ord for LimitKey {
    fn cmp(&self, other: &Self) -> Ordering {
        pair(&self.price)
            .cmp(&pair(&other.price))
            .then_with(|| other.price.value_cmp(&self.price))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Key for the call order book, least collateralized first.
#[derive(Debug, Clone, Copy)]
pub struct CallKey {
    pub price: Price,
    pub id: u64,
}

impl CallKey {
    pub fn of(order: &CallOrder) -> Self {
        Self { price: order.call_price, id: order.id }
    }
}

impl Ord for CallKey {
    fn cmp(&self, other: &Self) -> Ordering {
        pair(&self.price)
            .cmp(&pair(&other.price))
            .then_with(|| self.price.value_cmp(&other.price))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Key for the collateral bid book, best bid first within a debt asset.
#[derive(Debug, Clone, Copy)]
pub struct BidKey {
    pub price: Price,
    pub id: u64,
}

impl BidKey {
    pub fn of(bid: &CollateralBid) -> Self {
        Self { price: bid.inv_swan_price, id: bid.id }
    }
}

impl Ord for BidKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // keyed by the debt asset being bid on, then the collateral asset
        (self.price.quote.asset_id, self.price.base.asset_id)
            .cmp(&(other.price.quote.asset_id, other.price.base.asset_id))
            .then_with(|| other.price.value_cmp(&self.price))
            .then_with(|| self.id.cmp(&other.id))
    }
}

macro_rules! impl_key_eq {
    ($key:ident) => {
        impl PartialOrd for $key {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl PartialEq for $key {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }
        impl Eq for $key {}
    };
}

impl_key_eq!(LimitKey);
impl_key_eq!(CallKey);
impl_key_eq!(BidKey);

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    fn price(b: u64, bid: AssetId, q: u64, qid: AssetId) -> Price {
        Price::new(Asset::new(b, bid), Asset::new(q, qid))
    }

    #[test]
    fn test_limit_key_best_first() {
        // selling asset 2 for asset 1, the more generous offer sorts first
        let generous = LimitKey { price: price(100, 2, 100, 1), id: 5 };
        let stingy = LimitKey { price: price(100, 2, 200, 1), id: 1 };
        assert!(generous < stingy);

        // price ties break by id, oldest first
        let a = LimitKey { price: price(1, 2, 2, 1), id: 1 };
        let b = LimitKey { price: price(2, 2, 4, 1), id: 2 };
        assert!(a < b);
    }

    #[test]
    fn test_limit_key_groups_by_pair() {
        let one = LimitKey { price: price(1, 1, 1, 2), id: 9 };
        let other = LimitKey { price: price(1, 2, 1, 1), id: 1 };
        // pair dominates price and id
        assert!(one < other);
    }

    #[test]
    fn test_call_key_least_collateralized_first() {
        let thin = CallKey {
            price: Price::call_price(Asset::new(100, 2), Asset::new(1100, 1), 1750),
            id: 2,
        };
        let fat = CallKey {
            price: Price::call_price(Asset::new(100, 2), Asset::new(5000, 1), 1750),
            id: 1,
        };
        assert!(thin < fat);
    }

    #[test]
    fn test_bid_key_best_first() {
        // more collateral per covered debt sorts first
        let strong = BidKey { price: price(500, 1, 1000, 2), id: 2 };
        let weak = BidKey { price: price(100, 1, 1000, 2), id: 1 };
        assert!(strong < weak);
    }
}
