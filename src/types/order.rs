//! Order entities.
//!
//! Four families of objects live in the store and move value when prices
//! cross: limit orders, call orders (collateralized debt positions),
//! force settlements, and collateral bids. The matcher never creates
//! limit or settlement orders, it only mutates or removes them; call
//! orders are created by evaluators and, during revival, by executed
//! collateral bids.
//!
//! All entities derive `SimpleSerialize` so the store can hash a
//! deterministic state root over them.

use ssz_rs::prelude::*;

use crate::error::Result as MarketResult;
use crate::types::asset::{AccountId, Asset, AssetId};
use crate::types::price::Price;

// ============================================================================
// Limit order
// ============================================================================

/// An offer to sell a fixed amount at a limit price.
///
/// `sell_price` is oriented base = the asset being sold, quote = the
/// asset wanted. The order still owes `deferred_fee` (core units) and
/// optionally `deferred_paid_fee` (in whatever asset the fee was
/// originally paid in); both are settled on first fill or on cancel.
#[derive(Debug, Clone, Default, SimpleSerialize)]
pub struct LimitOrder {
    pub id: u64,
    pub seller: AccountId,

    /// Remaining amount for sale, in `sell_price.base` units
    pub for_sale: u64,

    pub sell_price: Price,

    /// Creation fee still owed, in core asset units
    pub deferred_fee: u64,

    /// Creation fee still owed in the originally paid asset, zero amount
    /// when the fee was paid in core
    pub deferred_paid_fee: Asset,
}

impl LimitOrder {
    #[inline]
    pub fn sell_asset_id(&self) -> AssetId {
        self.sell_price.base.asset_id
    }

    #[inline]
    pub fn receive_asset_id(&self) -> AssetId {
        self.sell_price.quote.asset_id
    }

    /// The remaining amount offered
    #[inline]
    pub fn amount_for_sale(&self) -> Asset {
        Asset::new(self.for_sale, self.sell_asset_id())
    }

    /// What selling the full remainder would bring in, truncated.
    ///
    /// A zero here means the order is dust: nobody can pay less than one
    /// raw unit, so the order must be culled rather than matched.
    pub fn amount_to_receive(&self) -> MarketResult<Asset> {
        self.amount_for_sale().checked_mul(&self.sell_price)
    }
}

// ============================================================================
// Call order
// ============================================================================

/// A collateralized debt position.
///
/// Owes `debt` of the market-issued asset against `collateral` of the
/// backing asset. The asset ids are carried by `call_price`, which is
/// kept equal to `Price::call_price(debt, collateral, mcr)` at all times;
/// the store orders positions by it so the least collateralized position
/// is always first.
#[derive(Debug, Clone, Default, SimpleSerialize)]
pub struct CallOrder {
    pub id: u64,
    pub borrower: AccountId,

    /// Posted collateral, in the backing asset
    pub collateral: u64,

    /// Outstanding debt, in the issued asset
    pub debt: u64,

    /// Margin call trigger price, base = collateral, quote = debt
    pub call_price: Price,
}

impl CallOrder {
    #[inline]
    pub fn debt_type(&self) -> AssetId {
        self.call_price.quote.asset_id
    }

    #[inline]
    pub fn collateral_type(&self) -> AssetId {
        self.call_price.base.asset_id
    }

    #[inline]
    pub fn debt_asset(&self) -> Asset {
        Asset::new(self.debt, self.debt_type())
    }

    #[inline]
    pub fn collateral_asset(&self) -> Asset {
        Asset::new(self.collateral, self.collateral_type())
    }
}

// ============================================================================
// Force settlement
// ============================================================================

/// A holder's request to redeem issued units against the least
/// collateralized position at the feed price, after a delay.
#[derive(Debug, Clone, Default, SimpleSerialize)]
pub struct ForceSettlement {
    pub id: u64,
    pub owner: AccountId,

    /// Amount still to be settled, in the issued asset
    pub balance: Asset,

    /// When the settlement becomes executable
    pub settlement_date: u64,
}

// ============================================================================
// Collateral bid
// ============================================================================

/// An offer, made while an asset is globally settled, to take over debt
/// in exchange for a share of the settlement fund.
///
/// `inv_swan_price` is oriented base = additional collateral put up by
/// the bidder, quote = the debt the bidder offers to cover. Bids with
/// more collateral per covered debt are better and execute first.
#[derive(Debug, Clone, Default, SimpleSerialize)]
pub struct CollateralBid {
    pub id: u64,
    pub bidder: AccountId,
    pub inv_swan_price: Price,
}

impl CollateralBid {
    #[inline]
    pub fn additional_collateral(&self) -> Asset {
        self.inv_swan_price.base
    }

    #[inline]
    pub fn debt_covered(&self) -> Asset {
        self.inv_swan_price.quote
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
