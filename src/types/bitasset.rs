//! Per-asset records: options, dynamic data, and the market-issued state.
//!
//! A market-issued asset is one whose supply exists only as the debt side
//! of collateralized positions. Its [`BitassetData`] carries the backing
//! asset, the current price feed, and the global settlement state that a
//! black swan leaves behind.

use crate::types::asset::{Asset, AssetId, AccountId, COLLATERAL_RATIO_DENOM, MAX_SHARE_SUPPLY};
use crate::types::price::Price;

/// Oracle provided pricing parameters for a market-issued asset.
#[derive(Debug, Clone, Copy)]
pub struct PriceFeed {
    /// Feed price, base = the issued asset, quote = the backing asset
    pub settlement_price: Price,

    /// Minimum collateral to debt ratio, scaled by [`COLLATERAL_RATIO_DENOM`]
    pub maintenance_collateral_ratio: u16,

    /// Bound on how hard shorts may be squeezed, scaled by [`COLLATERAL_RATIO_DENOM`]
    pub maximum_short_squeeze_ratio: u16,
}

impl PriceFeed {
    /// The worst price a margin call can be forced to pay.
    ///
    /// Scales the feed price down by `DENOM / MSSR`: with a 10:1 feed and
    /// an MSSR of 1100 a call pays at most 11 backing per unit of debt.
    pub fn max_short_squeeze_price(&self) -> Price {
        let sp = self.settlement_price;
        let mut num = sp.base.amount as u128 * COLLATERAL_RATIO_DENOM as u128;
        let mut den = sp.quote.amount as u128 * self.maximum_short_squeeze_ratio as u128;
        while num > MAX_SHARE_SUPPLY as u128 || den > MAX_SHARE_SUPPLY as u128 {
            num = (num >> 1) + 1;
            den = (den >> 1) + 1;
        }
        Price::new(
            Asset::new(num as u64, sp.base.asset_id),
            Asset::new(den as u64, sp.quote.asset_id),
        )
    }
}

/// Issuer configured options of an asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetOptions {
    /// Market fee charged on fills, scaled by [`crate::types::HUNDRED_PERCENT`]
    pub market_fee_percent: u16,

    /// Cap on the market fee of a single fill, in the asset's own units
    pub max_market_fee: u64,

    /// Whether market fees are charged at all
    pub charge_market_fee: bool,
}

/// Supply and fee accumulators of an asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetDynamicData {
    /// Outstanding supply. For a market-issued asset this equals the sum
    /// of all call order debts, except while globally settled.
    pub current_supply: u64,

    /// Market and cancel fees collected for the issuer
    pub accumulated_fees: u64,

    /// Core fees pooled for fee conversion
    pub fee_pool: u64,
}

/// Immutable options of a market-issued asset.
#[derive(Debug, Clone, Copy)]
pub struct BitassetOptions {
    /// The collateral asset backing every debt position
    pub short_backing_asset: AssetId,
}

/// Mutable state of a market-issued asset.
#[derive(Debug, Clone, Copy)]
pub struct BitassetData {
    pub options: BitassetOptions,

    /// Median oracle feed, absent until published
    pub current_feed: Option<PriceFeed>,

    /// Prediction markets never get margin called
    pub is_prediction_market: bool,

    /// Price at which the asset was globally settled, absent in normal
    /// operation
    pub settlement_price: Option<Price>,

    /// Collateral gathered by global settlement, owed to holders
    pub settlement_fund: u64,
}

impl BitassetData {
    /// Create the state for a live asset backed by `short_backing_asset`
    pub fn new(short_backing_asset: AssetId) -> Self {
        Self {
            options: BitassetOptions { short_backing_asset },
            current_feed: None,
            is_prediction_market: false,
            settlement_price: None,
            settlement_fund: 0,
        }
    }

    /// Whether the asset has been globally settled and not yet revived
    #[inline]
    pub fn has_settlement(&self) -> bool {
        self.settlement_price.is_some()
    }
}

/// An asset known to the store.
#[derive(Debug, Clone)]
pub struct AssetObject {
    pub id: AssetId,
    pub issuer: AccountId,
    pub options: AssetOptions,
    pub dynamic: AssetDynamicData,

    /// Present only for market-issued assets
    pub bitasset: Option<BitassetData>,
}

impl AssetObject {
    /// A plain asset with no fees and no debt market
    pub fn new(id: AssetId, issuer: AccountId) -> Self {
        Self {
            id,
            issuer,
            options: AssetOptions::default(),
            dynamic: AssetDynamicData::default(),
            bitasset: None,
        }
    }

    /// A market-issued asset backed by `backing`
    pub fn market_issued(id: AssetId, issuer: AccountId, backing: AssetId) -> Self {
        Self {
            id,
            issuer,
            options: AssetOptions::default(),
            dynamic: AssetDynamicData::default(),
            bitasset: Some(BitassetData::new(backing)),
        }
    }

    #[inline]
    pub fn is_market_issued(&self) -> bool {
        self.bitasset.is_some()
    }

    /// An amount of this asset
    #[inline]
    pub fn amount(&self, amount: u64) -> Asset {
        Asset::new(amount, self.id)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_short_squeeze_price() {
        // 10:1 feed, MSSR 1.1x: the squeeze bound is 11 backing per debt
        let feed = PriceFeed {
            settlement_price: Price::new(Asset::new(1, 2), Asset::new(10, 1)),
            maintenance_collateral_ratio: 1750,
            maximum_short_squeeze_ratio: 1100,
        };
        let mssp = feed.max_short_squeeze_price();
        assert_eq!(mssp.base, Asset::new(1000, 2));
        assert_eq!(mssp.quote, Asset::new(11_000, 1));
        // the bound is below the feed price
        assert!(mssp < feed.settlement_price);
    }

    #[test]
    fn test_has_settlement() {
        let mut bad = BitassetData::new(1);
        assert!(!bad.has_settlement());
        bad.settlement_price = Some(Price::new(Asset::new(1, 2), Asset::new(5, 1)));
        assert!(bad.has_settlement());
    }

    #[test]
    fn test_asset_object() {
        let core = AssetObject::new(0, 0);
        assert!(!core.is_market_issued());

        let mia = AssetObject::market_issued(2, 9, 1);
        assert!(mia.is_market_issued());
        assert_eq!(mia.bitasset.unwrap().options.short_backing_asset, 1);
        assert_eq!(mia.amount(5), Asset::new(5, 2));
    }
}
