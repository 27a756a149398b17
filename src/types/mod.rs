//! Core data types: amounts, prices, orders, assets, events.

/// Fixed-point amounts and chain constants
pub mod asset;

/// Rational prices and price arithmetic
pub mod price;

/// Per-asset records and price feeds
pub mod bitasset;

/// Order entities held by the store
pub mod order;

/// Observable engine output
pub mod event;

pub use asset::{
    format_amount, parse_amount, AccountId, Asset, AssetId, CORE_ASSET, COLLATERAL_RATIO_DENOM,
    HUNDRED_PERCENT, MAX_SHARE_SUPPLY,
};
pub use bitasset::{
    AssetDynamicData, AssetObject, AssetOptions, BitassetData, BitassetOptions, PriceFeed,
};
pub use event::{FillEvent, MarketEvent};
pub use order::{CallOrder, CollateralBid, ForceSettlement, LimitOrder};
pub use price::Price;
