//! The indexed order store.
//!
//! ## Architecture
//!
//! Each entity family lives in a hybrid structure:
//!
//! - **Slab**: arena storage for O(1) access by slab key
//! - **HashMap**: id to slab key mapping for O(1) lookup and removal
//! - **BTreeMap**: ordered price index for range scans
//!
//! The price-sorted indices give the three scans the matcher lives on:
//! the best limit offer of a pair, the least collateralized call of a
//! pair, and the best collateral bid of a settled asset. Scans re-query
//! the index on every step instead of holding an iterator, so removing
//! or re-pricing the current element never invalidates the walk.
//!
//! ## Scoped mutation
//!
//! Indexed fields are only changed through `modify_*`, which recomputes
//! the entity's index key and repairs the ordered index when it moved.
//! Mutating an entity any other way is not possible outside this module.

mod index;

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};
use slab::Slab;

use crate::error::{MarketError, Result};
use crate::types::bitasset::AssetObject;
use crate::types::order::{CallOrder, CollateralBid, ForceSettlement, LimitOrder};
use crate::types::price::Price;
use crate::types::{AccountId, Asset, AssetId};

use index::{BidKey, CallKey, LimitKey};

/// All persistent market state: assets, orders, positions, bids.
#[derive(Debug, Default)]
pub struct MarketStore {
    assets: HashMap<AssetId, AssetObject>,

    limit_orders: Slab<LimitOrder>,
    limit_ids: HashMap<u64, usize>,
    limit_index: BTreeMap<LimitKey, u64>,

    call_orders: Slab<CallOrder>,
    call_ids: HashMap<u64, usize>,
    call_index: BTreeMap<CallKey, u64>,

    settlements: Slab<ForceSettlement>,
    settle_ids: BTreeMap<u64, usize>,

    bids: Slab<CollateralBid>,
    bid_ids: HashMap<u64, usize>,
    bid_index: BTreeMap<BidKey, u64>,

    next_id: u64,
}

impl MarketStore {
    pub fn new() -> Self {
        Self { next_id: 1, ..Self::default() }
    }

    fn assign_id(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Register an asset. Replaces any previous record with the same id.
    pub fn insert_asset(&mut self, asset: AssetObject) {
        self.assets.insert(asset.id, asset);
    }

    pub fn asset(&self, id: AssetId) -> Option<&AssetObject> {
        self.assets.get(&id)
    }

    /// Mutate an asset record in place.
    pub fn modify_asset(&mut self, id: AssetId, f: impl FnOnce(&mut AssetObject)) -> Result<()> {
        let asset = self.assets.get_mut(&id).ok_or(MarketError::NotFound(id))?;
        f(asset);
        Ok(())
    }

    // ========================================================================
    // Limit orders
    // ========================================================================

    /// Insert a new limit order and return its id.
    pub fn create_limit_order(
        &mut self,
        seller: AccountId,
        for_sale: u64,
        sell_price: Price,
        deferred_fee: u64,
        deferred_paid_fee: Asset,
    ) -> u64 {
        let id = self.assign_id();
        let order = LimitOrder { id, seller, for_sale, sell_price, deferred_fee, deferred_paid_fee };
        let key = LimitKey::of(&order);
        let slot = self.limit_orders.insert(order);
        self.limit_ids.insert(id, slot);
        self.limit_index.insert(key, id);
        id
    }

    pub fn limit_order(&self, id: u64) -> Option<&LimitOrder> {
        self.limit_ids.get(&id).map(|&slot| &self.limit_orders[slot])
    }

    /// Mutate a limit order, repairing the price index if the sell price
    /// changed.
    pub fn modify_limit_order(&mut self, id: u64, f: impl FnOnce(&mut LimitOrder)) -> Result<()> {
        let slot = *self.limit_ids.get(&id).ok_or(MarketError::NotFound(id))?;
        let old_key = LimitKey::of(&self.limit_orders[slot]);
        f(&mut self.limit_orders[slot]);
        let new_key = LimitKey::of(&self.limit_orders[slot]);
        if new_key != old_key {
            self.limit_index.remove(&old_key);
            self.limit_index.insert(new_key, id);
        }
        Ok(())
    }

    pub fn remove_limit_order(&mut self, id: u64) -> Option<LimitOrder> {
        let slot = self.limit_ids.remove(&id)?;
        let order = self.limit_orders.remove(slot);
        self.limit_index.remove(&LimitKey::of(&order));
        Some(order)
    }

    pub fn limit_order_count(&self) -> usize {
        self.limit_orders.len()
    }

    /// Whether the order is the best offer of its pair. An order behind
    /// another order of the same pair cannot match anything.
    pub fn limit_order_at_front(&self, id: u64) -> bool {
        let Some(&slot) = self.limit_ids.get(&id) else { return false };
        let order = &self.limit_orders[slot];
        let start = LimitKey {
            price: Price::max(order.sell_asset_id(), order.receive_asset_id()),
            id: 0,
        };
        let own = LimitKey::of(order);
        self.limit_index.range(start..own).next().is_none()
    }

    /// Best limit order selling `sell` for `recv` at a price no worse
    /// than `floor`, if any.
    pub fn best_limit_at_or_above(&self, sell: AssetId, recv: AssetId, floor: &Price) -> Option<u64> {
        let start = LimitKey { price: Price::max(sell, recv), id: 0 };
        let end = LimitKey { price: *floor, id: u64::MAX };
        self.limit_index.range(start..=end).next().map(|(_, &id)| id)
    }

    // ========================================================================
    // Call orders
    // ========================================================================

    /// Insert a new call order and return its id.
    pub fn create_call_order(
        &mut self,
        borrower: AccountId,
        collateral: u64,
        debt: u64,
        call_price: Price,
    ) -> u64 {
        let id = self.assign_id();
        let order = CallOrder { id, borrower, collateral, debt, call_price };
        let key = CallKey::of(&order);
        let slot = self.call_orders.insert(order);
        self.call_ids.insert(id, slot);
        self.call_index.insert(key, id);
        id
    }

    pub fn call_order(&self, id: u64) -> Option<&CallOrder> {
        self.call_ids.get(&id).map(|&slot| &self.call_orders[slot])
    }

    /// Mutate a call order, repairing the price index if the call price
    /// changed.
    pub fn modify_call_order(&mut self, id: u64, f: impl FnOnce(&mut CallOrder)) -> Result<()> {
        let slot = *self.call_ids.get(&id).ok_or(MarketError::NotFound(id))?;
        let old_key = CallKey::of(&self.call_orders[slot]);
        f(&mut self.call_orders[slot]);
        let new_key = CallKey::of(&self.call_orders[slot]);
        if new_key != old_key {
            self.call_index.remove(&old_key);
            self.call_index.insert(new_key, id);
        }
        Ok(())
    }

    pub fn remove_call_order(&mut self, id: u64) -> Option<CallOrder> {
        let slot = self.call_ids.remove(&id)?;
        let order = self.call_orders.remove(slot);
        self.call_index.remove(&CallKey::of(&order));
        Some(order)
    }

    pub fn call_order_count(&self) -> usize {
        self.call_orders.len()
    }

    /// The least collateralized position owing `debt_asset` backed by
    /// `collateral_asset`, if any.
    pub fn least_collateralized_call(
        &self,
        collateral_asset: AssetId,
        debt_asset: AssetId,
    ) -> Option<u64> {
        // a zero lower sentinel also catches degenerate zero collateral prices
        let start = CallKey {
            price: Price::new(Asset::new(0, collateral_asset), Asset::new(1, debt_asset)),
            id: 0,
        };
        let end = CallKey { price: Price::max(collateral_asset, debt_asset), id: u64::MAX };
        self.call_index.range(start..=end).next().map(|(_, &id)| id)
    }

    // ========================================================================
    // Force settlements
    // ========================================================================

    /// Insert a new force settlement request and return its id.
    pub fn create_settlement(&mut self, owner: AccountId, balance: Asset, settlement_date: u64) -> u64 {
        let id = self.assign_id();
        let slot = self.settlements.insert(ForceSettlement { id, owner, balance, settlement_date });
        self.settle_ids.insert(id, slot);
        id
    }

    pub fn settlement(&self, id: u64) -> Option<&ForceSettlement> {
        self.settle_ids.get(&id).map(|&slot| &self.settlements[slot])
    }

    pub fn modify_settlement(&mut self, id: u64, f: impl FnOnce(&mut ForceSettlement)) -> Result<()> {
        let slot = *self.settle_ids.get(&id).ok_or(MarketError::NotFound(id))?;
        f(&mut self.settlements[slot]);
        Ok(())
    }

    pub fn remove_settlement(&mut self, id: u64) -> Option<ForceSettlement> {
        let slot = self.settle_ids.remove(&id)?;
        Some(self.settlements.remove(slot))
    }

    // ========================================================================
    // Collateral bids
    // ========================================================================

    /// Insert a new collateral bid and return its id.
    pub fn create_collateral_bid(&mut self, bidder: AccountId, inv_swan_price: Price) -> u64 {
        let id = self.assign_id();
        let bid = CollateralBid { id, bidder, inv_swan_price };
        let key = BidKey::of(&bid);
        let slot = self.bids.insert(bid);
        self.bid_ids.insert(id, slot);
        self.bid_index.insert(key, id);
        id
    }

    pub fn bid(&self, id: u64) -> Option<&CollateralBid> {
        self.bid_ids.get(&id).map(|&slot| &self.bids[slot])
    }

    pub fn remove_collateral_bid(&mut self, id: u64) -> Option<CollateralBid> {
        let slot = self.bid_ids.remove(&id)?;
        let bid = self.bids.remove(slot);
        self.bid_index.remove(&BidKey::of(&bid));
        Some(bid)
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    /// All bids on `debt_asset`, best first.
    pub fn collateral_bids(&self, collateral_asset: AssetId, debt_asset: AssetId) -> Vec<u64> {
        let start = BidKey { price: Price::max(collateral_asset, debt_asset), id: 0 };
        let end = BidKey {
            price: Price::new(Asset::new(0, collateral_asset), Asset::new(1, debt_asset)),
            id: u64::MAX,
        };
        self.bid_index.range(start..=end).map(|(_, &id)| id).collect()
    }

    // ========================================================================
    // State root
    // ========================================================================

    /// SHA-256 over the SSZ encoding of every order in index order.
    ///
    /// Two stores that went through the same sequence of operations hash
    /// identically, which lets replicas cross-check their books.
    pub fn compute_state_root(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (_, &id) in &self.limit_index {
            let slot = self.limit_ids[&id];
            let bytes = ssz_rs::serialize(&self.limit_orders[slot]).expect("orders are fixed size");
            hasher.update(&bytes);
        }
        for (_, &id) in &self.call_index {
            let slot = self.call_ids[&id];
            let bytes = ssz_rs::serialize(&self.call_orders[slot]).expect("orders are fixed size");
            hasher.update(&bytes);
        }
        for (_, &slot) in &self.settle_ids {
            let bytes = ssz_rs::serialize(&self.settlements[slot]).expect("orders are fixed size");
            hasher.update(&bytes);
        }
        for (_, &id) in &self.bid_index {
            let slot = self.bid_ids[&id];
            let bytes = ssz_rs::serialize(&self.bids[slot]).expect("orders are fixed size");
            hasher.update(&bytes);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// The state root as a hex string
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.compute_state_root())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
