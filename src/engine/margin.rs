//! Margin call sweep, forced settlement, global settlement and revival.
//!
//! ## Life of a black swan
//!
//! When the least collateralized position cannot cover its debt at the
//! match price the market has failed: every position is force closed at
//! the feed price, the collateral lands in a settlement fund, and the
//! asset freezes. Holders redeem against the fund at the recorded
//! settlement price. The asset comes back either through collateral
//! bids covering the outstanding supply, or through an issuer pseudo
//! bid once the feed recovers.

use tracing::{debug, info, warn};

use crate::engine::MarketEngine;
use crate::error::{MarketError, Result};
use crate::ledger::Ledger;
use crate::store::MarketStore;
use crate::types::bitasset::BitassetData;
use crate::types::{AccountId, Asset, AssetId, MarketEvent, Price, PriceFeed};

impl MarketEngine {
    fn bitasset_of(store: &MarketStore, asset_id: AssetId) -> Result<BitassetData> {
        store
            .asset(asset_id)
            .ok_or(MarketError::NotFound(asset_id))?
            .bitasset
            .ok_or(MarketError::Precondition("asset is not market issued"))
    }

    // ========================================================================
    // Margin call sweep
    // ========================================================================

    /// Walk under-collateralized positions against the limit book.
    ///
    /// Entry point for any event that may have changed collateralization:
    /// a feed update, a collateral change, or admission of a new limit
    /// order. Positions are taken least collateralized first and matched
    /// against limit orders selling the issued asset no further than the
    /// short squeeze bound, at the limit order's price.
    ///
    /// `for_new_limit_order` sets maker/taker attribution: a sweep run
    /// for a newly admitted order treats the calls as makers, a sweep
    /// after a feed update treats them as takers.
    ///
    /// Returns whether any margin call fired. A detected black swan
    /// settles the asset globally, or fails the evaluation with
    /// [`MarketError::BlackSwan`] when `enable_black_swan` is unset.
    pub fn check_call_orders<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        mia_id: AssetId,
        enable_black_swan: bool,
        for_new_limit_order: bool,
    ) -> Result<bool> {
        let asset = store.asset(mia_id).ok_or(MarketError::NotFound(mia_id))?;
        let Some(bitasset) = asset.bitasset else { return Ok(false) };
        if bitasset.is_prediction_market || bitasset.has_settlement() {
            return Ok(false);
        }
        let Some(feed) = bitasset.current_feed else { return Ok(false) };
        let backing = bitasset.options.short_backing_asset;

        // consider limit orders selling the issued asset, but no cheaper
        // than the short squeeze bound
        let min_price = feed.max_short_squeeze_price();
        let mut margin_called = false;

        loop {
            let Some(call_id) = store.least_collateralized_call(backing, mia_id) else { break };
            let Some(limit_id) = store.best_limit_at_or_above(mia_id, backing, &min_price) else {
                return Ok(margin_called);
            };
            let call = store.call_order(call_id).ok_or(MarketError::NotFound(call_id))?.clone();
            let limit = store.limit_order(limit_id).ok_or(MarketError::NotFound(limit_id))?.clone();

            // the least collateralized position is safe, so all of them are
            if feed.settlement_price > call.call_price.inverse() {
                return Ok(margin_called);
            }

            let match_price = limit.sell_price;
            match_price.validate()?;
            margin_called = true;
            debug!(call = call_id, limit = limit_id, "margin call executing");

            let debt_to_cover = call.debt_asset();
            if debt_to_cover.checked_mul(&match_price)? > call.collateral_asset() {
                warn!(asset = mia_id, "black swan detected during margin call sweep");
                if !enable_black_swan {
                    return Err(MarketError::BlackSwan(mia_id));
                }
                self.globally_settle_asset(store, ledger, mia_id, feed.settlement_price)?;
                return Ok(true);
            }

            // size the trade in the issued asset, truncating toward the call
            let usd_for_sale = limit.amount_for_sale();
            let call_receives =
                if debt_to_cover >= usd_for_sale { usd_for_sale } else { debt_to_cover };
            let order_receives = call_receives.checked_mul(&match_price)?;
            let call_pays = order_receives;
            let order_pays = call_receives;

            self.fill_call_order(store, ledger, call_id, call_pays, call_receives, match_price, for_new_limit_order)?;
            self.fill_limit_order(
                store,
                ledger,
                limit_id,
                order_pays,
                order_receives,
                true,
                match_price,
                !for_new_limit_order,
            )?;
        }
        Ok(margin_called)
    }

    // ========================================================================
    // Forced settlement against the debt book
    // ========================================================================

    /// Settle a force settlement against a call order, up to
    /// `max_settlement`, at `match_price`. The call is maker. Returns
    /// the amount of debt actually settled.
    ///
    /// A call that lacks the collateral to cover at the match price is a
    /// black swan signal, but only order matching may trigger one: the
    /// error is returned and the caller is expected to cancel the
    /// settlement instead of settling the asset globally.
    pub fn match_settle<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        call_id: u64,
        settle_id: u64,
        match_price: Price,
        max_settlement: Asset,
        fill_price: Price,
    ) -> Result<Asset> {
        let call = store.call_order(call_id).ok_or(MarketError::NotFound(call_id))?.clone();
        let settle = store.settlement(settle_id).ok_or(MarketError::NotFound(settle_id))?.clone();
        if call.debt_type() != settle.balance.asset_id {
            return Err(MarketError::AssetMismatch {
                expected: call.debt_type(),
                actual: settle.balance.asset_id,
            });
        }
        if call.debt == 0 || call.collateral == 0 || settle.balance.amount == 0 {
            return Err(MarketError::Precondition("matched orders must have positive size"));
        }
        if max_settlement.asset_id != settle.balance.asset_id {
            return Err(MarketError::AssetMismatch {
                expected: settle.balance.asset_id,
                actual: max_settlement.asset_id,
            });
        }

        let settle_for_sale =
            if settle.balance <= max_settlement { settle.balance } else { max_settlement };
        let call_receives =
            if settle_for_sale <= call.debt_asset() { settle_for_sale } else { call.debt_asset() };
        let call_pays = call_receives.checked_mul(&match_price)?;
        let settle_pays = call_receives;
        let settle_receives = call_pays;

        if !(call_pays < call.collateral_asset()) {
            return Err(MarketError::BlackSwan(call.debt_type()));
        }

        self.fill_call_order(store, ledger, call_id, call_pays, call_receives, fill_price, true)?;
        self.fill_settle_order(store, ledger, settle_id, settle_pays, settle_receives, fill_price, false)?;

        Ok(call_receives)
    }

    /// Redeem issued units directly against the settlement fund of a
    /// globally settled asset. Returns the collateral paid out.
    pub fn settle_from_fund<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        mia_id: AssetId,
        account: AccountId,
        amount: Asset,
    ) -> Result<Asset> {
        let bitasset = Self::bitasset_of(store, mia_id)?;
        let Some(settlement_price) = bitasset.settlement_price else {
            return Err(MarketError::Precondition("asset is not globally settled"));
        };
        if amount.asset_id != mia_id {
            return Err(MarketError::AssetMismatch { expected: mia_id, actual: amount.asset_id });
        }
        let supply = store.asset(mia_id).ok_or(MarketError::NotFound(mia_id))?.dynamic.current_supply;
        if amount.amount == 0 || amount.amount > supply {
            return Err(MarketError::Precondition("settlement amount out of range"));
        }

        let mut settled = amount.checked_mul(&settlement_price)?;
        // the last redemption takes the whole remaining fund, leaving no dust
        if amount.amount == supply || settled.amount > bitasset.settlement_fund {
            settled.amount = bitasset.settlement_fund;
        }

        store.modify_asset(mia_id, |a| {
            a.dynamic.current_supply -= amount.amount;
            if let Some(b) = a.bitasset.as_mut() {
                b.settlement_fund -= settled.amount;
            }
        })?;
        ledger.adjust_balance(account, settled);
        Ok(settled)
    }

    // ========================================================================
    // Global settlement
    // ========================================================================

    /// Force close every debt position of an asset at `settlement_price`
    /// and freeze the asset.
    ///
    /// Each position pays `min(debt at the price, its collateral)` into
    /// the settlement fund. The recorded settlement price is the average
    /// actually realized, `original supply / collateral gathered`, and
    /// the supply is restored afterward: closing the positions burned
    /// it, but it is still owed to holders against the fund.
    pub fn globally_settle_asset<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        mia_id: AssetId,
        settlement_price: Price,
    ) -> Result<()> {
        let bitasset = Self::bitasset_of(store, mia_id)?;
        if bitasset.has_settlement() {
            return Err(MarketError::AlreadySettled(mia_id));
        }
        if settlement_price.base.asset_id != mia_id {
            return Err(MarketError::AssetMismatch {
                expected: mia_id,
                actual: settlement_price.base.asset_id,
            });
        }
        let backing = bitasset.options.short_backing_asset;
        let original_supply =
            store.asset(mia_id).ok_or(MarketError::NotFound(mia_id))?.dynamic.current_supply;

        info!(asset = mia_id, "globally settling asset");

        let mut collateral_gathered = Asset::zero(backing);
        while let Some(call_id) = store.least_collateralized_call(backing, mia_id) {
            let call = store.call_order(call_id).ok_or(MarketError::NotFound(call_id))?.clone();
            let mut pays = call.debt_asset().checked_mul(&settlement_price)?;
            if pays > call.collateral_asset() {
                pays = call.collateral_asset();
            }
            collateral_gathered = collateral_gathered.checked_add(pays)?;
            // the call order is maker
            let removed =
                self.fill_call_order(store, ledger, call_id, pays, call.debt_asset(), settlement_price, true)?;
            if !removed {
                return Err(MarketError::Precondition("global settlement must close every position"));
            }
        }

        let recorded = Asset::new(original_supply, mia_id).divide(collateral_gathered)?;
        store.modify_asset(mia_id, |a| {
            if let Some(b) = a.bitasset.as_mut() {
                b.settlement_price = Some(recorded);
                b.settlement_fund = collateral_gathered.amount;
            }
            a.dynamic.current_supply = original_supply;
        })?;
        Ok(())
    }

    // ========================================================================
    // Revival
    // ========================================================================

    /// Revive a settled asset once its feed has recovered.
    ///
    /// Outstanding supply is taken over by a zero collateral bid made on
    /// behalf of the issuer and executed against the whole fund, which
    /// socializes any shortfall or surplus. Remaining bids are cancelled
    /// and the settlement state cleared.
    pub fn revive_bitasset<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        mia_id: AssetId,
    ) -> Result<()> {
        let asset = store.asset(mia_id).ok_or(MarketError::NotFound(mia_id))?.clone();
        let bitasset =
            asset.bitasset.ok_or(MarketError::Precondition("asset is not market issued"))?;
        if !bitasset.has_settlement() {
            return Err(MarketError::Precondition("asset is not globally settled"));
        }
        if bitasset.is_prediction_market {
            return Err(MarketError::Precondition("prediction markets are not revived"));
        }
        let feed = bitasset
            .current_feed
            .ok_or(MarketError::Precondition("revival requires a valid price feed"))?;
        let backing = bitasset.options.short_backing_asset;
        let supply = asset.dynamic.current_supply;

        if supply > 0 {
            if bitasset.settlement_fund == 0 {
                return Err(MarketError::Precondition("outstanding supply requires a settlement fund"));
            }
            let pseudo_price = Asset::zero(backing).divide(Asset::new(supply, mia_id))?;
            let bid_id = store.create_collateral_bid(asset.issuer, pseudo_price);
            self.execute_bid(store, ledger, bid_id, supply, bitasset.settlement_fund, &feed)?;
        } else if bitasset.settlement_fund != 0 {
            return Err(MarketError::Precondition("settlement fund must be empty without supply"));
        }

        self.cancel_bids_and_revive(store, ledger, mia_id, backing)
    }

    /// Execute the standing collateral bids of a settled asset if they
    /// cover the whole outstanding supply at an acceptable ratio.
    ///
    /// Bids are taken best first while the position each would create is
    /// adequately collateralized at the current feed. If the accepted
    /// bids cover the supply they are executed against the settlement
    /// fund, the last one absorbing the rounding remainder, the leftover
    /// bids are cancelled and the asset is revived. Returns whether the
    /// asset was revived.
    pub fn process_bids<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        mia_id: AssetId,
    ) -> Result<bool> {
        let asset = store.asset(mia_id).ok_or(MarketError::NotFound(mia_id))?.clone();
        let bitasset =
            asset.bitasset.ok_or(MarketError::Precondition("asset is not market issued"))?;
        let Some(settlement_price) = bitasset.settlement_price else {
            return Err(MarketError::Precondition("asset is not globally settled"));
        };
        if bitasset.is_prediction_market {
            return Ok(false);
        }
        let Some(feed) = bitasset.current_feed else { return Ok(false) };
        let backing = bitasset.options.short_backing_asset;
        let supply = asset.dynamic.current_supply;

        // find whether the best bids can take over the whole supply
        let mut covered = 0u64;
        let mut accepted = Vec::new();
        for bid_id in store.collateral_bids(backing, mia_id) {
            if covered >= supply {
                break;
            }
            let bid = store.bid(bid_id).ok_or(MarketError::NotFound(bid_id))?.clone();
            let debt = Asset::new(bid.debt_covered().amount.min(supply), mia_id);
            let collateral =
                debt.checked_mul(&settlement_price)?.checked_add(bid.additional_collateral())?;
            let call_price = Price::call_price(debt, collateral, feed.maintenance_collateral_ratio);
            // the position this bid would create must not be instantly callable
            if !(feed.settlement_price > call_price.inverse()) {
                break;
            }
            covered += debt.amount;
            accepted.push(bid_id);
        }
        if covered < supply {
            return Ok(false);
        }

        // execute against the fund, the last bid absorbing the remainder
        let mut to_cover = supply;
        let mut remaining_fund = bitasset.settlement_fund;
        for bid_id in accepted {
            let bid = store.bid(bid_id).ok_or(MarketError::NotFound(bid_id))?.clone();
            let mut debt = bid.debt_covered().amount.min(supply);
            let mut collateral = Asset::new(debt, mia_id).checked_mul(&settlement_price)?.amount;
            if debt >= to_cover {
                debt = to_cover;
                collateral = remaining_fund;
            }
            to_cover -= debt;
            remaining_fund = remaining_fund
                .checked_sub(collateral)
                .ok_or(MarketError::Precondition("bids exceed the settlement fund"))?;
            self.execute_bid(store, ledger, bid_id, debt, collateral, &feed)?;
        }
        if to_cover != 0 || remaining_fund != 0 {
            return Err(MarketError::Precondition("bid execution must exactly drain the fund"));
        }

        self.cancel_bids_and_revive(store, ledger, mia_id, backing)?;
        Ok(true)
    }

    /// Turn a collateral bid into a live debt position, funding it with
    /// `collateral_from_fund` out of the settlement fund on top of the
    /// bidder's own collateral.
    pub fn execute_bid<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        _ledger: &mut L,
        bid_id: u64,
        debt_covered: u64,
        collateral_from_fund: u64,
        feed: &PriceFeed,
    ) -> Result<()> {
        let bid = store.bid(bid_id).ok_or(MarketError::NotFound(bid_id))?.clone();
        let collateral_id = bid.additional_collateral().asset_id;
        let debt_id = bid.debt_covered().asset_id;
        let collateral = bid
            .additional_collateral()
            .checked_add(Asset::new(collateral_from_fund, collateral_id))?;

        let call_price = Price::call_price(
            Asset::new(debt_covered, debt_id),
            collateral,
            feed.maintenance_collateral_ratio,
        );
        store.create_call_order(bid.bidder, collateral.amount, debt_covered, call_price);

        self.push_event(MarketEvent::BidExecuted {
            bidder: bid.bidder,
            collateral,
            debt: Asset::new(debt_covered, debt_id),
        });
        store.remove_collateral_bid(bid_id);
        Ok(())
    }

    /// Cancel a collateral bid, refunding the bidder's collateral.
    /// Cancelling a bid that no longer exists is a no-op.
    pub fn cancel_bid<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        bid_id: u64,
        create_virtual_op: bool,
    ) -> Result<()> {
        let Some(bid) = store.bid(bid_id).cloned() else { return Ok(()) };
        ledger.adjust_balance(bid.bidder, bid.additional_collateral());
        if create_virtual_op {
            self.push_event(MarketEvent::BidCancelled {
                bidder: bid.bidder,
                additional_collateral: bid.additional_collateral(),
                debt_covered: Asset::zero(bid.debt_covered().asset_id),
            });
        }
        store.remove_collateral_bid(bid_id);
        Ok(())
    }

    fn cancel_bids_and_revive<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        mia_id: AssetId,
        backing: AssetId,
    ) -> Result<()> {
        for bid_id in store.collateral_bids(backing, mia_id) {
            self.cancel_bid(store, ledger, bid_id, true)?;
        }
        store.modify_asset(mia_id, |a| {
            if let Some(b) = a.bitasset.as_mut() {
                b.settlement_price = None;
                b.settlement_fund = 0;
            }
        })?;
        info!(asset = mia_id, "asset revived from global settlement");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
