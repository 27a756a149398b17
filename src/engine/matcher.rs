//! Pairwise matching, order fillers and the apply-order pipeline.
//!
//! ## Matching Rules
//!
//! - The pre-existing order is the maker, the incoming order the taker.
//! - A match executes at one price; all truncation goes in the maker's
//!   favor, and against a call order in the call's favor.
//! - `match_*` returns a bit mask: bit 0 set when the taker was removed,
//!   bit 1 when the maker was removed. At least one bit is always set,
//!   which is what guarantees the matching loops terminate.
//!
//! ## Dust
//!
//! An order whose remaining proceeds truncate to zero can never be
//! filled. Makers are culled the moment a partial fill leaves them in
//! that state; a resting taker is culled when the pipeline finishes.

use tracing::debug;

use crate::engine::MarketEngine;
use crate::error::{MarketError, Result};
use crate::ledger::Ledger;
use crate::store::MarketStore;
use crate::types::bitasset::{AssetObject, PriceFeed};
use crate::types::{Asset, FillEvent, MarketEvent, Price, CORE_ASSET, HUNDRED_PERCENT};

/// The taker side of a match was fully consumed.
pub const TAKER_FILLED: u8 = 1;

/// The maker side of a match was fully consumed.
pub const MAKER_FILLED: u8 = 2;

impl MarketEngine {
    // ========================================================================
    // Market fees
    // ========================================================================

    /// The issuer fee due on an amount received in `asset_def`, clamped
    /// to the per-asset maximum.
    pub fn calculate_market_fee(asset_def: &AssetObject, trade_amount: &Asset) -> Result<Asset> {
        if asset_def.id != trade_amount.asset_id {
            return Err(MarketError::AssetMismatch {
                expected: asset_def.id,
                actual: trade_amount.asset_id,
            });
        }
        if !asset_def.options.charge_market_fee || asset_def.options.market_fee_percent == 0 {
            return Ok(Asset::zero(trade_amount.asset_id));
        }
        let percent = trade_amount.amount as u128 * asset_def.options.market_fee_percent as u128
            / HUNDRED_PERCENT as u128;
        let fee = (percent as u64).min(asset_def.options.max_market_fee);
        Ok(Asset::new(fee, trade_amount.asset_id))
    }

    /// Charge the issuer fee on `receives` into the receive asset's
    /// accumulated fees and return it.
    fn pay_market_fees(&mut self, store: &mut MarketStore, receives: &Asset) -> Result<Asset> {
        let asset_def = store
            .asset(receives.asset_id)
            .ok_or(MarketError::NotFound(receives.asset_id))?;
        let fee = Self::calculate_market_fee(asset_def, receives)?;
        if fee.amount > 0 {
            store.modify_asset(receives.asset_id, |a| a.dynamic.accumulated_fees += fee.amount)?;
        }
        Ok(fee)
    }

    // ========================================================================
    // Fillers
    // ========================================================================

    /// Fill one side of a limit order.
    ///
    /// Pays the seller `receives` net of issuer fees, settles any
    /// deferred creation fees, and removes the order when nothing is
    /// left for sale. Returns whether the order was removed.
    pub(crate) fn fill_limit_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        order_id: u64,
        pays: Asset,
        receives: Asset,
        cull_if_small: bool,
        fill_price: Price,
        is_maker: bool,
    ) -> Result<bool> {
        let order = store.limit_order(order_id).ok_or(MarketError::NotFound(order_id))?.clone();
        if pays.asset_id != order.sell_asset_id() {
            return Err(MarketError::AssetMismatch {
                expected: order.sell_asset_id(),
                actual: pays.asset_id,
            });
        }
        if pays.asset_id == receives.asset_id {
            return Err(MarketError::Precondition("a fill must exchange two distinct assets"));
        }
        if pays.amount > order.for_sale {
            return Err(MarketError::Precondition("fill exceeds the amount for sale"));
        }

        let issuer_fees = self.pay_market_fees(store, &receives)?;
        ledger.adjust_balance(order.seller, receives.checked_sub(issuer_fees)?);

        self.push_event(MarketEvent::Fill(FillEvent {
            order_id,
            account: order.seller,
            pays,
            receives,
            fee: issuer_fees,
            fill_price,
            is_maker,
        }));

        // deferred creation fees are settled on the first fill
        if order.deferred_fee > 0 {
            ledger.pay_fee(order.seller, order.deferred_fee);
        }
        if order.deferred_paid_fee.amount > 0 {
            store.modify_asset(order.deferred_paid_fee.asset_id, |a| {
                a.dynamic.accumulated_fees += order.deferred_paid_fee.amount;
            })?;
        }

        if pays == order.amount_for_sale() {
            store.remove_limit_order(order_id);
            Ok(true)
        } else {
            store.modify_limit_order(order_id, |o| {
                o.for_sale -= pays.amount;
                o.deferred_fee = 0;
                o.deferred_paid_fee.amount = 0;
            })?;
            if cull_if_small {
                self.maybe_cull_small_order(store, ledger, order_id)
            } else {
                Ok(false)
            }
        }
    }

    /// Fill one side of a call order.
    ///
    /// Decrements debt and collateral, burns the received debt from the
    /// issued asset's supply, and either refunds the freed collateral to
    /// the borrower (debt paid off) or re-prices the position at the
    /// current maintenance ratio. Returns whether the order was removed.
    pub(crate) fn fill_call_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        call_id: u64,
        pays: Asset,
        receives: Asset,
        fill_price: Price,
        is_maker: bool,
    ) -> Result<bool> {
        let call = store.call_order(call_id).ok_or(MarketError::NotFound(call_id))?.clone();
        if receives.asset_id != call.debt_type() {
            return Err(MarketError::AssetMismatch {
                expected: call.debt_type(),
                actual: receives.asset_id,
            });
        }
        if pays.asset_id != call.collateral_type() {
            return Err(MarketError::AssetMismatch {
                expected: call.collateral_type(),
                actual: pays.asset_id,
            });
        }
        if pays.amount > call.collateral || receives.amount > call.debt {
            return Err(MarketError::Precondition("fill exceeds the call position"));
        }

        let mia = store.asset(receives.asset_id).ok_or(MarketError::NotFound(receives.asset_id))?;
        let bitasset = mia
            .bitasset
            .as_ref()
            .ok_or(MarketError::Precondition("call orders only exist for market issued assets"))?;
        if mia.dynamic.current_supply < receives.amount {
            return Err(MarketError::Precondition("debt exceeds the recorded supply"));
        }
        let mcr = bitasset.current_feed.map(|f| f.maintenance_collateral_ratio);

        let mut collateral_freed: Option<Asset> = None;
        store.modify_call_order(call_id, |o| {
            o.debt -= receives.amount;
            o.collateral -= pays.amount;
            if o.debt == 0 {
                collateral_freed = Some(o.collateral_asset());
                o.collateral = 0;
            } else if let Some(mcr) = mcr {
                o.call_price = Price::call_price(o.debt_asset(), o.collateral_asset(), mcr);
            }
        })?;

        // debt destruction
        store.modify_asset(receives.asset_id, |a| a.dynamic.current_supply -= receives.amount)?;

        if let Some(freed) = collateral_freed {
            ledger.adjust_balance(call.borrower, freed);
        }

        self.push_event(MarketEvent::Fill(FillEvent {
            order_id: call_id,
            account: call.borrower,
            pays,
            receives,
            fee: Asset::zero(pays.asset_id),
            fill_price,
            is_maker,
        }));

        if collateral_freed.is_some() {
            store.remove_call_order(call_id);
        }
        Ok(collateral_freed.is_some())
    }

    /// Fill one side of a force settlement.
    ///
    /// Credits the owner `receives` net of issuer fees and reduces or
    /// removes the settlement balance. Returns whether it was removed.
    pub(crate) fn fill_settle_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        settle_id: u64,
        pays: Asset,
        receives: Asset,
        fill_price: Price,
        is_maker: bool,
    ) -> Result<bool> {
        let settle = store.settlement(settle_id).ok_or(MarketError::NotFound(settle_id))?.clone();
        if pays.asset_id != settle.balance.asset_id {
            return Err(MarketError::AssetMismatch {
                expected: settle.balance.asset_id,
                actual: pays.asset_id,
            });
        }
        if pays.amount > settle.balance.amount {
            return Err(MarketError::Precondition("fill exceeds the settlement balance"));
        }

        let issuer_fees = self.pay_market_fees(store, &receives)?;

        let filled = pays.amount == settle.balance.amount;
        if !filled {
            store.modify_settlement(settle_id, |s| s.balance.amount -= pays.amount)?;
        }

        ledger.adjust_balance(settle.owner, receives.checked_sub(issuer_fees)?);

        self.push_event(MarketEvent::Fill(FillEvent {
            order_id: settle_id,
            account: settle.owner,
            pays,
            receives,
            fee: issuer_fees,
            fill_price,
            is_maker,
        }));

        if filled {
            store.remove_settlement(settle_id);
        }
        Ok(filled)
    }

    // ========================================================================
    // Pairwise matching
    // ========================================================================

    /// Match a taker limit order against a maker limit order at
    /// `match_price`.
    ///
    /// Returns the fill mask. `MAKER_FILLED` alone means the taker still
    /// has size left and the caller should keep walking the book.
    pub fn match_limit_limit<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        taker_id: u64,
        maker_id: u64,
        match_price: Price,
    ) -> Result<u8> {
        let taker = store.limit_order(taker_id).ok_or(MarketError::NotFound(taker_id))?.clone();
        let maker = store.limit_order(maker_id).ok_or(MarketError::NotFound(maker_id))?.clone();
        if taker.sell_asset_id() != maker.receive_asset_id()
            || taker.receive_asset_id() != maker.sell_asset_id()
        {
            return Err(MarketError::Precondition("orders are not opposite sides of one market"));
        }
        if taker.for_sale == 0 || maker.for_sale == 0 {
            return Err(MarketError::Precondition("matched orders must have positive size"));
        }

        let taker_for_sale = taker.amount_for_sale();
        let maker_for_sale = maker.amount_for_sale();

        // size the trade in the taker's sell asset, truncating toward the maker
        let (taker_pays, taker_receives) = if taker_for_sale <= maker_for_sale.checked_mul(&match_price)? {
            (taker_for_sale, taker_for_sale.checked_mul(&match_price)?)
        } else {
            (maker_for_sale.checked_mul(&match_price)?, maker_for_sale)
        };
        let maker_pays = taker_receives;
        let maker_receives = taker_pays;

        let mut result = 0u8;
        result |= self
            .fill_limit_order(store, ledger, taker_id, taker_pays, taker_receives, false, match_price, false)?
            as u8;
        result |= (self
            .fill_limit_order(store, ledger, maker_id, maker_pays, maker_receives, true, match_price, true)?
            as u8)
            << 1;
        if result == 0 {
            return Err(MarketError::Precondition("a match must consume at least one order"));
        }
        Ok(result)
    }

    /// Match a taker limit order against a maker call order at
    /// `match_price`.
    ///
    /// The taker must be selling the debt asset for the collateral
    /// asset; the call's capacity is its outstanding debt.
    pub fn match_limit_call<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        taker_id: u64,
        call_id: u64,
        match_price: Price,
    ) -> Result<u8> {
        let taker = store.limit_order(taker_id).ok_or(MarketError::NotFound(taker_id))?.clone();
        let call = store.call_order(call_id).ok_or(MarketError::NotFound(call_id))?.clone();
        if taker.sell_asset_id() != call.debt_type() || taker.receive_asset_id() != call.collateral_type()
        {
            return Err(MarketError::Precondition("order does not trade the call's market"));
        }
        if taker.for_sale == 0 || call.debt == 0 || call.collateral == 0 {
            return Err(MarketError::Precondition("matched orders must have positive size"));
        }

        let taker_for_sale = taker.amount_for_sale();
        let debt_to_cover = call.debt_asset();

        // truncation goes in the call's favor
        let call_receives = if debt_to_cover >= taker_for_sale { taker_for_sale } else { debt_to_cover };
        let order_receives = call_receives.checked_mul(&match_price)?;
        let call_pays = order_receives;
        let order_pays = call_receives;

        let mut result = 0u8;
        result |= self
            .fill_limit_order(store, ledger, taker_id, order_pays, order_receives, false, match_price, false)?
            as u8;
        result |= (self.fill_call_order(store, ledger, call_id, call_pays, call_receives, match_price, true)?
            as u8)
            << 1;
        if result == 0 {
            return Err(MarketError::Precondition("a match must consume at least one order"));
        }
        Ok(result)
    }

    // ========================================================================
    // Apply-order pipeline
    // ========================================================================

    /// Run a newly admitted limit order against the books.
    ///
    /// The order must already be in the store. Probes margin calls first
    /// when the order sells a live market-issued asset for its backing
    /// collateral, giving better-priced limit makers priority, then
    /// walks the opposite limit book. Returns `true` when the order was
    /// fully consumed or culled as dust.
    ///
    /// A margin call that cannot cover its debt at the protected price
    /// collapses the market: with `allow_black_swan` the asset is
    /// globally settled and matching stops, otherwise the evaluation
    /// fails with [`MarketError::BlackSwan`].
    pub fn apply_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        order_id: u64,
        allow_black_swan: bool,
    ) -> Result<bool> {
        let order = store.limit_order(order_id).ok_or(MarketError::NotFound(order_id))?.clone();
        if order.for_sale == 0 {
            return Err(MarketError::Precondition("an admitted order must have positive size"));
        }
        let sell_asset_id = order.sell_asset_id();
        let recv_asset_id = order.receive_asset_id();

        // an order behind another order of its own pair cannot match anything
        if !store.limit_order_at_front(order_id) {
            return Ok(false);
        }

        // margin calls are only probed when selling a live market-issued
        // asset for its backing collateral
        let mut feed: Option<PriceFeed> = None;
        if let Some(bitasset) = store.asset(sell_asset_id).and_then(|a| a.bitasset.as_ref()) {
            if bitasset.options.short_backing_asset == recv_asset_id
                && !bitasset.is_prediction_market
                && !bitasset.has_settlement()
            {
                feed = bitasset.current_feed;
            }
        }

        // worst counter offer this order will accept
        let opposite_floor = order.sell_price.inverse();
        let mut finished = false;

        if let Some(feed) = feed {
            let mssp = feed.max_short_squeeze_price();
            debug!(order = order_id, asset = sell_asset_id, "probing margin calls");
            while !finished {
                let Some(call_id) = store.least_collateralized_call(recv_asset_id, sell_asset_id)
                else {
                    break;
                };
                let call = store.call_order(call_id).ok_or(MarketError::NotFound(call_id))?.clone();

                // the least collateralized position is safe, so all of them are
                if feed.settlement_price > call.call_price.inverse() {
                    break;
                }

                // feed protection: a margin call pays out at the short squeeze
                // bound, never beyond it
                let mut call_pay_price = call.call_price.inverse();
                if mssp < call_pay_price {
                    call_pay_price = mssp;
                }

                // the call's protected price does not reach this order's limit
                if call_pay_price > order.sell_price {
                    break;
                }

                // limit makers paying more than the call take priority
                while let Some(maker_id) =
                    store.best_limit_at_or_above(recv_asset_id, sell_asset_id, &opposite_floor)
                {
                    let maker_price = store
                        .limit_order(maker_id)
                        .ok_or(MarketError::NotFound(maker_id))?
                        .sell_price;
                    if !(call_pay_price > maker_price.inverse()) {
                        break;
                    }
                    if self.match_limit_limit(store, ledger, order_id, maker_id, maker_price)?
                        != MAKER_FILLED
                    {
                        finished = true;
                        break;
                    }
                }
                if finished {
                    break;
                }

                // a position that cannot cover at the protected price takes
                // the whole market down with it
                let demanded = call.debt_asset().checked_mul(&call_pay_price)?;
                if demanded > call.collateral_asset() {
                    if !allow_black_swan {
                        return Err(MarketError::BlackSwan(sell_asset_id));
                    }
                    self.globally_settle_asset(store, ledger, sell_asset_id, feed.settlement_price)?;
                    finished = true;
                    break;
                }

                if self.match_limit_call(store, ledger, order_id, call_id, call_pay_price)?
                    != MAKER_FILLED
                {
                    finished = true;
                }
            }
        }

        // remaining overlap against the opposite limit book
        while !finished {
            let Some(maker_id) =
                store.best_limit_at_or_above(recv_asset_id, sell_asset_id, &opposite_floor)
            else {
                break;
            };
            let maker_price =
                store.limit_order(maker_id).ok_or(MarketError::NotFound(maker_id))?.sell_price;
            finished =
                self.match_limit_limit(store, ledger, order_id, maker_id, maker_price)? != MAKER_FILLED;
        }

        if store.limit_order(order_id).is_none() {
            return Ok(true);
        }
        self.maybe_cull_small_order(store, ledger, order_id)
    }

    /// Cancel and refund an order whose remaining proceeds truncate to
    /// zero. Returns whether the order was culled.
    pub fn maybe_cull_small_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        order_id: u64,
    ) -> Result<bool> {
        let Some(order) = store.limit_order(order_id) else { return Ok(false) };
        if order.amount_to_receive()?.amount != 0 {
            return Ok(false);
        }
        debug!(order = order_id, "culling order too small to sell at its price");
        self.cancel_limit_order(store, ledger, order_id, true, false)?;
        Ok(true)
    }

    // ========================================================================
    // Cancels
    // ========================================================================

    /// Cancel a limit order, refunding the unsold remainder and settling
    /// deferred creation fees.
    ///
    /// With `create_virtual_op` a cancel event is emitted and, unless
    /// `skip_cancel_fee` is set, the fee schedule's cancel fee is
    /// deducted from the deferred fee before the refund. Cancelling an
    /// order that no longer exists is a no-op.
    pub fn cancel_limit_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        order_id: u64,
        create_virtual_op: bool,
        skip_cancel_fee: bool,
    ) -> Result<()> {
        let Some(order) = store.limit_order(order_id).cloned() else { return Ok(()) };

        let mut deferred_fee = order.deferred_fee;
        let mut deferred_paid_fee = order.deferred_paid_fee;
        let mut charged_fee = Asset::zero(CORE_ASSET);

        if create_virtual_op && !skip_cancel_fee && deferred_fee > 0 {
            let core_cancel_fee = ledger.cancel_fee().min(deferred_fee);
            if core_cancel_fee > 0 {
                ledger.pay_fee(order.seller, core_cancel_fee);
                deferred_fee -= core_cancel_fee;
                if deferred_paid_fee.amount == 0 {
                    charged_fee = Asset::new(core_cancel_fee, CORE_ASSET);
                } else {
                    // the originally paid fee is reduced proportionally,
                    // rounded up, and kept by the fee asset's issuer
                    let numerator = deferred_paid_fee.amount as u128 * core_cancel_fee as u128
                        + order.deferred_fee as u128
                        - 1;
                    let paid_cancel_fee = (numerator / order.deferred_fee as u128) as u64;
                    store.modify_asset(deferred_paid_fee.asset_id, |a| {
                        a.dynamic.accumulated_fees += paid_cancel_fee;
                    })?;
                    deferred_paid_fee.amount -= paid_cancel_fee;
                    charged_fee = Asset::new(paid_cancel_fee, deferred_paid_fee.asset_id);
                }
            }
        }

        // refund the unsold remainder
        ledger.adjust_balance(order.seller, order.amount_for_sale());

        // refund what is left of the creation fee
        if order.deferred_paid_fee.amount == 0 {
            ledger.adjust_balance(order.seller, Asset::new(deferred_fee, CORE_ASSET));
        } else {
            // fee was paid in another asset: refund that, and move the core
            // side into the fee asset's pool
            ledger.adjust_balance(order.seller, deferred_paid_fee);
            store.modify_asset(order.deferred_paid_fee.asset_id, |a| {
                a.dynamic.fee_pool += deferred_fee;
            })?;
        }

        if create_virtual_op {
            self.push_event(MarketEvent::LimitOrderCancelled {
                order_id,
                fee_paying_account: order.seller,
                fee: charged_fee,
            });
        }

        store.remove_limit_order(order_id);
        Ok(())
    }

    /// Cancel a force settlement, refunding its balance to the owner.
    /// Cancelling a settlement that no longer exists is a no-op.
    pub fn cancel_settle_order<L: Ledger>(
        &mut self,
        store: &mut MarketStore,
        ledger: &mut L,
        settle_id: u64,
        create_virtual_op: bool,
    ) -> Result<()> {
        let Some(settle) = store.settlement(settle_id).cloned() else { return Ok(()) };
        ledger.adjust_balance(settle.owner, settle.balance);
        if create_virtual_op {
            self.push_event(MarketEvent::SettleCancelled {
                settlement_id: settle_id,
                account: settle.owner,
                amount: settle.balance,
            });
        }
        store.remove_settlement(settle_id);
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::types::AssetObject;

    const BACK: u64 = 1;
    const MIA: u64 = 2;
    const ALICE: u64 = 100;
    const BOB: u64 = 101;

    fn price(b: u64, bid: u64, q: u64, qid: u64) -> Price {
        Price::new(Asset::new(b, bid), Asset::new(q, qid))
    }

    fn plain_market() -> MarketStore {
        let mut store = MarketStore::new();
        store.insert_asset(AssetObject::new(CORE_ASSET, 0));
        store.insert_asset(AssetObject::new(BACK, 0));
        store.insert_asset(AssetObject::new(MIA, 0));
        store
    }

    #[test]
    fn test_calculate_market_fee_clamps() {
        let mut asset = AssetObject::new(BACK, 0);
        assert_eq!(
            MarketEngine::calculate_market_fee(&asset, &Asset::new(1000, BACK)).unwrap(),
            Asset::zero(BACK)
        );

        // 2% capped at 15
        asset.options.charge_market_fee = true;
        asset.options.market_fee_percent = 200;
        asset.options.max_market_fee = 15;
        assert_eq!(
            MarketEngine::calculate_market_fee(&asset, &Asset::new(500, BACK)).unwrap(),
            Asset::new(10, BACK)
        );
        assert_eq!(
            MarketEngine::calculate_market_fee(&asset, &Asset::new(5000, BACK)).unwrap(),
            Asset::new(15, BACK)
        );
    }

    #[test]
    fn test_simple_cross_fills_both() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        let maker = store.create_limit_order(ALICE, 100, price(100, MIA, 200, BACK), 0, Asset::zero(0));
        assert!(!engine.apply_order(&mut store, &mut ledger, maker, true).unwrap());

        let taker = store.create_limit_order(BOB, 200, price(200, BACK, 100, MIA), 0, Asset::zero(0));
        assert!(engine.apply_order(&mut store, &mut ledger, taker, true).unwrap());

        assert_eq!(store.limit_order_count(), 0);
        assert_eq!(ledger.balance(ALICE, BACK), 200);
        assert_eq!(ledger.balance(BOB, MIA), 100);

        let fills: Vec<_> = engine
            .events()
            .iter()
            .filter_map(|e| match e {
                MarketEvent::Fill(f) => Some(*f),
                _ => None,
            })
            .collect();
        assert_eq!(fills.len(), 2);
        assert!(!fills[0].is_maker && fills[0].account == BOB);
        assert!(fills[1].is_maker && fills[1].account == ALICE);
    }

    #[test]
    fn test_partial_fill_keeps_maker_priority_price() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        // maker asks 2 BACK per MIA, taker would have paid 3
        let maker = store.create_limit_order(ALICE, 100, price(100, MIA, 200, BACK), 0, Asset::zero(0));
        engine.apply_order(&mut store, &mut ledger, maker, true).unwrap();

        let taker = store.create_limit_order(BOB, 90, price(90, BACK, 30, MIA), 0, Asset::zero(0));
        assert!(engine.apply_order(&mut store, &mut ledger, taker, true).unwrap());

        // the match executed at the maker's price: 90 BACK buys 45 MIA
        assert_eq!(ledger.balance(BOB, MIA), 45);
        assert_eq!(ledger.balance(ALICE, BACK), 90);
        assert_eq!(store.limit_order(maker).unwrap().for_sale, 55);
    }

    #[test]
    fn test_order_behind_the_book_rests() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        let front = store.create_limit_order(ALICE, 100, price(100, MIA, 200, BACK), 0, Asset::zero(0));
        engine.apply_order(&mut store, &mut ledger, front, true).unwrap();

        // worse price on the same side, never probes the books
        let behind = store.create_limit_order(BOB, 100, price(100, MIA, 300, BACK), 0, Asset::zero(0));
        assert!(!engine.apply_order(&mut store, &mut ledger, behind, true).unwrap());
        assert_eq!(store.limit_order_count(), 2);
    }

    #[test]
    fn test_dust_taker_is_culled_on_admission() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        // one raw unit whose proceeds truncate to zero
        let dust = store.create_limit_order(BOB, 1, price(2, BACK, 1, MIA), 0, Asset::zero(0));
        assert!(engine.apply_order(&mut store, &mut ledger, dust, true).unwrap());

        assert_eq!(store.limit_order_count(), 0);
        assert_eq!(ledger.balance(BOB, BACK), 1);
        // refund only, no fill happened
        assert!(matches!(
            engine.events(),
            [MarketEvent::LimitOrderCancelled { fee: Asset { amount: 0, .. }, .. }]
        ));
    }

    #[test]
    fn test_market_fee_charged_on_fill() {
        let mut store = plain_market();
        store
            .modify_asset(MIA, |a| {
                a.options.charge_market_fee = true;
                a.options.market_fee_percent = 100; // 1%
                a.options.max_market_fee = u64::MAX;
            })
            .unwrap();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        let maker = store.create_limit_order(ALICE, 100, price(100, MIA, 200, BACK), 0, Asset::zero(0));
        engine.apply_order(&mut store, &mut ledger, maker, true).unwrap();
        let taker = store.create_limit_order(BOB, 200, price(200, BACK, 100, MIA), 0, Asset::zero(0));
        engine.apply_order(&mut store, &mut ledger, taker, true).unwrap();

        // the taker received 100 MIA minus the 1% issuer fee
        assert_eq!(ledger.balance(BOB, MIA), 99);
        assert_eq!(store.asset(MIA).unwrap().dynamic.accumulated_fees, 1);
    }

    #[test]
    fn test_deferred_fees_settled_on_fill() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        let maker =
            store.create_limit_order(ALICE, 100, price(100, MIA, 200, BACK), 7, Asset::zero(CORE_ASSET));
        engine.apply_order(&mut store, &mut ledger, maker, true).unwrap();

        // partial fill settles the whole deferred fee once
        let taker = store.create_limit_order(BOB, 100, price(100, BACK, 50, MIA), 0, Asset::zero(0));
        engine.apply_order(&mut store, &mut ledger, taker, true).unwrap();

        assert_eq!(ledger.fees_paid(ALICE), 7);
        assert_eq!(store.limit_order(maker).unwrap().deferred_fee, 0);
    }

    #[test]
    fn test_cancel_refunds_and_charges_cancel_fee() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::with_cancel_fee(3);

        let order =
            store.create_limit_order(ALICE, 100, price(100, MIA, 200, BACK), 10, Asset::zero(CORE_ASSET));
        engine.cancel_limit_order(&mut store, &mut ledger, order, true, false).unwrap();

        assert_eq!(ledger.balance(ALICE, MIA), 100);
        // 10 deferred, 3 charged, 7 refunded
        assert_eq!(ledger.fees_paid(ALICE), 3);
        assert_eq!(ledger.balance(ALICE, CORE_ASSET), 7);
        assert!(matches!(
            engine.events(),
            [MarketEvent::LimitOrderCancelled { fee: Asset { amount: 3, asset_id: CORE_ASSET }, .. }]
        ));

        // cancelling again finds nothing and does nothing
        engine.cancel_limit_order(&mut store, &mut ledger, order, true, false).unwrap();
        assert_eq!(ledger.balance(ALICE, MIA), 100);
    }

    #[test]
    fn test_cancel_with_fee_paid_in_other_asset() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::with_cancel_fee(4);

        // creation fee of 10 core was originally paid with 25 BACK
        let order = store.create_limit_order(
            ALICE,
            100,
            price(100, MIA, 200, BACK),
            10,
            Asset::new(25, BACK),
        );
        engine.cancel_limit_order(&mut store, &mut ledger, order, true, false).unwrap();

        // core side: 4 charged to statistics, 6 into the fee asset's pool
        assert_eq!(ledger.fees_paid(ALICE), 4);
        assert_eq!(store.asset(BACK).unwrap().dynamic.fee_pool, 6);
        // paid side: ceil(25 * 4 / 10) = 10 kept as fees, 15 refunded
        assert_eq!(store.asset(BACK).unwrap().dynamic.accumulated_fees, 10);
        assert_eq!(ledger.balance(ALICE, BACK), 15);
        assert_eq!(ledger.balance(ALICE, MIA), 100);
        assert_eq!(ledger.balance(ALICE, CORE_ASSET), 0);
    }

    #[test]
    fn test_cancel_settle_order_refunds() {
        let mut store = plain_market();
        let mut engine = MarketEngine::new();
        let mut ledger = MemoryLedger::new();

        let settle = store.create_settlement(BOB, Asset::new(40, MIA), 0);
        engine.cancel_settle_order(&mut store, &mut ledger, settle, true).unwrap();

        assert_eq!(ledger.balance(BOB, MIA), 40);
        assert!(store.settlement(settle).is_none());
        // idempotent
        engine.cancel_settle_order(&mut store, &mut ledger, settle, true).unwrap();
        assert_eq!(ledger.balance(BOB, MIA), 40);
    }
}
