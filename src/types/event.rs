//! Observable side effects of the engine.
//!
//! Every mutation that a host needs to index or relay is emitted as a
//! [`MarketEvent`] in the exact order it happened. Fill events are
//! SSZ-serializable so hosts can log and hash them byte-identically
//! across replicas; the digest helper mirrors how the store hashes its
//! state root.

use sha2::{Digest, Sha256};
use ssz_rs::prelude::*;

use crate::types::asset::{AccountId, Asset};
use crate::types::price::Price;

/// One side of a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Default, SimpleSerialize)]
pub struct FillEvent {
    /// The order that was filled (limit, call or settlement id)
    pub order_id: u64,

    /// Owner of the filled order
    pub account: AccountId,

    /// What the order gave up
    pub pays: Asset,

    /// What the order got, before fees
    pub receives: Asset,

    /// Market fee withheld from `receives` for the issuer
    pub fee: Asset,

    /// The price the match executed at
    pub fill_price: Price,

    /// Whether this side was resting on the book
    pub is_maker: bool,
}

impl FillEvent {
    /// Deterministic digest of the event for host-side logs.
    pub fn digest(&self) -> [u8; 32] {
        let bytes = ssz_rs::serialize(self).expect("fill events are fixed size");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}

/// Everything the engine reports back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// One order side was filled
    Fill(FillEvent),

    /// A limit order was cancelled, expired or culled
    LimitOrderCancelled {
        order_id: u64,
        fee_paying_account: AccountId,
        /// Cancel fee actually charged, possibly zero
        fee: Asset,
    },

    /// A force settlement was cancelled and refunded
    SettleCancelled {
        settlement_id: u64,
        account: AccountId,
        amount: Asset,
    },

    /// A collateral bid was cancelled and its collateral refunded
    BidCancelled {
        bidder: AccountId,
        additional_collateral: Asset,
        debt_covered: Asset,
    },

    /// A collateral bid was turned into a live debt position
    BidExecuted {
        bidder: AccountId,
        collateral: Asset,
        debt: Asset,
    },
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fill() -> FillEvent {
        FillEvent {
            order_id: 7,
            account: 42,
            pays: Asset::new(50, 1),
            receives: Asset::new(25, 2),
            fee: Asset::new(0, 2),
            fill_price: Price::new(Asset::new(100, 2), Asset::new(200, 1)),
            is_maker: true,
        }
    }

    #[test]
    fn test_fill_ssz_roundtrip() {
        let e = fill();
        let bytes = ssz_rs::serialize(&e).expect("serialize");
        let back: FillEvent = ssz_rs::deserialize(&bytes).expect("deserialize");
        assert_eq!(e, back);
    }

    #[test]
    fn test_fill_digest_deterministic() {
        assert_eq!(fill().digest(), fill().digest());

        let mut other = fill();
        other.pays = Asset::new(51, 1);
        assert_ne!(fill().digest(), other.digest());
    }
}
