//! Demo binary: seeds a small market and runs a match.

use marginbook::types::{Asset, AssetObject, Price, CORE_ASSET};
use marginbook::{MarketEngine, MarketStore, MemoryLedger};

const BACK: u64 = 1;
const MIA: u64 = 2;

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let mut store = MarketStore::new();
    store.insert_asset(AssetObject::new(CORE_ASSET, 0));
    store.insert_asset(AssetObject::new(BACK, 0));
    store.insert_asset(AssetObject::market_issued(MIA, 99, BACK));

    let mut engine = MarketEngine::new();
    let mut ledger = MemoryLedger::new();

    // alice offers 100 units at 2 backing each
    let price = |b, bid, q, qid| Price::new(Asset::new(b, bid), Asset::new(q, qid));
    let maker = store.create_limit_order(100, 100, price(100, MIA, 200, BACK), 0, Asset::zero(0));
    engine.apply_order(&mut store, &mut ledger, maker, true).expect("maker rests");

    // bob crosses with 50 backing
    let taker = store.create_limit_order(101, 50, price(50, BACK, 25, MIA), 0, Asset::zero(0));
    let filled = engine.apply_order(&mut store, &mut ledger, taker, true).expect("taker matches");

    println!("taker fully consumed: {}", filled);
    println!("alice received {} backing", ledger.balance(100, BACK));
    println!("bob received {} issued units", ledger.balance(101, MIA));
    println!("resting orders: {}", store.limit_order_count());
    for event in engine.drain_events() {
        println!("event: {:?}", event);
    }
    println!("state root: {}", store.state_root_hex());
}
