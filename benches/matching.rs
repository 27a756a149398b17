//! Benchmarks for the matching core.
//!
//! ## Running
//!
//! ```bash
//! cargo bench
//! cargo bench -- apply_order
//! ```
//!
//! Results land in `target/criterion/` with HTML reports.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use marginbook::types::{Asset, AssetObject, Price, PriceFeed, CORE_ASSET};
use marginbook::{MarketEngine, MarketStore, MemoryLedger};

const BACK: u64 = 1;
const MIA: u64 = 2;

// ============================================================================
// Helpers
// ============================================================================

fn price(b: u64, bid: u64, q: u64, qid: u64) -> Price {
    Price::new(Asset::new(b, bid), Asset::new(q, qid))
}

fn market() -> MarketStore {
    let mut store = MarketStore::new();
    store.insert_asset(AssetObject::new(CORE_ASSET, 0));
    store.insert_asset(AssetObject::new(BACK, 0));
    let mut mia = AssetObject::market_issued(MIA, 99, BACK);
    mia.bitasset.as_mut().unwrap().current_feed = Some(PriceFeed {
        settlement_price: price(1, MIA, 10, BACK),
        maintenance_collateral_ratio: 1750,
        maximum_short_squeeze_ratio: 1100,
    });
    store.insert_asset(mia);
    store
}

/// Rest `count` offers selling MIA at worsening prices.
fn populate_asks(store: &mut MarketStore, count: u64, quantity: u64) {
    for i in 0..count {
        store.create_limit_order(
            1,
            quantity,
            price(quantity, MIA, quantity * 2 + i, BACK),
            0,
            Asset::zero(0),
        );
    }
}

/// Deterministic batch of crossing and resting orders.
fn generate_order_batch(count: usize, seed: u64) -> Vec<(u64, Price)> {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut orders = Vec::with_capacity(count);
    for _ in 0..count {
        let amount = rng.gen_range(1..100u64);
        let rate = rng.gen_range(150..250u64);
        let order = if rng.gen_bool(0.5) {
            (amount, price(amount * 100, MIA, amount * rate, BACK))
        } else {
            (amount, price(amount * 100, BACK, amount * 100 * 100 / rate, MIA))
        };
        orders.push(order);
    }
    orders
}

// ============================================================================
// BENCHMARK: apply_order latency
// ============================================================================

fn bench_apply_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_order");

    group.bench_function("cross_into_1k_book", |b| {
        b.iter_batched(
            || {
                let mut store = market();
                populate_asks(&mut store, 1000, 100);
                store
            },
            |mut store| {
                let mut engine = MarketEngine::new();
                let mut ledger = MemoryLedger::new();
                let taker = store.create_limit_order(
                    2,
                    200,
                    price(200, BACK, 100, MIA),
                    0,
                    Asset::zero(0),
                );
                black_box(engine.apply_order(&mut store, &mut ledger, taker, true).unwrap())
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("rest_behind_1k_book", |b| {
        b.iter_batched(
            || {
                let mut store = market();
                populate_asks(&mut store, 1000, 100);
                store
            },
            |mut store| {
                let mut engine = MarketEngine::new();
                let mut ledger = MemoryLedger::new();
                // priced behind the whole book, rests untouched
                let resting = store.create_limit_order(
                    2,
                    100,
                    price(100, MIA, 10_000, BACK),
                    0,
                    Asset::zero(0),
                );
                black_box(engine.apply_order(&mut store, &mut ledger, resting, true).unwrap())
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: margin call sweep
// ============================================================================

fn bench_margin_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("margin_sweep");

    group.bench_function("sweep_100_calls", |b| {
        b.iter_batched(
            || {
                let mut store = market();
                for i in 0..100u64 {
                    store.create_call_order(
                        3,
                        1200 + i,
                        100,
                        Price::call_price(Asset::new(100, MIA), Asset::new(1200 + i, BACK), 1750),
                    );
                }
                store.modify_asset(MIA, |a| a.dynamic.current_supply = 100 * 100).unwrap();
                populate_asks(&mut store, 100, 100);
                store
            },
            |mut store| {
                let mut engine = MarketEngine::new();
                let mut ledger = MemoryLedger::new();
                black_box(
                    engine.check_call_orders(&mut store, &mut ledger, MIA, true, false).unwrap(),
                )
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: throughput
// ============================================================================

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.sample_size(20);

    for batch in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("orders", batch), &batch, |b, &batch| {
            let orders = generate_order_batch(batch, 42);
            b.iter_batched(
                || (market(), orders.clone()),
                |(mut store, orders)| {
                    let mut engine = MarketEngine::new();
                    let mut ledger = MemoryLedger::new();
                    for (amount, sell_price) in orders {
                        let id =
                            store.create_limit_order(2, amount, sell_price, 0, Asset::zero(0));
                        engine.apply_order(&mut store, &mut ledger, id, true).unwrap();
                    }
                    black_box(store.limit_order_count())
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_apply_order, bench_margin_sweep, bench_throughput);
criterion_main!(benches);
