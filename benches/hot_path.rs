//! Criterion benchmarks for the message plane hot path.
//!
//! Measures frame classification + routing, queue handoff, channel hashing,
//! and the rate-gate query.
//!
//! Run: `cargo bench`

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use deribit_ws::dispatch::{Dispatcher, fnv1a_32};
use deribit_ws::rate_limit::TokenBucket;
use deribit_ws::spsc::SpscQueue;

const SUB_FRAME: &str = r#"{"jsonrpc":"2.0","method":"subscription","params":{"channel":"deribit_price_index.btc_usd","data":{"timestamp":1700000000000,"price":97123.45,"index_name":"btc_usd"}}}"#;

const RPC_FRAME: &str = r#"{"jsonrpc":"2.0","id":17,"result":{"ticks":[1700000000000],"open":[100.0],"high":[101.5],"low":[99.5],"close":[100.25],"volume":[10.1],"cost":[1000.0]},"usIn":1700000000000123,"usOut":1700000000000456,"usDiff":333}"#;

fn bench_dispatch_subscription(c: &mut Criterion) {
    let dispatcher = Dispatcher::new();
    dispatcher.register_subscription(
        "deribit_price_index.btc_usd",
        Arc::new(|pm| {
            black_box(pm.data.len());
        }),
    );
    c.bench_function("dispatch_subscription", |b| {
        b.iter(|| dispatcher.dispatch(black_box(SUB_FRAME)));
    });
}

fn bench_dispatch_rpc_response(c: &mut Criterion) {
    let dispatcher = Dispatcher::new();
    dispatcher.register_rpc(
        17,
        Some(Arc::new(|pm| {
            black_box(pm.result.len());
        })),
        None,
    );
    c.bench_function("dispatch_rpc_response", |b| {
        b.iter(|| dispatcher.dispatch(black_box(RPC_FRAME)));
    });
}

fn bench_dispatch_unregistered(c: &mut Criterion) {
    // Parse + classify + table miss: the floor cost of every inbound frame.
    let dispatcher = Dispatcher::new();
    c.bench_function("dispatch_unregistered", |b| {
        b.iter(|| dispatcher.dispatch(black_box(SUB_FRAME)));
    });
}

fn bench_spsc_push_pop(c: &mut Criterion) {
    let queue = SpscQueue::new(4096);
    c.bench_function("spsc_push_pop_u64", |b| {
        b.iter(|| {
            queue.push(black_box(42u64)).unwrap();
            black_box(queue.pop());
        });
    });
}

fn bench_spsc_push_pop_frame(c: &mut Criterion) {
    let queue = SpscQueue::new(4096);
    c.bench_function("spsc_push_pop_frame", |b| {
        b.iter(|| {
            queue.push(black_box(SUB_FRAME.to_owned())).unwrap();
            black_box(queue.pop());
        });
    });
}

fn bench_fnv1a(c: &mut Criterion) {
    c.bench_function("fnv1a_32_channel", |b| {
        b.iter(|| fnv1a_32(black_box("deribit_price_index.btc_usd")));
    });
}

fn bench_token_bucket(c: &mut Criterion) {
    let mut bucket = TokenBucket::new();
    c.bench_function("token_bucket_allow", |b| {
        b.iter(|| black_box(bucket.allow()));
    });
}

criterion_group!(
    benches,
    bench_dispatch_subscription,
    bench_dispatch_rpc_response,
    bench_dispatch_unregistered,
    bench_spsc_push_pop,
    bench_spsc_push_pop_frame,
    bench_fnv1a,
    bench_token_bucket,
);
criterion_main!(benches);
