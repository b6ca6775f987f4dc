use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use chain_events::query::match_text;
use chain_events::{callback, Context, Emitter, Publisher, Query, QueryBuilder, Subscribable, TagMap};

const QUERY: &str = "EventType = 'CallEvent' AND Height >= 45 AND (Address CONTAINS 'AB' OR Index < 3)";

fn tags() -> TagMap {
    TagMap::new()
        .with("EventType", "CallEvent")
        .with("Height", 80u64)
        .with("Address", "01ABCDEF")
        .with("Index", 7u64)
        .with("TxHash", vec![0xDEu8; 32])
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(QUERY.len() as u64));
    group.bench_function("compile", |b| b.iter(|| Query::parse(black_box(QUERY)).unwrap()));
    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let tags = tags();
    let compiled = Query::must_parse(QUERY);

    let mut group = c.benchmark_group("match");
    group.throughput(Throughput::Elements(1));
    group.bench_function("compiled", |b| b.iter(|| compiled.matches(black_box(&tags))));
    group.bench_function("single_pass", |b| {
        b.iter(|| match_text(black_box(QUERY), black_box(&tags)).unwrap());
    });
    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let emitter = Arc::new(Emitter::<u64>::new());
    for i in 0..256u64 {
        let query = QueryBuilder::new()
            .and_equals("EventType", "CallEvent")
            .and_strictly_greater_than("Height", i);
        emitter
            .subscribe(&format!("sub-{i}"), &query, callback(|h: &u64| black_box(*h) > 0))
            .unwrap();
    }
    let tags = tags();
    let ctx = Context::background();

    let mut group = c.benchmark_group("publish");
    group.throughput(Throughput::Elements(256));
    group.bench_function("256_listeners", |b| {
        b.iter(|| emitter.publish(&ctx, black_box(80), &tags).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_match, bench_publish);
criterion_main!(benches);
