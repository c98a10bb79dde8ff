use std::{hint::black_box, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use topicbus::{AsyncOptions, PubSub, PubSubMsg, Subscription, INTEGER, OBJECT};

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    for subs in [0usize, 1, 10, 100] {
        let bus = PubSub::default();
        let topic = bus.create_topic("bench.fanout", &INTEGER).unwrap();
        let _subs: Vec<Subscription> = (0..subs)
            .map(|_| {
                let sub = bus.subscription_fn(|msg: PubSubMsg| {
                    black_box(msg.msg_id());
                });
                sub.subscribe_to_topic("bench.fanout", true).unwrap();
                sub
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(subs), &subs, |b, _| {
            b.iter(|| topic.publish(black_box(42u64)).unwrap())
        });
    }
    group.finish();
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let bus = PubSub::default();
    let _topic = bus.create_topic("bench.churn", &OBJECT).unwrap();
    let sub = bus.subscription_fn(|_msg: PubSubMsg| {});
    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            sub.subscribe_to_topic(black_box("bench.churn"), true)
                .unwrap();
            sub.unsubscribe_from_topic(black_box("bench.churn"));
        })
    });
}

fn bench_create_drop_topic(c: &mut Criterion) {
    let bus = PubSub::default();
    c.bench_function("create_drop_topic", |b| {
        b.iter(|| {
            let topic = bus.create_topic(black_box("bench.topic"), &OBJECT).unwrap();
            drop(topic);
        })
    });
}

fn bench_async_roundtrip(c: &mut Criterion) {
    let bus = PubSub::default();
    let topic = bus.create_topic("bench.async", &INTEGER).unwrap();
    let reader = bus.async_subscriber(AsyncOptions::with_capacity(1024));
    reader.subscribe_to("bench.async", true).unwrap();

    c.bench_function("async_publish_and_read", |b| {
        b.iter(|| {
            topic.publish(black_box(7u32)).unwrap();
            let msg = reader.get_next_msg(Duration::ZERO).unwrap();
            black_box(msg)
        })
    });
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_subscribe_unsubscribe,
    bench_create_drop_topic,
    bench_async_roundtrip
);
criterion_main!(benches);
