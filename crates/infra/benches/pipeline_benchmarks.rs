use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use questline_core::{CustomerId, QuestId, ShopId};
use questline_infra::config::QueueSettings;
use questline_infra::issuer::IssuerRegistry;
use questline_infra::jobs::{InMemoryJobStore, JobQueue};
use questline_infra::store::{InMemoryStore, ProgressStore, QuestStore};
use questline_infra::workers::{OrderJob, OrderProcessor, WorkerContext};
use questline_quests::{
    ConditionConfig, EvaluatorRegistry, NewQuest, OrderCountConfig, OrderEvent,
    PercentageDiscountConfig, ProgressKey, RewardConfig, target_reached,
};
use rust_decimal::Decimal;

fn order(id: u64) -> OrderEvent {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "customer": { "id": 1 },
        "financial_status": "paid",
        "created_at": Utc::now(),
        "line_items": [ { "product_id": 1, "title": "Mug", "quantity": 1 } ]
    }))
    .unwrap()
}

fn context_with_quests(quests: usize) -> (WorkerContext, ShopId) {
    let store = Arc::new(InMemoryStore::new());
    let queue = JobQueue::new(InMemoryJobStore::arc(), QueueSettings::default());
    let shop_id = ShopId::new();
    for i in 0..quests {
        let quest = NewQuest {
            name: format!("quest {i}"),
            description: None,
            is_active: true,
            start_date: None,
            end_date: None,
            conditions: vec![ConditionConfig::OrderCount(OrderCountConfig {
                target_order_count: u64::MAX,
                time_window_days: None,
            })],
            rewards: vec![RewardConfig::DiscountPercentage(PercentageDiscountConfig {
                percentage: Decimal::new(10, 0),
                minimum_order_value: None,
                expiry_days: None,
            })],
        }
        .into_quest(shop_id, Utc::now())
        .unwrap();
        store.insert_quest(quest).unwrap();
    }
    let ctx = WorkerContext::new(store, queue, EvaluatorRegistry::with_defaults(), IssuerRegistry::new());
    (ctx, shop_id)
}

fn bench_order_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_processing");

    for quests in [1usize, 10, 50] {
        let (ctx, shop_id) = context_with_quests(quests);
        let processor = OrderProcessor::new(ctx);
        let next_id = AtomicU64::new(1);

        group.throughput(Throughput::Elements(quests as u64));
        group.bench_with_input(BenchmarkId::new("active_quests", quests), &quests, |b, _| {
            b.iter(|| {
                let job = OrderJob {
                    shop_id,
                    order: order(next_id.fetch_add(1, Ordering::Relaxed)),
                };
                black_box(processor.process(&job, Utc::now()).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_contended_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("progress_store");
    let store = InMemoryStore::new();
    let key = ProgressKey::new(ShopId::new(), QuestId::new(), CustomerId::parse("1").unwrap());
    store.get_or_create_progress(&key, u64::MAX, Utc::now()).unwrap();
    let next_id = AtomicU64::new(1);

    group.bench_function("apply_increment", |b| {
        b.iter(|| {
            let order_id = next_id.fetch_add(1, Ordering::Relaxed).to_string().parse().unwrap();
            black_box(store.apply_increment(&key, &order_id, 1, Utc::now(), &target_reached).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_order_processing, bench_contended_increment);
criterion_main!(benches);
