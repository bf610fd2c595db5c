use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use questline_core::{CustomerId, OrderId, QuestId, ShopId};
use questline_quests::{
    ConditionConfig, EvaluatorRegistry, OrderCountConfig, OrderEvent, Progress, ProgressKey,
    ProductCategoryConfig, TotalSpendConfig, target_reached,
};

fn paid_order(line_items: usize) -> OrderEvent {
    let items: Vec<_> = (0..line_items)
        .map(|i| {
            let product_type = if i % 2 == 0 { "Shoes" } else { "Socks" };
            serde_json::json!({
                "product_id": i,
                "product_type": product_type,
                "title": format!("item {i}"),
                "quantity": 1,
                "price": "10.00"
            })
        })
        .collect();
    serde_json::from_value(serde_json::json!({
        "id": 1,
        "customer": { "id": 1 },
        "financial_status": "paid",
        "created_at": Utc::now(),
        "total_price": "120.00",
        "currency": "USD",
        "line_items": items
    }))
    .unwrap()
}

fn progress(target: u64) -> Progress {
    let key = ProgressKey::new(ShopId::new(), QuestId::new(), CustomerId::parse("1").unwrap());
    Progress::new(key, target, Utc::now())
}

fn bench_registry_dispatch(c: &mut Criterion) {
    let registry = EvaluatorRegistry::with_defaults();
    let order = paid_order(4);
    let p = progress(3);
    let configs = [
        (
            "order_count",
            ConditionConfig::OrderCount(OrderCountConfig { target_order_count: 3, time_window_days: Some(30) }),
        ),
        (
            "total_spend",
            ConditionConfig::TotalSpend(TotalSpendConfig {
                target_amount: "500".parse().unwrap(),
                currency: "USD".to_string(),
                time_window_days: None,
            }),
        ),
        (
            "product_category",
            ConditionConfig::ProductCategory(ProductCategoryConfig {
                category_id: "shoes".to_string(),
                category_name: None,
                minimum_quantity: Some(5),
            }),
        ),
    ];

    let mut group = c.benchmark_group("evaluator_dispatch");
    group.sample_size(1000);
    for (name, config) in &configs {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let now = Utc::now();
                black_box(registry.evaluate(black_box(&order), config, &p, now).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_line_item_scaling(c: &mut Criterion) {
    let registry = EvaluatorRegistry::with_defaults();
    let config = ConditionConfig::ProductCategory(ProductCategoryConfig {
        category_id: "shoes".to_string(),
        category_name: Some("Sneakers".to_string()),
        minimum_quantity: Some(5),
    });
    let p = progress(5);

    let mut group = c.benchmark_group("product_category_line_items");
    for size in [1usize, 10, 100] {
        let order = paid_order(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &order, |b, order| {
            b.iter(|| black_box(registry.evaluate(order, &config, &p, Utc::now()).unwrap()))
        });
    }
    group.finish();
}

fn bench_apply_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("progress_apply_increment");
    for orders in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(orders));
        group.bench_with_input(BenchmarkId::from_parameter(orders), &orders, |b, &orders| {
            let ids: Vec<OrderId> = (0..orders).map(|n| OrderId::parse(n.to_string()).unwrap()).collect();
            b.iter(|| {
                let now = Utc::now();
                let mut p = progress(orders + 1);
                for id in &ids {
                    black_box(p.apply_increment(id, 1, now, target_reached));
                }
                // Redelivery of every order: all duplicates.
                for id in &ids {
                    black_box(p.apply_increment(id, 1, now, target_reached));
                }
                p.current_value
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_registry_dispatch,
    bench_line_item_scaling,
    bench_apply_increment
);
criterion_main!(benches);
