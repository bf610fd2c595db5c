//! End-to-end tests for the quest pipeline.
//!
//! Tests: order job -> OrderProcessor -> Progress -> reward job -> RewardWorker -> Redemption
//!
//! Verifies:
//! - Completion happens exactly once and enqueues exactly one reward job
//! - Redelivery of order and reward jobs is idempotent
//! - One failing quest does not affect its siblings
//! - Systemic and issuer failures retry, then park

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use serde_json::json;

    use questline_core::{CustomerId, QuestId, RewardId, ShopId};
    use questline_quests::{
        ConditionConfig, ConditionEvaluator, ConditionType, EvaluationError, EvaluatorRegistry,
        NewQuest, OrderCountConfig, OrderEvent, PercentageDiscountConfig, Progress, ProgressKey,
        ProgressStatus, ProductSpecificConfig, Quest, RedemptionKey, RewardConfig, Shop,
        TotalSpendConfig,
    };
    use questline_quests::evaluators::OrderCountEvaluator;

    use crate::config::QueueSettings;
    use crate::issuer::{DiscountSeed, IssuanceError, IssuedDiscount, IssuerRegistry, RewardIssuer, generate_code};
    use crate::jobs::{InMemoryJobStore, JobQueue, JobStatus, JobStore, QueueName, RetryPolicy};
    use crate::store::{InMemoryStore, ProgressStore, QuestStore, RedemptionStore, ShopStore, StoreError};
    use crate::workers::{
        ISSUE_REWARD_JOB, OrderJob, OrderProcessor, PROCESS_ORDER_JOB, QuestOutcome, RewardJob,
        WorkerContext, WorkerPools, order_executor, reward_executor,
    };

    /// Issues codes locally; fails the first `failures` calls.
    #[derive(Default)]
    struct FakeIssuer {
        calls: AtomicUsize,
        failures: usize,
    }

    impl FakeIssuer {
        fn failing(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RewardIssuer for FakeIssuer {
        fn create_discount(
            &self,
            _shop: &Shop,
            reward: &RewardConfig,
            seed: &DiscountSeed,
        ) -> Result<IssuedDiscount, IssuanceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(IssuanceError::Transport("connection reset".to_string()));
            }
            Ok(IssuedDiscount {
                code: generate_code(reward.reward_type(), seed.quest_id),
                platform_reference: Some(format!("rule-{call}")),
            })
        }
    }

    /// Evaluator that always fails, standing in for a broken condition.
    struct BrokenEvaluator;

    impl ConditionEvaluator for BrokenEvaluator {
        fn condition_type(&self) -> ConditionType {
            ConditionType::ProductSpecific
        }

        fn evaluate(
            &self,
            _order: &OrderEvent,
            _config: &ConditionConfig,
            _progress: &Progress,
            _now: DateTime<Utc>,
        ) -> Result<u64, EvaluationError> {
            Err(EvaluationError::InvalidConfig("product catalogue unavailable".to_string()))
        }

        fn target_value(&self, _config: &ConditionConfig) -> Result<u64, EvaluationError> {
            Ok(1)
        }
    }

    /// Order counting that only completes once the target is exceeded.
    struct BeyondTarget;

    impl ConditionEvaluator for BeyondTarget {
        fn condition_type(&self) -> ConditionType {
            ConditionType::OrderCount
        }

        fn evaluate(
            &self,
            order: &OrderEvent,
            config: &ConditionConfig,
            progress: &Progress,
            now: DateTime<Utc>,
        ) -> Result<u64, EvaluationError> {
            OrderCountEvaluator.evaluate(order, config, progress, now)
        }

        fn is_completed(&self, current: u64, target: u64) -> bool {
            current > target
        }

        fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
            OrderCountEvaluator.target_value(config)
        }
    }

    /// Quest store whose reads always fail.
    struct UnavailableQuests;

    impl QuestStore for UnavailableQuests {
        fn insert_quest(&self, _quest: Quest) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn get_quest(&self, _shop_id: ShopId, _quest_id: QuestId) -> Result<Option<Quest>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn list_quests(&self, _shop_id: ShopId) -> Result<Vec<Quest>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn active_quests(&self, _shop_id: ShopId, _now: DateTime<Utc>) -> Result<Vec<Quest>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn set_quest_active(
            &self,
            _shop_id: ShopId,
            _quest_id: QuestId,
            _active: bool,
            _now: DateTime<Utc>,
        ) -> Result<Quest, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct Pipeline {
        store: Arc<InMemoryStore>,
        jobs: Arc<InMemoryJobStore>,
        issuer: Arc<FakeIssuer>,
        ctx: WorkerContext,
        shop: Shop,
    }

    fn pipeline() -> Pipeline {
        pipeline_with(EvaluatorRegistry::with_defaults(), FakeIssuer::default())
    }

    fn pipeline_with(evaluators: EvaluatorRegistry, issuer: FakeIssuer) -> Pipeline {
        let store = Arc::new(InMemoryStore::new());
        let jobs = InMemoryJobStore::arc();
        let issuer = Arc::new(issuer);
        let settings = QueueSettings::default().with_retry(RetryPolicy::fixed(3, Duration::ZERO));
        let queue = JobQueue::new(jobs.clone(), settings);
        let ctx = WorkerContext::new(
            store.clone(),
            queue,
            evaluators,
            IssuerRegistry::with_discount_issuer(issuer.clone()),
        );
        let shop = store
            .upsert_shop(Shop::new("quest-demo.myshopify.com", "shpat_test", Utc::now()).unwrap())
            .unwrap();

        Pipeline {
            store,
            jobs,
            issuer,
            ctx,
            shop,
        }
    }

    fn order_count(target: u64, window_days: Option<u32>) -> ConditionConfig {
        ConditionConfig::OrderCount(OrderCountConfig {
            target_order_count: target,
            time_window_days: window_days,
        })
    }

    fn ten_percent() -> RewardConfig {
        RewardConfig::DiscountPercentage(PercentageDiscountConfig {
            percentage: rust_decimal::Decimal::new(10, 0),
            minimum_order_value: None,
            expiry_days: Some(30),
        })
    }

    fn customer() -> CustomerId {
        CustomerId::parse("207119551").unwrap()
    }

    fn order(id: u64, financial_status: &str, created_at: DateTime<Utc>) -> OrderEvent {
        serde_json::from_value(json!({
            "id": id,
            "customer": { "id": 207119551, "email": "bob@example.com" },
            "financial_status": financial_status,
            "created_at": created_at,
            "total_price": "25.00",
            "currency": "USD",
            "line_items": [ { "product_id": 632910392, "title": "Mug", "quantity": 1, "price": "25.00" } ]
        }))
        .unwrap()
    }

    fn paid_order(id: u64) -> OrderEvent {
        order(id, "paid", Utc::now())
    }

    impl Pipeline {
        fn add_quest(&self, condition: ConditionConfig) -> Quest {
            let quest = NewQuest {
                name: "Loyal customer".to_string(),
                description: None,
                is_active: true,
                start_date: None,
                end_date: None,
                conditions: vec![condition],
                rewards: vec![ten_percent()],
            }
            .into_quest(self.shop.id, Utc::now())
            .unwrap();
            self.store.insert_quest(quest.clone()).unwrap();
            quest
        }

        fn submit(&self, order: OrderEvent) {
            let job = OrderJob {
                shop_id: self.shop.id,
                order,
            };
            self.ctx
                .queue
                .enqueue(QueueName::OrderProcessing, PROCESS_ORDER_JOB, &job)
                .unwrap();
        }

        fn run_orders(&self) -> usize {
            order_executor(&self.ctx).run_until_idle().unwrap()
        }

        fn run_rewards(&self) -> usize {
            reward_executor(&self.ctx).run_until_idle().unwrap()
        }

        fn progress(&self, quest: &Quest) -> Option<Progress> {
            self.store
                .find_progress(&ProgressKey::new(self.shop.id, quest.id, customer()))
                .unwrap()
        }

        fn redemption_key(&self, quest: &Quest) -> RedemptionKey {
            RedemptionKey {
                shop_id: self.shop.id,
                quest_id: quest.id,
                reward_id: quest.rewards[0].id,
                customer_id: customer(),
            }
        }

        fn reward_job(&self, quest: &Quest) -> RewardJob {
            RewardJob {
                shop_id: self.shop.id,
                quest_id: quest.id,
                customer_id: customer(),
                reward_id: quest.rewards[0].id,
            }
        }
    }

    #[test]
    fn third_paid_order_completes_quest_and_issues_one_reward() {
        let p = pipeline();
        let quest = p.add_quest(order_count(3, None));

        p.submit(paid_order(1));
        p.submit(paid_order(2));
        assert_eq!(p.run_orders(), 2);

        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert_eq!(progress.current_value, 2);
        assert_eq!(p.jobs.stats(QueueName::RewardIssuance).unwrap().waiting, 0);

        p.submit(paid_order(3));
        assert_eq!(p.run_orders(), 1);

        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert_eq!(progress.current_value, 3);
        assert_eq!(p.jobs.stats(QueueName::RewardIssuance).unwrap().waiting, 1);

        assert_eq!(p.run_rewards(), 1);
        let redemption = p.store.find_redemption(&p.redemption_key(&quest)).unwrap().unwrap();
        assert!(redemption.discount_code.starts_with("QUEST-"));
        assert_eq!(redemption.expires_at, redemption.issued_at + ChronoDuration::days(30));
        assert_eq!(p.progress(&quest).unwrap().status, ProgressStatus::Rewarded);
        assert_eq!(p.issuer.calls(), 1);
    }

    #[test]
    fn single_qualifying_order_can_complete_directly() {
        let p = pipeline();
        let quest = p.add_quest(order_count(1, None));

        p.submit(paid_order(1));
        p.run_orders();

        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert_eq!(progress.completing_order_id.as_ref().map(|o| o.as_str()), Some("1"));
    }

    #[test]
    fn redelivered_order_counts_once() {
        let p = pipeline();
        let quest = p.add_quest(order_count(3, None));

        // orders/create, orders/paid and orders/updated for the same order
        for _ in 0..3 {
            p.submit(paid_order(42));
        }
        assert_eq!(p.run_orders(), 3);

        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.current_value, 1);
        assert_eq!(progress.status, ProgressStatus::InProgress);
    }

    #[test]
    fn redelivered_completing_order_never_issues_twice() {
        let p = pipeline();
        let quest = p.add_quest(order_count(1, None));

        p.submit(paid_order(7));
        p.run_orders();
        p.submit(paid_order(7));
        p.run_orders();
        p.run_rewards();

        assert_eq!(p.store.redemption_count(), 1);
        assert_eq!(p.issuer.calls(), 1);
        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.current_value, 1);
        assert_eq!(progress.status, ProgressStatus::Rewarded);
    }

    #[test]
    fn duplicate_reward_job_returns_original_code() {
        let p = pipeline();
        let quest = p.add_quest(order_count(1, None));
        p.submit(paid_order(1));
        p.run_orders();

        // Simulate redelivery of the reward job.
        let duplicate = p.reward_job(&quest);
        let extra = p
            .ctx
            .queue
            .enqueue(QueueName::RewardIssuance, ISSUE_REWARD_JOB, &duplicate)
            .unwrap();
        assert_eq!(p.run_rewards(), 2);

        let redemption = p.store.find_redemption(&p.redemption_key(&quest)).unwrap().unwrap();
        let replayed = p.jobs.get(extra).unwrap().unwrap();
        assert_eq!(replayed.status, JobStatus::Completed);
        let result = replayed.result.unwrap();
        assert_eq!(result["discountCode"], redemption.discount_code.as_str());
        assert_eq!(result["newlyIssued"], false);

        assert_eq!(p.store.redemption_count(), 1);
        assert_eq!(p.issuer.calls(), 1);
    }

    #[test]
    fn failing_quest_does_not_block_siblings() {
        let mut evaluators = EvaluatorRegistry::with_defaults();
        evaluators.register(Arc::new(BrokenEvaluator));
        let p = pipeline_with(evaluators, FakeIssuer::default());

        let healthy_a = p.add_quest(order_count(5, None));
        let broken = p.add_quest(ConditionConfig::ProductSpecific(ProductSpecificConfig {
            product_ids: vec!["632910392".parse().unwrap()],
            minimum_quantity: None,
        }));
        let healthy_b = p.add_quest(order_count(2, Some(30)));

        let report = OrderProcessor::new(p.ctx.clone())
            .process(
                &OrderJob {
                    shop_id: p.shop.id,
                    order: paid_order(1),
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 2);
        let failed = report.results.iter().find(|r| r.is_failure()).unwrap();
        assert_eq!(failed.quest_id, broken.id);

        assert_eq!(p.progress(&healthy_a).unwrap().current_value, 1);
        assert_eq!(p.progress(&healthy_b).unwrap().current_value, 1);
    }

    #[test]
    fn unrepresentable_order_total_fails_only_the_spend_quest() {
        let p = pipeline();
        let spend = p.add_quest(ConditionConfig::TotalSpend(TotalSpendConfig {
            target_amount: "100.00".parse().unwrap(),
            currency: "USD".to_string(),
            time_window_days: None,
        }));
        let count = p.add_quest(order_count(3, None));

        let mut whale = paid_order(1);
        whale.total_price = Some("79228162514264337593543950335".parse().unwrap());
        let report = OrderProcessor::new(p.ctx.clone())
            .process(&OrderJob { shop_id: p.shop.id, order: whale }, Utc::now())
            .unwrap();

        assert_eq!(report.failed, 1);
        let failed = report.results.iter().find(|r| r.is_failure()).unwrap();
        assert_eq!(failed.quest_id, spend.id);
        assert!(matches!(&failed.outcome, QuestOutcome::Failed { error } if error.contains("total_price")));

        assert_eq!(p.progress(&spend).unwrap().current_value, 0);
        assert_eq!(p.progress(&count).unwrap().current_value, 1);
    }

    #[test]
    fn evaluator_decides_when_progress_completes() {
        let mut evaluators = EvaluatorRegistry::with_defaults();
        evaluators.register(Arc::new(BeyondTarget));
        let p = pipeline_with(evaluators, FakeIssuer::default());
        let quest = p.add_quest(order_count(2, None));

        p.submit(paid_order(1));
        p.submit(paid_order(2));
        p.run_orders();
        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.current_value, 2);
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert_eq!(p.jobs.stats(QueueName::RewardIssuance).unwrap().waiting, 0);

        p.submit(paid_order(3));
        p.run_orders();
        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert!(progress.completed_by(&"3".parse().unwrap()));
        assert_eq!(p.jobs.stats(QueueName::RewardIssuance).unwrap().waiting, 1);
    }

    #[test]
    fn unpaid_and_stale_orders_do_not_count() {
        let p = pipeline();
        let quest = p.add_quest(order_count(2, Some(7)));
        let processor = OrderProcessor::new(p.ctx.clone());
        let now = Utc::now();

        for order in [
            order(1, "pending", now),
            order(2, "refunded", now),
            order(3, "paid", now - ChronoDuration::days(10)),
        ] {
            let report = processor
                .process(&OrderJob { shop_id: p.shop.id, order }, now)
                .unwrap();
            assert_eq!(report.results[0].outcome, QuestOutcome::NotCounted);
        }

        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.current_value, 0);
        assert_eq!(progress.status, ProgressStatus::NotStarted);
    }

    #[test]
    fn order_without_customer_is_skipped() {
        let p = pipeline();
        p.add_quest(order_count(1, None));
        let mut guest = paid_order(1);
        guest.customer = None;

        let report = OrderProcessor::new(p.ctx.clone())
            .process(&OrderJob { shop_id: p.shop.id, order: guest }, Utc::now())
            .unwrap();

        assert_eq!(report.skipped.as_deref(), Some("no customer"));
        assert!(report.results.is_empty());
    }

    #[test]
    fn unreadable_quest_list_retries_then_parks() {
        let p = pipeline();
        let mut ctx = p.ctx.clone();
        ctx.quests = Arc::new(UnavailableQuests);

        p.submit(paid_order(1));
        let executed = order_executor(&ctx).run_until_idle().unwrap();
        assert_eq!(executed, 3);

        let parked = p.jobs.list_dead_letters(QueueName::OrderProcessing, 10).unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].job.attempt, 3);
        assert!(parked[0].reason.contains("could not load quests"));
    }

    #[test]
    fn issuer_failure_retries_without_dangling_redemption() {
        let p = pipeline_with(EvaluatorRegistry::with_defaults(), FakeIssuer::failing(1));
        let quest = p.add_quest(order_count(1, None));
        p.submit(paid_order(1));
        p.run_orders();

        // First attempt fails at the platform, the retry succeeds.
        assert_eq!(p.run_rewards(), 2);
        assert_eq!(p.issuer.calls(), 2);
        assert_eq!(p.store.redemption_count(), 1);
        let redemption = p.store.find_redemption(&p.redemption_key(&quest)).unwrap().unwrap();
        assert_eq!(redemption.platform_reference.as_deref(), Some("rule-1"));
    }

    #[test]
    fn reward_for_unknown_reward_is_parked() {
        let p = pipeline();
        let quest = p.add_quest(order_count(1, None));
        p.submit(paid_order(1));
        p.run_orders();

        let mut bogus = p.reward_job(&quest);
        bogus.reward_id = RewardId::new();
        let job_id = p
            .ctx
            .queue
            .enqueue(QueueName::RewardIssuance, ISSUE_REWARD_JOB, &bogus)
            .unwrap();
        reward_executor(&p.ctx).run_until_idle().unwrap();

        let job = p.jobs.get(job_id).unwrap().unwrap();
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 1, .. }));
    }

    #[test]
    fn paid_order_with_issued_code_marks_redemption() {
        let p = pipeline();
        let quest = p.add_quest(order_count(1, None));
        p.submit(paid_order(1));
        p.run_orders();
        p.run_rewards();
        let code = p
            .store
            .find_redemption(&p.redemption_key(&quest))
            .unwrap()
            .unwrap()
            .discount_code;

        let mut checkout = paid_order(2);
        checkout.discount_codes = vec![questline_quests::OrderDiscountCode { code: code.clone() }];
        let report = OrderProcessor::new(p.ctx.clone())
            .process(&OrderJob { shop_id: p.shop.id, order: checkout }, Utc::now())
            .unwrap();

        assert_eq!(report.redeemed_codes, vec![code]);
        let redemption = p.store.find_redemption(&p.redemption_key(&quest)).unwrap().unwrap();
        assert_eq!(redemption.redeemed_order_id.as_ref().map(|o| o.as_str()), Some("2"));
    }

    #[test]
    fn concurrent_pools_lose_no_increments() {
        let p = pipeline();
        let quest = p.add_quest(order_count(100, None));
        let total = 40u64;
        for id in 1..=total {
            p.submit(paid_order(id));
        }

        let mut ctx = p.ctx.clone();
        ctx.queue = JobQueue::new(
            p.jobs.clone(),
            QueueSettings::default().with_poll_interval(Duration::from_millis(5)),
        );
        let pools = WorkerPools::spawn(&ctx).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while p.jobs.stats(QueueName::OrderProcessing).unwrap().completed < total as usize {
            assert!(Instant::now() < deadline, "order jobs did not finish in time");
            std::thread::sleep(Duration::from_millis(10));
        }
        pools.shutdown();

        let progress = p.progress(&quest).unwrap();
        assert_eq!(progress.current_value, total);
        assert_eq!(progress.counted_orders.len(), total as usize);
    }
}
