//! Persistence contracts for shops, quests, progress and redemptions.
//!
//! Every mutation of shared state goes through one of these operations, and
//! each implementation must make them atomic per natural key: progress by
//! (shop, quest, customer), redemptions by (shop, quest, reward, customer).
//! Workers never read-modify-write records themselves.

pub mod in_memory;
pub mod redb_store;

pub use in_memory::InMemoryStore;
pub use redb_store::RedbStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use questline_core::{CustomerId, DomainError, OrderId, QuestId, RewardId, ShopId};
use questline_quests::{
    IncrementOutcome, NewRedemption, Progress, ProgressKey, Quest, Redemption, RedemptionKey, Shop,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored record no longer decodes.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::Conflict(err.to_string())
    }
}

/// Result of an atomic increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: Progress,
    pub outcome: IncrementOutcome,
}

impl ProgressUpdate {
    pub fn newly_completed(&self) -> bool {
        matches!(self.outcome, IncrementOutcome::Applied { newly_completed: true })
    }
}

/// Result of an atomic check-then-insert of a redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionInsert {
    Created(Redemption),
    /// A redemption for the key already existed; it is returned unchanged.
    Existing(Redemption),
}

pub trait ShopStore: Send + Sync {
    fn find_shop(&self, shop_id: ShopId) -> Result<Option<Shop>, StoreError>;

    fn find_shop_by_domain(&self, domain: &str) -> Result<Option<Shop>, StoreError>;

    /// Insert, or refresh token and install state of the shop with the same domain.
    fn upsert_shop(&self, shop: Shop) -> Result<Shop, StoreError>;

    fn mark_uninstalled(&self, domain: &str, at: DateTime<Utc>) -> Result<Option<Shop>, StoreError>;
}

pub trait QuestStore: Send + Sync {
    fn insert_quest(&self, quest: Quest) -> Result<(), StoreError>;

    fn get_quest(&self, shop_id: ShopId, quest_id: QuestId) -> Result<Option<Quest>, StoreError>;

    /// All quests of the shop, newest first.
    fn list_quests(&self, shop_id: ShopId) -> Result<Vec<Quest>, StoreError>;

    /// Quests that are active and inside their date window at `now`, newest first.
    fn active_quests(&self, shop_id: ShopId, now: DateTime<Utc>) -> Result<Vec<Quest>, StoreError>;

    fn set_quest_active(
        &self,
        shop_id: ShopId,
        quest_id: QuestId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Quest, StoreError>;
}

pub trait ProgressStore: Send + Sync {
    /// Fetch the record for `key`, creating it with `target_value` if absent.
    /// The target of an existing record is never changed.
    fn get_or_create_progress(
        &self,
        key: &ProgressKey,
        target_value: u64,
        now: DateTime<Utc>,
    ) -> Result<Progress, StoreError>;

    fn find_progress(&self, key: &ProgressKey) -> Result<Option<Progress>, StoreError>;

    /// Atomically apply `amount` contributed by `order_id`, completing the
    /// record when `is_completed(current, target)` holds afterwards.
    ///
    /// Finished records and already-counted orders are left untouched and
    /// reported through the outcome.
    fn apply_increment(
        &self,
        key: &ProgressKey,
        order_id: &OrderId,
        amount: u64,
        now: DateTime<Utc>,
        is_completed: &dyn Fn(u64, u64) -> bool,
    ) -> Result<ProgressUpdate, StoreError>;

    /// COMPLETED -> REWARDED.
    fn mark_rewarded(&self, key: &ProgressKey, reward_id: RewardId, now: DateTime<Utc>) -> Result<Progress, StoreError>;

    fn list_customer_progress(&self, shop_id: ShopId, customer_id: &CustomerId) -> Result<Vec<Progress>, StoreError>;
}

pub trait RedemptionStore: Send + Sync {
    fn find_redemption(&self, key: &RedemptionKey) -> Result<Option<Redemption>, StoreError>;

    /// Insert unless a redemption already exists for the key.
    fn create_redemption(&self, new: NewRedemption) -> Result<RedemptionInsert, StoreError>;

    /// Attach checkout data to the redemption holding `code`. First write wins.
    /// Returns `None` when no redemption of the shop carries the code.
    fn mark_redeemed(
        &self,
        shop_id: ShopId,
        code: &str,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<Option<Redemption>, StoreError>;

    fn list_customer_redemptions(
        &self,
        shop_id: ShopId,
        customer_id: &CustomerId,
    ) -> Result<Vec<Redemption>, StoreError>;
}

macro_rules! forward_to_arc {
    ($trait:ident { $(fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)* }) => {
        impl<S: $trait + ?Sized> $trait for Arc<S> {
            $(
                fn $name(&self $(, $arg: $ty)*) -> $ret {
                    (**self).$name($($arg),*)
                }
            )*
        }
    };
}

forward_to_arc!(ShopStore {
    fn find_shop(&self, shop_id: ShopId) -> Result<Option<Shop>, StoreError>;
    fn find_shop_by_domain(&self, domain: &str) -> Result<Option<Shop>, StoreError>;
    fn upsert_shop(&self, shop: Shop) -> Result<Shop, StoreError>;
    fn mark_uninstalled(&self, domain: &str, at: DateTime<Utc>) -> Result<Option<Shop>, StoreError>;
});

forward_to_arc!(QuestStore {
    fn insert_quest(&self, quest: Quest) -> Result<(), StoreError>;
    fn get_quest(&self, shop_id: ShopId, quest_id: QuestId) -> Result<Option<Quest>, StoreError>;
    fn list_quests(&self, shop_id: ShopId) -> Result<Vec<Quest>, StoreError>;
    fn active_quests(&self, shop_id: ShopId, now: DateTime<Utc>) -> Result<Vec<Quest>, StoreError>;
    fn set_quest_active(&self, shop_id: ShopId, quest_id: QuestId, active: bool, now: DateTime<Utc>) -> Result<Quest, StoreError>;
});

forward_to_arc!(ProgressStore {
    fn get_or_create_progress(&self, key: &ProgressKey, target_value: u64, now: DateTime<Utc>) -> Result<Progress, StoreError>;
    fn find_progress(&self, key: &ProgressKey) -> Result<Option<Progress>, StoreError>;
    fn apply_increment(&self, key: &ProgressKey, order_id: &OrderId, amount: u64, now: DateTime<Utc>, is_completed: &dyn Fn(u64, u64) -> bool) -> Result<ProgressUpdate, StoreError>;
    fn mark_rewarded(&self, key: &ProgressKey, reward_id: RewardId, now: DateTime<Utc>) -> Result<Progress, StoreError>;
    fn list_customer_progress(&self, shop_id: ShopId, customer_id: &CustomerId) -> Result<Vec<Progress>, StoreError>;
});

forward_to_arc!(RedemptionStore {
    fn find_redemption(&self, key: &RedemptionKey) -> Result<Option<Redemption>, StoreError>;
    fn create_redemption(&self, new: NewRedemption) -> Result<RedemptionInsert, StoreError>;
    fn mark_redeemed(&self, shop_id: ShopId, code: &str, order_id: &OrderId, at: DateTime<Utc>) -> Result<Option<Redemption>, StoreError>;
    fn list_customer_redemptions(&self, shop_id: ShopId, customer_id: &CustomerId) -> Result<Vec<Redemption>, StoreError>;
});
