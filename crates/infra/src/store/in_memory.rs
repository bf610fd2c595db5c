//! In-memory store for tests/dev.
//!
//! Each table sits behind its own lock; every trait operation holds the
//! table's write lock for its whole read-modify-write, which makes it atomic
//! per key.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use questline_core::{CustomerId, OrderId, QuestId, RewardId, ShopId};
use questline_quests::{
    NewRedemption, Progress, ProgressKey, Quest, Redemption, RedemptionKey, Shop,
};

use super::{
    ProgressStore, ProgressUpdate, QuestStore, RedemptionInsert, RedemptionStore, ShopStore,
    StoreError,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    shops: RwLock<HashMap<ShopId, Shop>>,
    quests: RwLock<HashMap<QuestId, Quest>>,
    progress: RwLock<HashMap<ProgressKey, Progress>>,
    redemptions: RwLock<HashMap<RedemptionKey, Redemption>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

fn newest_first(quests: &mut [Quest]) {
    quests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of redemptions held, across all shops.
    pub fn redemption_count(&self) -> usize {
        self.redemptions.read().map(|r| r.len()).unwrap_or(0)
    }
}

impl ShopStore for InMemoryStore {
    fn find_shop(&self, shop_id: ShopId) -> Result<Option<Shop>, StoreError> {
        Ok(read(&self.shops)?.get(&shop_id).cloned())
    }

    fn find_shop_by_domain(&self, domain: &str) -> Result<Option<Shop>, StoreError> {
        let domain = domain.trim().to_ascii_lowercase();
        Ok(read(&self.shops)?.values().find(|s| s.domain == domain).cloned())
    }

    fn upsert_shop(&self, shop: Shop) -> Result<Shop, StoreError> {
        let mut shops = write(&self.shops)?;
        if let Some(existing) = shops.values_mut().find(|s| s.domain == shop.domain) {
            existing.access_token = shop.access_token;
            existing.installed = true;
            existing.installed_at = shop.installed_at;
            existing.uninstalled_at = None;
            return Ok(existing.clone());
        }
        shops.insert(shop.id, shop.clone());
        Ok(shop)
    }

    fn mark_uninstalled(&self, domain: &str, at: DateTime<Utc>) -> Result<Option<Shop>, StoreError> {
        let domain = domain.trim().to_ascii_lowercase();
        let mut shops = write(&self.shops)?;
        Ok(shops.values_mut().find(|s| s.domain == domain).map(|shop| {
            shop.mark_uninstalled(at);
            shop.clone()
        }))
    }
}

impl QuestStore for InMemoryStore {
    fn insert_quest(&self, quest: Quest) -> Result<(), StoreError> {
        let mut quests = write(&self.quests)?;
        if quests.contains_key(&quest.id) {
            return Err(StoreError::Conflict(format!("quest {} already exists", quest.id)));
        }
        quests.insert(quest.id, quest);
        Ok(())
    }

    fn get_quest(&self, shop_id: ShopId, quest_id: QuestId) -> Result<Option<Quest>, StoreError> {
        Ok(read(&self.quests)?
            .get(&quest_id)
            .filter(|q| q.shop_id == shop_id)
            .cloned())
    }

    fn list_quests(&self, shop_id: ShopId) -> Result<Vec<Quest>, StoreError> {
        let mut quests: Vec<_> = read(&self.quests)?
            .values()
            .filter(|q| q.shop_id == shop_id)
            .cloned()
            .collect();
        newest_first(&mut quests);
        Ok(quests)
    }

    fn active_quests(&self, shop_id: ShopId, now: DateTime<Utc>) -> Result<Vec<Quest>, StoreError> {
        let mut quests: Vec<_> = read(&self.quests)?
            .values()
            .filter(|q| q.shop_id == shop_id && q.is_live(now))
            .cloned()
            .collect();
        newest_first(&mut quests);
        Ok(quests)
    }

    fn set_quest_active(
        &self,
        shop_id: ShopId,
        quest_id: QuestId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Quest, StoreError> {
        let mut quests = write(&self.quests)?;
        let quest = quests
            .get_mut(&quest_id)
            .filter(|q| q.shop_id == shop_id)
            .ok_or_else(|| StoreError::NotFound(format!("quest {quest_id}")))?;
        quest.set_active(active, now);
        Ok(quest.clone())
    }
}

impl ProgressStore for InMemoryStore {
    fn get_or_create_progress(
        &self,
        key: &ProgressKey,
        target_value: u64,
        now: DateTime<Utc>,
    ) -> Result<Progress, StoreError> {
        let mut progress = write(&self.progress)?;
        Ok(progress
            .entry(key.clone())
            .or_insert_with(|| Progress::new(key.clone(), target_value, now))
            .clone())
    }

    fn find_progress(&self, key: &ProgressKey) -> Result<Option<Progress>, StoreError> {
        Ok(read(&self.progress)?.get(key).cloned())
    }

    fn apply_increment(
        &self,
        key: &ProgressKey,
        order_id: &OrderId,
        amount: u64,
        now: DateTime<Utc>,
        is_completed: &dyn Fn(u64, u64) -> bool,
    ) -> Result<ProgressUpdate, StoreError> {
        let mut progress = write(&self.progress)?;
        let record = progress
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("progress for quest {}", key.quest_id)))?;
        let outcome = record.apply_increment(order_id, amount, now, is_completed);
        Ok(ProgressUpdate {
            progress: record.clone(),
            outcome,
        })
    }

    fn mark_rewarded(&self, key: &ProgressKey, reward_id: RewardId, now: DateTime<Utc>) -> Result<Progress, StoreError> {
        let mut progress = write(&self.progress)?;
        let record = progress
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("progress for quest {}", key.quest_id)))?;
        record.mark_rewarded(reward_id, now)?;
        Ok(record.clone())
    }

    fn list_customer_progress(&self, shop_id: ShopId, customer_id: &CustomerId) -> Result<Vec<Progress>, StoreError> {
        let mut records: Vec<_> = read(&self.progress)?
            .values()
            .filter(|p| p.shop_id == shop_id && &p.customer_id == customer_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

impl RedemptionStore for InMemoryStore {
    fn find_redemption(&self, key: &RedemptionKey) -> Result<Option<Redemption>, StoreError> {
        Ok(read(&self.redemptions)?.get(key).cloned())
    }

    fn create_redemption(&self, new: NewRedemption) -> Result<RedemptionInsert, StoreError> {
        let mut redemptions = write(&self.redemptions)?;
        if let Some(existing) = redemptions.get(&new.key) {
            return Ok(RedemptionInsert::Existing(existing.clone()));
        }
        let code_taken = redemptions
            .values()
            .any(|r| r.shop_id == new.key.shop_id && r.discount_code.eq_ignore_ascii_case(&new.discount_code));
        if code_taken {
            return Err(StoreError::Conflict(format!("discount code {} already issued", new.discount_code)));
        }
        let redemption = new.into_redemption();
        redemptions.insert(redemption.key(), redemption.clone());
        Ok(RedemptionInsert::Created(redemption))
    }

    fn mark_redeemed(
        &self,
        shop_id: ShopId,
        code: &str,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<Option<Redemption>, StoreError> {
        let mut redemptions = write(&self.redemptions)?;
        Ok(redemptions
            .values_mut()
            .find(|r| r.shop_id == shop_id && r.discount_code.eq_ignore_ascii_case(code))
            .map(|r| {
                r.mark_redeemed(order_id.clone(), at);
                r.clone()
            }))
    }

    fn list_customer_redemptions(
        &self,
        shop_id: ShopId,
        customer_id: &CustomerId,
    ) -> Result<Vec<Redemption>, StoreError> {
        let mut records: Vec<_> = read(&self.redemptions)?
            .values()
            .filter(|r| r.shop_id == shop_id && &r.customer_id == customer_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(records)
    }
}
