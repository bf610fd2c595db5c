//! redb-backed store.
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `shops` | shop id | `ShopRecord` |
//! | `shop_domains` | domain | shop id |
//! | `quests` | quest id | `Quest` |
//! | `progress` | `shop/quest/customer` | `Progress` |
//! | `redemptions` | `shop/quest/reward/customer` | `Redemption` |
//! | `redemption_codes` | `shop/CODE` | redemption key |
//!
//! Values are JSON. Every mutation runs in one write transaction; redb admits
//! a single writer at a time, so read-modify-write is atomic per key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use questline_core::{CustomerId, OrderId, QuestId, RewardId, ShopId};
use questline_quests::{NewRedemption, Progress, ProgressKey, Quest, Redemption, RedemptionKey, Shop};

use super::{
    ProgressStore, ProgressUpdate, QuestStore, RedemptionInsert, RedemptionStore, ShopStore,
    StoreError,
};
use crate::database::from_redb_errors;

type Records = TableDefinition<'static, &'static str, &'static [u8]>;
type Index = TableDefinition<'static, &'static str, &'static str>;

const SHOPS: Records = TableDefinition::new("shops");
const SHOP_DOMAINS: Index = TableDefinition::new("shop_domains");
const QUESTS: Records = TableDefinition::new("quests");
const PROGRESS: Records = TableDefinition::new("progress");
const REDEMPTIONS: Records = TableDefinition::new("redemptions");
const REDEMPTION_CODES: Index = TableDefinition::new("redemption_codes");

from_redb_errors!(StoreError, Unavailable);

/// Persisted shop. Unlike `Shop`'s own serialization it keeps the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShopRecord {
    id: ShopId,
    domain: String,
    access_token: String,
    installed: bool,
    installed_at: DateTime<Utc>,
    uninstalled_at: Option<DateTime<Utc>>,
}

impl From<&Shop> for ShopRecord {
    fn from(shop: &Shop) -> Self {
        Self {
            id: shop.id,
            domain: shop.domain.clone(),
            access_token: shop.access_token.clone(),
            installed: shop.installed,
            installed_at: shop.installed_at,
            uninstalled_at: shop.uninstalled_at,
        }
    }
}

impl From<ShopRecord> for Shop {
    fn from(record: ShopRecord) -> Self {
        Shop {
            id: record.id,
            domain: record.domain,
            access_token: record.access_token,
            installed: record.installed,
            installed_at: record.installed_at,
            uninstalled_at: record.uninstalled_at,
        }
    }
}

fn progress_key(key: &ProgressKey) -> String {
    format!("{}/{}/{}", key.shop_id, key.quest_id, key.customer_id)
}

fn redemption_key(key: &RedemptionKey) -> String {
    format!("{}/{}/{}/{}", key.shop_id, key.quest_id, key.reward_id, key.customer_id)
}

/// Codes are matched case-insensitively within a shop.
fn code_key(shop_id: ShopId, code: &str) -> String {
    format!("{shop_id}/{}", code.trim().to_ascii_uppercase())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn load<T, R>(table: &R, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    table.get(key)?.map(|guard| decode(guard.value())).transpose()
}

fn put<T: Serialize>(table: &mut Table<'_, &'static str, &'static [u8]>, key: &str, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

fn newest_first(quests: &mut [Quest]) {
    quests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Wrap `db`, creating the store's tables if they do not exist yet.
    pub fn new(db: Arc<Database>) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        {
            txn.open_table(SHOPS)?;
            txn.open_table(SHOP_DOMAINS)?;
            txn.open_table(QUESTS)?;
            txn.open_table(PROGRESS)?;
            txn.open_table(REDEMPTIONS)?;
            txn.open_table(REDEMPTION_CODES)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    fn get<T: DeserializeOwned>(&self, table: Records, key: &str) -> Result<Option<T>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        load(&table, key)
    }

    fn scan<T: DeserializeOwned>(&self, table: Records, keep: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: T = decode(value.value())?;
            if keep(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Run `op` in a write transaction, committing only if it succeeds.
    fn write<T>(&self, op: impl FnOnce(&WriteTransaction) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let txn = self.db.begin_write()?;
        let value = op(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    fn shop_id_for_domain(&self, domain: &str) -> Result<Option<String>, StoreError> {
        let txn = self.db.begin_read()?;
        let domains = txn.open_table(SHOP_DOMAINS)?;
        Ok(domains.get(domain)?.map(|guard| guard.value().to_string()))
    }
}

impl core::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl ShopStore for RedbStore {
    fn find_shop(&self, shop_id: ShopId) -> Result<Option<Shop>, StoreError> {
        Ok(self.get::<ShopRecord>(SHOPS, &shop_id.to_string())?.map(Shop::from))
    }

    fn find_shop_by_domain(&self, domain: &str) -> Result<Option<Shop>, StoreError> {
        let domain = domain.trim().to_ascii_lowercase();
        match self.shop_id_for_domain(&domain)? {
            Some(id) => Ok(self.get::<ShopRecord>(SHOPS, &id)?.map(Shop::from)),
            None => Ok(None),
        }
    }

    fn upsert_shop(&self, shop: Shop) -> Result<Shop, StoreError> {
        self.write(|txn| {
            let mut shops = txn.open_table(SHOPS)?;
            let mut domains = txn.open_table(SHOP_DOMAINS)?;

            let existing_id = domains.get(shop.domain.as_str())?.map(|guard| guard.value().to_string());
            if let Some(id) = existing_id {
                if let Some(mut existing) = load::<ShopRecord, _>(&shops, &id)? {
                    existing.access_token = shop.access_token;
                    existing.installed = true;
                    existing.installed_at = shop.installed_at;
                    existing.uninstalled_at = None;
                    put(&mut shops, &id, &existing)?;
                    return Ok(existing.into());
                }
            }

            let id = shop.id.to_string();
            put(&mut shops, &id, &ShopRecord::from(&shop))?;
            domains.insert(shop.domain.as_str(), id.as_str())?;
            Ok(shop)
        })
    }

    fn mark_uninstalled(&self, domain: &str, at: DateTime<Utc>) -> Result<Option<Shop>, StoreError> {
        let domain = domain.trim().to_ascii_lowercase();
        self.write(|txn| {
            let mut shops = txn.open_table(SHOPS)?;
            let domains = txn.open_table(SHOP_DOMAINS)?;
            let Some(id) = domains.get(domain.as_str())?.map(|guard| guard.value().to_string()) else {
                return Ok(None);
            };
            let Some(record) = load::<ShopRecord, _>(&shops, &id)? else {
                return Ok(None);
            };
            let mut shop = Shop::from(record);
            shop.mark_uninstalled(at);
            put(&mut shops, &id, &ShopRecord::from(&shop))?;
            Ok(Some(shop))
        })
    }
}

impl QuestStore for RedbStore {
    fn insert_quest(&self, quest: Quest) -> Result<(), StoreError> {
        self.write(|txn| {
            let mut quests = txn.open_table(QUESTS)?;
            let id = quest.id.to_string();
            if quests.get(id.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!("quest {} already exists", quest.id)));
            }
            put(&mut quests, &id, &quest)
        })
    }

    fn get_quest(&self, shop_id: ShopId, quest_id: QuestId) -> Result<Option<Quest>, StoreError> {
        Ok(self
            .get::<Quest>(QUESTS, &quest_id.to_string())?
            .filter(|q| q.shop_id == shop_id))
    }

    fn list_quests(&self, shop_id: ShopId) -> Result<Vec<Quest>, StoreError> {
        let mut quests = self.scan(QUESTS, |q: &Quest| q.shop_id == shop_id)?;
        newest_first(&mut quests);
        Ok(quests)
    }

    fn active_quests(&self, shop_id: ShopId, now: DateTime<Utc>) -> Result<Vec<Quest>, StoreError> {
        let mut quests = self.scan(QUESTS, |q: &Quest| q.shop_id == shop_id && q.is_live(now))?;
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
        self.write(|txn| {
            let mut quests = txn.open_table(QUESTS)?;
            let id = quest_id.to_string();
            let mut quest = load::<Quest, _>(&quests, &id)?
                .filter(|q| q.shop_id == shop_id)
                .ok_or_else(|| StoreError::NotFound(format!("quest {quest_id}")))?;
            quest.set_active(active, now);
            put(&mut quests, &id, &quest)?;
            Ok(quest)
        })
    }
}

impl ProgressStore for RedbStore {
    fn get_or_create_progress(
        &self,
        key: &ProgressKey,
        target_value: u64,
        now: DateTime<Utc>,
    ) -> Result<Progress, StoreError> {
        self.write(|txn| {
            let mut progress = txn.open_table(PROGRESS)?;
            let id = progress_key(key);
            if let Some(existing) = load::<Progress, _>(&progress, &id)? {
                return Ok(existing);
            }
            let created = Progress::new(key.clone(), target_value, now);
            put(&mut progress, &id, &created)?;
            Ok(created)
        })
    }

    fn find_progress(&self, key: &ProgressKey) -> Result<Option<Progress>, StoreError> {
        self.get(PROGRESS, &progress_key(key))
    }

    fn apply_increment(
        &self,
        key: &ProgressKey,
        order_id: &OrderId,
        amount: u64,
        now: DateTime<Utc>,
        is_completed: &dyn Fn(u64, u64) -> bool,
    ) -> Result<ProgressUpdate, StoreError> {
        self.write(|txn| {
            let mut progress = txn.open_table(PROGRESS)?;
            let id = progress_key(key);
            let mut record = load::<Progress, _>(&progress, &id)?
                .ok_or_else(|| StoreError::NotFound(format!("progress for quest {}", key.quest_id)))?;
            let outcome = record.apply_increment(order_id, amount, now, is_completed);
            put(&mut progress, &id, &record)?;
            Ok(ProgressUpdate {
                progress: record,
                outcome,
            })
        })
    }

    fn mark_rewarded(&self, key: &ProgressKey, reward_id: RewardId, now: DateTime<Utc>) -> Result<Progress, StoreError> {
        self.write(|txn| {
            let mut progress = txn.open_table(PROGRESS)?;
            let id = progress_key(key);
            let mut record = load::<Progress, _>(&progress, &id)?
                .ok_or_else(|| StoreError::NotFound(format!("progress for quest {}", key.quest_id)))?;
            record.mark_rewarded(reward_id, now)?;
            put(&mut progress, &id, &record)?;
            Ok(record)
        })
    }

    fn list_customer_progress(&self, shop_id: ShopId, customer_id: &CustomerId) -> Result<Vec<Progress>, StoreError> {
        let mut records = self.scan(PROGRESS, |p: &Progress| {
            p.shop_id == shop_id && &p.customer_id == customer_id
        })?;
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

impl RedemptionStore for RedbStore {
    fn find_redemption(&self, key: &RedemptionKey) -> Result<Option<Redemption>, StoreError> {
        self.get(REDEMPTIONS, &redemption_key(key))
    }

    fn create_redemption(&self, new: NewRedemption) -> Result<RedemptionInsert, StoreError> {
        self.write(|txn| {
            let mut redemptions = txn.open_table(REDEMPTIONS)?;
            let mut codes = txn.open_table(REDEMPTION_CODES)?;
            let id = redemption_key(&new.key);
            if let Some(existing) = load::<Redemption, _>(&redemptions, &id)? {
                return Ok(RedemptionInsert::Existing(existing));
            }
            let code = code_key(new.key.shop_id, &new.discount_code);
            if codes.get(code.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!("discount code {} already issued", new.discount_code)));
            }
            let redemption = new.into_redemption();
            put(&mut redemptions, &id, &redemption)?;
            codes.insert(code.as_str(), id.as_str())?;
            Ok(RedemptionInsert::Created(redemption))
        })
    }

    fn mark_redeemed(
        &self,
        shop_id: ShopId,
        code: &str,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<Option<Redemption>, StoreError> {
        self.write(|txn| {
            let mut redemptions = txn.open_table(REDEMPTIONS)?;
            let codes = txn.open_table(REDEMPTION_CODES)?;
            let Some(id) = codes
                .get(code_key(shop_id, code).as_str())?
                .map(|guard| guard.value().to_string())
            else {
                return Ok(None);
            };
            let Some(mut redemption) = load::<Redemption, _>(&redemptions, &id)? else {
                return Ok(None);
            };
            redemption.mark_redeemed(order_id.clone(), at);
            put(&mut redemptions, &id, &redemption)?;
            Ok(Some(redemption))
        })
    }

    fn list_customer_redemptions(
        &self,
        shop_id: ShopId,
        customer_id: &CustomerId,
    ) -> Result<Vec<Redemption>, StoreError> {
        let mut records = self.scan(REDEMPTIONS, |r: &Redemption| {
            r.shop_id == shop_id && &r.customer_id == customer_id
        })?;
        records.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(records)
    }
}
