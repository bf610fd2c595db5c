use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use questline_core::{CustomerId, OrderId, QuestId, RedemptionId, RewardId, ShopId};

/// At most one redemption exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionKey {
    pub shop_id: ShopId,
    pub quest_id: QuestId,
    pub reward_id: RewardId,
    pub customer_id: CustomerId,
}

/// Record of an issued reward and its later use at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: RedemptionId,
    pub shop_id: ShopId,
    pub quest_id: QuestId,
    pub reward_id: RewardId,
    pub customer_id: CustomerId,
    pub discount_code: String,
    /// Platform-side identifier of the created discount, when there is one.
    pub platform_reference: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_order_id: Option<OrderId>,
}

/// `issued_at` plus `days`, or `None` past the representable range.
pub fn expiry_after(issued_at: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|validity| issued_at.checked_add_signed(validity))
}

/// Everything needed to persist a redemption after a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRedemption {
    pub key: RedemptionKey,
    pub discount_code: String,
    pub platform_reference: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewRedemption {
    pub fn into_redemption(self) -> Redemption {
        Redemption {
            id: RedemptionId::new(),
            shop_id: self.key.shop_id,
            quest_id: self.key.quest_id,
            reward_id: self.key.reward_id,
            customer_id: self.key.customer_id,
            discount_code: self.discount_code,
            platform_reference: self.platform_reference,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            redeemed_at: None,
            redeemed_order_id: None,
        }
    }
}

impl Redemption {
    pub fn key(&self) -> RedemptionKey {
        RedemptionKey {
            shop_id: self.shop_id,
            quest_id: self.quest_id,
            reward_id: self.reward_id,
            customer_id: self.customer_id.clone(),
        }
    }

    pub fn is_redeemed(&self) -> bool {
        self.redeemed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Attach checkout data. First write wins: returns `false` if already redeemed.
    pub fn mark_redeemed(&mut self, order_id: OrderId, at: DateTime<Utc>) -> bool {
        if self.is_redeemed() {
            return false;
        }
        self.redeemed_at = Some(at);
        self.redeemed_order_id = Some(order_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_redemption(issued_at: DateTime<Utc>) -> NewRedemption {
        NewRedemption {
            key: RedemptionKey {
                shop_id: ShopId::new(),
                quest_id: QuestId::new(),
                reward_id: RewardId::new(),
                customer_id: CustomerId::parse("7").unwrap(),
            },
            discount_code: "QUEST-0190A1B2-K3ZQ".to_string(),
            platform_reference: None,
            issued_at,
            expires_at: expiry_after(issued_at, 30).unwrap(),
        }
    }

    #[test]
    fn expiry_is_issue_time_plus_days() {
        let issued = Utc::now();
        let r = new_redemption(issued).into_redemption();
        assert_eq!(r.expires_at - r.issued_at, Duration::days(30));
        assert!(!r.is_expired(issued + Duration::days(29)));
        assert!(r.is_expired(issued + Duration::days(31)));
    }

    #[test]
    fn expiry_beyond_the_calendar_is_rejected() {
        let issued = Utc::now();
        assert_eq!(expiry_after(issued, 7), Some(issued + Duration::days(7)));
        assert_eq!(expiry_after(issued, u32::MAX), None);
    }

    #[test]
    fn redemption_is_first_write_wins() {
        let now = Utc::now();
        let mut r = new_redemption(now).into_redemption();
        let first = OrderId::parse("1001").unwrap();
        assert!(r.mark_redeemed(first.clone(), now));
        assert!(!r.mark_redeemed(OrderId::parse("1002").unwrap(), now));
        assert_eq!(r.redeemed_order_id, Some(first));
    }
}
