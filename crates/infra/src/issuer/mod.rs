//! External reward issuer contract.
//!
//! The reward worker depends only on [`RewardIssuer`]: given a shop, a reward
//! configuration and a seed, produce a discount code on the platform. The
//! issuer is assumed non-idempotent; at-most-once issuance is enforced by the
//! worker's check-then-write protocol against the redemption store.

pub mod code;
pub mod shopify;

pub use code::{code_prefix, generate_code};
pub use shopify::{AdminTransport, RestTransport, ShopifyDiscountIssuer};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use questline_core::{CustomerId, QuestId};
use questline_quests::{RewardConfig, RewardType, Shop};

/// Inputs that make one issuance unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountSeed {
    pub quest_id: QuestId,
    pub customer_id: CustomerId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A discount created on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedDiscount {
    pub code: String,
    /// Platform-side rule id, when the platform returns one.
    pub platform_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssuanceError {
    #[error("reward type {0} cannot be issued as a discount")]
    Unsupported(RewardType),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("platform rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected platform response: {0}")]
    Parse(String),
}

impl IssuanceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IssuanceError::Unsupported(_))
    }
}

pub trait RewardIssuer: Send + Sync {
    fn create_discount(
        &self,
        shop: &Shop,
        reward: &RewardConfig,
        seed: &DiscountSeed,
    ) -> Result<IssuedDiscount, IssuanceError>;
}

impl<I: RewardIssuer + ?Sized> RewardIssuer for Arc<I> {
    fn create_discount(
        &self,
        shop: &Shop,
        reward: &RewardConfig,
        seed: &DiscountSeed,
    ) -> Result<IssuedDiscount, IssuanceError> {
        (**self).create_discount(shop, reward, seed)
    }
}

/// Reward type -> issuer.
#[derive(Clone, Default)]
pub struct IssuerRegistry {
    issuers: HashMap<RewardType, Arc<dyn RewardIssuer>>,
}

impl IssuerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `issuer` for the three platform discount types.
    pub fn with_discount_issuer(issuer: Arc<dyn RewardIssuer>) -> Self {
        let mut registry = Self::new();
        for reward_type in [
            RewardType::DiscountPercentage,
            RewardType::DiscountFixed,
            RewardType::FreeShipping,
        ] {
            registry.register(reward_type, issuer.clone());
        }
        registry
    }

    pub fn register(&mut self, reward_type: RewardType, issuer: Arc<dyn RewardIssuer>) {
        self.issuers.insert(reward_type, issuer);
    }

    pub fn get(&self, reward_type: RewardType) -> Option<&Arc<dyn RewardIssuer>> {
        self.issuers.get(&reward_type)
    }
}

impl core::fmt::Debug for IssuerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<_> = self.issuers.keys().map(RewardType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("IssuerRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl RewardIssuer for Nop {
        fn create_discount(
            &self,
            _shop: &Shop,
            _reward: &RewardConfig,
            _seed: &DiscountSeed,
        ) -> Result<IssuedDiscount, IssuanceError> {
            Ok(IssuedDiscount {
                code: "X".to_string(),
                platform_reference: None,
            })
        }
    }

    #[test]
    fn discount_issuer_covers_platform_types_only() {
        let registry = IssuerRegistry::with_discount_issuer(Arc::new(Nop));
        assert!(registry.get(RewardType::DiscountPercentage).is_some());
        assert!(registry.get(RewardType::DiscountFixed).is_some());
        assert!(registry.get(RewardType::FreeShipping).is_some());
        assert!(registry.get(RewardType::Custom).is_none());
    }

    #[test]
    fn only_unsupported_is_permanent() {
        assert!(!IssuanceError::Unsupported(RewardType::Custom).is_retryable());
        assert!(IssuanceError::Transport("reset".into()).is_retryable());
        assert!(IssuanceError::Rejected { status: 422, body: String::new() }.is_retryable());
    }
}
