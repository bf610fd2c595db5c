//! `questline-core`: identifiers and the domain error model.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{ConditionId, CustomerId, OrderId, ProductId, QuestId, RedemptionId, RewardId, ShopId};
