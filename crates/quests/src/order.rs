//! Inbound order events as delivered by the commerce platform.
//!
//! Only the fields the quest engine reads are modelled; unknown fields are
//! ignored on deserialization.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use questline_core::{CustomerId, OrderId, ProductId};

/// Financial status value that makes an order count toward progress.
pub const PAID: &str = "paid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<u64>,
    #[serde(default)]
    pub customer: Option<OrderCustomer>,
    /// `paid`, `pending`, `refunded`, ...
    pub financial_status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub discount_codes: Vec<OrderDiscountCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCustomer {
    pub id: CustomerId,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub title: String,
    pub quantity: u64,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDiscountCode {
    pub code: String,
}

impl OrderEvent {
    pub fn customer_id(&self) -> Option<&CustomerId> {
        self.customer.as_ref().map(|c| &c.id)
    }

    pub fn is_paid(&self) -> bool {
        self.financial_status == PAID
    }

    /// Whether the order was placed at or after `cutoff`.
    pub fn placed_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at >= cutoff
    }
}

/// Convert a decimal amount to integer minor units (cents), rounding half away
/// from zero. Negative or unrepresentable amounts yield `None`.
pub fn to_minor_units(amount: Decimal) -> Option<u64> {
    if amount.is_sign_negative() {
        return None;
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
}
