//! Shopify Admin REST discount issuer.
//!
//! Issuance is two calls: create a price rule scoped to one use per customer,
//! then attach a discount code to it. The request bodies are built by pure
//! functions so they can be checked without a network.

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use questline_quests::{RewardConfig, Shop};

use super::{DiscountSeed, IssuanceError, IssuedDiscount, RewardIssuer, generate_code};

pub const DEFAULT_API_VERSION: &str = "2024-10";

/// Authenticated JSON calls against a shop's Admin API.
pub trait AdminTransport: Send + Sync {
    fn post(&self, url: &str, access_token: &str, body: &Value) -> Result<Value, IssuanceError>;

    fn delete(&self, url: &str, access_token: &str) -> Result<(), IssuanceError>;
}

/// Blocking reqwest transport.
pub struct RestTransport {
    client: reqwest::blocking::Client,
}

impl RestTransport {
    /// Builds a blocking HTTP client; call outside an async runtime.
    pub fn new() -> Result<Self, IssuanceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| IssuanceError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response, IssuanceError> {
        let resp = request.send().map_err(|e| IssuanceError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IssuanceError::Rejected {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(resp)
    }
}

impl AdminTransport for RestTransport {
    fn post(&self, url: &str, access_token: &str, body: &Value) -> Result<Value, IssuanceError> {
        let request = self
            .client
            .post(url)
            .header("X-Shopify-Access-Token", access_token)
            .json(body);
        self.send(request)?
            .json::<Value>()
            .map_err(|e| IssuanceError::Parse(e.to_string()))
    }

    fn delete(&self, url: &str, access_token: &str) -> Result<(), IssuanceError> {
        let request = self.client.delete(url).header("X-Shopify-Access-Token", access_token);
        self.send(request).map(|_| ())
    }
}

pub struct ShopifyDiscountIssuer<T = RestTransport> {
    transport: T,
    api_version: String,
    /// Replaces `https://{shop domain}` when set.
    base_url: Option<String>,
}

impl ShopifyDiscountIssuer {
    /// Builds a blocking HTTP client; call outside an async runtime.
    pub fn new(api_version: impl Into<String>) -> Result<Self, IssuanceError> {
        Ok(Self::with_transport(RestTransport::new()?, api_version))
    }
}

impl<T: AdminTransport> ShopifyDiscountIssuer<T> {
    pub fn with_transport(transport: T, api_version: impl Into<String>) -> Self {
        Self {
            transport,
            api_version: api_version.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, shop: &Shop, path: &str) -> String {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{}", shop.domain),
        };
        format!("{base}/admin/api/{}/{path}", self.api_version)
    }

    fn post(&self, shop: &Shop, path: &str, body: &Value) -> Result<Value, IssuanceError> {
        self.transport.post(&self.endpoint(shop, path), &shop.access_token, body)
    }

    /// Remove a price rule left without a code. Failure is logged only.
    fn discard_rule(&self, shop: &Shop, rule_id: u64) {
        let url = self.endpoint(shop, &format!("price_rules/{rule_id}.json"));
        match self.transport.delete(&url, &shop.access_token) {
            Ok(()) => debug!(shop = %shop.domain, rule_id, "orphaned price rule deleted"),
            Err(e) => warn!(shop = %shop.domain, rule_id, error = %e, "could not delete orphaned price rule"),
        }
    }
}

impl<T> core::fmt::Debug for ShopifyDiscountIssuer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShopifyDiscountIssuer")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl<T: AdminTransport> RewardIssuer for ShopifyDiscountIssuer<T> {
    fn create_discount(
        &self,
        shop: &Shop,
        reward: &RewardConfig,
        seed: &DiscountSeed,
    ) -> Result<IssuedDiscount, IssuanceError> {
        let code = generate_code(reward.reward_type(), seed.quest_id);
        let rule = price_rule_body(reward, seed, &code)?;

        let created = self.post(shop, "price_rules.json", &rule)?;
        let rule_id = created
            .pointer("/price_rule/id")
            .and_then(Value::as_u64)
            .ok_or_else(|| IssuanceError::Parse("price_rule.id missing".to_string()))?;
        debug!(shop = %shop.domain, rule_id, "price rule created");

        let attached = self.post(
            shop,
            &format!("price_rules/{rule_id}/discount_codes.json"),
            &discount_code_body(&code),
        );
        if let Err(e) = attached {
            // A retry creates a fresh rule; this one would never get a code.
            self.discard_rule(shop, rule_id);
            return Err(e);
        }
        info!(shop = %shop.domain, rule_id, code = %code, reward_type = %reward.reward_type(), "discount issued");

        Ok(IssuedDiscount {
            code,
            platform_reference: Some(rule_id.to_string()),
        })
    }
}

fn negated(value: Decimal) -> String {
    format!("-{}", value.normalize())
}

/// Request body for `POST price_rules.json`.
pub fn price_rule_body(
    reward: &RewardConfig,
    seed: &DiscountSeed,
    code: &str,
) -> Result<Value, IssuanceError> {
    let (target_type, value_type, value, allocation_method) = match reward {
        RewardConfig::DiscountPercentage(c) => ("line_item", "percentage", negated(c.percentage), "across"),
        RewardConfig::DiscountFixed(c) => ("line_item", "fixed_amount", negated(c.amount), "across"),
        RewardConfig::FreeShipping(_) => ("shipping_line", "percentage", "-100".to_string(), "each"),
        RewardConfig::Custom(_) => return Err(IssuanceError::Unsupported(reward.reward_type())),
    };

    let mut rule = json!({
        "title": format!("Quest reward {code}"),
        "target_type": target_type,
        "target_selection": "all",
        "allocation_method": allocation_method,
        "value_type": value_type,
        "value": value,
        "customer_selection": "all",
        "once_per_customer": true,
        "usage_limit": 1,
        "starts_at": seed.issued_at.to_rfc3339(),
        "ends_at": seed.expires_at.to_rfc3339(),
    });

    if let Some(minimum) = reward.minimum_order_value() {
        rule["prerequisite_subtotal_range"] = json!({
            "greater_than_or_equal_to": minimum.normalize().to_string(),
        });
    }

    Ok(json!({ "price_rule": rule }))
}

/// Request body for `POST price_rules/{id}/discount_codes.json`.
pub fn discount_code_body(code: &str) -> Value {
    json!({ "discount_code": { "code": code } })
}
