//! App-proxy request signatures.
//!
//! The platform forwards storefront requests with the query string signed:
//! every parameter except `signature`, sorted by key, rendered `key=value`
//! (repeated keys joined with `,`) and concatenated without separators, then
//! HMAC-SHA256'd and hex encoded.

use std::collections::BTreeMap;

use crate::webhook::{SignatureError, WebhookVerifier};

const SIGNATURE: &str = "signature";
const SHOP: &str = "shop";
const LOGGED_IN_CUSTOMER_ID: &str = "logged_in_customer_id";

/// Decoded query parameters of an app-proxy request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyParams {
    params: BTreeMap<String, Vec<String>>,
}

impl ProxyParams {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in pairs {
            params.entry(k.into()).or_default().push(v.into());
        }
        Self { params }
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn signature(&self) -> Option<&str> {
        self.first(SIGNATURE)
    }

    pub fn shop(&self) -> Option<&str> {
        self.first(SHOP)
    }

    /// Present only when a customer is logged in to the storefront.
    pub fn logged_in_customer_id(&self) -> Option<&str> {
        self.first(LOGGED_IN_CUSTOMER_ID)
    }
}

/// The byte string the platform signs for `params`.
pub fn canonical_proxy_message(params: &ProxyParams) -> String {
    params
        .params
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE)
        .map(|(key, values)| format!("{key}={}", values.join(",")))
        .collect()
}

impl WebhookVerifier {
    /// Verify an app-proxy query. Fails closed when `signature` is absent.
    pub fn verify_proxy(&self, params: &ProxyParams) -> Result<(), SignatureError> {
        let signature = params.signature().ok_or(SignatureError::Missing)?;
        let message = canonical_proxy_message(params);
        let outcome = self.verify_hex(message.as_bytes(), signature);
        if outcome.is_err() {
            tracing::debug!(shop = params.shop().unwrap_or_default(), "app proxy signature rejected");
        }
        outcome
    }
}
