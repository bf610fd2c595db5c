use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use questline_core::{DomainError, ShopId};

/// A merchant installation.
///
/// Created by the installation flow; the access token authorizes calls to the
/// platform's admin API on the shop's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    /// Platform domain, e.g. `example.myshopify.com`. Always lowercase.
    pub domain: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub installed: bool,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
}

impl Shop {
    pub fn new(
        domain: impl AsRef<str>,
        access_token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let domain = normalize_domain(domain.as_ref())?;
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(DomainError::validation("access token must not be empty"));
        }

        Ok(Self {
            id: ShopId::new(),
            domain,
            access_token,
            installed: true,
            installed_at: now,
            uninstalled_at: None,
        })
    }

    pub fn mark_uninstalled(&mut self, now: DateTime<Utc>) {
        self.installed = false;
        self.uninstalled_at = Some(now);
    }
}

/// Lowercase and validate a shop domain as sent in webhook headers.
pub fn normalize_domain(domain: &str) -> Result<String, DomainError> {
    let domain = domain.trim().to_ascii_lowercase();
    let valid = !domain.is_empty()
        && domain.contains('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(DomainError::validation(format!("invalid shop domain: {domain:?}")));
    }
    Ok(domain)
}
