use questline_core::CustomerId;
use questline_quests::Shop;

/// App-proxy request context: the verified shop and the logged-in customer.
///
/// Inserted by the proxy middleware; present on every `/proxy` route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyContext {
    shop: Shop,
    customer_id: CustomerId,
}

impl ProxyContext {
    pub fn new(shop: Shop, customer_id: CustomerId) -> Self {
        Self { shop, customer_id }
    }

    pub fn shop(&self) -> &Shop {
        &self.shop
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }
}
