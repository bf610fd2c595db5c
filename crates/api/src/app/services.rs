//! Service wiring: stores, queues, verifier and worker context.

use std::sync::Arc;

use tracing::info;

use questline_auth::{SignatureError, WebhookVerifier};
use questline_infra::database;
use questline_infra::issuer::IssuerRegistry;
use questline_infra::jobs::{InMemoryJobStore, JobQueue, JobStoreError, RedbJobStore};
use questline_infra::store::{InMemoryStore, RedbStore, StoreError};
use questline_infra::workers::WorkerContext;
use questline_quests::EvaluatorRegistry;

use crate::config::ApiConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("could not open database: {0}")]
    Database(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jobs(#[from] JobStoreError),
}

/// Everything request handlers need. Shared behind an `Arc`.
#[derive(Debug)]
pub struct AppServices {
    pub verifier: WebhookVerifier,
    /// Queue and store handles, shared with the worker pools.
    pub workers: WorkerContext,
}

impl AppServices {
    /// Stores and queues live in the redb file named by `config.database_path`,
    /// or in memory without one. `issuers` decides how rewards reach the platform.
    pub fn new(config: &ApiConfig, issuers: IssuerRegistry) -> Result<Self, ServicesError> {
        let verifier = WebhookVerifier::new(config.shopify_api_secret.as_bytes())?;
        let evaluators = EvaluatorRegistry::with_defaults();

        let workers = match &config.database_path {
            Some(path) => {
                let db = database::open(path).map_err(|e| ServicesError::Database(e.to_string()))?;
                let store = Arc::new(RedbStore::new(db.clone())?);
                let queue = JobQueue::new(RedbJobStore::arc(db)?, config.queue_settings());
                info!(path = %path.display(), "using durable storage");
                WorkerContext::new(store, queue, evaluators, issuers)
            }
            None => {
                let store = Arc::new(InMemoryStore::new());
                let queue = JobQueue::new(InMemoryJobStore::arc(), config.queue_settings());
                info!("using in-memory storage");
                WorkerContext::new(store, queue, evaluators, issuers)
            }
        };
        Ok(Self { verifier, workers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use questline_infra::jobs::{JobStore, QueueName};
    use questline_infra::store::ShopStore;
    use questline_quests::Shop;

    fn config(database_path: Option<&std::path::Path>) -> ApiConfig {
        ApiConfig::from_lookup(|key: &str| match key {
            "SHOPIFY_API_SECRET" => Some("s3cret".to_string()),
            "DATABASE_PATH" => database_path.map(|p| p.display().to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn durable_services_keep_state_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questline.redb");

        let shop_id = {
            let services = AppServices::new(&config(Some(&path)), IssuerRegistry::new()).unwrap();
            let shop = Shop::new("demo.myshopify.com", "shpat_test", Utc::now()).unwrap();
            let shop_id = services.workers.shops.upsert_shop(shop).unwrap().id;
            services
                .workers
                .queue
                .enqueue(QueueName::OrderProcessing, "process-order", &serde_json::json!({ "n": 1 }))
                .unwrap();
            shop_id
        };

        let services = AppServices::new(&config(Some(&path)), IssuerRegistry::new()).unwrap();
        let shop = services.workers.shops.find_shop(shop_id).unwrap().unwrap();
        assert_eq!(shop.access_token, "shpat_test");
        let stats = services.workers.queue.store().stats(QueueName::OrderProcessing).unwrap();
        assert_eq!(stats.waiting, 1);
    }

    #[test]
    fn memory_services_start_empty() {
        let services = AppServices::new(&config(None), IssuerRegistry::new()).unwrap();
        assert!(services.workers.shops.find_shop_by_domain("demo.myshopify.com").unwrap().is_none());
    }
}
