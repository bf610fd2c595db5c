use std::sync::Arc;

use questline_quests::EvaluatorRegistry;

use crate::issuer::IssuerRegistry;
use crate::jobs::JobQueue;
use crate::store::{ProgressStore, QuestStore, RedemptionStore, ShopStore};

/// Handles shared by both workers. Cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: JobQueue,
    pub shops: Arc<dyn ShopStore>,
    pub quests: Arc<dyn QuestStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub redemptions: Arc<dyn RedemptionStore>,
    pub evaluators: Arc<EvaluatorRegistry>,
    pub issuers: Arc<IssuerRegistry>,
}

impl WorkerContext {
    /// Context backed by one store implementing every contract.
    pub fn new<S>(
        store: Arc<S>,
        queue: JobQueue,
        evaluators: EvaluatorRegistry,
        issuers: IssuerRegistry,
    ) -> Self
    where
        S: ShopStore + QuestStore + ProgressStore + RedemptionStore + 'static,
    {
        Self {
            queue,
            shops: store.clone(),
            quests: store.clone(),
            progress: store.clone(),
            redemptions: store,
            evaluators: Arc::new(evaluators),
            issuers: Arc::new(issuers),
        }
    }
}

impl core::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("queue", &self.queue)
            .field("evaluators", &self.evaluators)
            .field("issuers", &self.issuers)
            .finish_non_exhaustive()
    }
}
