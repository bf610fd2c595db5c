//! Merchant administration: shops, quests and queue maintenance.
//!
//! Mounted behind the bearer-token middleware.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use questline_core::{QuestId, ShopId};
use questline_infra::jobs::{JobId, JobStore, QueueName};
use questline_infra::store::{QuestStore, ShopStore};
use questline_quests::{NewQuest, Shop};

use crate::app::dto::{CreateShopRequest, FailedJobView, FailedJobsQuery, QueueStatsView};
use crate::app::{errors, services::AppServices};

const DEFAULT_FAILED_LIMIT: usize = 50;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/shops", post(register_shop))
        .route("/shops/:shop_id/quests", post(create_quest).get(list_quests))
        .route("/shops/:shop_id/quests/:quest_id/activate", post(activate_quest))
        .route("/shops/:shop_id/quests/:quest_id/deactivate", post(deactivate_quest))
        .route("/queues/:queue/stats", get(queue_stats))
        .route("/queues/:queue/failed", get(list_failed_jobs))
        .route("/queues/:queue/failed/:job_id/retry", post(retry_failed_job))
        .route("/queues/:queue/failed/:job_id", delete(delete_failed_job))
}

// ─────────────────────────────────────────────────────────────────────────────
// Path parsing
// ─────────────────────────────────────────────────────────────────────────────

fn parse_shop_id(raw: &str) -> Result<ShopId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid shop id"))
}

fn parse_quest_id(raw: &str) -> Result<QuestId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid quest id"))
}

fn parse_queue(raw: &str) -> Result<QueueName, axum::response::Response> {
    raw.parse()
        .map_err(|e: String| errors::json_error(StatusCode::NOT_FOUND, "unknown_queue", e))
}

fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"))
}

/// The shop must exist before anything is created under it.
fn require_shop(services: &AppServices, shop_id: ShopId) -> Result<Shop, axum::response::Response> {
    match services.workers.shops.find_shop(shop_id) {
        Ok(Some(shop)) => Ok(shop),
        Ok(None) => Err(errors::json_error(StatusCode::NOT_FOUND, "not_found", "shop not found")),
        Err(e) => Err(errors::store_error_to_response(e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shops
// ─────────────────────────────────────────────────────────────────────────────

/// POST /admin/shops - register (or reinstall) a shop
pub async fn register_shop(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateShopRequest>,
) -> axum::response::Response {
    let shop = match Shop::new(&body.domain, body.access_token, Utc::now()) {
        Ok(shop) => shop,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.workers.shops.upsert_shop(shop) {
        Ok(shop) => {
            info!(shop_id = %shop.id, shop = %shop.domain, "shop registered");
            (StatusCode::CREATED, Json(shop)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Quests
// ─────────────────────────────────────────────────────────────────────────────

/// POST /admin/shops/:shop_id/quests - create a quest
pub async fn create_quest(
    Extension(services): Extension<Arc<AppServices>>,
    Path(shop_id): Path<String>,
    Json(body): Json<NewQuest>,
) -> axum::response::Response {
    let shop_id = match parse_shop_id(&shop_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_shop(&services, shop_id) {
        return resp;
    }

    let quest = match body.into_quest(shop_id, Utc::now()) {
        Ok(quest) => quest,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.workers.quests.insert_quest(quest.clone()) {
        Ok(()) => {
            info!(shop_id = %shop_id, quest_id = %quest.id, name = %quest.name, "quest created");
            (StatusCode::CREATED, Json(quest)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/shops/:shop_id/quests - all quests, newest first
pub async fn list_quests(
    Extension(services): Extension<Arc<AppServices>>,
    Path(shop_id): Path<String>,
) -> axum::response::Response {
    let shop_id = match parse_shop_id(&shop_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.workers.quests.list_quests(shop_id) {
        Ok(quests) => (StatusCode::OK, Json(serde_json::json!({ "items": quests }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /admin/shops/:shop_id/quests/:quest_id/activate
pub async fn activate_quest(
    Extension(services): Extension<Arc<AppServices>>,
    Path((shop_id, quest_id)): Path<(String, String)>,
) -> axum::response::Response {
    set_active(&services, &shop_id, &quest_id, true)
}

/// POST /admin/shops/:shop_id/quests/:quest_id/deactivate
pub async fn deactivate_quest(
    Extension(services): Extension<Arc<AppServices>>,
    Path((shop_id, quest_id)): Path<(String, String)>,
) -> axum::response::Response {
    set_active(&services, &shop_id, &quest_id, false)
}

fn set_active(services: &AppServices, shop_id: &str, quest_id: &str, active: bool) -> axum::response::Response {
    let (shop_id, quest_id) = match (parse_shop_id(shop_id), parse_quest_id(quest_id)) {
        (Ok(s), Ok(q)) => (s, q),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match services.workers.quests.set_quest_active(shop_id, quest_id, active, Utc::now()) {
        Ok(quest) => {
            info!(shop_id = %shop_id, quest_id = %quest_id, active, "quest active flag changed");
            (StatusCode::OK, Json(quest)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queues
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/queues/:queue/stats
pub async fn queue_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Path(queue): Path<String>,
) -> axum::response::Response {
    let queue = match parse_queue(&queue) {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.workers.queue.store().stats(queue) {
        Ok(stats) => Json(QueueStatsView { queue: queue.as_str(), stats }).into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// GET /admin/queues/:queue/failed?limit=N - parked jobs, oldest first
pub async fn list_failed_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(queue): Path<String>,
    Query(query): Query<FailedJobsQuery>,
) -> axum::response::Response {
    let queue = match parse_queue(&queue) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let limit = query.limit.unwrap_or(DEFAULT_FAILED_LIMIT);

    match services.workers.queue.store().list_dead_letters(queue, limit) {
        Ok(entries) => {
            let items: Vec<FailedJobView> = entries.into_iter().map(FailedJobView::from).collect();
            Json(serde_json::json!({ "items": items })).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// POST /admin/queues/:queue/failed/:job_id/retry - replay a parked job
pub async fn retry_failed_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path((queue, job_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (queue, job_id) = match parked_job(&services, &queue, &job_id) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    match services.workers.queue.store().retry_dead_letter(job_id) {
        Ok(job) => {
            info!(queue = %queue, job_id = %job.id, "failed job replayed");
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "id": job.id, "status": job.status }))).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// DELETE /admin/queues/:queue/failed/:job_id
pub async fn delete_failed_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path((queue, job_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (queue, job_id) = match parked_job(&services, &queue, &job_id) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    match services.workers.queue.store().delete_dead_letter(job_id) {
        Ok(()) => {
            info!(queue = %queue, job_id = %job_id, "failed job deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// Resolve path ids and check the job belongs to the queue in the path.
fn parked_job(services: &AppServices, queue: &str, job_id: &str) -> Result<(QueueName, JobId), axum::response::Response> {
    let queue = parse_queue(queue)?;
    let job_id = parse_job_id(job_id)?;

    match services.workers.queue.store().get(job_id) {
        Ok(Some(job)) if job.queue == queue => Ok((queue, job_id)),
        Ok(_) => Err(errors::json_error(StatusCode::NOT_FOUND, "job_not_found", job_id.to_string())),
        Err(e) => Err(errors::job_store_error_to_response(e)),
    }
}
