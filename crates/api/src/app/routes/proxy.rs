//! Customer-facing app-proxy endpoints. The proxy middleware has already
//! verified the signature and resolved the shop and customer.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use questline_infra::store::{ProgressStore, QuestStore, RedemptionStore};

use crate::app::dto::{CustomerQuestView, CustomerRewardView};
use crate::app::{errors, services::AppServices};
use crate::context::ProxyContext;

pub fn router() -> Router {
    Router::new()
        .route("/quests", get(list_quests))
        .route("/rewards", get(list_rewards))
}

/// GET /proxy/api/quests - live quests with the customer's progress
pub async fn list_quests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ProxyContext>,
) -> Response {
    let shop_id = ctx.shop().id;
    let workers = &services.workers;

    let quests = match workers.quests.active_quests(shop_id, Utc::now()) {
        Ok(quests) => quests,
        Err(e) => return errors::store_error_to_response(e),
    };
    let progress = match workers.progress.list_customer_progress(shop_id, ctx.customer_id()) {
        Ok(progress) => progress,
        Err(e) => return errors::store_error_to_response(e),
    };

    let views: Vec<_> = quests
        .iter()
        .filter_map(|quest| {
            let mine = progress.iter().find(|p| p.quest_id == quest.id);
            CustomerQuestView::build(quest, mine, &workers.evaluators)
        })
        .collect();

    Json(json!({ "quests": views })).into_response()
}

/// GET /proxy/api/rewards - discount codes issued to the customer
pub async fn list_rewards(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ProxyContext>,
) -> Response {
    let now = Utc::now();
    match services
        .workers
        .redemptions
        .list_customer_redemptions(ctx.shop().id, ctx.customer_id())
    {
        Ok(redemptions) => {
            let views: Vec<_> = redemptions.iter().map(|r| CustomerRewardView::build(r, now)).collect();
            Json(json!({ "rewards": views })).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
