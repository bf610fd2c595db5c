//! Platform webhooks.
//!
//! Every topic verifies the HMAC over the raw body before anything else.
//! Order topics only enqueue; the order worker does the work.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use questline_infra::jobs::QueueName;
use questline_infra::store::ShopStore;
use questline_infra::workers::{OrderJob, PROCESS_ORDER_JOB};
use questline_quests::OrderEvent;

use crate::app::{errors, services::AppServices};

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

pub fn router() -> Router {
    Router::new()
        .route("/app/uninstalled", post(app_uninstalled))
        .route("/orders/create", post(orders_create))
        .route("/orders/paid", post(orders_paid))
        .route("/orders/updated", post(orders_updated))
}

fn acknowledged() -> Response {
    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Signature check shared by all topics; `Err` is the response to send.
fn authenticate<'a>(services: &AppServices, headers: &'a HeaderMap, body: &[u8], topic: &str) -> Result<&'a str, Response> {
    if let Err(e) = services.verifier.verify(body, header(headers, HMAC_HEADER)) {
        warn!(topic, error = %e, "webhook signature rejected");
        return Err(errors::json_error(StatusCode::UNAUTHORIZED, "invalid_signature", "invalid webhook signature"));
    }
    header(headers, SHOP_DOMAIN_HEADER)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| errors::json_error(StatusCode::BAD_REQUEST, "missing_shop", "shop domain header is required"))
}

/// POST /webhooks/app/uninstalled
pub async fn app_uninstalled(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let domain = match authenticate(&services, &headers, &body, "app/uninstalled") {
        Ok(domain) => domain,
        Err(resp) => return resp,
    };

    match services.workers.shops.mark_uninstalled(domain, Utc::now()) {
        Ok(Some(shop)) => info!(shop_id = %shop.id, shop = %shop.domain, "shop uninstalled"),
        Ok(None) => warn!(shop = domain, "uninstall webhook for unknown shop"),
        Err(e) => {
            error!(shop = domain, error = %e, "failed to mark shop uninstalled");
            return errors::store_error_to_response(e);
        }
    }
    acknowledged()
}

/// POST /webhooks/orders/create
pub async fn orders_create(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    order_webhook(&services, &headers, &body, "orders/create")
}

/// POST /webhooks/orders/paid
pub async fn orders_paid(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    order_webhook(&services, &headers, &body, "orders/paid")
}

/// POST /webhooks/orders/updated
pub async fn orders_updated(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    order_webhook(&services, &headers, &body, "orders/updated")
}

fn order_webhook(services: &AppServices, headers: &HeaderMap, body: &[u8], topic: &'static str) -> Response {
    let domain = match authenticate(services, headers, body, topic) {
        Ok(domain) => domain,
        Err(resp) => return resp,
    };

    let shop = match services.workers.shops.find_shop_by_domain(domain) {
        Ok(Some(shop)) if shop.installed => shop,
        Ok(_) => {
            warn!(topic, shop = domain, "order webhook for unknown or uninstalled shop");
            return acknowledged();
        }
        Err(e) => {
            error!(topic, shop = domain, error = %e, "shop lookup failed");
            return errors::store_error_to_response(e);
        }
    };

    // Redelivering a body that never parses would not help; acknowledge it.
    let order: OrderEvent = match serde_json::from_slice(body) {
        Ok(order) => order,
        Err(e) => {
            warn!(topic, shop_id = %shop.id, error = %e, "order webhook body rejected");
            return acknowledged();
        }
    };

    let order_id = order.id.clone();
    let job = OrderJob { shop_id: shop.id, order };
    match services
        .workers
        .queue
        .enqueue(QueueName::OrderProcessing, PROCESS_ORDER_JOB, &job)
    {
        Ok(job_id) => {
            info!(topic, shop_id = %shop.id, order_id = %order_id, job_id = %job_id, "order job enqueued");
            acknowledged()
        }
        Err(e) => {
            error!(topic, shop_id = %shop.id, order_id = %order_id, error = %e, "order job not enqueued");
            errors::enqueue_error_to_response(e)
        }
    }
}
