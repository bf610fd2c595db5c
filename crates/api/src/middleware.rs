use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use questline_auth::ProxyParams;
use questline_core::CustomerId;
use questline_infra::store::ShopStore;

use crate::app::errors::{json_error, store_error_to_response};
use crate::app::services::AppServices;
use crate::context::ProxyContext;

#[derive(Clone)]
pub struct AdminAuthState {
    /// `None` rejects every request.
    pub token: Option<Arc<str>>,
}

pub async fn admin_middleware(
    State(state): State<AdminAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = state.token.as_deref().ok_or(StatusCode::UNAUTHORIZED)?;
    let presented = extract_bearer(req.headers())?;
    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

/// Verify the app-proxy query signature and resolve shop and customer.
pub async fn proxy_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let pairs = match Query::<Vec<(String, String)>>::try_from_uri(req.uri()) {
        Ok(Query(pairs)) => pairs,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_query", "malformed query string"),
    };
    let params = ProxyParams::from_pairs(pairs);

    if let Err(e) = services.verifier.verify_proxy(&params) {
        warn!(error = %e, "app proxy signature rejected");
        return json_error(StatusCode::UNAUTHORIZED, "invalid_signature", "invalid signature");
    }

    let Some(domain) = params.shop() else {
        return json_error(StatusCode::BAD_REQUEST, "missing_shop", "shop parameter is required");
    };
    let shop = match services.workers.shops.find_shop_by_domain(domain) {
        Ok(Some(shop)) if shop.installed => shop,
        Ok(_) => return json_error(StatusCode::NOT_FOUND, "shop_not_found", "shop not found"),
        Err(e) => return store_error_to_response(e),
    };

    let customer_id = match params.logged_in_customer_id().map(CustomerId::parse) {
        Some(Ok(id)) => id,
        _ => return json_error(StatusCode::UNAUTHORIZED, "not_logged_in", "Not logged in"),
    };

    debug!(shop = %shop.domain, customer_id = %customer_id, "app proxy request");
    req.extensions_mut().insert(ProxyContext::new(shop, customer_id));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
