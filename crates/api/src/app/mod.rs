//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, queues and the signature verifier
//! - `routes/`: HTTP routes + handlers (one file per surface)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// `admin_token` of `None` leaves `/admin` locked.
pub fn build_app(services: Arc<services::AppServices>, admin_token: Option<String>) -> Router {
    let admin_state = middleware::AdminAuthState {
        token: admin_token.map(Arc::from),
    };

    let proxy = routes::proxy::router().layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::proxy_middleware,
    ));

    let admin = routes::admin::router().layer(axum::middleware::from_fn_with_state(
        admin_state,
        middleware::admin_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/webhooks", routes::webhooks::router())
        .nest("/proxy/api", proxy)
        .nest("/admin", admin)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
