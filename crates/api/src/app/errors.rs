use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use questline_core::DomainError;
use questline_infra::jobs::{EnqueueError, JobStoreError};
use questline_infra::store::StoreError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        e @ DomainError::IllegalTransition { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "illegal_transition", e.to_string())
        }
        e @ DomainError::AlreadyRewarded(_) => json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", what),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Unavailable(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg),
        StoreError::Corrupt(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_corrupt", msg),
    }
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => json_error(StatusCode::NOT_FOUND, "job_not_found", id.to_string()),
        JobStoreError::AlreadyExists(id) => json_error(StatusCode::CONFLICT, "job_exists", id.to_string()),
        JobStoreError::Storage(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", msg),
    }
}

pub fn enqueue_error_to_response(err: EnqueueError) -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "enqueue_failed", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
