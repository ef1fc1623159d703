//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the REST CRUD surface and the websocket endpoint under a
//! single Axum router. Everything speaks JSON; the websocket carries the same
//! envelopes the REST mutations broadcast.

pub mod contacts;
pub mod funnels;
pub mod leads;
pub mod stages;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Full application router: REST + websocket + health.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/contacts", get(contacts::list).post(contacts::create))
        .route(
            "/contacts/{id}",
            get(contacts::get_one).put(contacts::update).delete(contacts::delete),
        )
        .route("/contacts/email/{email}", get(contacts::get_by_email))
        .route("/leads", get(leads::list).post(leads::create))
        .route(
            "/leads/{id}",
            get(leads::get_one).put(leads::update).delete(leads::delete),
        )
        .route("/funnels", get(funnels::list).post(funnels::create))
        .route(
            "/funnels/{id}",
            get(funnels::get_one).put(funnels::update).delete(funnels::delete),
        )
        .route("/stages", get(stages::list).post(stages::create))
        .route(
            "/stages/{id}",
            get(stages::get_one).put(stages::update).delete(stages::delete),
        )
        .route("/stages/reorder", post(stages::reorder))
        .route("/stages/move-lead", post(stages::move_lead))
        .route("/ws", get(ws::handle_ws))
        .route("/ws/status", get(ws::ws_status))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// One field-level validation failure, e.g. `{"field": "limit", "message": ...}`.
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Uniform JSON error body across every route.
///
/// Validation problems come back as 400 with an `errors` array; everything
/// else is a single `error` string with the matching status code.
#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    NotFound(String),
    Conflict(String),
    Internal,
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError { field, message: message.into() }])
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "errors": errors })),
            )
                .into_response(),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal server error" })),
            )
                .into_response(),
        }
    }
}
