//! Lead routes.
//!
//! Mutations broadcast a matching event over the websocket hub after a
//! successful write. Broadcast is best-effort; the HTTP response never
//! depends on it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::routes::ApiError;
use crate::services::lead::{
    self, Lead, LeadError, LeadFilters, LeadPage, LeadStatus, LeadUpdate, NewLead,
};
use crate::state::AppState;

pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLeadsQuery {
    pub status: Option<LeadStatus>,
    pub contact_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadBody {
    pub contact_id: Uuid,
    pub name: String,
    pub company: String,
    #[serde(default)]
    pub status: LeadStatus,
    pub stage_id: Option<Uuid>,
}

/// Distinguishes an absent `stageId` (keep) from an explicit `null` (clear).
fn some_option<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadBody {
    pub contact_id: Option<Uuid>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub status: Option<LeadStatus>,
    #[serde(default, deserialize_with = "some_option")]
    pub stage_id: Option<Option<Uuid>>,
}

pub(crate) fn lead_error_to_api(err: LeadError) -> ApiError {
    match err {
        LeadError::NotFound(id) => ApiError::not_found(format!("lead not found: {id}")),
        LeadError::ContactMissing(id) => {
            ApiError::validation("contactId", format!("contact not found: {id}"))
        }
        LeadError::StageMissing => ApiError::validation("stageId", "stage not found"),
        LeadError::Database(e) => {
            tracing::error!(error = %e, "lead query failed");
            ApiError::Internal
        }
    }
}

/// `GET /leads` — filtered, paginated list.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<LeadPage>, ApiError> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(ApiError::validation("page", "page must be at least 1"));
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::validation(
            "limit",
            format!("limit must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }

    let filters = LeadFilters { status: query.status, contact_id: query.contact_id };
    let result = lead::list(&state.pool, &filters, page, limit)
        .await
        .map_err(lead_error_to_api)?;
    Ok(Json(result))
}

/// `GET /leads/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, ApiError> {
    let row = lead::find_by_id(&state.pool, id).await.map_err(lead_error_to_api)?;
    Ok(Json(row))
}

/// `POST /leads` — create, then broadcast `lead:created`.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateLeadBody>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }

    let new = NewLead {
        contact_id: body.contact_id,
        name: body.name,
        company: body.company,
        status: body.status,
        stage_id: body.stage_id,
    };
    let row = lead::create(&state.pool, &new).await.map_err(lead_error_to_api)?;

    state.realtime.emit_lead_created(row.id, row.stage_id).await;

    Ok((StatusCode::CREATED, Json(row)))
}

/// `PUT /leads/{id}` — partial update, then broadcast `lead:updated`.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateLeadBody>,
) -> Result<Json<Lead>, ApiError> {
    let changes = LeadUpdate {
        contact_id: body.contact_id,
        name: body.name,
        company: body.company,
        status: body.status,
        stage_id: body.stage_id,
    };
    let row = lead::update(&state.pool, id, &changes).await.map_err(lead_error_to_api)?;

    state.realtime.emit_lead_updated(row.id).await;

    Ok(Json(row))
}

/// `DELETE /leads/{id}` — delete, then broadcast `lead:deleted`.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    lead::delete(&state.pool, id).await.map_err(lead_error_to_api)?;

    state.realtime.emit_lead_deleted(id).await;

    Ok(Json(serde_json::json!({ "ok": true })))
}
