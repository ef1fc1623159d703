//! Funnel routes. Plain CRUD; `GET /funnels/{id}` hydrates the whole board
//! (stages in position order, leads per stage). No broadcasts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::ApiError;
use crate::services::funnel::{
    self, Funnel, FunnelError, FunnelUpdate, FunnelWithStages, NewFunnel,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateFunnelBody {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateFunnelBody {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn funnel_error_to_api(err: FunnelError) -> ApiError {
    match err {
        FunnelError::NotFound(id) => ApiError::not_found(format!("funnel not found: {id}")),
        FunnelError::Database(e) => {
            tracing::error!(error = %e, "funnel query failed");
            ApiError::Internal
        }
    }
}

/// `GET /funnels`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Funnel>>, ApiError> {
    let rows = funnel::find_all(&state.pool).await.map_err(funnel_error_to_api)?;
    Ok(Json(rows))
}

/// `GET /funnels/{id}` — funnel with its stages and their leads.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FunnelWithStages>, ApiError> {
    let row = funnel::find_with_stages(&state.pool, id).await.map_err(funnel_error_to_api)?;
    Ok(Json(row))
}

/// `POST /funnels`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateFunnelBody>,
) -> Result<(StatusCode, Json<Funnel>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }

    let new = NewFunnel { name: body.name, description: body.description };
    let row = funnel::create(&state.pool, &new).await.map_err(funnel_error_to_api)?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `PUT /funnels/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateFunnelBody>,
) -> Result<Json<Funnel>, ApiError> {
    let changes = FunnelUpdate { name: body.name, description: body.description };
    let row = funnel::update(&state.pool, id, &changes).await.map_err(funnel_error_to_api)?;
    Ok(Json(row))
}

/// `DELETE /funnels/{id}` — cascades to the funnel's stages.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    funnel::delete(&state.pool, id).await.map_err(funnel_error_to_api)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
