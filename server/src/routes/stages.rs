//! Stage routes, including the board operations: atomic reorder and
//! move-lead. Stage mutations broadcast `stage:*` events; move-lead
//! broadcasts `lead:moved` with the full transition.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use events::LeadMoved;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::ApiError;
use crate::routes::leads::lead_error_to_api;
use crate::services::lead;
use crate::services::stage::{
    self, NewStage, Stage, StageError, StageUpdate, StageWithLeads,
};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelQuery {
    pub funnel_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStageBody {
    pub funnel_id: Uuid,
    pub name: String,
    pub position: Option<i32>,
    pub color: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateStageBody {
    pub name: Option<String>,
    pub position: Option<i32>,
    pub color: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBody {
    pub stage_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLeadBody {
    pub lead_id: Uuid,
    pub stage_id: Option<Uuid>,
}

fn stage_error_to_api(err: StageError) -> ApiError {
    match err {
        StageError::NotFound(id) => ApiError::not_found(format!("stage not found: {id}")),
        StageError::FunnelMissing(id) => {
            ApiError::validation("funnelId", format!("funnel not found: {id}"))
        }
        StageError::ForeignStage(stage_id, funnel_id) => ApiError::validation(
            "stageIds",
            format!("stage {stage_id} does not belong to funnel {funnel_id}"),
        ),
        StageError::Database(e) => {
            tracing::error!(error = %e, "stage query failed");
            ApiError::Internal
        }
    }
}

/// `GET /stages?funnelId=` — a funnel's stages in board order.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<FunnelQuery>,
) -> Result<Json<Vec<Stage>>, ApiError> {
    let rows = stage::list_by_funnel(&state.pool, query.funnel_id)
        .await
        .map_err(stage_error_to_api)?;
    Ok(Json(rows))
}

/// `GET /stages/{id}` — stage with its leads.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StageWithLeads>, ApiError> {
    let row = stage::find_with_leads(&state.pool, id).await.map_err(stage_error_to_api)?;
    Ok(Json(row))
}

/// `POST /stages` — create, then broadcast `stage:created`.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateStageBody>,
) -> Result<(StatusCode, Json<Stage>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }

    let new = NewStage {
        funnel_id: body.funnel_id,
        name: body.name,
        position: body.position,
        color: body.color,
    };
    let row = stage::create(&state.pool, &new).await.map_err(stage_error_to_api)?;

    state.realtime.emit_stage_created(row.id, row.funnel_id).await;

    Ok((StatusCode::CREATED, Json(row)))
}

/// `PUT /stages/{id}` — partial update, then broadcast `stage:updated`.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStageBody>,
) -> Result<Json<Stage>, ApiError> {
    let changes = StageUpdate { name: body.name, position: body.position, color: body.color };
    let row = stage::update(&state.pool, id, &changes).await.map_err(stage_error_to_api)?;

    state.realtime.emit_stage_updated(row.id, row.funnel_id).await;

    Ok(Json(row))
}

/// `DELETE /stages/{id}` — the funnel id is captured before the row goes
/// away so the broadcast can still carry it.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let row = stage::find_by_id(&state.pool, id).await.map_err(stage_error_to_api)?;
    stage::delete(&state.pool, id).await.map_err(stage_error_to_api)?;

    state.realtime.emit_stage_deleted(row.id, row.funnel_id).await;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /stages/reorder?funnelId=` — rewrite every position atomically,
/// then broadcast one `stage:updated` per stage in the new order.
pub async fn reorder(
    State(state): State<AppState>,
    Query(query): Query<FunnelQuery>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.stage_ids.is_empty() {
        return Err(ApiError::validation("stageIds", "stageIds must not be empty"));
    }

    stage::reorder(&state.pool, query.funnel_id, &body.stage_ids)
        .await
        .map_err(stage_error_to_api)?;

    for stage_id in &body.stage_ids {
        state.realtime.emit_stage_updated(*stage_id, query.funnel_id).await;
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /stages/move-lead` — reassign a lead's stage and broadcast
/// `lead:moved` with the full transition (source stage, destination stage,
/// destination funnel).
pub async fn move_lead(
    State(state): State<AppState>,
    Json(body): Json<MoveLeadBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let before = lead::find_by_id(&state.pool, body.lead_id)
        .await
        .map_err(lead_error_to_api)?;

    // Resolve the destination funnel before touching the lead; a dangling
    // stage id fails here instead of mid-move.
    let funnel_id = match body.stage_id {
        Some(stage_id) => Some(
            stage::find_by_id(&state.pool, stage_id)
                .await
                .map_err(|_| ApiError::validation("stageId", format!("stage not found: {stage_id}")))?
                .funnel_id,
        ),
        None => None,
    };

    let updated = lead::set_stage(&state.pool, body.lead_id, body.stage_id)
        .await
        .map_err(lead_error_to_api)?;

    state
        .realtime
        .emit_lead_moved(LeadMoved {
            lead_id: updated.id,
            from_stage_id: before.stage_id,
            to_stage_id: updated.stage_id,
            funnel_id,
        })
        .await;

    Ok(Json(serde_json::json!({ "ok": true, "lead": updated })))
}
