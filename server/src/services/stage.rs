//! Stage service — funnel steps, their leads, and atomic reordering.
//!
//! ERROR HANDLING
//! ==============
//! `reorder` runs inside a single transaction: either every stage in the
//! funnel gets its new position or none do. A stage id that does not belong
//! to the funnel aborts the whole reorder instead of leaving a half-applied
//! ordering behind.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::services::lead::Lead;

pub const DEFAULT_STAGE_COLOR: &str = "#3B82F6";

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("stage not found: {0}")]
    NotFound(Uuid),
    #[error("funnel not found: {0}")]
    FunnelMissing(Uuid),
    #[error("stage {0} does not belong to funnel {1}")]
    ForeignStage(Uuid, Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: Uuid,
    pub funnel_id: Uuid,
    pub name: String,
    pub position: i32,
    pub color: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Stage plus its leads, as returned by `GET /stages/{id}`.
#[derive(Debug, Serialize)]
pub struct StageWithLeads {
    #[serde(flatten)]
    pub stage: Stage,
    pub leads: Vec<Lead>,
}

#[derive(Debug)]
pub struct NewStage {
    pub funnel_id: Uuid,
    pub name: String,
    pub position: Option<i32>,
    pub color: Option<String>,
}

#[derive(Debug, Default)]
pub struct StageUpdate {
    pub name: Option<String>,
    pub position: Option<i32>,
    pub color: Option<String>,
}

const STAGE_COLUMNS: &str = "id, funnel_id, name, position, color, created_at, updated_at";

fn map_fk_error(funnel_id: Uuid, err: sqlx::Error) -> StageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("stages_funnel_id_fkey") {
            return StageError::FunnelMissing(funnel_id);
        }
    }
    StageError::Database(err)
}

/// Stages of one funnel, in board order.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_by_funnel(pool: &PgPool, funnel_id: Uuid) -> Result<Vec<Stage>, StageError> {
    let rows = sqlx::query_as::<_, Stage>(&format!(
        "SELECT {STAGE_COLUMNS} FROM stages WHERE funnel_id = $1 ORDER BY position, created_at"
    ))
    .bind(funnel_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// `NotFound` when no stage has this id.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Stage, StageError> {
    sqlx::query_as::<_, Stage>(&format!("SELECT {STAGE_COLUMNS} FROM stages WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StageError::NotFound(id))
}

/// # Errors
///
/// `NotFound` when no stage has this id.
pub async fn find_with_leads(pool: &PgPool, id: Uuid) -> Result<StageWithLeads, StageError> {
    let stage = find_by_id(pool, id).await?;
    let leads = sqlx::query_as::<_, Lead>(
        "SELECT id, contact_id, name, company, status, stage_id, created_at, updated_at
         FROM leads WHERE stage_id = $1 ORDER BY created_at",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(StageWithLeads { stage, leads })
}

/// # Errors
///
/// `FunnelMissing` when the funnel id dangles.
pub async fn create(pool: &PgPool, new: &NewStage) -> Result<Stage, StageError> {
    let id = Uuid::new_v4();
    sqlx::query_as::<_, Stage>(&format!(
        "INSERT INTO stages (id, funnel_id, name, position, color)
         VALUES ($1, $2, $3, COALESCE($4, 0), COALESCE($5, '{DEFAULT_STAGE_COLOR}'))
         RETURNING {STAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(new.funnel_id)
    .bind(&new.name)
    .bind(new.position)
    .bind(&new.color)
    .fetch_one(pool)
    .await
    .map_err(|err| map_fk_error(new.funnel_id, err))
}

/// Partial update; absent fields keep their current value.
///
/// # Errors
///
/// `NotFound` when no stage has this id.
pub async fn update(pool: &PgPool, id: Uuid, changes: &StageUpdate) -> Result<Stage, StageError> {
    let row = sqlx::query_as::<_, Stage>(&format!(
        "UPDATE stages SET
            name = COALESCE($2, name),
            position = COALESCE($3, position),
            color = COALESCE($4, color),
            updated_at = now()
         WHERE id = $1
         RETURNING {STAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(&changes.name)
    .bind(changes.position)
    .bind(&changes.color)
    .fetch_optional(pool)
    .await?;

    row.ok_or(StageError::NotFound(id))
}

/// # Errors
///
/// `NotFound` when no stage has this id.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StageError> {
    let result = sqlx::query("DELETE FROM stages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StageError::NotFound(id));
    }
    Ok(())
}

/// Rewrite the positions of a funnel's stages to match `stage_ids` order,
/// atomically.
///
/// # Errors
///
/// `ForeignStage` (and a full rollback) if any id is not a stage of this
/// funnel.
pub async fn reorder(pool: &PgPool, funnel_id: Uuid, stage_ids: &[Uuid]) -> Result<(), StageError> {
    let mut tx = pool.begin().await?;

    for (index, stage_id) in stage_ids.iter().enumerate() {
        let position = i32::try_from(index).unwrap_or(i32::MAX);
        let result = sqlx::query("UPDATE stages SET position = $3, updated_at = now() WHERE id = $1 AND funnel_id = $2")
            .bind(stage_id)
            .bind(funnel_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the earlier updates.
            return Err(StageError::ForeignStage(*stage_id, funnel_id));
        }
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
#[path = "stage_test.rs"]
mod tests;
