//! Funnel service. A funnel is the top-level pipeline container; its stages
//! (and their leads) hang off it for the board view.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::services::lead::Lead;
use crate::services::stage::{StageError, StageWithLeads};

#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    #[error("funnel not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Funnel plus all of its stages and their leads, as returned by
/// `GET /funnels/{id}`.
#[derive(Debug, Serialize)]
pub struct FunnelWithStages {
    #[serde(flatten)]
    pub funnel: Funnel,
    pub stages: Vec<StageWithLeads>,
}

#[derive(Debug)]
pub struct NewFunnel {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct FunnelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

const FUNNEL_COLUMNS: &str = "id, name, description, created_at, updated_at";

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_all(pool: &PgPool) -> Result<Vec<Funnel>, FunnelError> {
    let rows = sqlx::query_as::<_, Funnel>(&format!(
        "SELECT {FUNNEL_COLUMNS} FROM funnels ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// `NotFound` when no funnel has this id.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Funnel, FunnelError> {
    sqlx::query_as::<_, Funnel>(&format!("SELECT {FUNNEL_COLUMNS} FROM funnels WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(FunnelError::NotFound(id))
}

/// Hydrate the full board: funnel, stages in position order, leads per stage.
///
/// One query per level rather than a join; the board is small and this keeps
/// the grouping trivial.
///
/// # Errors
///
/// `NotFound` when no funnel has this id.
pub async fn find_with_stages(pool: &PgPool, id: Uuid) -> Result<FunnelWithStages, FunnelError> {
    let funnel = find_by_id(pool, id).await?;

    let stages = crate::services::stage::list_by_funnel(pool, id)
        .await
        .map_err(|err| match err {
            StageError::Database(e) => FunnelError::Database(e),
            _ => FunnelError::NotFound(id),
        })?;

    let leads = sqlx::query_as::<_, Lead>(
        "SELECT l.id, l.contact_id, l.name, l.company, l.status, l.stage_id, l.created_at, l.updated_at
         FROM leads l
         JOIN stages s ON s.id = l.stage_id
         WHERE s.funnel_id = $1
         ORDER BY l.created_at",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let stages = stages
        .into_iter()
        .map(|stage| {
            let mine = leads
                .iter()
                .filter(|lead| lead.stage_id == Some(stage.id))
                .cloned()
                .collect();
            StageWithLeads { stage, leads: mine }
        })
        .collect();

    Ok(FunnelWithStages { funnel, stages })
}

/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create(pool: &PgPool, new: &NewFunnel) -> Result<Funnel, FunnelError> {
    let id = Uuid::new_v4();
    let funnel = sqlx::query_as::<_, Funnel>(&format!(
        "INSERT INTO funnels (id, name, description)
         VALUES ($1, $2, $3)
         RETURNING {FUNNEL_COLUMNS}"
    ))
    .bind(id)
    .bind(&new.name)
    .bind(&new.description)
    .fetch_one(pool)
    .await?;
    Ok(funnel)
}

/// Partial update; absent fields keep their current value.
///
/// # Errors
///
/// `NotFound` when no funnel has this id.
pub async fn update(pool: &PgPool, id: Uuid, changes: &FunnelUpdate) -> Result<Funnel, FunnelError> {
    let row = sqlx::query_as::<_, Funnel>(&format!(
        "UPDATE funnels SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            updated_at = now()
         WHERE id = $1
         RETURNING {FUNNEL_COLUMNS}"
    ))
    .bind(id)
    .bind(&changes.name)
    .bind(&changes.description)
    .fetch_optional(pool)
    .await?;

    row.ok_or(FunnelError::NotFound(id))
}

/// Deletes the funnel and, via cascade, its stages.
///
/// # Errors
///
/// `NotFound` when no funnel has this id.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), FunnelError> {
    let result = sqlx::query("DELETE FROM funnels WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(FunnelError::NotFound(id));
    }
    Ok(())
}
