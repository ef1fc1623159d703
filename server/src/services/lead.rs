//! Lead service — CRUD, filtered/paginated listing, and kanban placement.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LeadError {
    #[error("lead not found: {0}")]
    NotFound(Uuid),
    #[error("contact not found: {0}")]
    ContactMissing(Uuid),
    #[error("stage not found")]
    StageMissing,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Pipeline status of a lead, stored as the `lead_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "lead_status", rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub name: String,
    pub company: String,
    pub status: LeadStatus,
    pub stage_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LeadFilters {
    pub status: Option<LeadStatus>,
    pub contact_id: Option<Uuid>,
}

/// One page of leads plus the pagination envelope the list route returns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPage {
    pub data: Vec<Lead>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug)]
pub struct NewLead {
    pub contact_id: Uuid,
    pub name: String,
    pub company: String,
    pub status: LeadStatus,
    pub stage_id: Option<Uuid>,
}

/// Partial update. `stage_id` is tri-state: absent keeps the current stage,
/// `Some(None)` takes the lead off the board.
#[derive(Debug, Default)]
pub struct LeadUpdate {
    pub contact_id: Option<Uuid>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub status: Option<LeadStatus>,
    pub stage_id: Option<Option<Uuid>>,
}

const LEAD_COLUMNS: &str = "id, contact_id, name, company, status, stage_id, created_at, updated_at";

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &LeadFilters) {
    if let Some(status) = filters.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(contact_id) = filters.contact_id {
        builder.push(" AND contact_id = ").push_bind(contact_id);
    }
}

/// Row offset for a 1-based page. Saturates instead of overflowing so an
/// absurd page number yields an empty page, not a panic or negative OFFSET.
fn page_offset(page: i64, limit: i64) -> i64 {
    page.saturating_sub(1).saturating_mul(limit)
}

fn map_fk_error(new_contact_id: Uuid, err: sqlx::Error) -> LeadError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("leads_contact_id_fkey") => return LeadError::ContactMissing(new_contact_id),
            Some("leads_stage_id_fkey") => return LeadError::StageMissing,
            _ => {}
        }
    }
    LeadError::Database(err)
}

/// List leads matching the filters, newest first.
///
/// # Errors
///
/// Returns a database error if either the count or the page query fails.
pub async fn list(pool: &PgPool, filters: &LeadFilters, page: i64, limit: i64) -> Result<LeadPage, LeadError> {
    let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM leads WHERE TRUE");
    push_filters(&mut count_builder, filters);
    let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

    let mut builder = QueryBuilder::new(format!("SELECT {LEAD_COLUMNS} FROM leads WHERE TRUE"));
    push_filters(&mut builder, filters);
    builder.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(page_offset(page, limit));
    let data = builder.build_query_as::<Lead>().fetch_all(pool).await?;

    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
    Ok(LeadPage { data, total, page, limit, total_pages })
}

/// # Errors
///
/// `NotFound` when no lead has this id.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Lead, LeadError> {
    sqlx::query_as::<_, Lead>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(LeadError::NotFound(id))
}

/// # Errors
///
/// `ContactMissing`/`StageMissing` on foreign-key violations.
pub async fn create(pool: &PgPool, new: &NewLead) -> Result<Lead, LeadError> {
    let id = Uuid::new_v4();
    sqlx::query_as::<_, Lead>(&format!(
        "INSERT INTO leads (id, contact_id, name, company, status, stage_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {LEAD_COLUMNS}"
    ))
    .bind(id)
    .bind(new.contact_id)
    .bind(&new.name)
    .bind(&new.company)
    .bind(new.status)
    .bind(new.stage_id)
    .fetch_one(pool)
    .await
    .map_err(|err| map_fk_error(new.contact_id, err))
}

/// Partial update; absent fields keep their current value.
///
/// # Errors
///
/// `NotFound` when no lead has this id; FK violations map as in [`create`].
pub async fn update(pool: &PgPool, id: Uuid, changes: &LeadUpdate) -> Result<Lead, LeadError> {
    let row = sqlx::query_as::<_, Lead>(&format!(
        "UPDATE leads SET
            contact_id = COALESCE($2, contact_id),
            name = COALESCE($3, name),
            company = COALESCE($4, company),
            status = COALESCE($5, status),
            stage_id = CASE WHEN $6 THEN $7 ELSE stage_id END,
            updated_at = now()
         WHERE id = $1
         RETURNING {LEAD_COLUMNS}"
    ))
    .bind(id)
    .bind(changes.contact_id)
    .bind(&changes.name)
    .bind(&changes.company)
    .bind(changes.status)
    .bind(changes.stage_id.is_some())
    .bind(changes.stage_id.flatten())
    .fetch_optional(pool)
    .await
    .map_err(|err| map_fk_error(changes.contact_id.unwrap_or(id), err))?;

    row.ok_or(LeadError::NotFound(id))
}

/// Place a lead in a stage (or take it off the board with `None`).
///
/// # Errors
///
/// `NotFound` when no lead has this id; `StageMissing` on a dangling stage.
pub async fn set_stage(pool: &PgPool, id: Uuid, stage_id: Option<Uuid>) -> Result<Lead, LeadError> {
    let row = sqlx::query_as::<_, Lead>(&format!(
        "UPDATE leads SET stage_id = $2, updated_at = now() WHERE id = $1 RETURNING {LEAD_COLUMNS}"
    ))
    .bind(id)
    .bind(stage_id)
    .fetch_optional(pool)
    .await
    .map_err(|err| map_fk_error(id, err))?;

    row.ok_or(LeadError::NotFound(id))
}

/// # Errors
///
/// `NotFound` when no lead has this id.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), LeadError> {
    let result = sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LeadError::NotFound(id));
    }
    Ok(())
}

#[cfg(test)]
#[path = "lead_test.rs"]
mod tests;
