//! Contact service — CRUD against the `contacts` table.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("contact not found: {0}")]
    NotFound(Uuid),
    #[error("email already in use: {0}")]
    EmailTaken(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Default)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

const CONTACT_COLUMNS: &str = "id, name, email, phone, created_at, updated_at";

/// Map a unique-constraint violation on the email column to a typed error.
fn map_insert_error(email: &str, err: sqlx::Error) -> ContactError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("contacts_email_key") {
            return ContactError::EmailTaken(email.to_owned());
        }
    }
    ContactError::Database(err)
}

/// # Errors
///
/// `EmailTaken` when the email is already registered; `Database` otherwise.
pub async fn create(pool: &PgPool, new: &NewContact) -> Result<Contact, ContactError> {
    let id = Uuid::new_v4();
    sqlx::query_as::<_, Contact>(&format!(
        "INSERT INTO contacts (id, name, email, phone) VALUES ($1, $2, $3, $4) RETURNING {CONTACT_COLUMNS}"
    ))
    .bind(id)
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.phone)
    .fetch_one(pool)
    .await
    .map_err(|err| map_insert_error(&new.email, err))
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_all(pool: &PgPool) -> Result<Vec<Contact>, ContactError> {
    let rows = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// `NotFound` when no contact has this id.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Contact, ContactError> {
    sqlx::query_as::<_, Contact>(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ContactError::NotFound(id))
}

/// # Errors
///
/// Returns a database error if the query fails; `Ok(None)` when no contact
/// has this email.
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Contact>, ContactError> {
    let row = sqlx::query_as::<_, Contact>(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Partial update; absent fields keep their current value.
///
/// # Errors
///
/// `NotFound` when no contact has this id; `EmailTaken` when changing to an
/// email another contact owns.
pub async fn update(pool: &PgPool, id: Uuid, changes: &ContactUpdate) -> Result<Contact, ContactError> {
    let row = sqlx::query_as::<_, Contact>(&format!(
        "UPDATE contacts SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            updated_at = now()
         WHERE id = $1
         RETURNING {CONTACT_COLUMNS}"
    ))
    .bind(id)
    .bind(&changes.name)
    .bind(&changes.email)
    .bind(&changes.phone)
    .fetch_optional(pool)
    .await
    .map_err(|err| map_insert_error(changes.email.as_deref().unwrap_or_default(), err))?;

    row.ok_or(ContactError::NotFound(id))
}

/// # Errors
///
/// `NotFound` when no contact has this id.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), ContactError> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ContactError::NotFound(id));
    }
    Ok(())
}
