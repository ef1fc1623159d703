//! Contact routes. Plain CRUD, no broadcasts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::ApiError;
use crate::services::contact::{self, Contact, ContactError, ContactUpdate, NewContact};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateContactBody {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Deserialize, Default)]
pub struct UpdateContactBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn contact_error_to_api(err: ContactError) -> ApiError {
    match err {
        ContactError::NotFound(id) => ApiError::not_found(format!("contact not found: {id}")),
        ContactError::EmailTaken(email) => {
            ApiError::Conflict(format!("email already in use: {email}"))
        }
        ContactError::Database(e) => {
            tracing::error!(error = %e, "contact query failed");
            ApiError::Internal
        }
    }
}

/// `GET /contacts`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Contact>>, ApiError> {
    let rows = contact::find_all(&state.pool).await.map_err(contact_error_to_api)?;
    Ok(Json(rows))
}

/// `GET /contacts/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contact>, ApiError> {
    let row = contact::find_by_id(&state.pool, id).await.map_err(contact_error_to_api)?;
    Ok(Json(row))
}

/// `GET /contacts/email/{email}`
pub async fn get_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Contact>, ApiError> {
    contact::find_by_email(&state.pool, &email)
        .await
        .map_err(contact_error_to_api)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("contact not found: {email}")))
}

/// `POST /contacts`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateContactBody>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }
    if !body.email.contains('@') {
        return Err(ApiError::validation("email", "invalid email address"));
    }

    let new = NewContact { name: body.name, email: body.email, phone: body.phone };
    let row = contact::create(&state.pool, &new).await.map_err(contact_error_to_api)?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `PUT /contacts/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateContactBody>,
) -> Result<Json<Contact>, ApiError> {
    if let Some(email) = &body.email {
        if !email.contains('@') {
            return Err(ApiError::validation("email", "invalid email address"));
        }
    }

    let changes = ContactUpdate { name: body.name, email: body.email, phone: body.phone };
    let row = contact::update(&state.pool, id, &changes).await.map_err(contact_error_to_api)?;
    Ok(Json(row))
}

/// `DELETE /contacts/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    contact::delete(&state.pool, id).await.map_err(contact_error_to_api)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
