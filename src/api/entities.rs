/// Generic CRUD endpoints for every table of the data model
///
/// Endpoints (`{entity}` is a table slug such as `projects` or `event-types`):
/// - GET    /api/{entity}              list, filtered by query parameters
/// - POST   /api/{entity}              create
/// - GET    /api/{entity}/items?ids=   fetch several records by id
/// - GET    /api/{entity}/{id}         fetch one record
/// - PUT    /api/{entity}/{id}         partial update
/// - DELETE /api/{entity}/{id}         delete
/// - PATCH  /api/researchers/{id}/quit deactivate a researcher

use crate::{
    api::{auth::CurrentSession, error::ApiError, uploads},
    auth::{hash_password, AuthService},
    config::UploadConfig,
    schema::{
        types::{redact, ACTIVE_COLUMN, IMAGE_COLUMN, PASSWORD_HASH_COLUMN},
        validation::parse_filter_value,
        validate, EntityKind, FieldKind, Record,
    },
    storage::Database,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: Arc<AuthService>,
    pub uploads: Arc<UploadConfig>,
}

#[derive(Debug, Deserialize)]
struct ItemsQuery {
    ids: Option<String>,
}

/// Create CRUD routes for all tables
pub fn create_entity_routes() -> Router<AppState> {
    Router::new()
        .route("/api/{entity}", get(list_records).post(create_record))
        .route("/api/{entity}/items", get(get_records_by_ids))
        .route(
            "/api/{entity}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/api/{entity}/{id}/quit", patch(quit_researcher))
}

pub(crate) fn resolve_kind(slug: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_slug(slug).ok_or(ApiError::NotFound("Resource"))
}

/// Ids are positive integers; anything else cannot name a record
pub(crate) fn parse_id(kind: EntityKind, raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::NotFound(kind.label())),
    }
}

fn parse_payload(body: &str) -> Result<Value, ApiError> {
    let payload: Value = serde_json::from_str(body).map_err(|e| {
        tracing::warn!("❌ Invalid JSON payload: {}", e);
        ApiError::BadRequest("Invalid JSON payload".to_string())
    })?;
    if !payload.is_object() {
        return Err(ApiError::BadRequest("Request body must be a JSON object".to_string()));
    }
    Ok(payload)
}

/// Every foreign key in `columns` must point at an existing record
async fn check_references(db: &Database, kind: EntityKind, columns: &Record) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    for spec in kind.fields() {
        let (Some(target), Some(id)) = (spec.references, columns.get(spec.column).and_then(Value::as_i64)) else {
            continue;
        };
        if !db.exists(target, id).await? {
            errors.push(format!(
                "Invalid {}: {} {} does not exist",
                spec.input,
                target.label().to_lowercase(),
                id
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// List records, optionally filtered by `?field=value` (input or column names)
///
/// GET /api/{entity}
async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let kind = resolve_kind(&entity)?;

    let mut filters = Vec::with_capacity(params.len());
    for (name, raw) in &params {
        let column = kind
            .resolve_column(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown filter field: {}", name)))?;
        let field_kind = kind.column_kind(column).unwrap_or(FieldKind::Text);
        match parse_filter_value(field_kind, raw) {
            Some(value) => filters.push((column, value)),
            // A value that cannot be stored in the column matches nothing
            None => return Ok(Json(Vec::new())),
        }
    }

    let records = state.db.select(kind, &filters).await?;
    tracing::debug!("📋 Listed {} {} record(s)", records.len(), kind.table());
    Ok(Json(records.into_iter().map(redact).collect()))
}

/// Fetch several records at once; unparseable and unknown ids are skipped
///
/// GET /api/{entity}/items?ids=1,2,3
async fn get_records_by_ids(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let kind = resolve_kind(&entity)?;
    let ids: Vec<i64> = query
        .ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|raw| raw.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect();
    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let records = state.db.get_many(kind, &ids).await?;
    Ok(Json(records.into_iter().map(redact).collect()))
}

/// GET /api/{entity}/{id}
async fn get_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(kind, &id)?;
    match state.db.get(kind, id).await? {
        Some(record) => Ok(Json(redact(record))),
        None => Err(ApiError::NotFound(kind.label())),
    }
}

/// Create a record
///
/// POST /api/{entity}
async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    session: Option<CurrentSession>,
    body: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let kind = resolve_kind(&entity)?;
    let session = CurrentSession::required(session)?;
    session.require_admin()?;

    let payload = parse_payload(&body)?;
    let validated = validate(kind, &payload, None).map_err(ApiError::Validation)?;
    check_references(&state.db, kind, &validated.columns).await?;

    let mut columns = validated.columns;
    if kind == EntityKind::Researcher {
        columns.insert(ACTIVE_COLUMN.to_string(), Value::Bool(true));
        if let Some(password) = validated.password {
            columns.insert(PASSWORD_HASH_COLUMN.to_string(), Value::String(hash_password(&password)));
        }
    }

    let id = state.db.insert(kind, columns).await?;
    tracing::info!("✅ Created {} {} by {}", kind.table(), id, session.0.subject);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("{} created successfully", kind.label()),
            "id": id,
        })),
    ))
}

/// Update the given fields of a record
///
/// PUT /api/{entity}/{id}
async fn update_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    session: Option<CurrentSession>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(kind, &id)?;
    let session = CurrentSession::required(session)?;
    session.require_admin_or_self(kind, id)?;

    let payload = parse_payload(&body)?;
    let existing = state
        .db
        .get(kind, id)
        .await?
        .ok_or(ApiError::NotFound(kind.label()))?;
    let validated = validate(kind, &payload, Some(&existing)).map_err(ApiError::Validation)?;
    check_references(&state.db, kind, &validated.columns).await?;

    let mut columns = validated.columns;
    let password_changed = validated.password.is_some();
    if let Some(password) = validated.password {
        columns.insert(PASSWORD_HASH_COLUMN.to_string(), Value::String(hash_password(&password)));
    }

    if columns.is_empty() {
        return Ok(Json(json!({ "success": true, "message": "No changes provided", "id": id })));
    }

    if !state.db.update(kind, id, columns).await? {
        return Err(ApiError::NotFound(kind.label()));
    }
    if password_changed {
        let revoked = state.auth.sessions().revoke_researcher(id).await;
        tracing::info!("🔐 Password reset for researcher {} ({} session(s) closed)", id, revoked);
    }
    tracing::info!("✏️ Updated {} {} by {}", kind.table(), id, session.0.subject);

    Ok(Json(json!({
        "success": true,
        "message": format!("{} updated successfully", kind.label()),
        "id": id,
    })))
}

/// Delete a record together with the junction rows pointing at it
///
/// DELETE /api/{entity}/{id}
async fn delete_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    session: Option<CurrentSession>,
) -> Result<Json<Value>, ApiError> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(kind, &id)?;
    let session = CurrentSession::required(session)?;
    session.require_admin()?;

    let existing = state
        .db
        .get(kind, id)
        .await?
        .ok_or(ApiError::NotFound(kind.label()))?;
    if !state.db.delete(kind, id).await? {
        return Err(ApiError::NotFound(kind.label()));
    }

    if let Some(image) = existing.get(IMAGE_COLUMN).and_then(Value::as_str) {
        uploads::remove_image(&state.uploads, image).await;
    }
    if kind == EntityKind::Researcher {
        state.auth.sessions().revoke_researcher(id).await;
    }
    tracing::info!("🗑️ Deleted {} {} by {}", kind.table(), id, session.0.subject);

    Ok(Json(json!({
        "success": true,
        "message": format!("{} deleted successfully", kind.label()),
        "id": id,
    })))
}

/// Mark a researcher as having left; the record stays but can no longer log in
///
/// PATCH /api/researchers/{id}/quit
async fn quit_researcher(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    session: Option<CurrentSession>,
) -> Result<Json<Value>, ApiError> {
    let kind = resolve_kind(&entity)?;
    if kind != EntityKind::Researcher {
        return Err(ApiError::NotFound("Resource"));
    }
    let id = parse_id(kind, &id)?;
    let session = CurrentSession::required(session)?;
    session.require_admin_or_self(kind, id)?;

    let mut columns = Record::new();
    columns.insert(ACTIVE_COLUMN.to_string(), Value::Bool(false));
    if !state.db.update(kind, id, columns).await? {
        return Err(ApiError::NotFound(kind.label()));
    }

    let revoked = state.auth.sessions().revoke_researcher(id).await;
    tracing::info!("🚪 Researcher {} deactivated ({} session(s) closed)", id, revoked);

    Ok(Json(json!({
        "success": true,
        "message": "Researcher deactivated successfully",
        "id": id,
    })))
}
