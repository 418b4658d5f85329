/// Authentication endpoints and the session extractor
///
/// POST /api/auth/login, POST /api/auth/logout, GET /api/auth/me, PUT /api/auth/password

use crate::{
    api::{entities::AppState, error::ApiError},
    auth::{hash_password, Role, Session},
    schema::{
        types::PASSWORD_HASH_COLUMN,
        validation::validate_password,
        EntityKind, Record,
    },
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;

/// The session behind the request's cookie; rejects with 401 when absent or expired
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .auth
            .session_from_headers(&parts.headers)
            .await
            .map(CurrentSession)
            .ok_or(ApiError::Unauthorized)
    }
}

/// `Option<CurrentSession>` lets handlers check the route before demanding a login
impl OptionalFromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>, Self::Rejection> {
        Ok(state
            .auth
            .session_from_headers(&parts.headers)
            .await
            .map(CurrentSession))
    }
}

impl CurrentSession {
    /// Turn an optional session into a 401 when absent
    pub fn required(session: Option<Self>) -> Result<Self, ApiError> {
        session.ok_or(ApiError::Unauthorized)
    }

    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }

    /// Administrators only
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Administrators, or the researcher the record belongs to
    pub fn require_admin_or_self(&self, kind: EntityKind, id: i64) -> Result<(), ApiError> {
        if self.is_admin() || (kind == EntityKind::Researcher && self.0.researcher_id == Some(id)) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PasswordChangeRequest {
    password: String,
    confirm_password: Option<String>,
}

/// Create authentication routes
pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/password", put(change_password))
}

/// Log in with admin or researcher credentials
///
/// POST /api/auth/login
/// Body: { "username": "...", "password": "..." }
async fn login(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    let request: LoginRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("❌ Invalid login payload: {}", e);
            return Ok((StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid request" }))).into_response());
        }
    };

    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid request" }))).into_response());
    }

    match state.auth.login(&state.db, username, &request.password).await? {
        Some((token, session)) => Ok((
            [(header::SET_COOKIE, state.auth.session_cookie(&token))],
            Json(json!({ "message": "Login successful", "role": session.role })),
        )
            .into_response()),
        None => Ok((StatusCode::UNAUTHORIZED, Json(json!({ "message": "Login failed" }))).into_response()),
    }
}

/// End the current session and clear the cookie
///
/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if state.auth.logout(&headers).await {
        tracing::info!("👋 Session closed");
    }
    (
        [(header::SET_COOKIE, state.auth.clear_cookie())],
        Json(json!({ "message": "Logout successful" })),
    )
}

/// Describe the current session
///
/// GET /api/auth/me
async fn me(session: CurrentSession) -> Json<Session> {
    Json(session.0)
}

/// Change the logged-in researcher's password
///
/// PUT /api/auth/password
/// Body: { "password": "...", "confirm_password": "..." }
async fn change_password(
    State(state): State<AppState>,
    session: CurrentSession,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let Some(researcher_id) = session.0.researcher_id else {
        return Err(ApiError::BadRequest(
            "The administrator password is managed through the environment".to_string(),
        ));
    };

    let request: PasswordChangeRequest =
        serde_json::from_str(&body).map_err(|_| ApiError::BadRequest("Invalid JSON payload".to_string()))?;
    let errors = validate_password(&request.password, request.confirm_password.as_deref());
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let mut columns = Record::new();
    columns.insert(
        PASSWORD_HASH_COLUMN.to_string(),
        Value::String(hash_password(&request.password)),
    );
    if !state.db.update(EntityKind::Researcher, researcher_id, columns).await? {
        return Err(ApiError::NotFound(EntityKind::Researcher.label()));
    }

    tracing::info!("🔐 Password changed for researcher {}", researcher_id);
    Ok(Json(json!({ "success": true, "message": "Password updated successfully" })))
}
