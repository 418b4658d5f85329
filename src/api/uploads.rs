/// Image uploads for researchers, projects, events and publications
///
/// POST /api/{entity}/{id}/image with a multipart field named `image`.
/// Files land in `<upload dir>/<entity>/<uuid>_<name>`; the record's IMAGE column keeps the
/// path relative to the upload dir and the files are served under `/uploads`.

use crate::{
    api::{
        auth::CurrentSession,
        entities::{parse_id, resolve_kind, AppState},
        error::ApiError,
    },
    config::UploadConfig,
    schema::{types::IMAGE_COLUMN, Record},
};
use axum::{
    extract::{
        multipart::MultipartError,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::path::{Component, PathBuf};

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "svg"];

/// Headroom for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create image upload routes
pub fn create_upload_routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/{entity}/{id}/image", post(upload_image))
        .layer(DefaultBodyLimit::max(max_bytes + MULTIPART_OVERHEAD))
}

/// Keep only the last path component and replace anything unusual
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn has_allowed_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn too_large(max_bytes: usize) -> ApiError {
    ApiError::BadRequest(format!("File too large. Maximum size: {} bytes", max_bytes))
}

/// Bodies cut off by the request size limit surface as multipart errors carrying a 413
fn multipart_error(error: MultipartError, max_bytes: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", error))
    }
}

/// Resolve a stored IMAGE value below the upload dir, refusing anything that escapes it
fn stored_path(config: &UploadConfig, relative: &str) -> Option<PathBuf> {
    let relative = std::path::Path::new(relative);
    if relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        Some(PathBuf::from(&config.dir).join(relative))
    } else {
        None
    }
}

/// Best-effort removal of a stored image
pub async fn remove_image(config: &UploadConfig, relative: &str) {
    let Some(path) = stored_path(config, relative) else {
        tracing::warn!("⚠️ Refusing to remove image outside upload dir: {}", relative);
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!("🧹 Removed image {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("⚠️ Failed to remove image {}: {}", path.display(), e),
    }
}

/// Attach an image to a record, replacing the previous one
///
/// POST /api/{entity}/{id}/image
async fn upload_image(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    session: Option<CurrentSession>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let kind = resolve_kind(&entity)?;
    if !kind.has_image() {
        return Err(ApiError::NotFound("Resource"));
    }
    let id = parse_id(kind, &id)?;
    let session = CurrentSession::required(session)?;
    session.require_admin_or_self(kind, id)?;

    let existing = state
        .db
        .get(kind, id)
        .await?
        .ok_or(ApiError::NotFound(kind.label()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, state.uploads.max_bytes))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, state.uploads.max_bytes))?;
        upload = Some((file_name, data));
        break;
    }

    let Some((file_name, data)) = upload.filter(|(name, _)| !name.is_empty()) else {
        return Err(ApiError::BadRequest("No image file provided".to_string()));
    };
    if !has_allowed_extension(&file_name) {
        return Err(ApiError::BadRequest(format!(
            "Invalid file type. Allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if data.len() > state.uploads.max_bytes {
        return Err(too_large(state.uploads.max_bytes));
    }

    let stored_name = format!("{}_{}", uuid::Uuid::new_v4().simple(), sanitize_filename(&file_name));
    let relative = format!("{}/{}", kind.slug(), stored_name);
    let dir = PathBuf::from(&state.uploads.dir).join(kind.slug());
    let written = match tokio::fs::create_dir_all(&dir).await {
        Ok(()) => tokio::fs::write(dir.join(&stored_name), &data).await,
        Err(e) => Err(e),
    };
    written.map_err(|e| {
        tracing::error!("❌ Failed to store upload {}: {}", relative, e);
        ApiError::Internal("Failed to store image".to_string())
    })?;

    let mut columns = Record::new();
    columns.insert(IMAGE_COLUMN.to_string(), Value::String(relative.clone()));
    if !state.db.update(kind, id, columns).await? {
        remove_image(&state.uploads, &relative).await;
        return Err(ApiError::NotFound(kind.label()));
    }

    if let Some(previous) = existing.get(IMAGE_COLUMN).and_then(Value::as_str) {
        remove_image(&state.uploads, previous).await;
    }
    tracing::info!("🖼️ Stored image for {} {}: {}", kind.table(), id, relative);

    Ok(Json(json!({
        "success": true,
        "message": "Image uploaded successfully",
        "image": format!("/uploads/{}", relative),
    })))
}
