/// Server setup and initialization
///
/// Wires together all components: storage backend, sessions, API and dashboard routes.
/// Provides the main application factory function for creating the Axum app.

use crate::{
    api::{create_auth_routes, create_entity_routes, create_upload_routes, AppState},
    auth::AuthService,
    config::Config,
    dashboard::create_dashboard_routes,
    storage::Database,
};
use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    response::Redirect,
    routing::get,
    Router,
};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};

/// Uploaded files are user content: never let the browser run them as a page of this origin
const UPLOAD_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

fn create_upload_file_service(dir: &str) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(UPLOAD_CSP),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
}

fn ensure_parent_dir(file: &str) -> Result<()> {
    if let Some(parent) = Path::new(file).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Create the main Axum application with all routes and middleware
///
/// Opens the configured storage backend (creating files and schema as needed),
/// sets up the session registry and mounts every route.
pub async fn create_app(config: Config) -> Result<Router> {
    // Ensure data directories exist
    tracing::info!("📁 Ensuring data directories exist");
    ensure_parent_dir(&config.database.sqlite_path)?;
    ensure_parent_dir(&config.database.json_path)?;
    std::fs::create_dir_all(&config.uploads.dir)
        .map_err(|e| anyhow::anyhow!("Failed to create upload directory {}: {}", config.uploads.dir, e))?;

    // Open the storage backend
    tracing::info!("🗄️ Initializing storage backend");
    let db = Database::open(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
    tracing::info!("✅ Storage ready ({})", db.backend_name());

    // Sessions and credentials
    tracing::info!("🔑 Initializing authentication (admin user: {})", config.auth.admin_username);
    let auth = Arc::new(AuthService::new(&config.auth));

    tracing::info!("🏗️ Creating application state");
    let app_state = AppState {
        db,
        auth,
        uploads: Arc::new(config.uploads.clone()),
    };

    // Create the main application router
    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        .route("/", get(|| async { Redirect::to("/dashboard/") }))

        // JSON API routes
        .merge(create_auth_routes())
        .merge(create_entity_routes())
        .merge(create_upload_routes(config.uploads.max_bytes))

        // Browser pages
        .merge(create_dashboard_routes())
        .with_state(app_state)

        // Uploaded images
        .nest_service("/uploads", create_upload_file_service(&config.uploads.dir))
        .layer(TraceLayer::new_for_http());

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
///
/// Creates the application and starts the Axum server on the configured address and port.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting labtrack server...");

    // Create the application
    let app = create_app(config.clone()).await?;

    // Bind to the configured address
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    // Start the server
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
