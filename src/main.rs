/// labtrack: records for a research organization
///
/// Main entry point. Loads `.env`, builds the configuration from the environment and
/// starts the HTTP server.

use labtrack::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - REST API at /api/{entity} and /api/auth/*
/// - Dashboard pages at /dashboard/*
/// - Uploaded images at /uploads/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Defaults: 0.0.0.0:5000, JSON document under data/
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
