/// labtrack: records for a research organization
///
/// Researchers, laboratories, projects, partners, equipment, events and publications,
/// served as a JSON REST API and a small server-rendered dashboard over SQLite or a
/// single JSON document.

// Core configuration and setup
pub mod config;

// Data model - entity catalogue and payload validation
pub mod schema;

// Storage layer - SQLite and JSON document backends behind one interface
pub mod storage;

// Credentials and in-memory sessions
pub mod auth;

// HTTP API layer - REST endpoints for every table, login and uploads
pub mod api;

// Browser pages
pub mod dashboard;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use config::Config;
pub use schema::{EntityKind, Record};
pub use storage::Database;
pub use server::{create_app, start_server};
