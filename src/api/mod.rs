/// HTTP API Layer
///
/// JSON endpoints over the storage layer:
/// - Generic CRUD for every table under /api/{entity}
/// - Login, logout and password changes under /api/auth
/// - Image uploads for records that carry a picture

// Shared state, CRUD endpoints (GET/POST/PUT/DELETE/PATCH)
pub mod entities;

// Session endpoints and the session extractor
pub mod auth;

// Multipart image uploads
pub mod uploads;

// Error type rendered as JSON responses
pub mod error;

// Re-export router builders
pub use auth::{create_auth_routes, CurrentSession};
pub use entities::{create_entity_routes, AppState};
pub use error::ApiError;
pub use uploads::create_upload_routes;
