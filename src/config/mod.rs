/// Configuration management for labtrack
///
/// Handles server binding, storage backend selection, authentication and uploads.
/// Every value can be overridden through `LABTRACK_*` environment variables
/// (a `.env` file is honoured by the binary).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Login and session configuration
    pub auth: AuthConfig,
    /// Image upload configuration
    pub uploads: UploadConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Which storage backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Json,
}

impl FromStr for DatabaseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" => Ok(DatabaseBackend::Sqlite),
            "json" => Ok(DatabaseBackend::Json),
            other => Err(format!("Unsupported database type: {}", other)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// SQLite database file (default: "data/data.db")
    pub sqlite_path: String,
    /// JSON document file (default: "data/data.json")
    pub json_path: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Administrator login name
    pub admin_username: String,
    /// Administrator password; admin login is disabled when unset
    #[serde(skip_serializing)]
    pub admin_password: Option<String>,
    /// Name of the session cookie
    pub session_cookie: String,
    /// Session lifetime in hours
    pub session_ttl_hours: i64,
}

/// Image upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory uploaded images are written to and served from
    pub dir: String,
    /// Maximum accepted image size in bytes
    pub max_bytes: usize,
}

/// Session lifetime used when none (or an unusable one) is configured
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 3;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring invalid value for {}: {}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("LABTRACK_HOST", "0.0.0.0"),
                port: env_parse("LABTRACK_PORT", 5000),
            },
            database: DatabaseConfig {
                backend: env_parse("LABTRACK_DB_BACKEND", DatabaseBackend::Json),
                sqlite_path: env_or("LABTRACK_SQLITE_PATH", "data/data.db"),
                json_path: env_or("LABTRACK_JSON_PATH", "data/data.json"),
            },
            auth: AuthConfig {
                admin_username: env_or("LABTRACK_ADMIN_USERNAME", "admin"),
                admin_password: std::env::var("LABTRACK_ADMIN_PASSWORD")
                    .ok()
                    .filter(|p| !p.is_empty()),
                session_cookie: env_or("LABTRACK_SESSION_COOKIE", "labtrack_session"),
                session_ttl_hours: env_parse("LABTRACK_SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS),
            },
            uploads: UploadConfig {
                dir: env_or("LABTRACK_UPLOAD_DIR", "data/uploads"),
                max_bytes: env_parse("LABTRACK_MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("SQLite".parse::<DatabaseBackend>(), Ok(DatabaseBackend::Sqlite));
        assert_eq!("json".parse::<DatabaseBackend>(), Ok(DatabaseBackend::Json));
        assert!("mongo".parse::<DatabaseBackend>().is_err());
    }
}
