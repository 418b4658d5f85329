/// Persistence layer
///
/// Two interchangeable backends selected by configuration:
/// - SQLite through a sqlx pool, schema generated from the entity catalogue
/// - A single JSON document rewritten on every mutation
///
/// Both keep the same invariants: ids are never reused, junction pairs are unique,
/// deleting a record removes the junction rows that point at it and is refused while
/// any other record still references it.

pub mod json;
pub mod sqlite;

use crate::{
    config::{DatabaseBackend, DatabaseConfig},
    schema::{EntityKind, Record},
};
use serde_json::Value;
use std::sync::Arc;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

/// Storage failures surfaced to the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A junction pair already exists
    #[error("{label} already exists for {first} and {second}")]
    Conflict {
        label: &'static str,
        first: String,
        second: String,
    },
    /// The record is still referenced by a non-junction record
    #[error("Cannot delete {label} {id}: still referenced by {table}.{column}")]
    Referenced {
        label: &'static str,
        id: i64,
        table: &'static str,
        column: &'static str,
    },
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Selected storage backend
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqliteStore),
    Json(Arc<JsonStore>),
}

impl Database {
    /// Open the backend named in the configuration, creating files and schema as needed
    pub async fn open(config: &DatabaseConfig) -> anyhow::Result<Self> {
        match config.backend {
            DatabaseBackend::Sqlite => {
                tracing::info!("🗄️ Opening SQLite database: {}", config.sqlite_path);
                let store = SqliteStore::open(&config.sqlite_path).await?;
                Ok(Database::Sqlite(store))
            }
            DatabaseBackend::Json => {
                tracing::info!("📄 Opening JSON database: {}", config.json_path);
                let store = JsonStore::open(&config.json_path).await?;
                Ok(Database::Json(Arc::new(store)))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Database::Sqlite(_) => "sqlite",
            Database::Json(_) => "json",
        }
    }

    /// All records of a table matching every filter, ordered by id
    pub async fn select(&self, kind: EntityKind, filters: &[(&'static str, Value)]) -> StoreResult<Vec<Record>> {
        match self {
            Database::Sqlite(store) => store.select(kind, filters).await,
            Database::Json(store) => Ok(store.select(kind, filters)),
        }
    }

    pub async fn get(&self, kind: EntityKind, id: i64) -> StoreResult<Option<Record>> {
        match self {
            Database::Sqlite(store) => store.get(kind, id).await,
            Database::Json(store) => Ok(store.get(kind, id)),
        }
    }

    /// Records for the given ids; missing ids are skipped
    pub async fn get_many(&self, kind: EntityKind, ids: &[i64]) -> StoreResult<Vec<Record>> {
        match self {
            Database::Sqlite(store) => store.get_many(kind, ids).await,
            Database::Json(store) => Ok(store.get_many(kind, ids)),
        }
    }

    pub async fn exists(&self, kind: EntityKind, id: i64) -> StoreResult<bool> {
        Ok(self.get(kind, id).await?.is_some())
    }

    /// Insert a record and return its new id
    pub async fn insert(&self, kind: EntityKind, columns: Record) -> StoreResult<i64> {
        match self {
            Database::Sqlite(store) => store.insert(kind, columns).await,
            Database::Json(store) => store.insert(kind, columns).await,
        }
    }

    /// Merge columns into an existing record; `false` when the id is unknown
    pub async fn update(&self, kind: EntityKind, id: i64, columns: Record) -> StoreResult<bool> {
        match self {
            Database::Sqlite(store) => store.update(kind, id, columns).await,
            Database::Json(store) => store.update(kind, id, columns).await,
        }
    }

    /// Delete a record (and the junction rows pointing at it); `false` when unknown
    pub async fn delete(&self, kind: EntityKind, id: i64) -> StoreResult<bool> {
        match self {
            Database::Sqlite(store) => store.delete(kind, id).await,
            Database::Json(store) => store.delete(kind, id).await,
        }
    }
}

/// Render a column value for error messages
pub(crate) fn display_value(record: &Record, column: &str) -> String {
    match record.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}
