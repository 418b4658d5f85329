/// SQLite backend using sqlx
///
/// Tables are generated from the entity catalogue at startup. Every statement is built
/// from catalogue column names only; all values are bound parameters.

use crate::schema::{
    types::{FieldKind, ID_COLUMN},
    EntityKind, Record,
};
use crate::storage::{display_value, StoreError, StoreResult};
use serde_json::{Number, Value};
use sqlx::{
    query::Query,
    sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqliteRow},
    Row,
};
use std::path::Path;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite-backed record storage
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure every table exists
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("✅ SQLite database ready: {}", path.display());
        Ok(store)
    }

    /// Create one table per catalogue entry plus unique indexes for junction pairs.
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> StoreResult<()> {
        for kind in EntityKind::ALL {
            let mut columns = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", ID_COLUMN)];
            columns.extend(
                kind.columns()
                    .map(|(column, field_kind)| format!("{} {}", column, field_kind.sql_type())),
            );

            let statement = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                kind.table(),
                columns.join(", ")
            );
            sqlx::query(&statement).execute(&self.pool).await?;

            if let Some((first, second)) = kind.unique_key() {
                let index = format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_{}_pair ON {}({}, {})",
                    kind.table().to_lowercase(),
                    kind.table(),
                    first,
                    second
                );
                sqlx::query(&index).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub async fn select(&self, kind: EntityKind, filters: &[(&'static str, Value)]) -> StoreResult<Vec<Record>> {
        let mut statement = format!("SELECT * FROM {}", kind.table());
        if !filters.is_empty() {
            let conditions: Vec<String> = filters
                .iter()
                .map(|(column, _)| format!("{} = ?", column))
                .collect();
            statement.push_str(" WHERE ");
            statement.push_str(&conditions.join(" AND "));
        }
        statement.push_str(" ORDER BY id");

        let mut query = sqlx::query(&statement);
        for (_, value) in filters {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row_to_record(kind, row)).collect())
    }

    pub async fn get(&self, kind: EntityKind, id: i64) -> StoreResult<Option<Record>> {
        let statement = format!("SELECT * FROM {} WHERE id = ?", kind.table());
        let row = sqlx::query(&statement)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row_to_record(kind, &row)))
    }

    pub async fn get_many(&self, kind: EntityKind, ids: &[i64]) -> StoreResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let statement = format!(
            "SELECT * FROM {} WHERE id IN ({})",
            kind.table(),
            placeholders
        );
        let mut query = sqlx::query(&statement);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let records: Vec<Record> = rows.iter().map(|row| row_to_record(kind, row)).collect();

        // Keep the caller's order, like the JSON backend
        Ok(ids
            .iter()
            .filter_map(|id| {
                records
                    .iter()
                    .find(|record| crate::schema::record_id(record) == Some(*id))
                    .cloned()
            })
            .collect())
    }

    pub async fn insert(&self, kind: EntityKind, columns: Record) -> StoreResult<i64> {
        let present: Vec<(&String, &Value)> = columns.iter().filter(|(_, v)| !v.is_null()).collect();

        let statement = if present.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", kind.table())
        } else {
            let names: Vec<&str> = present.iter().map(|(column, _)| column.as_str()).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                kind.table(),
                names.join(", "),
                vec!["?"; names.len()].join(", ")
            )
        };

        let mut query = sqlx::query(&statement);
        for (_, value) in &present {
            query = bind_value(query, value);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(kind, &columns, e))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, kind: EntityKind, id: i64, columns: Record) -> StoreResult<bool> {
        if columns.is_empty() {
            return Ok(self.get(kind, id).await?.is_some());
        }

        let assignments: Vec<String> = columns.keys().map(|column| format!("{} = ?", column)).collect();
        let statement = format!(
            "UPDATE {} SET {} WHERE id = ?",
            kind.table(),
            assignments.join(", ")
        );

        let mut query = sqlx::query(&statement);
        for value in columns.values() {
            query = bind_value(query, value);
        }
        let result = match query.bind(id).execute(&self.pool).await {
            Ok(result) => result,
            Err(e) => {
                // Report the pair as it would have been stored
                let mut merged = self.get(kind, id).await?.unwrap_or_default();
                merged.extend(columns);
                return Err(unique_violation(kind, &merged, e));
            }
        };
        Ok(result.rows_affected() > 0)
    }

    /// Delete inside a transaction: refuse while non-junction rows reference the record,
    /// otherwise drop referencing junction rows together with it.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query(&format!("SELECT id FROM {} WHERE id = ?", kind.table()))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Ok(false);
        }

        let references = kind.referenced_by();
        for (other, spec) in &references {
            if other.is_junction() {
                continue;
            }
            let statement = format!(
                "SELECT id FROM {} WHERE {} = ? LIMIT 1",
                other.table(),
                spec.column
            );
            let referenced = sqlx::query(&statement)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if referenced {
                return Err(StoreError::Referenced {
                    label: kind.label(),
                    id,
                    table: other.table(),
                    column: spec.column,
                });
            }
        }

        for (other, spec) in &references {
            if other.is_junction() {
                let statement = format!("DELETE FROM {} WHERE {} = ?", other.table(), spec.column);
                sqlx::query(&statement).bind(id).execute(&mut *tx).await?;
            }
        }

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Decode a row using the catalogue kinds; NULL columns are left out of the record
fn row_to_record(kind: EntityKind, row: &SqliteRow) -> Record {
    let mut record = Record::new();
    if let Ok(id) = row.try_get::<i64, _>(ID_COLUMN) {
        record.insert(ID_COLUMN.to_string(), Value::from(id));
    }

    for (column, field_kind) in kind.columns() {
        let value = match field_kind {
            FieldKind::Integer | FieldKind::PositiveInteger => row
                .try_get::<Option<i64>, _>(column)
                .ok()
                .flatten()
                .map(Value::from),
            FieldKind::Real { .. } => row
                .try_get::<Option<f64>, _>(column)
                .ok()
                .flatten()
                .and_then(Number::from_f64)
                .map(Value::Number),
            FieldKind::Boolean => row
                .try_get::<Option<bool>, _>(column)
                .ok()
                .flatten()
                .map(Value::Bool),
            _ => row
                .try_get::<Option<String>, _>(column)
                .ok()
                .flatten()
                .map(Value::String),
        };
        if let Some(value) = value {
            record.insert(column.to_string(), value);
        }
    }
    record
}

fn unique_violation(kind: EntityKind, columns: &Record, error: sqlx::Error) -> StoreError {
    let is_unique = error
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation());
    match (is_unique, kind.unique_key()) {
        (true, Some((first, second))) => StoreError::Conflict {
            label: kind.label(),
            first: display_value(columns, first),
            second: display_value(columns, second),
        },
        _ => StoreError::Sql(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("data.db")).await.unwrap();
        (dir, store)
    }

    fn columns(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_select_round_trip_with_types() {
        let (_dir, store) = store().await;
        let id = store
            .insert(
                EntityKind::Project,
                columns(json!({
                    "NAME_PROJECT": "Deep sea",
                    "ID_MANAGER": 1,
                    "BUDGET": 99.5,
                    "STATUS": "active",
                    "DATE_BEGIN": "2024-01-01",
                    "DATE_END": "2024-02-01"
                })),
            )
            .await
            .unwrap();

        let record = store.get(EntityKind::Project, id).await.unwrap().unwrap();
        assert_eq!(record["id"], json!(id));
        assert_eq!(record["ID_MANAGER"], json!(1));
        assert_eq!(record["BUDGET"], json!(99.5));
        assert!(!record.contains_key("IMAGE"));

        let active = store
            .select(EntityKind::Project, &[("STATUS", json!("active"))])
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        let none = store
            .select(EntityKind::Project, &[("STATUS", json!("closed"))])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn autoincrement_never_reuses_ids() {
        let (_dir, store) = store().await;
        let first = store.insert(EntityKind::Grade, columns(json!({ "NAME_GRADE": "A" }))).await.unwrap();
        let second = store.insert(EntityKind::Grade, columns(json!({ "NAME_GRADE": "B" }))).await.unwrap();
        assert!(store.delete(EntityKind::Grade, second).await.unwrap());
        let third = store.insert(EntityKind::Grade, columns(json!({ "NAME_GRADE": "C" }))).await.unwrap();
        assert!(third > second && second > first);
    }

    #[tokio::test]
    async fn booleans_and_null_updates() {
        let (_dir, store) = store().await;
        let id = store
            .insert(
                EntityKind::Researcher,
                columns(json!({ "FULL_NAME": "Ada", "ACTIVE": true, "EMAIL": "ada@lab.org" })),
            )
            .await
            .unwrap();
        assert!(store
            .update(EntityKind::Researcher, id, columns(json!({ "ACTIVE": false, "EMAIL": null })))
            .await
            .unwrap());

        let record = store.get(EntityKind::Researcher, id).await.unwrap().unwrap();
        assert_eq!(record["ACTIVE"], json!(false));
        assert!(!record.contains_key("EMAIL"));
        assert!(!store.update(EntityKind::Researcher, 42, columns(json!({ "POSITION": "x" }))).await.unwrap());
    }

    #[tokio::test]
    async fn junction_conflicts_and_cascades() {
        let (_dir, store) = store().await;
        let lab = store.insert(EntityKind::Laboratory, columns(json!({ "NAME_LAB": "Bio" }))).await.unwrap();
        let project = store.insert(EntityKind::Project, columns(json!({ "NAME_PROJECT": "P" }))).await.unwrap();

        let pair = columns(json!({ "LABO_ID": lab, "ID_PROJECT": project }));
        store.insert(EntityKind::Assign, pair.clone()).await.unwrap();
        let error = store.insert(EntityKind::Assign, pair).await.unwrap_err();
        assert!(matches!(error, StoreError::Conflict { .. }));

        let equipment = store
            .insert(EntityKind::Equipment, columns(json!({ "NAME_EQUIPMENT": "Scope", "LABORATORY_ID": lab })))
            .await
            .unwrap();
        let error = store.delete(EntityKind::Laboratory, lab).await.unwrap_err();
        assert!(matches!(error, StoreError::Referenced { table: "EQUIPMENT", .. }));

        assert!(store.delete(EntityKind::Equipment, equipment).await.unwrap());
        assert!(store.delete(EntityKind::Laboratory, lab).await.unwrap());
        assert!(store.select(EntityKind::Assign, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_update_conflict_names_the_stored_pair() {
        let (_dir, store) = store().await;
        let bio = store.insert(EntityKind::Laboratory, columns(json!({ "NAME_LAB": "Bio" }))).await.unwrap();
        let chem = store.insert(EntityKind::Laboratory, columns(json!({ "NAME_LAB": "Chem" }))).await.unwrap();
        let project = store.insert(EntityKind::Project, columns(json!({ "NAME_PROJECT": "P" }))).await.unwrap();
        store
            .insert(EntityKind::Assign, columns(json!({ "LABO_ID": bio, "ID_PROJECT": project })))
            .await
            .unwrap();
        let second = store
            .insert(EntityKind::Assign, columns(json!({ "LABO_ID": chem, "ID_PROJECT": project })))
            .await
            .unwrap();

        let error = store
            .update(EntityKind::Assign, second, columns(json!({ "LABO_ID": bio })))
            .await
            .unwrap_err();
        match error {
            StoreError::Conflict { first, second, .. } => {
                assert_eq!(first, bio.to_string());
                assert_eq!(second, project.to_string());
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_many_keeps_requested_order() {
        let (_dir, store) = store().await;
        for name in ["a", "b", "c"] {
            store.insert(EntityKind::Grade, columns(json!({ "NAME_GRADE": name }))).await.unwrap();
        }
        let records = store.get_many(EntityKind::Grade, &[3, 9, 1]).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r["NAME_GRADE"].clone()).collect();
        assert_eq!(names, vec![json!("c"), json!("a")]);
    }
}
