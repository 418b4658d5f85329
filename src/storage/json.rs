/// Flat JSON file backend
///
/// The whole database is one JSON document: a top-level array per table plus a `_SEQ`
/// map of per-table id sequences. Reads take a lock-free snapshot through ArcSwap;
/// writers are serialized by a mutex, mutate a copy, rewrite the file and then publish
/// the new snapshot, so readers never observe a state that is not on disk.

use crate::schema::{record_id, types::values_match, EntityKind, Record};
use crate::storage::{display_value, StoreError, StoreResult};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

/// In-memory image of the JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Last id handed out per table; never decreases
    #[serde(rename = "_SEQ", default)]
    sequences: BTreeMap<String, i64>,
    /// Table name -> rows
    #[serde(flatten)]
    tables: BTreeMap<String, Vec<Record>>,
}

impl Document {
    /// Make sure every catalogue table exists and sequences cover existing ids
    fn normalize(&mut self) {
        for kind in EntityKind::ALL {
            let max_id = self
                .tables
                .entry(kind.table().to_string())
                .or_default()
                .iter()
                .filter_map(record_id)
                .max()
                .unwrap_or(0);
            let sequence = self.sequences.entry(kind.table().to_string()).or_insert(0);
            if *sequence < max_id {
                *sequence = max_id;
            }
        }
    }

    fn rows(&self, kind: EntityKind) -> &[Record] {
        self.tables
            .get(kind.table())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn rows_mut(&mut self, kind: EntityKind) -> &mut Vec<Record> {
        self.tables.entry(kind.table().to_string()).or_default()
    }

    fn next_id(&mut self, kind: EntityKind) -> i64 {
        let sequence = self.sequences.entry(kind.table().to_string()).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Reject a row whose junction pair already exists in another row
    fn check_unique(&self, kind: EntityKind, candidate: &Record, own_id: Option<i64>) -> StoreResult<()> {
        let Some((first, second)) = kind.unique_key() else {
            return Ok(());
        };
        let (Some(a), Some(b)) = (candidate.get(first), candidate.get(second)) else {
            return Ok(());
        };
        let duplicate = self.rows(kind).iter().any(|row| {
            record_id(row) != own_id
                && row.get(first).is_some_and(|v| values_match(v, a))
                && row.get(second).is_some_and(|v| values_match(v, b))
        });
        if duplicate {
            return Err(StoreError::Conflict {
                label: kind.label(),
                first: display_value(candidate, first),
                second: display_value(candidate, second),
            });
        }
        Ok(())
    }
}

fn matches_filters(record: &Record, filters: &[(&'static str, Value)]) -> bool {
    filters.iter().all(|(column, expected)| {
        record
            .get(*column)
            .is_some_and(|stored| values_match(stored, expected))
    })
}

fn merge(record: &mut Record, columns: Record) {
    for (column, value) in columns {
        if value.is_null() {
            record.remove(&column);
        } else {
            record.insert(column, value);
        }
    }
}

/// JSON document store
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    snapshot: ArcSwap<Document>,
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Load the document, starting from an empty one when the file is missing or corrupt.
    /// A corrupt file is moved aside rather than overwritten.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (mut document, needs_write) = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Document>(&bytes) {
                Ok(document) => (document, false),
                Err(e) => {
                    let backup = path.with_extension(format!(
                        "corrupt-{}.json",
                        chrono::Utc::now().format("%Y%m%d%H%M%S")
                    ));
                    tracing::warn!(
                        "⚠️ JSON database {} is unreadable ({}); moving it to {} and starting empty",
                        path.display(),
                        e,
                        backup.display()
                    );
                    tokio::fs::rename(&path, &backup).await?;
                    (Document::default(), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("📄 JSON database {} not found, creating it", path.display());
                (Document::default(), true)
            }
            Err(e) => return Err(e.into()),
        };

        document.normalize();
        let store = Self {
            path,
            snapshot: ArcSwap::new(Arc::new(document)),
            write_lock: Mutex::new(()),
        };
        if needs_write {
            store.persist(&store.snapshot.load()).await?;
        }
        Ok(store)
    }

    pub fn select(&self, kind: EntityKind, filters: &[(&'static str, Value)]) -> Vec<Record> {
        self.snapshot
            .load()
            .rows(kind)
            .iter()
            .filter(|record| matches_filters(record, filters))
            .cloned()
            .collect()
    }

    pub fn get(&self, kind: EntityKind, id: i64) -> Option<Record> {
        self.snapshot
            .load()
            .rows(kind)
            .iter()
            .find(|record| record_id(record) == Some(id))
            .cloned()
    }

    pub fn get_many(&self, kind: EntityKind, ids: &[i64]) -> Vec<Record> {
        let document = self.snapshot.load();
        ids.iter()
            .filter_map(|id| {
                document
                    .rows(kind)
                    .iter()
                    .find(|record| record_id(record) == Some(*id))
                    .cloned()
            })
            .collect()
    }

    pub async fn insert(&self, kind: EntityKind, columns: Record) -> StoreResult<i64> {
        self.mutate(|document| {
            let mut record = Record::new();
            merge(&mut record, columns);
            document.check_unique(kind, &record, None)?;

            let id = document.next_id(kind);
            record.insert(crate::schema::types::ID_COLUMN.to_string(), Value::from(id));
            document.rows_mut(kind).push(record);
            Ok((id, true))
        })
        .await
    }

    pub async fn update(&self, kind: EntityKind, id: i64, columns: Record) -> StoreResult<bool> {
        self.mutate(|document| {
            let Some(position) = document
                .rows(kind)
                .iter()
                .position(|record| record_id(record) == Some(id))
            else {
                return Ok((false, false));
            };

            let mut updated = document.rows(kind)[position].clone();
            merge(&mut updated, columns);
            updated.insert(crate::schema::types::ID_COLUMN.to_string(), Value::from(id));
            document.check_unique(kind, &updated, Some(id))?;

            document.rows_mut(kind)[position] = updated;
            Ok((true, true))
        })
        .await
    }

    pub async fn delete(&self, kind: EntityKind, id: i64) -> StoreResult<bool> {
        self.mutate(|document| {
            if !document.rows(kind).iter().any(|record| record_id(record) == Some(id)) {
                return Ok((false, false));
            }

            let references = kind.referenced_by();
            for (other, spec) in &references {
                if other.is_junction() {
                    continue;
                }
                let referenced = document
                    .rows(*other)
                    .iter()
                    .any(|row| row.get(spec.column).and_then(Value::as_i64) == Some(id));
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
                    document
                        .rows_mut(*other)
                        .retain(|row| row.get(spec.column).and_then(Value::as_i64) != Some(id));
                }
            }
            document.rows_mut(kind).retain(|record| record_id(record) != Some(id));
            Ok((true, true))
        })
        .await
    }

    /// Apply a change to a copy of the document, persist it, then publish it.
    /// The closure returns its result and whether anything changed.
    async fn mutate<T>(&self, change: impl FnOnce(&mut Document) -> StoreResult<(T, bool)>) -> StoreResult<T> {
        let _guard = self.write_lock.lock().await;
        let mut document = Document::clone(&self.snapshot.load());
        let (result, changed) = change(&mut document)?;
        if changed {
            self.persist(&document).await?;
            self.snapshot.store(Arc::new(document));
        }
        Ok(result)
    }

    /// Rewrite the whole file through a temporary sibling and an atomic rename
    async fn persist(&self, document: &Document) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!("💾 JSON database written: {}", self.path.display());
        Ok(())
    }
}
