use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use super::{
    ChangeEvent, CommitReceipt, Document, DocumentPath, DocumentStore, Fields, Query,
    ServerClock, StoreError, WriteBatch, CHANGE_FEED_CAPACITY,
};
use crate::db::DbPool;

/// Document store persisted in the `documents` table.
///
/// Commits from this process are serialized so that the read-resolve-write
/// cycle of a batch never interleaves with another one.
pub struct SqliteDocumentStore {
    pool: DbPool,
    clock: ServerClock,
    commit_lock: Mutex<()>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            pool,
            clock: ServerClock::default(),
            commit_lock: Mutex::new(()),
            changes,
        }
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document, StoreError> {
    let raw_path: String = row.try_get("path")?;
    let raw_fields: String = row.try_get("fields")?;
    let update_time: DateTime<Utc> = row.try_get("update_time")?;
    let path = DocumentPath::parse(&raw_path)?;
    let fields: Fields =
        serde_json::from_str(&raw_fields).map_err(|source| StoreError::Decode {
            path: raw_path.clone(),
            source,
        })?;
    Ok(Document {
        path,
        fields,
        update_time,
    })
}

/// Narrows the scan with `json_extract` for scalar values. Arrays, objects and
/// null are left to [`Query::select`].
fn push_filter(sql: &mut QueryBuilder<'_, Sqlite>, field: &str, value: &Value) {
    let json_path = format!("$.\"{}\"", field.replace('"', "\\\""));
    match value {
        Value::String(text) => {
            sql.push(" AND json_extract(fields, ")
                .push_bind(json_path)
                .push(") = ")
                .push_bind(text.clone());
        }
        Value::Bool(flag) => {
            sql.push(" AND json_extract(fields, ")
                .push_bind(json_path)
                .push(") = ")
                .push_bind(i64::from(*flag));
        }
        Value::Number(number) => {
            sql.push(" AND json_extract(fields, ")
                .push_bind(json_path)
                .push(") = ");
            match number.as_i64() {
                Some(int) => sql.push_bind(int),
                None => sql.push_bind(number.as_f64().unwrap_or(f64::NAN)),
            };
        }
        Value::Null | Value::Array(_) | Value::Object(_) => {}
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT path, fields, update_time FROM documents WHERE path = ?1")
            .bind(path.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut sql = QueryBuilder::<Sqlite>::new(
            "SELECT path, fields, update_time FROM documents WHERE collection = ",
        );
        sql.push_bind(query.collection.as_str());
        for filter in &query.filters {
            push_filter(&mut sql, &filter.field, &filter.value);
        }
        let rows = sql.build().fetch_all(&self.pool).await?;
        let documents = rows
            .iter()
            .map(row_to_document)
            .collect::<Result<Vec<_>, _>>()?;
        // Ordering, and filters SQLite cannot compare, are applied in memory.
        Ok(query.select(documents))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        let _guard = self.commit_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut current = BTreeMap::new();
        for path in batch.paths() {
            let row =
                sqlx::query("SELECT path, fields, update_time FROM documents WHERE path = ?1")
                    .bind(path.to_string())
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(row) = row {
                current.insert(path, row_to_document(&row)?);
            }
        }

        let commit_time = self.clock.now();
        let mutations = batch.resolve(&current, commit_time)?;
        let written = mutations.len();
        for (path, fields) in mutations {
            match fields {
                Some(fields) => {
                    let raw = serde_json::to_string(&fields).map_err(StoreError::Encode)?;
                    sqlx::query(
                        r#"INSERT INTO documents (path, collection, doc_id, fields, update_time)
                           VALUES (?1, ?2, ?3, ?4, ?5)
                           ON CONFLICT(path) DO UPDATE SET
                               fields = excluded.fields,
                               update_time = excluded.update_time"#,
                    )
                    .bind(path.to_string())
                    .bind(path.parent().as_str())
                    .bind(path.id())
                    .bind(raw)
                    .bind(commit_time)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM documents WHERE path = ?1")
                        .bind(path.to_string())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;

        debug!(written, %commit_time, "committed batch to sqlite store");
        let _ = self.changes.send(ChangeEvent {
            commit_time,
            collections: batch.collections().into(),
        });
        Ok(CommitReceipt {
            commit_time,
            written,
        })
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
