// src/kb/store.rs
// Relational persistence for documents and sync logs (design doc §3, §6).
// Chunk embeddings live behind the `VectorStore` trait (vector_store.rs);
// this store owns the `documents` and `sync_log` tables plus the
// per-`external_id` advisory lock that serializes concurrent syncs of the
// same document (design doc §4.2 step 7, §5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};

use super::types::{Document, MimeKind, SyncLog, SyncStatus};

pub struct DocumentStore {
    pool: SqlitePool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, locks: Mutex::new(HashMap::new()) }
    }

    /// Advisory lock keyed by `external_id`; held for the duration of one
    /// document's fetch-chunk-embed-write cycle so two concurrent syncs
    /// never race on the same document (design doc §4.2 step 7).
    pub async fn lock_for(&self, external_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(external_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Document> {
        let mime_raw: String = row.try_get("mime_kind").map_err(CoreError::from)?;
        let synced: i64 = row.try_get("last_synced_at").map_err(CoreError::from)?;
        Ok(Document {
            id: row.try_get("id").map_err(CoreError::from)?,
            external_id: row.try_get("external_id").map_err(CoreError::from)?,
            title: row.try_get("title").map_err(CoreError::from)?,
            folder_path: row.try_get("folder_path").map_err(CoreError::from)?,
            mime_kind: MimeKind::from_str_loose(&mime_raw),
            full_text: row.try_get("full_text").map_err(CoreError::from)?,
            is_context_file: row.try_get::<i64, _>("is_context_file").map_err(CoreError::from)? != 0,
            token_count: row.try_get("token_count").map_err(CoreError::from)?,
            last_synced_at: DateTime::from_timestamp(synced, 0).unwrap_or_else(Utc::now),
            sync_error: row.try_get("sync_error").ok(),
        })
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> CoreResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    /// Insert or update a document by `external_id`, returning its row id.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        external_id: &str,
        title: &str,
        folder_path: &str,
        mime_kind: MimeKind,
        full_text: &str,
        is_context_file: bool,
        token_count: i64,
        sync_error: Option<&str>,
    ) -> CoreResult<i64> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO documents
                (external_id, title, folder_path, mime_kind, full_text, is_context_file, token_count, last_synced_at, sync_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                folder_path = excluded.folder_path,
                mime_kind = excluded.mime_kind,
                full_text = excluded.full_text,
                is_context_file = excluded.is_context_file,
                token_count = excluded.token_count,
                last_synced_at = excluded.last_synced_at,
                sync_error = excluded.sync_error",
        )
        .bind(external_id)
        .bind(title)
        .bind(folder_path)
        .bind(mime_kind.as_str())
        .bind(full_text)
        .bind(is_context_file)
        .bind(token_count)
        .bind(now)
        .bind(sync_error)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;

        let row = sqlx::query("SELECT id FROM documents WHERE external_id = ?")
            .bind(external_id)
            .fetch_one(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.try_get("id").map_err(CoreError::from)
    }

    /// Delete documents whose `external_id` is not in `still_present`,
    /// returning the count deleted (design doc §4.2 step 8). Cascades to
    /// chunks via the `ON DELETE CASCADE` foreign key.
    pub async fn delete_missing(&self, still_present: &[String]) -> CoreResult<i64> {
        let existing: Vec<String> = sqlx::query("SELECT external_id FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?
            .iter()
            .filter_map(|r| r.try_get("external_id").ok())
            .collect();

        let still_present: std::collections::HashSet<&String> = still_present.iter().collect();
        let to_delete: Vec<&String> = existing.iter().filter(|id| !still_present.contains(id)).collect();

        for external_id in &to_delete {
            sqlx::query("DELETE FROM documents WHERE external_id = ?")
                .bind(external_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(CoreError::from)?;
        }

        Ok(to_delete.len() as i64)
    }

    pub async fn context_files(&self) -> CoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE is_context_file = 1 AND sync_error IS NULL ORDER BY title")
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter().map(Self::row_to_document).collect()
    }

    pub async fn get(&self, document_id: i64) -> CoreResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    pub async fn stats(&self) -> CoreResult<(i64, i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) as documents,
                    COALESCE(SUM(token_count), 0) as total_tokens,
                    COALESCE(SUM(CASE WHEN is_context_file THEN 1 ELSE 0 END), 0) as context_files
             FROM documents",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok((
            row.try_get("documents").map_err(CoreError::from)?,
            row.try_get("total_tokens").map_err(CoreError::from)?,
            row.try_get("context_files").map_err(CoreError::from)?,
        ))
    }

    pub async fn start_sync_log(&self) -> CoreResult<i64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO sync_log (started_at, status, processed, updated, deleted, failed)
             VALUES (?, 'running', 0, 0, 0, 0)",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn complete_sync_log(
        &self,
        id: i64,
        status: SyncStatus,
        processed: i64,
        updated: i64,
        deleted: i64,
        failed: i64,
    ) -> CoreResult<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE sync_log SET completed_at = ?, status = ?, processed = ?, updated = ?, deleted = ?, failed = ? WHERE id = ?",
        )
        .bind(now)
        .bind(status.as_str())
        .bind(processed)
        .bind(updated)
        .bind(deleted)
        .bind(failed)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn sync_counts(&self) -> CoreResult<(i64, i64, Option<DateTime<Utc>>)> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) as successful,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) as failed,
                MAX(completed_at) as last_completed
             FROM sync_log",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(CoreError::from)?;

        let last_completed: Option<i64> = row.try_get("last_completed").ok();
        Ok((
            row.try_get("successful").map_err(CoreError::from)?,
            row.try_get("failed").map_err(CoreError::from)?,
            last_completed.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        ))
    }

    #[allow(dead_code)]
    pub async fn recent_sync_logs(&self, limit: i64) -> CoreResult<Vec<SyncLog>> {
        let rows = sqlx::query("SELECT * FROM sync_log ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;

        rows.iter()
            .map(|row| {
                let started: i64 = row.try_get("started_at").map_err(CoreError::from)?;
                let completed: Option<i64> = row.try_get("completed_at").ok();
                let status_raw: String = row.try_get("status").map_err(CoreError::from)?;
                Ok(SyncLog {
                    id: row.try_get("id").map_err(CoreError::from)?,
                    started_at: DateTime::from_timestamp(started, 0).unwrap_or_else(Utc::now),
                    completed_at: completed.and_then(|ts| DateTime::from_timestamp(ts, 0)),
                    status: match status_raw.as_str() {
                        "completed" => SyncStatus::Completed,
                        "failed" => SyncStatus::Failed,
                        _ => SyncStatus::Running,
                    },
                    processed: row.try_get("processed").map_err(CoreError::from)?,
                    updated: row.try_get("updated").map_err(CoreError::from)?,
                    deleted: row.try_get("deleted").map_err(CoreError::from)?,
                    failed: row.try_get("failed").map_err(CoreError::from)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool_with_schema;

    #[tokio::test]
    async fn upsert_is_idempotent_by_external_id() {
        let pool = test_pool_with_schema().await;
        let store = DocumentStore::new(pool);

        let id1 = store.upsert("doc-1", "Title", "context/", MimeKind::Doc, "text", true, 10, None).await.unwrap();
        let id2 = store.upsert("doc-1", "Title v2", "context/", MimeKind::Doc, "text v2", true, 12, None).await.unwrap();
        assert_eq!(id1, id2);

        let doc = store.find_by_external_id("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.title, "Title v2");
    }

    #[tokio::test]
    async fn delete_missing_removes_only_absent_documents() {
        let pool = test_pool_with_schema().await;
        let store = DocumentStore::new(pool);
        store.upsert("keep", "Keep", "/", MimeKind::Doc, "t", false, 1, None).await.unwrap();
        store.upsert("drop", "Drop", "/", MimeKind::Doc, "t", false, 1, None).await.unwrap();

        let deleted = store.delete_missing(&["keep".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find_by_external_id("drop").await.unwrap().is_none());
        assert!(store.find_by_external_id("keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn context_files_only_returns_flagged_documents() {
        let pool = test_pool_with_schema().await;
        let store = DocumentStore::new(pool);
        store.upsert("ctx", "Context Doc", "context/", MimeKind::Doc, "t", true, 1, None).await.unwrap();
        store.upsert("other", "Other Doc", "misc/", MimeKind::Doc, "t", false, 1, None).await.unwrap();

        let files = store.context_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].external_id, "ctx");
    }

    #[tokio::test]
    async fn advisory_lock_is_per_external_id() {
        let pool = test_pool_with_schema().await;
        let store = DocumentStore::new(pool);
        let lock_a = store.lock_for("a").await;
        let lock_b_again = store.lock_for("a").await;
        assert!(Arc::ptr_eq(&lock_a, &lock_b_again));
    }
}
