// src/kb/sync.rs
// Sync protocol (design doc §4.2, nine steps). Exposed as an async
// function that emits `SyncEvent`s over an mpsc channel -- the HTTP layer
// is the only place that turns that into SSE (design doc §9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::kb::KbConfig;
use crate::llm::EmbeddingProvider;
use crate::metrics;

use super::chunker::chunk_text;
use super::extract::extract_text;
use super::provider::DocumentProvider;
use super::store::DocumentStore;
use super::types::{SyncEvent, SyncMode, SyncPhase, SyncProgress, SyncStatus, SyncSummary};
use super::vector_store::VectorStore;

/// Does `folder_path` live under the configured context folder? A
/// document is a context file iff the folder path has the context
/// folder name as one of its path components (design doc §3 invariant).
fn is_context_file(folder_path: &str, context_folder_name: &str) -> bool {
    folder_path.split('/').any(|segment| segment == context_folder_name)
}

async fn embed_with_retry(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    max_retries: u32,
) -> crate::error::CoreResult<Vec<f32>> {
    let mut attempt = 0u32;
    loop {
        match embedder.embed(text).await {
            Ok(embedding) => return Ok(embedding),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                let backoff = Duration::from_millis(200u64 * 2u64.pow(attempt));
                warn!("embedding attempt {} failed: {}; retrying in {:?}", attempt, e, backoff);
                sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Outcome of syncing one document: counts as a success (whether changed
/// or not) or a recorded per-document failure. The overall sync is a
/// partial-success accumulation, not an all-or-nothing `Result` (design
/// doc §9 redesign note).
enum DocOutcome {
    Unchanged,
    Updated,
    Failed,
}

#[allow(clippy::too_many_arguments)]
async fn sync_one_document(
    meta: &super::provider::RemoteDocumentMeta,
    provider: &dyn DocumentProvider,
    embedder: &dyn EmbeddingProvider,
    document_store: &DocumentStore,
    vector_store: &dyn VectorStore,
    config: &KbConfig,
    force: bool,
) -> DocOutcome {
    let lock = document_store.lock_for(&meta.external_id).await;
    let _guard = lock.lock().await;

    let existing = document_store.find_by_external_id(&meta.external_id).await.unwrap_or(None);
    if !force {
        if let Some(existing) = &existing {
            if meta.external_mtime <= existing.last_synced_at {
                return DocOutcome::Unchanged;
            }
        }
    }

    let bytes = match provider.fetch_content(&meta.external_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("fetch failed for {}: {}", meta.external_id, e);
            let _ = document_store
                .upsert(
                    &meta.external_id,
                    &meta.title,
                    &meta.folder_path,
                    meta.mime_kind,
                    "",
                    is_context_file(&meta.folder_path, &config.context_folder_name),
                    0,
                    Some(&format!("not_found: {e}")),
                )
                .await;
            return DocOutcome::Failed;
        }
    };

    let full_text = match extract_text(&bytes, meta.mime_kind, None) {
        Ok(text) => text,
        Err(e) => {
            error!("extraction failed for {}: {}", meta.external_id, e);
            let _ = document_store
                .upsert(
                    &meta.external_id,
                    &meta.title,
                    &meta.folder_path,
                    meta.mime_kind,
                    "",
                    is_context_file(&meta.folder_path, &config.context_folder_name),
                    0,
                    Some(&e.to_string()),
                )
                .await;
            return DocOutcome::Failed;
        }
    };

    let token_count = crate::utils::hash::estimate_tokens(&full_text);
    let is_context = is_context_file(&meta.folder_path, &config.context_folder_name);

    let drafts = chunk_text(&full_text, config.chunk_size_tokens, config.chunk_overlap_tokens);
    let mut chunks = Vec::with_capacity(drafts.len());
    let mut chunk_error = None;

    for draft in &drafts {
        match embed_with_retry(embedder, &draft.text, config.embed_max_retries).await {
            Ok(embedding) => chunks.push((draft.order_index, draft.text.clone(), draft.token_count, embedding)),
            Err(e) => {
                chunk_error = Some(e.to_string());
                break;
            }
        }
    }

    if let Some(err) = chunk_error {
        warn!("document {} marked failed: chunk embedding error: {}", meta.external_id, err);
        let _ = document_store
            .upsert(
                &meta.external_id,
                &meta.title,
                &meta.folder_path,
                meta.mime_kind,
                &full_text,
                is_context,
                token_count,
                Some(&err),
            )
            .await;
        return DocOutcome::Failed;
    }

    let document_id = match document_store
        .upsert(&meta.external_id, &meta.title, &meta.folder_path, meta.mime_kind, &full_text, is_context, token_count, None)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            error!("failed to persist document {}: {}", meta.external_id, e);
            return DocOutcome::Failed;
        }
    };

    if let Err(e) = vector_store.replace_document_chunks(document_id, &chunks).await {
        error!("failed to persist chunks for document {}: {}", meta.external_id, e);
        return DocOutcome::Failed;
    }

    DocOutcome::Updated
}

pub struct SyncRunner {
    pub provider: Arc<dyn DocumentProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub document_store: Arc<DocumentStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub config: KbConfig,
    pub kb_version: Arc<AtomicU64>,
}

impl SyncRunner {
    /// Run one sync to completion, sending progress events as it goes.
    /// Consumer disconnect is modeled by the channel closing: a send
    /// error just stops further progress reporting, the sync itself keeps
    /// running to completion and still writes its `SyncLog` row (design
    /// doc §5: "the worker finishes the current document ... and stops"
    /// applies to the stream, not the underlying work).
    pub async fn run(&self, mode: SyncMode, force: bool, events: mpsc::Sender<SyncEvent>) -> SyncSummary {
        let root_folder_id = if mode == SyncMode::Smart {
            format!("{}/{}", self.config.root_folder_id, self.config.context_folder_name)
        } else {
            self.config.root_folder_id.clone()
        };

        let log_id = match self.document_store.start_sync_log().await {
            Ok(id) => id,
            Err(e) => {
                error!("could not start sync log: {}", e);
                let summary = SyncSummary { processed: 0, updated: 0, deleted: 0, failed: 0, status: SyncStatus::Failed };
                let _ = events.send(SyncEvent::Done { summary: summary.clone() }).await;
                return summary;
            }
        };

        let _ = events
            .send(SyncEvent::Progress(SyncProgress {
                processed: 0,
                total: 0,
                current_title: String::new(),
                phase: SyncPhase::Listing,
            }))
            .await;

        let documents = match self.provider.list_documents(&root_folder_id).await {
            Ok(docs) => docs,
            Err(e) => {
                error!("kb sync listing failed: {}", e);
                let _ = self.document_store.complete_sync_log(log_id, SyncStatus::Failed, 0, 0, 0, 0).await;
                let summary = SyncSummary { processed: 0, updated: 0, deleted: 0, failed: 0, status: SyncStatus::Failed };
                let _ = events.send(SyncEvent::Done { summary: summary.clone() }).await;
                metrics::record_sync_run("failed", 0, 0);
                return summary;
            }
        };

        let total = documents.len();
        let mut processed = 0i64;
        let mut updated = 0i64;
        let mut failed = 0i64;

        for meta in &documents {
            let _ = events
                .send(SyncEvent::Progress(SyncProgress {
                    processed: processed as usize,
                    total,
                    current_title: meta.title.clone(),
                    phase: SyncPhase::Fetching,
                }))
                .await;

            match sync_one_document(
                meta,
                self.provider.as_ref(),
                self.embedder.as_ref(),
                &self.document_store,
                self.vector_store.as_ref(),
                &self.config,
                force,
            )
            .await
            {
                DocOutcome::Updated => updated += 1,
                DocOutcome::Failed => failed += 1,
                DocOutcome::Unchanged => {}
            }
            processed += 1;
        }

        let _ = events
            .send(SyncEvent::Progress(SyncProgress {
                processed: total,
                total,
                current_title: String::new(),
                phase: SyncPhase::Finalizing,
            }))
            .await;

        let still_present: Vec<String> = documents.iter().map(|d| d.external_id.clone()).collect();
        let deleted = match self.document_store.delete_missing(&still_present).await {
            Ok(n) => n,
            Err(e) => {
                error!("kb sync deletion reconciliation failed: {}", e);
                0
            }
        };

        let status = SyncStatus::Completed;
        let _ = self.document_store.complete_sync_log(log_id, status, processed, updated, deleted, failed).await;

        if updated > 0 || deleted > 0 {
            let new_version = self.kb_version.fetch_add(1, Ordering::SeqCst) + 1;
            info!("kb_version incremented to {}", new_version);
        }

        metrics::record_sync_run(status.as_str(), processed, failed);
        info!(
            "kb sync completed: processed={} updated={} deleted={} failed={}",
            processed, updated, deleted, failed
        );

        let summary = SyncSummary { processed, updated, deleted, failed, status };
        let _ = events.send(SyncEvent::Done { summary: summary.clone() }).await;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_folder_detected_anywhere_in_path() {
        assert!(is_context_file("site/context/policies", "context"));
        assert!(is_context_file("context", "context"));
        assert!(!is_context_file("site/misc/policies", "context"));
    }
}
