// src/kb/mod.rs
// Knowledge Base subsystem (design doc §4.2): owns document sync, chunking,
// embedding, and semantic search, and is the concrete `KbSource` the
// Context Manager bundles against.

pub mod chunker;
pub mod extract;
pub mod provider;
pub mod store;
pub mod sync;
pub mod types;
pub mod vector_store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::kb::{KbConfig, VectorBackend};
use crate::context::sources::{ContextFileSection, KbSearchHit, KbSource};
use crate::llm::EmbeddingProvider;

use provider::DocumentProvider;
use store::DocumentStore;
use sync::SyncRunner;
use types::{KbStats, SyncEvent, SyncMode};
use vector_store::{QdrantVectorStore, SqliteVectorStore, VectorStore};

pub struct KnowledgeBase {
    pool: SqlitePool,
    document_store: Arc<DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    provider: Arc<dyn DocumentProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: KbConfig,
    kb_version: Arc<AtomicU64>,
}

impl KnowledgeBase {
    /// Build the vector store the config asks for and compose the
    /// subsystem. Qdrant connection failures fall back to the sqlite
    /// store rather than refusing to start -- semantic search degrades to
    /// brute force, everything else keeps working (the same "graceful
    /// collaborator fallback" shape the cache layer uses).
    pub async fn new(
        pool: SqlitePool,
        provider: Arc<dyn DocumentProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: KbConfig,
    ) -> Self {
        let vector_store: Arc<dyn VectorStore> = match config.vector_backend {
            VectorBackend::Qdrant => {
                match QdrantVectorStore::connect(&config.qdrant_url, &config.qdrant_collection_prefix, embedder.dimension() as u64)
                    .await
                {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        warn!("qdrant unavailable ({}), falling back to sqlite vector store", e);
                        Arc::new(SqliteVectorStore::new(pool.clone()))
                    }
                }
            }
            VectorBackend::Sqlite => Arc::new(SqliteVectorStore::new(pool.clone())),
        };

        Self {
            document_store: Arc::new(DocumentStore::new(pool.clone())),
            pool,
            vector_store,
            provider,
            embedder,
            config,
            kb_version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Launch one sync run in the background, streaming progress back over
    /// the returned channel (design doc §4.2, §6). The caller -- the HTTP
    /// collaborator -- turns that channel into an SSE response.
    pub fn start_sync(&self, mode: SyncMode, force: bool) -> mpsc::Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel(32);
        let runner = SyncRunner {
            provider: self.provider.clone(),
            embedder: self.embedder.clone(),
            document_store: self.document_store.clone(),
            vector_store: self.vector_store.clone(),
            config: self.config.clone(),
            kb_version: self.kb_version.clone(),
        };
        tokio::spawn(async move {
            runner.run(mode, force, tx).await;
        });
        rx
    }

    pub async fn stats(&self) -> crate::error::CoreResult<KbStats> {
        use crate::error::CoreError;

        let (documents, total_tokens, context_files) = self.document_store.stats().await?;
        let (successful_syncs, failed_syncs, last_sync_time) = self.document_store.sync_counts().await?;
        let chunks_row = sqlx::query("SELECT COUNT(*) as chunks FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(CoreError::from)?;
        let chunks: i64 = chunks_row.try_get("chunks").map_err(CoreError::from)?;

        Ok(KbStats { documents, chunks, context_files, total_tokens, last_sync_time, successful_syncs, failed_syncs })
    }

    pub async fn get_document(&self, document_id: i64) -> crate::error::CoreResult<Option<types::Document>> {
        self.document_store.get(document_id).await
    }
}

#[async_trait]
impl KbSource for KnowledgeBase {
    async fn context_files(&self) -> Vec<ContextFileSection> {
        match self.document_store.context_files().await {
            Ok(docs) => docs
                .into_iter()
                .map(|d| ContextFileSection { title: d.title, text: d.full_text, token_count: d.token_count })
                .collect(),
            Err(e) => {
                warn!("failed to load context files: {}", e);
                vec![]
            }
        }
    }

    async fn search(&self, query: &str, top_k: usize, threshold: f32) -> Vec<KbSearchHit> {
        let embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!("kb search embedding failed: {}", e);
                return vec![];
            }
        };

        let hits = match self.vector_store.search(&embedding, top_k, threshold).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("kb vector search failed: {}", e);
                return vec![];
            }
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let doc = self.document_store.get(hit.document_id).await.ok().flatten();
            let (document_title, folder) = doc.map(|d| (d.title, d.folder_path)).unwrap_or_default();
            results.push(KbSearchHit { document_title, folder, chunk_text: hit.text, similarity: hit.similarity });
        }
        results
    }

    fn kb_version(&self) -> u64 {
        self.kb_version.load(Ordering::SeqCst)
    }

    fn default_threshold(&self) -> f32 {
        self.config.search_default_threshold
    }
}
