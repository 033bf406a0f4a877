// src/kb/vector_store.rs
// Vector index behind a trait (design doc §9 note: the spec's "relational
// store with vector index extensions" is modeled as a separate capability
// so a real ANN backend can be swapped in without touching callers). Two
// implementations: an in-process cosine-similarity store over the sqlite
// `chunks` table (default, zero extra infrastructure) and a Qdrant-backed
// store for deployments that want approximate nearest neighbor search at
// scale, grounded in the teacher's `QdrantMultiStore`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub document_id: i64,
    pub order_index: i32,
    pub text: String,
    pub similarity: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace all vectors for `document_id` atomically (design doc §4.2
    /// step 7: delete existing chunks, insert new).
    async fn replace_document_chunks(
        &self,
        document_id: i64,
        chunks: &[(i32, String, i64, Vec<f32>)],
    ) -> CoreResult<()>;

    async fn delete_document(&self, document_id: i64) -> CoreResult<()>;

    async fn search(&self, embedding: &[f32], top_k: usize, threshold: f32) -> CoreResult<Vec<VectorHit>>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Default vector store: chunk embeddings live in the same sqlite `chunks`
/// table the relational store uses (design doc §6 schema), searched with
/// brute-force cosine similarity. Fine at the document counts a single
/// off-grid site's knowledge base holds; swap in `QdrantVectorStore` for
/// larger deployments.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn replace_document_chunks(
        &self,
        document_id: i64,
        chunks: &[(i32, String, i64, Vec<f32>)],
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(CoreError::from)?;

        for (order_index, text, token_count, embedding) in chunks {
            sqlx::query(
                "INSERT INTO chunks (document_id, order_index, text, token_count, embedding)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(document_id)
            .bind(order_index)
            .bind(text)
            .bind(token_count)
            .bind(encode_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(CoreError::from)?;
        }

        tx.commit().await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn delete_document(&self, document_id: i64) -> CoreResult<()> {
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize, threshold: f32) -> CoreResult<Vec<VectorHit>> {
        let rows = sqlx::query("SELECT document_id, order_index, text, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.try_get("embedding").ok()?;
                let vec = decode_embedding(&blob);
                let similarity = cosine_similarity(embedding, &vec);
                if similarity < threshold {
                    return None;
                }
                Some(VectorHit {
                    document_id: row.try_get("document_id").ok()?,
                    order_index: row.try_get("order_index").ok()?,
                    text: row.try_get("text").ok()?,
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Qdrant-backed store for deployments that want a real ANN index (design
/// doc §6: "approximate-nearest-neighbor index on `embedding` using cosine
/// distance"). One collection per crate instance, named from
/// `KB_QDRANT_COLLECTION_PREFIX`.
pub struct QdrantVectorStore {
    client: qdrant_client::Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub async fn connect(url: &str, collection_prefix: &str, dimension: u64) -> anyhow::Result<Self> {
        use qdrant_client::qdrant::{CreateCollectionBuilder, Distance, VectorParamsBuilder};

        let client = qdrant_client::Qdrant::from_url(url).skip_compatibility_check().build()?;
        let collection = format!("{}_chunks", collection_prefix);

        if !client.collection_exists(&collection).await? {
            info!("creating qdrant collection {}", collection);
            match client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
                )
                .await
            {
                Ok(_) => {}
                Err(e) if e.to_string().contains("already exists") => {
                    warn!("qdrant collection {} already exists, continuing", collection);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self { client, collection })
    }

    fn point_id(document_id: i64, order_index: i32) -> u64 {
        // document_id and order_index are both small and positive in
        // practice; packing them keeps point ids stable across re-syncs
        // instead of minting a fresh uuid per chunk.
        ((document_id as u64) << 20) | (order_index as u64 & 0xFFFFF)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn replace_document_chunks(
        &self,
        document_id: i64,
        chunks: &[(i32, String, i64, Vec<f32>)],
    ) -> CoreResult<()> {
        use qdrant_client::qdrant::{DeletePointsBuilder, PointStruct, UpsertPointsBuilder};
        use qdrant_client::qdrant::{Condition, Filter};

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::must([Condition::matches("document_id", document_id)])),
            )
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|(order_index, text, token_count, embedding)| {
                let mut payload = std::collections::HashMap::new();
                payload.insert("document_id".to_string(), document_id.into());
                payload.insert("order_index".to_string(), (*order_index).into());
                payload.insert("text".to_string(), text.clone().into());
                payload.insert("token_count".to_string(), (*token_count).into());
                PointStruct::new(Self::point_id(document_id, *order_index), embedding.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        Ok(())
    }

    async fn delete_document(&self, document_id: i64) -> CoreResult<()> {
        use qdrant_client::qdrant::{Condition, DeletePointsBuilder, Filter};

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::must([Condition::matches("document_id", document_id)])),
            )
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize, threshold: f32) -> CoreResult<Vec<VectorHit>> {
        use qdrant_client::qdrant::SearchPointsBuilder;

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), top_k as u64)
                    .score_threshold(threshold)
                    .with_payload(true),
            )
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;
                let document_id = payload.get("document_id")?.as_integer()?;
                let order_index = payload.get("order_index")?.as_integer()? as i32;
                let text = payload.get("text")?.as_str()?.to_string();
                Some(VectorHit { document_id, order_index, text, similarity: point.score })
            })
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                order_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn embedding_encode_decode_round_trips() {
        let v = vec![0.1f32, -0.2, 3.5, 0.0];
        let decoded = decode_embedding(&encode_embedding(&v));
        assert_eq!(v, decoded);
    }

    #[tokio::test]
    async fn search_respects_threshold_and_top_k() {
        let pool = test_pool().await;
        let store = SqliteVectorStore::new(pool);

        store
            .replace_document_chunks(
                1,
                &[
                    (0, "close match".into(), 3, vec![1.0, 0.0, 0.0]),
                    (1, "far match".into(), 3, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 5, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "close match");
    }

    #[tokio::test]
    async fn replace_document_chunks_is_atomic_delete_then_insert() {
        let pool = test_pool().await;
        let store = SqliteVectorStore::new(pool);

        store
            .replace_document_chunks(1, &[(0, "old".into(), 1, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace_document_chunks(1, &[(0, "new".into(), 1, vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "new");
    }
}
