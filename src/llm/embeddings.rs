// src/llm/embeddings.rs
// Embedding provider, grounded in the teacher's `OpenAiEmbeddings` (single
// and batched calls to an embeddings endpoint).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(api_base: String, api_key: String, model: String, dimension: usize) -> Self {
        Self { client: reqwest::Client::new(), api_base, api_key, model, dimension }
    }

    fn parse_embeddings(raw: &Value) -> CoreResult<Vec<Vec<f32>>> {
        let data = raw["data"]
            .as_array()
            .ok_or_else(|| CoreError::Internal("no data array in embedding response".into()))?;
        Ok(data
            .iter()
            .filter_map(|item| {
                item["embedding"]
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect::<Vec<f32>>())
            })
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let embeddings = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        embeddings.into_iter().next().ok_or_else(|| CoreError::Internal("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let body = json!({ "model": self.model, "input": texts });
        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 20 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!(
                "embedding provider responded {}",
                response.status()
            )));
        }

        let raw: Value = response.json().await?;
        Self::parse_embeddings(&raw)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_embeddings_extracts_vectors_in_order() {
        let raw = json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] },
            ]
        });
        let parsed = HttpEmbeddingProvider::parse_embeddings(&raw).unwrap();
        assert_eq!(parsed, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }
}
