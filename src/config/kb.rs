// src/config/kb.rs
// Knowledge base sync/chunking/search configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorBackend {
    Sqlite,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    pub root_folder_id: String,
    pub context_folder_name: String,
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub embed_max_retries: u32,
    pub search_default_top_k: usize,
    pub search_default_threshold: f32,
    pub qdrant_url: String,
    pub qdrant_collection_prefix: String,
    pub vector_backend: VectorBackend,
    pub document_provider_api_base: String,
    pub document_provider_api_key: String,
}

impl KbConfig {
    pub fn from_env() -> Self {
        let backend = super::helpers::env_or("KB_VECTOR_BACKEND", "sqlite");
        Self {
            root_folder_id: super::helpers::env_or("KB_ROOT_FOLDER_ID", ""),
            context_folder_name: super::helpers::env_or("KB_CONTEXT_FOLDER_NAME", "context"),
            chunk_size_tokens: super::helpers::env_usize("KB_CHUNK_SIZE", 500),
            chunk_overlap_tokens: super::helpers::env_usize("KB_CHUNK_OVERLAP", 50),
            embed_max_retries: super::helpers::env_u32("KB_EMBED_MAX_RETRIES", 3),
            search_default_top_k: super::helpers::env_usize("KB_SEARCH_DEFAULT_TOP_K", 5),
            search_default_threshold: super::helpers::env_f32("KB_SEARCH_DEFAULT_THRESHOLD", 0.3),
            qdrant_url: super::helpers::env_or("QDRANT_URL", "http://localhost:6334"),
            qdrant_collection_prefix: super::helpers::env_or("QDRANT_COLLECTION_PREFIX", "commandcenter"),
            vector_backend: if backend.eq_ignore_ascii_case("qdrant") { VectorBackend::Qdrant } else { VectorBackend::Sqlite },
            document_provider_api_base: super::helpers::env_or("DOCUMENT_PROVIDER_API_BASE", "https://api.documents.example.com"),
            document_provider_api_key: super::helpers::env_or("DOCUMENT_PROVIDER_API_KEY", ""),
        }
    }
}
