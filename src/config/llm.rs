// src/config/llm.rs
// LLM, embedding, and web-search provider configuration.
// These providers are external collaborators (see design doc §1); this
// struct only holds the credentials and model names core needs to call them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: super::helpers::env_or("LLM_API_BASE", "https://api.openai.com/v1"),
            api_key: super::helpers::env_or("LLM_API_KEY", ""),
            model: super::helpers::env_or("LLM_MODEL", "gpt-5.1"),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("LLM_API_KEY is required to enable the agent orchestrator");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: super::helpers::env_or("EMBEDDING_API_BASE", "https://api.openai.com/v1"),
            api_key: super::helpers::env_or("EMBEDDING_API_KEY", ""),
            model: super::helpers::env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            dimension: super::helpers::env_usize("EMBEDDING_DIMENSION", 1536),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    pub api_base: String,
    pub api_key: String,
    pub enabled: bool,
}

impl WebSearchConfig {
    pub fn from_env() -> Self {
        let api_key = super::helpers::env_or("WEB_SEARCH_API_KEY", "");
        Self {
            api_base: super::helpers::env_or("WEB_SEARCH_API_BASE", "https://api.search.example.com"),
            enabled: !api_key.is_empty(),
            api_key,
        }
    }
}
