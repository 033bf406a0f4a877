// src/config/mod.rs
// Central configuration for CommandCenter, composed from one module per domain.

pub mod budget;
pub mod helpers;
pub mod kb;
pub mod llm;
pub mod orchestrator;
pub mod server;
pub mod telemetry;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
    pub static ref CONFIG: CoreConfig = CoreConfig::from_env();
}

/// Top-level configuration, composed from domain configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub server: server::ServerConfig,
    pub database: server::DatabaseConfig,
    pub logging: server::LoggingConfig,
    pub llm: llm::LlmConfig,
    pub embedding: llm::EmbeddingConfig,
    pub web_search: llm::WebSearchConfig,
    pub token_budget: budget::TokenBudgetConfig,
    pub kb: kb::KbConfig,
    pub telemetry: telemetry::TelemetryConfig,
    pub orchestrator: orchestrator::OrchestratorConfig,
    pub cache_url: Option<String>,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: server::ServerConfig::from_env(),
            database: server::DatabaseConfig::from_env(),
            logging: server::LoggingConfig::from_env(),
            llm: llm::LlmConfig::from_env(),
            embedding: llm::EmbeddingConfig::from_env(),
            web_search: llm::WebSearchConfig::from_env(),
            token_budget: budget::TokenBudgetConfig::from_env(),
            kb: kb::KbConfig::from_env(),
            telemetry: telemetry::TelemetryConfig::from_env(),
            orchestrator: orchestrator::OrchestratorConfig::from_env(),
            cache_url: std::env::var("CACHE_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Validate config on startup. The orchestrator needs a real LLM key;
    /// everything else degrades gracefully (cache absent, web search disabled).
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.validate()
    }
}
