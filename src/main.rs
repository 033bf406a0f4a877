// src/main.rs
// CommandCenter binary entrypoint: wires every subsystem collaborator
// together and serves the RPC surface over HTTP (design doc §5, §6).

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use commandcenter::agents::routing::RoutingTables;
use commandcenter::agents::Orchestrator;
use commandcenter::api::{CoreApi, http};
use commandcenter::cache::{CacheHandle, NoOpCache, SqliteCache};
use commandcenter::config::CONFIG;
use commandcenter::context::classifier::Classifier;
use commandcenter::context::sources::NoOpUserPrefs;
use commandcenter::context::ContextManager;
use commandcenter::conversation::ConversationStore;
use commandcenter::kb::provider::HttpDocumentProvider;
use commandcenter::kb::KnowledgeBase;
use commandcenter::llm::{HttpEmbeddingProvider, HttpLlmProvider, HttpWebSearchProvider};
use commandcenter::metrics;
use commandcenter::observability::ExecutionLog;
use commandcenter::storage;
use commandcenter::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&CONFIG.logging.level))
        .with_ansi(false)
        .init();

    info!("starting commandcenter");

    CONFIG.validate()?;

    let pool = storage::connect(&CONFIG.database.url, CONFIG.database.max_connections).await?;
    storage::run_migrations(&pool).await?;

    metrics::init_metrics();

    let conversation = Arc::new(ConversationStore::new(pool.clone()));

    let document_provider = Arc::new(HttpDocumentProvider::new(
        CONFIG.kb.document_provider_api_base.clone(),
        CONFIG.kb.document_provider_api_key.clone(),
    ));
    let embedder = Arc::new(HttpEmbeddingProvider::new(
        CONFIG.embedding.api_base.clone(),
        CONFIG.embedding.api_key.clone(),
        CONFIG.embedding.model.clone(),
        CONFIG.embedding.dimension,
    ));
    let kb = Arc::new(KnowledgeBase::new(pool.clone(), document_provider, embedder, CONFIG.kb.clone()).await);

    let telemetry = Arc::new(Telemetry::new(pool.clone(), &CONFIG.telemetry));
    let poller_handles = telemetry.spawn();
    info!("spawned {} telemetry pollers", poller_handles.len());

    let cache: Arc<dyn CacheHandle> = match &CONFIG.cache_url {
        Some(_) => Arc::new(SqliteCache::new(pool.clone())),
        None => Arc::new(NoOpCache),
    };

    let context_manager = Arc::new(ContextManager::new(
        Classifier::from_env(),
        CONFIG.token_budget.clone(),
        kb.clone(),
        conversation.clone(),
        Arc::new(NoOpUserPrefs),
        cache,
    ));

    let llm: Arc<dyn commandcenter::llm::LlmProvider> =
        Arc::new(HttpLlmProvider::new(CONFIG.llm.api_base.clone(), CONFIG.llm.api_key.clone(), CONFIG.llm.model.clone()));

    let web_search: Option<Arc<dyn commandcenter::llm::WebSearchProvider>> = if CONFIG.web_search.enabled {
        Some(Arc::new(HttpWebSearchProvider::new(CONFIG.web_search.api_base.clone(), CONFIG.web_search.api_key.clone())))
    } else {
        None
    };

    let executions = Arc::new(ExecutionLog::new(pool.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        llm,
        context_manager,
        conversation.clone(),
        kb.clone(),
        telemetry.clone(),
        web_search,
        RoutingTables::load_from_env(),
        CONFIG.orchestrator.clone(),
        executions.clone(),
    ));

    let api = Arc::new(CoreApi {
        orchestrator,
        conversation,
        kb,
        telemetry,
        executions,
        pool,
        api_key: CONFIG.server.api_key.clone(),
    });

    let app = http::router(api);
    let listener = tokio::net::TcpListener::bind(CONFIG.server.bind_address()).await?;
    info!("listening on {}", CONFIG.server.bind_address());
    axum::serve(listener, app).await?;

    Ok(())
}
