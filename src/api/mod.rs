// src/api/mod.rs
// The RPC contract (design doc §6): one async method per row of the
// inbound-RPC table, independent of transport. `src/api/http.rs` is the
// thin axum collaborator that maps these onto REST + SSE; nothing in core
// depends on it, matching §9's "out of scope" framing for the HTTP surface.

pub mod http;

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::agents::{AskResult, Orchestrator};
use crate::context::sources::KbSource;
use crate::conversation::{Conversation, ConversationStore, Message, SessionSummary};
use crate::error::CoreResult;
use crate::kb::types::{KbStats, SyncEvent, SyncMode};
use crate::kb::KnowledgeBase;
use crate::observability::{agents_health, system_health, AgentHealth, ExecutionLog, SystemHealth};
use crate::telemetry::types::{TelemetrySample, Vendor};
use crate::telemetry::Telemetry;

/// `agents.health` response body (design doc §6): an overall rollup plus
/// one entry per agent role.
#[derive(Debug, Clone, Serialize)]
pub struct AgentsHealthResponse {
    pub overall: &'static str,
    pub per_agent: Vec<AgentHealth>,
}

/// `kb.search` response row (design doc §6).
#[derive(Debug, Clone, Serialize)]
pub struct KbSearchResult {
    pub title: String,
    pub folder: String,
    pub chunk_text: String,
    pub similarity: f32,
}

/// `conversations.get` response body (design doc §6).
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub session: Conversation,
    pub messages: Vec<Message>,
}

/// Wires every subsystem handle the RPC surface needs. Constructed once in
/// `main` alongside the `Orchestrator` it wraps; cheap to clone since every
/// field is an `Arc` or a pool handle.
#[derive(Clone)]
pub struct CoreApi {
    pub orchestrator: Arc<Orchestrator>,
    pub conversation: Arc<ConversationStore>,
    pub kb: Arc<KnowledgeBase>,
    pub telemetry: Arc<Telemetry>,
    pub executions: Arc<ExecutionLog>,
    pub pool: SqlitePool,
    /// Required `X-Api-Key` header value for every RPC but `/health` and
    /// `/metrics` (design doc §6's "Configuration" row); `None` disables
    /// the check, matching local/dev deployment.
    pub api_key: Option<String>,
}

impl CoreApi {
    /// `ask` (design doc §6).
    pub async fn ask(&self, message: &str, session_id: Option<&str>, user_id: Option<&str>) -> AskResult {
        self.orchestrator.ask(message, session_id, user_id).await
    }

    /// `conversations.list`.
    pub async fn list_conversations(&self, limit: i64) -> CoreResult<Vec<SessionSummary>> {
        self.conversation.list_conversations(limit).await
    }

    /// `conversations.get`.
    pub async fn get_conversation(&self, session_id: &str, recent_limit: i64) -> CoreResult<Option<ConversationDetail>> {
        let Some(session) = self.conversation.get_conversation(session_id).await? else {
            return Ok(None);
        };
        let messages = self.conversation.recent(session_id, recent_limit).await?;
        Ok(Some(ConversationDetail { session, messages }))
    }

    /// `kb.sync`: returns the progress stream; the HTTP collaborator turns
    /// this into SSE and closes it on `Done` or consumer disconnect
    /// (design doc §4.2, §5).
    pub fn kb_sync(&self, mode: SyncMode, force: bool) -> mpsc::Receiver<SyncEvent> {
        self.kb.start_sync(mode, force)
    }

    /// `kb.search`.
    pub async fn kb_search(&self, query: &str, top_k: usize, threshold: f32) -> Vec<KbSearchResult> {
        KbSource::search(self.kb.as_ref(), query, top_k, threshold)
            .await
            .into_iter()
            .map(|hit| KbSearchResult { title: hit.document_title, folder: hit.folder, chunk_text: hit.chunk_text, similarity: hit.similarity })
            .collect()
    }

    /// `kb.stats`.
    pub async fn kb_stats(&self) -> CoreResult<KbStats> {
        self.kb.stats().await
    }

    /// `telemetry.latest`.
    pub async fn telemetry_latest(&self, vendor: Vendor) -> CoreResult<Option<TelemetrySample>> {
        self.telemetry.latest(vendor).await
    }

    /// `telemetry.history`.
    pub async fn telemetry_history(&self, vendor: Vendor, hours: i64, limit: i64) -> CoreResult<Vec<TelemetrySample>> {
        self.telemetry.history(vendor, hours, limit).await
    }

    /// `health`.
    pub async fn health(&self) -> SystemHealth {
        system_health(&self.pool, &self.telemetry).await
    }

    /// `agents.health`.
    pub async fn agents_health(&self) -> AgentsHealthResponse {
        let per_agent = agents_health(&self.executions).await;
        let overall = if per_agent.iter().any(|a| a.status == "degraded") { "degraded" } else { "healthy" };
        AgentsHealthResponse { overall, per_agent }
    }
}
