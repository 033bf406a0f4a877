// src/agents/mod.rs
// Agent Orchestrator (design doc §4.3): a Manager plus three specialists
// over the typed tool registry in `tools.rs`. Deterministic routing
// overrides run before any LLM call; the manager hands off to exactly one
// specialist per query and passes its final answer through unchanged.

pub mod planning;
pub mod routing;
pub mod tools;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::context::types::QueryType;
use crate::context::ContextManager;
use crate::conversation::{ConversationStore, MessageMetadata, MessageRole};
use crate::config::orchestrator::OrchestratorConfig;
use crate::error::CoreError;
use crate::kb::KnowledgeBase;
use crate::llm::web_search::WebSearchProvider;
use crate::llm::{ChatOutcome, LlmProvider, Message, ToolCallInfo};
use crate::metrics;
use crate::observability::ExecutionLog;
use crate::telemetry::Telemetry;

use routing::RoutingTables;
use tools::{execute_tool, schemas_for, AgentTool, ExecutionContext};

/// The agent roster (design doc §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Manager,
    Status,
    Planner,
    Research,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Manager => "manager",
            AgentRole::Status => "status",
            AgentRole::Planner => "planner",
            AgentRole::Research => "research",
        }
    }

    fn tools(&self) -> Vec<AgentTool> {
        match self {
            AgentRole::Manager => AgentTool::manager_tools(),
            AgentRole::Status => AgentTool::status_tools(),
            AgentRole::Planner => AgentTool::planner_tools(),
            AgentRole::Research => AgentTool::research_tools(),
        }
    }

    fn backstory(&self) -> &'static str {
        match self {
            AgentRole::Manager => {
                "You are the CommandCenter manager agent. You do not answer questions yourself. \
                 For every query either call route_to_status, route_to_planner, or route_to_research \
                 to hand the question to the right specialist, or call search_kb directly when the \
                 question is purely informational. If you have nothing useful to add, reply with a \
                 short direct answer instead of calling a tool."
            }
            AgentRole::Status => {
                "You are the CommandCenter status specialist. You answer questions about the current \
                 or historical state of the solar installation using the latest_sample, history, stats, \
                 and search_kb tools. Cite the sample timestamp when freshness matters. Answer plainly; \
                 do not mention tool names to the user."
            }
            AgentRole::Planner => {
                "You are the CommandCenter planning specialist. You answer questions about battery \
                 management, discretionary mining load, and energy balance using the battery_plan, \
                 miner_plan, energy_plan, latest_sample, and search_kb tools. Ground every \
                 recommendation in the tool output, never guess a number."
            }
            AgentRole::Research => {
                "You are the CommandCenter research specialist. You answer questions that need \
                 information beyond this site's own telemetry and documentation, using web_search, \
                 web_extract, and search_kb. Be explicit when a claim comes from the open web rather \
                 than this site's own records."
            }
        }
    }
}

/// Suggests which specialist a query type is most likely headed for; used
/// only to bias the manager's prompt, never to force a route (design doc
/// §4.3's "type-based routing hint").
fn routing_hint(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::System => "status",
        QueryType::Planning => "planner",
        QueryType::Research => "research",
        QueryType::General => "whichever specialist best fits, or answer directly if none do",
    }
}

/// Output contract for `ask` (design doc §4.3/§6). `response` is omitted
/// when the failure is a system error rather than a user-safe one (design
/// doc §7's propagation policy).
#[derive(Debug, Clone, Serialize)]
pub struct AskResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub agent_role: String,
    pub duration_ms: i64,
    pub session_id: String,
    pub context_tokens: i64,
    pub cache_hit: bool,
    pub query_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of either the manager or a specialist loop over one query.
enum LoopOutcome {
    Answered(String),
    RouteTo(AgentRole),
    MaxIterations,
    ToolErrorFatal(String),
    ModelError(String),
    DeadlineExceeded,
}

/// Wires the Context Manager, Conversation Store, Knowledge Base,
/// Telemetry, LLM provider, and tool registry into the query pipeline
/// described in design doc §4.3.
pub struct Orchestrator {
    llm: Arc<dyn LlmProvider>,
    context_manager: Arc<ContextManager>,
    conversation: Arc<ConversationStore>,
    kb: Arc<KnowledgeBase>,
    telemetry: Arc<Telemetry>,
    web_search: Option<Arc<dyn WebSearchProvider>>,
    routing: RoutingTables,
    config: OrchestratorConfig,
    executions: Arc<ExecutionLog>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        context_manager: Arc<ContextManager>,
        conversation: Arc<ConversationStore>,
        kb: Arc<KnowledgeBase>,
        telemetry: Arc<Telemetry>,
        web_search: Option<Arc<dyn WebSearchProvider>>,
        routing: RoutingTables,
        config: OrchestratorConfig,
        executions: Arc<ExecutionLog>,
    ) -> Self {
        Self { llm, context_manager, conversation, kb, telemetry, web_search, routing, config, executions }
    }

    /// Answer one user query end to end: ensure a session, classify and
    /// bundle context, apply the deterministic routing overrides, run the
    /// manager/specialist loops, persist both turns, and record an
    /// `AgentExecution` row regardless of outcome.
    pub async fn ask(&self, message: &str, session_id: Option<&str>, user_id: Option<&str>) -> AskResult {
        let start = Instant::now();
        let deadline = start + self.config.query_deadline;

        let session_id = match self.conversation.ensure_session(session_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to establish a conversation session: {}", e);
                return AskResult {
                    response: None,
                    agent_role: AgentRole::Manager.as_str().to_string(),
                    duration_ms: start.elapsed().as_millis() as i64,
                    session_id: session_id.unwrap_or("").to_string(),
                    context_tokens: 0,
                    cache_hit: false,
                    query_type: QueryType::General.to_string(),
                    error: Some("internal".to_string()),
                };
            }
        };

        let (query_type, confidence) = self.context_manager.classify(message);

        if query_type == QueryType::General && confidence == 0.0 {
            let response = "Could you rephrase that as a question about the site's status, planning, or documentation?".to_string();
            return self
                .finish(
                    start,
                    session_id,
                    query_type,
                    confidence,
                    AgentRole::Manager,
                    0,
                    false,
                    Some(response),
                    None,
                    vec![],
                )
                .await;
        }

        let bundle = self.context_manager.bundle(message, Some(&session_id), user_id).await;
        let cache_hit = bundle.cache_hit;
        let context_tokens = bundle.total_tokens;

        let _ = self
            .conversation
            .append(&session_id, MessageRole::User, message, MessageMetadata::default())
            .await;

        let mut ctx = ExecutionContext::new(
            message.to_string(),
            bundle,
            session_id.clone(),
            self.kb.clone(),
            self.telemetry.clone(),
            self.web_search.clone(),
        );

        let mut tools_invoked: Vec<String> = vec![];
        let (agent_role, outcome) = self.run(message, query_type, deadline, &mut ctx, &mut tools_invoked).await;

        let (response, error) = match outcome {
            LoopOutcome::Answered(text) => (Some(text), None),
            LoopOutcome::MaxIterations => {
                (Some("I could not confidently answer that.".to_string()), Some("max_iterations".to_string()))
            }
            LoopOutcome::RouteTo(_) => {
                (Some("I could not confidently answer that.".to_string()), Some("max_iterations".to_string()))
            }
            LoopOutcome::ToolErrorFatal(msg) => (None, Some(format!("tool_error_fatal: {}", msg))),
            LoopOutcome::ModelError(msg) => (None, Some(format!("model_error: {}", msg))),
            LoopOutcome::DeadlineExceeded => (None, Some("deadline".to_string())),
        };

        self.finish(
            start,
            session_id,
            query_type,
            confidence,
            agent_role,
            context_tokens,
            cache_hit,
            response,
            error,
            tools_invoked,
        )
        .await
    }

    async fn finish(
        &self,
        start: Instant,
        session_id: String,
        query_type: QueryType,
        _confidence: f32,
        agent_role: AgentRole,
        context_tokens: i64,
        cache_hit: bool,
        response: Option<String>,
        error: Option<String>,
        tools_invoked: Vec<String>,
    ) -> AskResult {
        let duration_ms = start.elapsed().as_millis() as i64;

        if let Some(text) = &response {
            let metadata = MessageMetadata {
                agent_role: Some(agent_role.as_str().to_string()),
                duration_ms: Some(duration_ms),
                tokens: Some(context_tokens),
                cache_hit: Some(cache_hit),
                query_type: Some(query_type.to_string()),
            };
            if error.is_none() {
                let _ = self.conversation.append(&session_id, MessageRole::Assistant, text, metadata).await;
            }
        }

        metrics::record_agent_execution(agent_role.as_str(), &query_type.to_string(), error.as_deref());
        metrics::record_cache_result(cache_hit);
        metrics::record_tokens_in(&query_type.to_string(), context_tokens);

        if let Err(e) = self
            .executions
            .record(&session_id, agent_role.as_str(), &query_type.to_string(), context_tokens, cache_hit, duration_ms, &tools_invoked, error.as_deref())
            .await
        {
            warn!("failed to record agent execution: {}", e);
        }

        AskResult {
            response,
            agent_role: agent_role.as_str().to_string(),
            duration_ms,
            session_id,
            context_tokens,
            cache_hit,
            query_type: query_type.to_string(),
            error,
        }
    }

    /// Apply the three deterministic overrides, then fall through to the
    /// manager loop (design doc §4.3).
    async fn run(
        &self,
        query: &str,
        query_type: QueryType,
        deadline: Instant,
        ctx: &mut ExecutionContext,
        tools_invoked: &mut Vec<String>,
    ) -> (AgentRole, LoopOutcome) {
        let normalized = crate::context::classifier::Classifier::normalize(query);

        if self.routing.matches_meta(&normalized) {
            info!("meta/off-topic override matched for session {}", ctx.session_id);
            return (
                AgentRole::Manager,
                LoopOutcome::Answered(
                    "I'm CommandCenter, the operational control plane for this off-grid solar site. \
                     Ask me about battery status, energy planning, or site documentation."
                        .to_string(),
                ),
            );
        }

        if self.routing.matches_kb_fast_path(&normalized) {
            info!("kb fast path override matched for session {}", ctx.session_id);
            tools_invoked.push(AgentTool::SearchKb.name().to_string());
            let text = execute_tool(AgentTool::SearchKb, &serde_json::json!({ "query": query }), ctx).await;
            if !text.contains("No matching knowledge base entries") {
                return (AgentRole::Manager, LoopOutcome::Answered(strip_tool_wrapper(&text)));
            }
            // Fast path found nothing; fall through to the regular manager loop.
        }

        match self.manager_loop(query, query_type, deadline, ctx, tools_invoked).await {
            LoopOutcome::RouteTo(role) => {
                let outcome = self.specialist_loop(role, deadline, ctx, tools_invoked).await;
                (role, outcome)
            }
            other => (AgentRole::Manager, other),
        }
    }

    async fn manager_loop(
        &self,
        query: &str,
        query_type: QueryType,
        deadline: Instant,
        ctx: &mut ExecutionContext,
        tools_invoked: &mut Vec<String>,
    ) -> LoopOutcome {
        let system = format!(
            "{}\n\nThe query appears to be type {:?}; prefer routing to the {} specialist unless clearly mismatched.",
            AgentRole::Manager.backstory(),
            query_type,
            routing_hint(query_type)
        );
        let mut messages = vec![Message::system(system), Message::user(format!("{}\n\nUser question: {}", ctx.bundle.format(), query))];
        let tool_specs = schemas_for(&AgentRole::Manager.tools());

        for iteration in 0..self.config.manager_max_iterations {
            if Instant::now() >= deadline {
                return LoopOutcome::DeadlineExceeded;
            }

            match self.chat_with_retry(&messages, &tool_specs, deadline).await {
                Ok(ChatOutcome::Text(text)) => return LoopOutcome::Answered(text),
                Ok(ChatOutcome::ToolCall(call)) => {
                    match route_for_tool_name(&call.name) {
                        Some(role) => return LoopOutcome::RouteTo(role),
                        None => match AgentTool::from_name(&call.name) {
                            Some(tool @ AgentTool::SearchKb) => {
                                tools_invoked.push(tool.name().to_string());
                                let result = execute_tool(tool, &call.arguments, ctx).await;
                                messages.push(assistant_tool_call(&call));
                                messages.push(Message::tool_result(call.id.clone(), result));
                            }
                            _ => {
                                messages.push(assistant_tool_call(&call));
                                messages.push(Message::tool_result(
                                    call.id.clone(),
                                    format!("unknown tool '{}': rejected", call.name),
                                ));
                            }
                        },
                    }
                }
                Err(e) => {
                    warn!("manager iteration {} failed: {}", iteration, e);
                    return LoopOutcome::ModelError(e.to_string());
                }
            }
        }

        LoopOutcome::MaxIterations
    }

    async fn specialist_loop(
        &self,
        role: AgentRole,
        deadline: Instant,
        ctx: &mut ExecutionContext,
        tools_invoked: &mut Vec<String>,
    ) -> LoopOutcome {
        let mut messages =
            vec![Message::system(role.backstory()), Message::user(format!("{}\n\nUser question: {}", ctx.bundle.format(), ctx.query))];
        let tool_specs = schemas_for(&role.tools());

        for iteration in 0..self.config.specialist_max_iterations {
            if Instant::now() >= deadline {
                return LoopOutcome::DeadlineExceeded;
            }

            match self.chat_with_retry(&messages, &tool_specs, deadline).await {
                Ok(ChatOutcome::Text(text)) => return LoopOutcome::Answered(text),
                Ok(ChatOutcome::ToolCall(call)) => match AgentTool::from_name(&call.name) {
                    Some(tool) if role.tools().contains(&tool) => {
                        tools_invoked.push(tool.name().to_string());
                        let result = execute_tool(tool, &call.arguments, ctx).await;
                        let is_error = result.contains("error=\"true\"");
                        messages.push(assistant_tool_call(&call));
                        messages.push(Message::tool_result(call.id.clone(), result));
                        if is_error && iteration + 1 == self.config.specialist_max_iterations {
                            return LoopOutcome::ToolErrorFatal(format!("tool '{}' kept failing", call.name));
                        }
                    }
                    _ => {
                        messages.push(assistant_tool_call(&call));
                        messages.push(Message::tool_result(
                            call.id.clone(),
                            format!("tool '{}' is not available to this specialist", call.name),
                        ));
                    }
                },
                Err(e) => {
                    warn!("{:?} specialist iteration {} failed: {}", role, iteration, e);
                    return LoopOutcome::ModelError(e.to_string());
                }
            }
        }

        LoopOutcome::MaxIterations
    }

    /// Bounded retries on transient upstream failures (design doc §5: "K=3,
    /// jittered exponential backoff"), mirroring `kb::sync::embed_with_retry`.
    async fn chat_with_retry(
        &self,
        messages: &[Message],
        tools: &[crate::llm::ToolSpec],
        deadline: Instant,
    ) -> Result<ChatOutcome, CoreError> {
        const MAX_RETRIES: u32 = 3;
        let mut attempt = 0u32;
        loop {
            match self.llm.chat(messages, tools).await {
                Ok(response) => return Ok(response.outcome),
                Err(e @ (CoreError::UpstreamTransient(_) | CoreError::RateLimited { .. })) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200u64 * 2u64.pow(attempt));
                    if Instant::now() + backoff >= deadline {
                        return Err(e);
                    }
                    warn!("llm chat attempt {} failed: {}; retrying in {:?}", attempt, e, backoff);
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn route_for_tool_name(name: &str) -> Option<AgentRole> {
    match name {
        "route_to_status" => Some(AgentRole::Status),
        "route_to_planner" => Some(AgentRole::Planner),
        "route_to_research" => Some(AgentRole::Research),
        _ => None,
    }
}

fn assistant_tool_call(call: &ToolCallInfo) -> Message {
    let mut message = Message::assistant("");
    message.tool_calls = Some(vec![call.clone()]);
    message
}

/// Unwrap the `<tool_output ...>` delimiter so a directly-answered fast
/// path doesn't leak the untrusted-data wrapper into the user-facing text.
fn strip_tool_wrapper(wrapped: &str) -> String {
    let start = wrapped.find('>').map(|i| i + 1).unwrap_or(0);
    let end = wrapped.rfind("</tool_output>").unwrap_or(wrapped.len());
    wrapped.get(start..end).unwrap_or(wrapped).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_hint_matches_type_to_specialist() {
        assert_eq!(routing_hint(QueryType::System), "status");
        assert_eq!(routing_hint(QueryType::Planning), "planner");
        assert_eq!(routing_hint(QueryType::Research), "research");
    }

    #[test]
    fn route_for_tool_name_matches_manager_tools_only() {
        assert_eq!(route_for_tool_name("route_to_status"), Some(AgentRole::Status));
        assert_eq!(route_for_tool_name("search_kb"), None);
    }

    #[test]
    fn strip_tool_wrapper_removes_the_delimiter() {
        let wrapped = "<tool_output name=\"search_kb\" trusted=\"false\" error=\"false\">\nhello\n</tool_output>";
        assert_eq!(strip_tool_wrapper(wrapped), "hello");
    }

}
