// src/agents/tools.rs
// Typed tool registry and dispatcher (design doc §4.3: "a typed ToolRegistry
// (name -> {schema, handler})"). Grounded in the teacher's
// advisory/tool_bridge.rs: an allow-listed tool enum, a budget/cooldown
// tracker, and a central execute_tool() that never lets a collaborator
// error escape as anything but a wrapped ToolResult.

use std::sync::Arc;

use serde_json::Value;

use crate::context::types::ContextBundle;
use crate::kb::KnowledgeBase;
use crate::llm::web_search::WebSearchProvider;
use crate::llm::ToolSpec;
use crate::telemetry::types::Vendor;
use crate::telemetry::Telemetry;

use super::planning;

/// Tools the orchestrator knows how to both advertise to a model and run.
/// Manager-only tools route to a specialist instead of doing work
/// themselves; the rest are handlers a specialist invokes directly
/// (design doc §4.3's roster: Manager / Status / Planner / Research).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentTool {
    RouteToStatus,
    RouteToPlanner,
    RouteToResearch,
    SearchKb,
    LatestSample,
    History,
    Stats,
    BatteryPlan,
    MinerPlan,
    EnergyPlan,
    WebSearch,
    WebExtract,
}

impl AgentTool {
    pub fn name(&self) -> &'static str {
        match self {
            AgentTool::RouteToStatus => "route_to_status",
            AgentTool::RouteToPlanner => "route_to_planner",
            AgentTool::RouteToResearch => "route_to_research",
            AgentTool::SearchKb => "search_kb",
            AgentTool::LatestSample => "latest_sample",
            AgentTool::History => "history",
            AgentTool::Stats => "stats",
            AgentTool::BatteryPlan => "battery_plan",
            AgentTool::MinerPlan => "miner_plan",
            AgentTool::EnergyPlan => "energy_plan",
            AgentTool::WebSearch => "web_search",
            AgentTool::WebExtract => "web_extract",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentTool::RouteToStatus => "Hand the query to the Status specialist for live telemetry questions",
            AgentTool::RouteToPlanner => "Hand the query to the Planner specialist for battery/miner/energy planning",
            AgentTool::RouteToResearch => "Hand the query to the Research specialist for questions needing the open web",
            AgentTool::SearchKb => "Search the knowledge base for documentation, policies, and procedures",
            AgentTool::LatestSample => "Get the most recent telemetry reading for a vendor",
            AgentTool::History => "Get recent telemetry history for a vendor",
            AgentTool::Stats => "Get summary statistics (min/max/avg) over a telemetry window",
            AgentTool::BatteryPlan => "Get a battery state-of-charge recommendation",
            AgentTool::MinerPlan => "Get a recommendation on whether to run discretionary mining load",
            AgentTool::EnergyPlan => "Get a 24-hour energy balance projection",
            AgentTool::WebSearch => "Search the open web",
            AgentTool::WebExtract => "Extract the text content of a web page",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "route_to_status" => Some(AgentTool::RouteToStatus),
            "route_to_planner" => Some(AgentTool::RouteToPlanner),
            "route_to_research" => Some(AgentTool::RouteToResearch),
            "search_kb" => Some(AgentTool::SearchKb),
            "latest_sample" => Some(AgentTool::LatestSample),
            "history" => Some(AgentTool::History),
            "stats" => Some(AgentTool::Stats),
            "battery_plan" => Some(AgentTool::BatteryPlan),
            "miner_plan" => Some(AgentTool::MinerPlan),
            "energy_plan" => Some(AgentTool::EnergyPlan),
            "web_search" => Some(AgentTool::WebSearch),
            "web_extract" => Some(AgentTool::WebExtract),
            _ => None,
        }
    }

    /// The tools offered to the Manager: route to a specialist, or answer
    /// a KB question itself via the fast path tool (design doc §4.3).
    pub fn manager_tools() -> Vec<AgentTool> {
        vec![AgentTool::RouteToStatus, AgentTool::RouteToPlanner, AgentTool::RouteToResearch, AgentTool::SearchKb]
    }

    pub fn status_tools() -> Vec<AgentTool> {
        vec![AgentTool::LatestSample, AgentTool::History, AgentTool::Stats, AgentTool::SearchKb]
    }

    pub fn planner_tools() -> Vec<AgentTool> {
        vec![AgentTool::BatteryPlan, AgentTool::MinerPlan, AgentTool::EnergyPlan, AgentTool::LatestSample, AgentTool::SearchKb]
    }

    pub fn research_tools() -> Vec<AgentTool> {
        vec![AgentTool::WebSearch, AgentTool::WebExtract, AgentTool::SearchKb]
    }

    pub fn schema(&self) -> ToolSpec {
        let parameters = match self {
            AgentTool::RouteToStatus | AgentTool::RouteToPlanner | AgentTool::RouteToResearch => {
                serde_json::json!({ "type": "object", "properties": {} })
            }
            AgentTool::SearchKb => serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "top_k": { "type": "integer", "description": "Maximum results (default 5)" }
                },
                "required": ["query"]
            }),
            AgentTool::LatestSample => serde_json::json!({
                "type": "object",
                "properties": {
                    "vendor": { "type": "string", "enum": ["solark", "victron"] }
                },
                "required": ["vendor"]
            }),
            AgentTool::History => serde_json::json!({
                "type": "object",
                "properties": {
                    "vendor": { "type": "string", "enum": ["solark", "victron"] },
                    "hours": { "type": "integer", "description": "Lookback window in hours (default 24)" },
                    "limit": { "type": "integer", "description": "Maximum samples (default 100)" }
                },
                "required": ["vendor"]
            }),
            AgentTool::Stats => serde_json::json!({
                "type": "object",
                "properties": {
                    "vendor": { "type": "string", "enum": ["solark", "victron"] },
                    "hours": { "type": "integer", "description": "Lookback window in hours (default 24)" }
                },
                "required": ["vendor"]
            }),
            AgentTool::BatteryPlan | AgentTool::MinerPlan => serde_json::json!({
                "type": "object",
                "properties": {
                    "vendor": { "type": "string", "enum": ["solark", "victron"] }
                },
                "required": ["vendor"]
            }),
            AgentTool::EnergyPlan => serde_json::json!({
                "type": "object",
                "properties": {
                    "vendor": { "type": "string", "enum": ["solark", "victron"] }
                },
                "required": ["vendor"]
            }),
            AgentTool::WebSearch => serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer", "description": "Maximum results (default 5)" }
                },
                "required": ["query"]
            }),
            AgentTool::WebExtract => serde_json::json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" }
                },
                "required": ["url"]
            }),
        };

        ToolSpec { name: self.name().to_string(), description: self.description().to_string(), parameters }
    }
}

pub fn schemas_for(tools: &[AgentTool]) -> Vec<ToolSpec> {
    tools.iter().map(|t| t.schema()).collect()
}

/// Per-call/per-session tool governance, same shape as the teacher's
/// `ToolBudget`/`ToolUsageTracker` pair.
#[derive(Debug, Clone)]
pub struct ToolBudget {
    pub per_call_limit: usize,
    pub per_session_limit: usize,
    pub query_cooldown_turns: usize,
}

impl Default for ToolBudget {
    fn default() -> Self {
        Self { per_call_limit: 5, per_session_limit: 15, query_cooldown_turns: 2 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolUsageTracker {
    pub session_total: usize,
    pub current_call: usize,
    pub recent_calls: Vec<(String, usize)>,
    pub current_turn: usize,
}

impl ToolUsageTracker {
    pub fn can_call(&self, budget: &ToolBudget) -> bool {
        self.current_call < budget.per_call_limit && self.session_total < budget.per_session_limit
    }

    pub fn is_on_cooldown(&self, fingerprint: &str, budget: &ToolBudget) -> bool {
        self.recent_calls.iter().any(|(f, turn)| f == fingerprint && self.current_turn - turn < budget.query_cooldown_turns)
    }

    pub fn record_call(&mut self, fingerprint: &str) {
        self.session_total += 1;
        self.current_call += 1;
        self.recent_calls.push((fingerprint.to_string(), self.current_turn));
        if self.recent_calls.len() > 20 {
            self.recent_calls.remove(0);
        }
    }

    pub fn new_round(&mut self) {
        self.current_call = 0;
        self.current_turn += 1;
    }
}

/// Threaded through every tool call instead of module-level state (design
/// doc §4.3). Carries the query, its assembled bundle, the session id, and
/// read handles to the collaborators tools are allowed to touch.
pub struct ExecutionContext {
    pub query: String,
    pub bundle: ContextBundle,
    pub session_id: String,
    pub kb: Arc<KnowledgeBase>,
    pub telemetry: Arc<Telemetry>,
    pub web_search: Option<Arc<dyn WebSearchProvider>>,
    pub budget: ToolBudget,
    pub tracker: ToolUsageTracker,
}

impl ExecutionContext {
    pub fn new(
        query: String,
        bundle: ContextBundle,
        session_id: String,
        kb: Arc<KnowledgeBase>,
        telemetry: Arc<Telemetry>,
        web_search: Option<Arc<dyn WebSearchProvider>>,
    ) -> Self {
        Self {
            query,
            bundle,
            session_id,
            kb,
            telemetry,
            web_search,
            budget: ToolBudget::default(),
            tracker: ToolUsageTracker::default(),
        }
    }
}

fn parse_vendor(args: &Value) -> Result<Vendor, String> {
    match args.get("vendor").and_then(|v| v.as_str()) {
        Some("solark") => Ok(Vendor::SolArk),
        Some("victron") => Ok(Vendor::Victron),
        Some(other) => Err(format!("unknown vendor '{}'", other)),
        None => Err("missing required 'vendor' parameter".to_string()),
    }
}

/// Result of a tool invocation: `Ok` text is handed back to the model as a
/// tool-result message, `Err` is formatted the same way (design doc §4.3's
/// tool protocol never lets a collaborator error cross the tool boundary
/// unformatted).
pub async fn dispatch(tool: AgentTool, args: &Value, ctx: &ExecutionContext) -> Result<String, String> {
    match tool {
        AgentTool::RouteToStatus | AgentTool::RouteToPlanner | AgentTool::RouteToResearch => {
            Err("routing tools are handled by the manager loop, not dispatched directly".to_string())
        }

        AgentTool::SearchKb => {
            let query = args.get("query").and_then(|v| v.as_str()).unwrap_or(&ctx.query);
            let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
            let hits = ctx.kb.as_ref();
            let threshold = crate::context::sources::KbSource::default_threshold(hits);
            let hits = crate::context::sources::KbSource::search(hits, query, top_k, threshold).await;
            if hits.is_empty() {
                return Ok("No matching knowledge base entries found.".to_string());
            }
            Ok(hits
                .iter()
                .map(|h| format!("[{} / {}] (similarity {:.2}): {}", h.document_title, h.folder, h.similarity, h.chunk_text))
                .collect::<Vec<_>>()
                .join("\n---\n"))
        }

        AgentTool::LatestSample => {
            let vendor = parse_vendor(args)?;
            match ctx.telemetry.latest(vendor).await {
                Ok(Some(sample)) => Ok(format!(
                    "{} at {}: SOC {:.1}%, battery {:.0}W, PV {:.0}W, load {:.0}W, grid {:.0}W",
                    vendor, sample.timestamp, sample.soc, sample.battery_power, sample.pv_power, sample.load_power, sample.grid_power
                )),
                Ok(None) => Ok(format!("No telemetry has been recorded yet for {}.", vendor)),
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::History => {
            let vendor = parse_vendor(args)?;
            let hours = args.get("hours").and_then(|v| v.as_i64()).unwrap_or(24);
            let limit = args.get("limit").and_then(|v| v.as_i64()).unwrap_or(100);
            match ctx.telemetry.history(vendor, hours, limit).await {
                Ok(samples) if samples.is_empty() => Ok(format!("No telemetry history for {} in the last {}h.", vendor, hours)),
                Ok(samples) => Ok(samples
                    .iter()
                    .map(|s| format!("{}: SOC {:.1}%, battery {:.0}W, PV {:.0}W, load {:.0}W", s.timestamp, s.soc, s.battery_power, s.pv_power, s.load_power))
                    .collect::<Vec<_>>()
                    .join("\n")),
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::Stats => {
            let vendor = parse_vendor(args)?;
            let hours = args.get("hours").and_then(|v| v.as_i64()).unwrap_or(24);
            match ctx.telemetry.history(vendor, hours, 1000).await {
                Ok(samples) if samples.is_empty() => Ok(format!("No telemetry history for {} in the last {}h.", vendor, hours)),
                Ok(samples) => {
                    let n = samples.len() as f32;
                    let avg_soc: f32 = samples.iter().map(|s| s.soc).sum::<f32>() / n;
                    let min_soc = samples.iter().map(|s| s.soc).fold(f32::MAX, f32::min);
                    let max_soc = samples.iter().map(|s| s.soc).fold(f32::MIN, f32::max);
                    let avg_pv: f32 = samples.iter().map(|s| s.pv_power).sum::<f32>() / n;
                    let avg_load: f32 = samples.iter().map(|s| s.load_power).sum::<f32>() / n;
                    Ok(format!(
                        "{} over last {}h ({} samples): SOC avg {:.1}% (min {:.1}%, max {:.1}%), avg PV {:.0}W, avg load {:.0}W",
                        vendor, hours, samples.len(), avg_soc, min_soc, max_soc, avg_pv, avg_load
                    ))
                }
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::BatteryPlan => {
            let vendor = parse_vendor(args)?;
            match ctx.telemetry.latest(vendor).await {
                Ok(Some(sample)) => Ok(planning::battery_plan(&sample)),
                Ok(None) => Ok(format!("No telemetry has been recorded yet for {}.", vendor)),
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::MinerPlan => {
            let vendor = parse_vendor(args)?;
            match ctx.telemetry.latest(vendor).await {
                Ok(Some(sample)) => Ok(planning::miner_plan(&sample)),
                Ok(None) => Ok(format!("No telemetry has been recorded yet for {}.", vendor)),
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::EnergyPlan => {
            let vendor = parse_vendor(args)?;
            match ctx.telemetry.history(vendor, 24, 1000).await {
                Ok(samples) => Ok(planning::energy_plan(&samples)),
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::WebSearch => {
            let Some(provider) = ctx.web_search.as_ref() else {
                return Err("web search is not configured".to_string());
            };
            let query = args.get("query").and_then(|v| v.as_str()).ok_or("missing required 'query' parameter")?;
            let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
            match provider.search(query, top_k).await {
                Ok(hits) if hits.is_empty() => Ok("No web results found.".to_string()),
                Ok(hits) => Ok(hits.iter().map(|h| format!("{} ({}): {}", h.title, h.url, h.snippet)).collect::<Vec<_>>().join("\n")),
                Err(e) => Err(e.to_string()),
            }
        }

        AgentTool::WebExtract => {
            let Some(provider) = ctx.web_search.as_ref() else {
                return Err("web search is not configured".to_string());
            };
            let url = args.get("url").and_then(|v| v.as_str()).ok_or("missing required 'url' parameter")?;
            match provider.extract(url).await {
                Ok(result) => Ok(result.text),
                Err(e) => Err(e.to_string()),
            }
        }
    }
}

/// Governs and executes a tool call: cooldown and budget checks wrap
/// `dispatch`, mirroring the teacher's `execute_tool`. Output is wrapped in
/// the same untrusted-data delimiter the teacher uses, since tool output
/// (KB text, web pages) is not something the model should treat as an
/// instruction.
pub async fn execute_tool(tool: AgentTool, args: &Value, ctx: &mut ExecutionContext) -> String {
    let fingerprint = format!("{}:{}", tool.name(), args);

    if !ctx.tracker.can_call(&ctx.budget) {
        return wrap_output(tool.name(), "tool budget exceeded for this call", true);
    }
    if ctx.tracker.is_on_cooldown(&fingerprint, &ctx.budget) {
        return wrap_output(tool.name(), "this exact tool call was just made, try a different query", true);
    }
    ctx.tracker.record_call(&fingerprint);

    match dispatch(tool, args, ctx).await {
        Ok(content) => wrap_output(tool.name(), &content, false),
        Err(message) => wrap_output(tool.name(), &message, true),
    }
}

fn wrap_output(tool_name: &str, content: &str, is_error: bool) -> String {
    format!(
        "<tool_output name=\"{}\" trusted=\"false\" error=\"{}\">\n{}\n</tool_output>",
        tool_name, is_error, content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoOpCache;
    use crate::config::kb::KbConfig;
    use crate::config::telemetry::TelemetryConfig;
    use crate::context::types::ContextBundle;
    use crate::kb::provider::DocumentProvider;
    use crate::llm::EmbeddingProvider;
    use async_trait::async_trait;

    struct EmptyProvider;
    #[async_trait]
    impl DocumentProvider for EmptyProvider {
        async fn list_documents(&self, _root_folder_id: &str) -> crate::error::CoreResult<Vec<crate::kb::provider::RemoteDocumentMeta>> {
            Ok(vec![])
        }
        async fn fetch_content(&self, _external_id: &str) -> crate::error::CoreResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    struct FixedEmbedder;
    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> crate::error::CoreResult<Vec<f32>> {
            Ok(vec![0.0; 8])
        }
        async fn embed_batch(&self, texts: &[String]) -> crate::error::CoreResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
        }
        fn dimension(&self) -> usize {
            8
        }
    }

    async fn test_ctx() -> ExecutionContext {
        let pool = crate::storage::test_pool_with_schema().await;
        let kb = Arc::new(
            crate::kb::KnowledgeBase::new(pool.clone(), Arc::new(EmptyProvider), Arc::new(FixedEmbedder), KbConfig::from_env()).await,
        );
        let telemetry = Arc::new(Telemetry::new(pool, &TelemetryConfig::from_env()));
        ExecutionContext::new(
            "what is the battery level".to_string(),
            ContextBundle::default(),
            "session-1".to_string(),
            kb,
            telemetry,
            None,
        )
    }

    #[test]
    fn tool_names_round_trip_through_from_name() {
        for tool in AgentTool::manager_tools().into_iter().chain(AgentTool::status_tools()).chain(AgentTool::planner_tools()).chain(AgentTool::research_tools()) {
            assert_eq!(AgentTool::from_name(tool.name()), Some(tool));
        }
    }

    #[tokio::test]
    async fn latest_sample_reports_no_data_before_any_poll() {
        let mut ctx = test_ctx().await;
        let result = execute_tool(AgentTool::LatestSample, &serde_json::json!({"vendor": "solark"}), &mut ctx).await;
        assert!(result.contains("No telemetry"));
    }

    #[tokio::test]
    async fn missing_vendor_parameter_is_a_handled_error_not_a_panic() {
        let mut ctx = test_ctx().await;
        let result = execute_tool(AgentTool::LatestSample, &serde_json::json!({}), &mut ctx).await;
        assert!(result.contains("error=\"true\""));
    }

    #[tokio::test]
    async fn budget_exhaustion_blocks_further_calls() {
        let mut ctx = test_ctx().await;
        ctx.budget.per_call_limit = 1;
        let _ = execute_tool(AgentTool::LatestSample, &serde_json::json!({"vendor": "solark"}), &mut ctx).await;
        let second = execute_tool(AgentTool::LatestSample, &serde_json::json!({"vendor": "victron"}), &mut ctx).await;
        assert!(second.contains("budget exceeded"));
    }

    #[tokio::test]
    async fn web_search_without_a_provider_configured_errors_cleanly() {
        let mut ctx = test_ctx().await;
        let result = execute_tool(AgentTool::WebSearch, &serde_json::json!({"query": "solar panels"}), &mut ctx).await;
        assert!(result.contains("not configured"));
    }
}
