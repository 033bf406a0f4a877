// src/llm/mod.rs
// LLM, embedding, and web-search providers are external collaborators
// (design doc §1); this module defines the narrow traits core depends on
// and one HTTP-backed implementation of each, grounded in the teacher's
// `llm/provider` shape (Message, ToolCallInfo, Response, TokenUsage).

pub mod embeddings;
pub mod provider;
pub mod web_search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider};
pub use provider::{HttpLlmProvider, LlmProvider};
pub use web_search::{HttpWebSearchProvider, WebExtractResult, WebSearchHit, WebSearchProvider};

/// Message format shared by every provider call site (grounded in the
/// teacher's `llm::provider::Message`), trimmed to what a single-turn
/// tool-calling loop needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallInfo>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into(), tool_call_id: None, tool_calls: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into(), tool_call_id: None, tool_calls: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into(), tool_call_id: None, tool_calls: None }
    }
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: "tool".into(), content: content.into(), tool_call_id: Some(call_id.into()), tool_calls: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool definition offered to the model for this call (design doc §9:
/// "a typed tool registry ... agent prompts include the tool names").
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
}

/// Either the model answered directly, or it wants exactly one tool
/// invoked (design doc §4.3: "MUST either emit exactly one tool call or a
/// direct textual reply").
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Text(String),
    ToolCall(ToolCallInfo),
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub outcome: ChatOutcome,
    pub tokens: TokenUsage,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> crate::error::CoreResult<ChatResponse>;
}
