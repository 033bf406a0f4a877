// src/llm/provider.rs
// Chat-completions style LLM provider, grounded in the teacher's
// OpenAI-compatible request shape (see llm::provider::openai) but for
// tool-calling chat rather than embeddings.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};

use super::{ChatOutcome, ChatResponse, LlmProvider, Message, TokenUsage, ToolCallInfo, ToolSpec};

pub struct HttpLlmProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HttpLlmProvider {
    pub fn new(api_base: String, api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), api_base, api_key, model }
    }

    fn tool_spec_to_json(tool: &ToolSpec) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        })
    }

    fn message_to_json(message: &Message) -> Value {
        let mut obj = json!({ "role": message.role, "content": message.content });
        if let Some(call_id) = &message.tool_call_id {
            obj["tool_call_id"] = json!(call_id);
        }
        if let Some(calls) = &message.tool_calls {
            obj["tool_calls"] = json!(calls
                .iter()
                .map(|c| json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments.to_string() }
                }))
                .collect::<Vec<_>>());
        }
        obj
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> CoreResult<ChatResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(Self::message_to_json).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools.iter().map(Self::tool_spec_to_json).collect::<Vec<_>>());
            body["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 20 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!("llm provider responded {}", response.status())));
        }

        let raw: Value = response.json().await?;
        let choice = raw["choices"].get(0).ok_or_else(|| CoreError::Internal("no choices in llm response".into()))?;
        let message = &choice["message"];

        let tokens = TokenUsage {
            input: raw["usage"]["prompt_tokens"].as_i64().unwrap_or(0),
            output: raw["usage"]["completion_tokens"].as_i64().unwrap_or(0),
        };

        if let Some(tool_calls) = message["tool_calls"].as_array() {
            if let Some(call) = tool_calls.first() {
                let id = call["id"].as_str().unwrap_or_default().to_string();
                let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
                let args_raw = call["function"]["arguments"].as_str().unwrap_or("{}");
                let arguments: Value = serde_json::from_str(args_raw).unwrap_or(json!({}));
                return Ok(ChatResponse {
                    outcome: ChatOutcome::ToolCall(ToolCallInfo { id, name, arguments }),
                    tokens,
                });
            }
        }

        let text = message["content"].as_str().unwrap_or_default().to_string();
        Ok(ChatResponse { outcome: ChatOutcome::Text(text), tokens })
    }
}
