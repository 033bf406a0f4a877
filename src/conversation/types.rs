// src/conversation/types.rs
// Data model for the Conversation Store (design doc §3: Conversation, Message).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "closed")]
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "closed" => ConversationStatus::Closed,
            _ => ConversationStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub agent_role: Option<String>,
    pub status: ConversationStatus,
}

/// Metadata attached to a message at append time, all optional (design doc
/// §3: only assistant turns that went through the orchestrator carry it).
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    pub agent_role: Option<String>,
    pub duration_ms: Option<i64>,
    pub tokens: Option<i64>,
    pub cache_hit: Option<bool>,
    pub query_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub agent_role: Option<String>,
    pub duration_ms: Option<i64>,
    pub tokens: Option<i64>,
    pub cache_hit: Option<bool>,
    pub query_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row returned by `list_conversations` -- cheaper than a full `Conversation`
/// plus its messages (design doc §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub agent_role: Option<String>,
    pub status: ConversationStatus,
    pub message_count: i64,
}
