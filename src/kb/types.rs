// src/kb/types.rs
// Data model for the Knowledge Base (design doc §3: Document, Chunk, SyncLog).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeKind {
    #[serde(rename = "doc")]
    Doc,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "sheet")]
    Sheet,
}

impl MimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeKind::Doc => "doc",
            MimeKind::Pdf => "pdf",
            MimeKind::Sheet => "sheet",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "pdf" => MimeKind::Pdf,
            "sheet" => MimeKind::Sheet,
            _ => MimeKind::Doc,
        }
    }
}

/// A document synced from the document provider (design doc §3).
/// `is_context_file` iff the document lives under the configured context
/// folder prefix -- an invariant enforced at sync time, not re-derived here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub folder_path: String,
    pub mime_kind: MimeKind,
    pub full_text: String,
    pub is_context_file: bool,
    pub token_count: i64,
    pub last_synced_at: DateTime<Utc>,
    pub sync_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub order_index: i32,
    pub text: String,
    pub token_count: i64,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub processed: i64,
    pub updated: i64,
    pub deleted: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "smart")]
    Smart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    #[serde(rename = "listing")]
    Listing,
    #[serde(rename = "fetching")]
    Fetching,
    #[serde(rename = "chunking")]
    Chunking,
    #[serde(rename = "embedding")]
    Embedding,
    #[serde(rename = "finalizing")]
    Finalizing,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Listing => "listing",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Chunking => "chunking",
            SyncPhase::Embedding => "embedding",
            SyncPhase::Finalizing => "finalizing",
        }
    }
}

/// One event in the progress stream (design doc §4.2, §6: newline-delimited
/// JSON). The HTTP collaborator is the only place that knows about SSE; the
/// sync job just yields these over a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub processed: usize,
    pub total: usize,
    pub current_title: String,
    pub phase: SyncPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub processed: i64,
    pub updated: i64,
    pub deleted: i64,
    pub failed: i64,
    pub status: SyncStatus,
}

/// Terminal event of a sync stream: either a summary or a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SyncEvent {
    #[serde(rename = "progress")]
    Progress(SyncProgress),
    #[serde(rename = "done")]
    Done { summary: SyncSummary },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbStats {
    pub documents: i64,
    pub chunks: i64,
    pub context_files: i64,
    pub total_tokens: i64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
}
