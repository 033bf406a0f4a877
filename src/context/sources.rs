// src/context/sources.rs
// Narrow interfaces the Context Manager depends on, implemented by the
// Knowledge Base and Conversation Store modules. Keeping these as traits
// here (rather than importing the concrete modules) lets bundle assembly
// be tested against fakes and keeps context/ ignorant of storage details.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ContextFileSection {
    pub title: String,
    pub text: String,
    pub token_count: i64,
}

#[derive(Debug, Clone)]
pub struct KbSearchHit {
    pub document_title: String,
    pub folder: String,
    pub chunk_text: String,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub user_content: String,
    pub assistant_content: String,
}

#[async_trait]
pub trait KbSource: Send + Sync {
    /// Always-on documents flagged `is_context_file`, in a stable order.
    async fn context_files(&self) -> Vec<ContextFileSection>;

    /// Semantic search used to fill the KB section of a bundle.
    async fn search(&self, query: &str, top_k: usize, threshold: f32) -> Vec<KbSearchHit>;

    /// Monotone counter, incremented by successful sync (§5).
    fn kb_version(&self) -> u64;

    /// Configured similarity floor (design doc §9: "a tunable, callers
    /// should not assume it") for callers that don't have their own.
    fn default_threshold(&self) -> f32 {
        0.3
    }
}

#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Last `limit` turns for a session, oldest first.
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Vec<ConversationTurn>;
}

pub trait UserPrefsSource: Send + Sync {
    /// Free-text preferences summary for a user, empty if none configured.
    /// The spec treats user-specific context as an optional extension point
    /// (design doc §9 open question); the default implementation always
    /// returns empty.
    fn summary(&self, user_id: Option<&str>) -> String;
}

pub struct NoOpUserPrefs;

impl UserPrefsSource for NoOpUserPrefs {
    fn summary(&self, _user_id: Option<&str>) -> String {
        String::new()
    }
}
