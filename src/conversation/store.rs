// src/conversation/store.rs
// Session and message persistence (design doc §4.5), grounded in the
// teacher's advisory session store: free functions-turned-methods over a
// `SqlitePool`, uuid session ids, a running "turns so far" counter.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

use super::types::{Conversation, ConversationStatus, Message, MessageMetadata, MessageRole, SessionSummary};

const TITLE_MAX_CHARS: usize = 80;

/// Derive a conversation title from its first user message: first line,
/// truncated to a readable length (design doc §4.5 "title inference from
/// the first user message").
fn infer_title(first_message: &str) -> String {
    let first_line = first_message.lines().next().unwrap_or(first_message).trim();
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated.trim_end())
    }
}

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session if `id` is absent or unknown, otherwise return it
    /// unchanged (design doc §4.5, §3 "created on first message with an
    /// unknown session id").
    pub async fn ensure_session(&self, id: Option<&str>) -> CoreResult<String> {
        if let Some(id) = id {
            let exists = sqlx::query("SELECT 1 FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)?
                .is_some();
            if exists {
                return Ok(id.to_string());
            }
        }

        let id = id.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at, agent_role, status)
             VALUES (?, NULL, ?, ?, NULL, 'active')",
        )
        .bind(&id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;

        Ok(id)
    }

    /// Append a message, maintaining `conversations.updated_at` and
    /// inferring a title from the first user message (design doc §3
    /// invariant: `updated_at` = max message `created_at`).
    pub async fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        metadata: MessageMetadata,
    ) -> CoreResult<i64> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO messages
                (conversation_id, role, content, agent_role, duration_ms, tokens, cache_hit, query_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&metadata.agent_role)
        .bind(metadata.duration_ms)
        .bind(metadata.tokens)
        .bind(metadata.cache_hit)
        .bind(&metadata.query_type)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;

        if role == MessageRole::User {
            let has_title: Option<String> = sqlx::query("SELECT title FROM conversations WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)?
                .and_then(|row| row.try_get::<Option<String>, _>("title").ok().flatten());

            if has_title.is_none() {
                sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
                    .bind(infer_title(content))
                    .bind(session_id)
                    .execute(&self.pool)
                    .await
                    .map_err(CoreError::from)?;
            }
        }

        sqlx::query("UPDATE conversations SET updated_at = ?, agent_role = COALESCE(?, agent_role) WHERE id = ?")
            .bind(now)
            .bind(&metadata.agent_role)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;

        Ok(result.last_insert_rowid())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Message> {
        let role_raw: String = row.try_get("role").map_err(CoreError::from)?;
        let created: i64 = row.try_get("created_at").map_err(CoreError::from)?;
        Ok(Message {
            id: row.try_get("id").map_err(CoreError::from)?,
            conversation_id: row.try_get("conversation_id").map_err(CoreError::from)?,
            role: MessageRole::from_str_loose(&role_raw),
            content: row.try_get("content").map_err(CoreError::from)?,
            agent_role: row.try_get("agent_role").ok(),
            duration_ms: row.try_get("duration_ms").ok(),
            tokens: row.try_get("tokens").ok(),
            cache_hit: row.try_get("cache_hit").ok(),
            query_type: row.try_get("query_type").ok(),
            created_at: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
        })
    }

    /// Last `limit` messages for a session, ordered newest-last (design
    /// doc §4.5).
    pub async fn recent(&self, session_id: &str, limit: i64) -> CoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM (
                SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at DESC, id DESC LIMIT ?
             ) ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        rows.iter().map(Self::row_to_message).collect()
    }

    pub async fn list_conversations(&self, limit: i64) -> CoreResult<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT c.id as id, c.title as title, c.created_at as created_at,
                    c.updated_at as updated_at, c.agent_role as agent_role, c.status as status,
                    COUNT(m.id) as message_count
             FROM conversations c
             LEFT JOIN messages m ON m.conversation_id = c.id
             GROUP BY c.id
             ORDER BY c.updated_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        rows.iter()
            .map(|row| {
                let created: i64 = row.try_get("created_at").map_err(CoreError::from)?;
                let updated: i64 = row.try_get("updated_at").map_err(CoreError::from)?;
                let status_raw: String = row.try_get("status").map_err(CoreError::from)?;
                Ok(SessionSummary {
                    id: row.try_get("id").map_err(CoreError::from)?,
                    title: row.try_get("title").ok(),
                    created_at: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
                    updated_at: DateTime::from_timestamp(updated, 0).unwrap_or_else(Utc::now),
                    agent_role: row.try_get("agent_role").ok(),
                    status: ConversationStatus::from_str_loose(&status_raw),
                    message_count: row.try_get("message_count").map_err(CoreError::from)?,
                })
            })
            .collect()
    }

    pub async fn get_conversation(&self, session_id: &str) -> CoreResult<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;

        row.map(|row| {
            let created: i64 = row.try_get("created_at").map_err(CoreError::from)?;
            let updated: i64 = row.try_get("updated_at").map_err(CoreError::from)?;
            let status_raw: String = row.try_get("status").map_err(CoreError::from)?;
            Ok(Conversation {
                id: row.try_get("id").map_err(CoreError::from)?,
                title: row.try_get("title").ok(),
                created_at: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
                updated_at: DateTime::from_timestamp(updated, 0).unwrap_or_else(Utc::now),
                agent_role: row.try_get("agent_role").ok(),
                status: ConversationStatus::from_str_loose(&status_raw),
            })
        })
        .transpose()
    }

    /// Close a conversation (design doc §3: "auto-closed by operator or
    /// retention policy").
    pub async fn close(&self, session_id: &str) -> CoreResult<()> {
        sqlx::query("UPDATE conversations SET status = 'closed' WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool_with_schema;

    #[test]
    fn infer_title_truncates_long_first_lines() {
        let long = "a".repeat(200);
        let title = infer_title(&long);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn infer_title_uses_first_line_only() {
        assert_eq!(infer_title("what's the battery SOC?\nfollow up"), "what's the battery SOC?");
    }

    #[tokio::test]
    async fn ensure_session_creates_unknown_ids_and_reuses_known_ones() {
        let pool = test_pool_with_schema().await;
        let store = ConversationStore::new(pool);

        let id = store.ensure_session(Some("fixed-id")).await.unwrap();
        assert_eq!(id, "fixed-id");
        let id_again = store.ensure_session(Some("fixed-id")).await.unwrap();
        assert_eq!(id_again, "fixed-id");

        let generated = store.ensure_session(None).await.unwrap();
        assert_ne!(generated, "fixed-id");
    }

    #[tokio::test]
    async fn append_sets_title_from_first_user_message_only() {
        let pool = test_pool_with_schema().await;
        let store = ConversationStore::new(pool);
        let session_id = store.ensure_session(None).await.unwrap();

        store.append(&session_id, MessageRole::User, "what's the battery doing?", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::Assistant, "SOC is 82%", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::User, "and the panels?", MessageMetadata::default()).await.unwrap();

        let conv = store.get_conversation(&session_id).await.unwrap().unwrap();
        assert_eq!(conv.title.as_deref(), Some("what's the battery doing?"));
    }

    #[tokio::test]
    async fn recent_returns_messages_oldest_to_newest() {
        let pool = test_pool_with_schema().await;
        let store = ConversationStore::new(pool);
        let session_id = store.ensure_session(None).await.unwrap();

        for i in 0..5 {
            store.append(&session_id, MessageRole::User, &format!("msg {i}"), MessageMetadata::default()).await.unwrap();
        }

        let recent = store.recent(&session_id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg 2");
        assert_eq!(recent[2].content, "msg 4");
    }

    #[tokio::test]
    async fn list_conversations_orders_by_most_recently_updated() {
        let pool = test_pool_with_schema().await;
        let store = ConversationStore::new(pool);

        let a = store.ensure_session(None).await.unwrap();
        store.append(&a, MessageRole::User, "first", MessageMetadata::default()).await.unwrap();
        let b = store.ensure_session(None).await.unwrap();
        store.append(&b, MessageRole::User, "second", MessageMetadata::default()).await.unwrap();

        let list = store.list_conversations(10).await.unwrap();
        assert_eq!(list[0].id, b);
        assert_eq!(list[0].message_count, 1);
        assert!(list[0].created_at <= list[0].updated_at);
        assert_eq!(list[0].agent_role, None);
    }
}
