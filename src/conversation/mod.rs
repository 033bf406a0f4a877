// src/conversation/mod.rs
// Conversation Store subsystem (design doc §4.5): session-scoped multi-turn
// history, and the concrete `ConversationSource` the Context Manager
// bundles against.

pub mod store;
pub mod types;

use async_trait::async_trait;

use crate::context::sources::{ConversationSource, ConversationTurn};

pub use store::ConversationStore;
pub use types::{Conversation, ConversationStatus, Message, MessageMetadata, MessageRole, SessionSummary};

#[async_trait]
impl ConversationSource for ConversationStore {
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Vec<ConversationTurn> {
        let messages = match self.recent(session_id, (limit as i64) * 2).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("failed to load recent turns for {}: {}", session_id, e);
                return vec![];
            }
        };

        // Pair consecutive user/assistant messages into turns (design doc
        // §3: "a turn is a user+assistant pair"). A trailing unanswered
        // user message (the one just appended for this very request) is
        // dropped -- it isn't history yet.
        let mut turns = Vec::new();
        let mut pending_user: Option<String> = None;
        for message in messages {
            match message.role {
                MessageRole::User => pending_user = Some(message.content),
                MessageRole::Assistant => {
                    if let Some(user_content) = pending_user.take() {
                        turns.push(ConversationTurn { user_content, assistant_content: message.content });
                    }
                }
                MessageRole::System => {}
            }
        }

        if turns.len() > limit {
            let drop = turns.len() - limit;
            turns.drain(0..drop);
        }
        turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool_with_schema;

    #[tokio::test]
    async fn recent_turns_pairs_user_and_assistant_messages() {
        let pool = test_pool_with_schema().await;
        let store = ConversationStore::new(pool);
        let session_id = store.ensure_session(None).await.unwrap();

        store.append(&session_id, MessageRole::User, "q1", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::Assistant, "a1", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::User, "q2", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::Assistant, "a2", MessageMetadata::default()).await.unwrap();

        let turns = ConversationSource::recent_turns(&store, &session_id, 10).await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user_content, "q1");
        assert_eq!(turns[1].assistant_content, "a2");
    }

    #[tokio::test]
    async fn recent_turns_drops_trailing_unanswered_user_message() {
        let pool = test_pool_with_schema().await;
        let store = ConversationStore::new(pool);
        let session_id = store.ensure_session(None).await.unwrap();

        store.append(&session_id, MessageRole::User, "q1", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::Assistant, "a1", MessageMetadata::default()).await.unwrap();
        store.append(&session_id, MessageRole::User, "q2 unanswered", MessageMetadata::default()).await.unwrap();

        let turns = ConversationSource::recent_turns(&store, &session_id, 10).await;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user_content, "q1");
    }
}
