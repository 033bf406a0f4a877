// src/context/mod.rs
// Context Manager: classify a query, assemble a token-budgeted bundle,
// cache by fingerprint (design doc §4.1).

pub mod bundle;
pub mod cache_key;
pub mod classifier;
pub mod keywords;
pub mod sources;
pub mod types;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::CacheHandle;
use crate::config::budget::TokenBudgetConfig;
use crate::metrics;

use self::bundle::AssembleInputs;
use self::classifier::Classifier;
use self::sources::{ConversationSource, KbSource, UserPrefsSource};
use self::types::ContextBundle;
pub use self::types::QueryType;

pub struct ContextManager {
    classifier: Classifier,
    budget: TokenBudgetConfig,
    kb: Arc<dyn KbSource>,
    conversation: Arc<dyn ConversationSource>,
    user_prefs: Arc<dyn UserPrefsSource>,
    cache: Arc<dyn CacheHandle>,
}

impl ContextManager {
    pub fn new(
        classifier: Classifier,
        budget: TokenBudgetConfig,
        kb: Arc<dyn KbSource>,
        conversation: Arc<dyn ConversationSource>,
        user_prefs: Arc<dyn UserPrefsSource>,
        cache: Arc<dyn CacheHandle>,
    ) -> Self {
        Self { classifier, budget, kb, conversation, user_prefs, cache }
    }

    pub fn classify(&self, query: &str) -> (QueryType, f32) {
        self.classifier.classify(query)
    }

    /// Produce a `ContextBundle` for a query, consulting the cache first.
    /// Sub-source failures are swallowed (the assembly helpers below never
    /// propagate errors); only the bundle's own internal consistency can
    /// fail this method, which it does not.
    pub async fn bundle(
        &self,
        query: &str,
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> ContextBundle {
        let (query_type, confidence) = self.classify(query);
        let kb_version = self.kb.kb_version();
        let key = cache_key::bundle_cache_key(query_type, query, session_id, user_id, kb_version);

        if let Some(raw) = self.cache.get(&key).await {
            if let Ok(mut cached) = serde_json::from_str::<ContextBundle>(&raw) {
                cached.cache_hit = true;
                metrics::record_cache_result(true);
                debug!("context bundle cache hit for key {}", key);
                return cached;
            }
            warn!("failed to deserialize cached bundle for key {}; recomputing", key);
        }

        metrics::record_cache_result(false);
        let type_budget = self.budget.for_type(query_type);

        let mut computed = bundle::assemble(AssembleInputs {
            kb: self.kb.as_ref(),
            conversation: self.conversation.as_ref(),
            user_prefs: self.user_prefs.as_ref(),
            query,
            session_id,
            user_id,
            query_type,
            confidence,
            budget: type_budget,
            config: &self.budget,
        })
        .await;
        computed.cache_hit = false;

        if let Ok(serialized) = serde_json::to_string(&computed) {
            self.cache.put(&key, &serialized, self.budget.cache_ttl_seconds).await;
        }

        computed
    }

    pub fn format(&self, bundle: &ContextBundle) -> String {
        bundle.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoOpCache;
    use crate::context::sources::{ConversationTurn, ContextFileSection, KbSearchHit, NoOpUserPrefs};
    use async_trait::async_trait;

    struct EmptyKb;

    #[async_trait]
    impl KbSource for EmptyKb {
        async fn context_files(&self) -> Vec<ContextFileSection> {
            vec![]
        }
        async fn search(&self, _query: &str, _top_k: usize, _threshold: f32) -> Vec<KbSearchHit> {
            vec![]
        }
        fn kb_version(&self) -> u64 {
            1
        }
    }

    struct EmptyConversation;

    #[async_trait]
    impl ConversationSource for EmptyConversation {
        async fn recent_turns(&self, _session_id: &str, _limit: usize) -> Vec<ConversationTurn> {
            vec![]
        }
    }

    fn manager() -> ContextManager {
        ContextManager::new(
            Classifier::from_env(),
            TokenBudgetConfig::from_env(),
            Arc::new(EmptyKb),
            Arc::new(EmptyConversation),
            Arc::new(NoOpUserPrefs),
            Arc::new(NoOpCache),
        )
    }

    #[tokio::test]
    async fn cache_miss_then_hit_with_nooop_cache_is_always_miss() {
        let mgr = manager();
        let b1 = mgr.bundle("what is my battery level?", Some("s1"), None).await;
        assert!(!b1.cache_hit);
        let b2 = mgr.bundle("what is my battery level?", Some("s1"), None).await;
        assert!(!b2.cache_hit);
    }

    #[tokio::test]
    async fn bundle_always_returned_even_with_empty_sources() {
        let mgr = manager();
        let bundle = mgr.bundle("plan next week", None, None).await;
        assert_eq!(bundle.query_type, QueryType::Planning);
    }
}
