// src/context/bundle.rs
// Bundle assembly (design doc §4.1, six-step algorithm).

use tracing::warn;

use crate::config::budget::{TokenBudgetConfig, TypeBudget};
use crate::utils::hash::estimate_tokens;

use super::sources::{ConversationSource, ConversationTurn, KbSource, UserPrefsSource};
use super::types::{BundleSection, ContextBundle, QueryType};

/// Truncate `text` so its estimated token count is at most `max_tokens`,
/// cutting on a whitespace boundary rather than mid-word.
fn truncate_to_tokens(text: &str, max_tokens: i64) -> (String, i64) {
    if max_tokens <= 0 {
        return (String::new(), 0);
    }
    let full_tokens = estimate_tokens(text);
    if full_tokens <= max_tokens {
        return (text.to_string(), full_tokens);
    }
    let max_chars = (max_tokens * 4).max(0) as usize;
    let mut cut = text.char_indices().map(|(i, _)| i).take_while(|&i| i <= max_chars).last().unwrap_or(0);
    if let Some(space) = text[..cut.min(text.len())].rfind(char::is_whitespace) {
        cut = space;
    }
    let truncated = text[..cut].trim_end().to_string();
    let tokens = estimate_tokens(&truncated);
    (truncated, tokens)
}

async fn assemble_context_files(kb: &dyn KbSource, cap_tokens: i64) -> BundleSection {
    let files = kb.context_files().await;
    let mut text = String::new();
    let mut used = 0i64;
    for file in files {
        if used + file.token_count > cap_tokens {
            continue; // skip whole documents that would overflow, try smaller ones next
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&format!("## {}\n{}", file.title, file.text));
        used += file.token_count;
    }
    BundleSection { text, tokens: used }
}

fn assemble_user_prefs(prefs: &dyn UserPrefsSource, user_id: Option<&str>, cap_tokens: i64) -> BundleSection {
    let summary = prefs.summary(user_id);
    if summary.is_empty() {
        return BundleSection::empty();
    }
    let (text, tokens) = truncate_to_tokens(&summary, cap_tokens);
    BundleSection { text, tokens }
}

fn format_turn(turn: &ConversationTurn) -> String {
    format!("User: {}\nAssistant: {}", turn.user_content, turn.assistant_content)
}

fn turn_tokens(turn: &ConversationTurn) -> i64 {
    estimate_tokens(&turn.user_content) + estimate_tokens(&turn.assistant_content)
}

async fn assemble_conversation(
    conv: &dyn ConversationSource,
    session_id: Option<&str>,
    max_turns: usize,
    remaining_budget: i64,
) -> BundleSection {
    let Some(session_id) = session_id else {
        return BundleSection::empty();
    };
    let mut turns = conv.recent_turns(session_id, max_turns).await;

    let mut total: i64 = turns.iter().map(turn_tokens).sum();
    while total > remaining_budget && !turns.is_empty() {
        let dropped = turns.remove(0); // oldest first; drop oldest until it fits
        total -= turn_tokens(&dropped);
    }

    if turns.is_empty() {
        return BundleSection::empty();
    }

    let text = turns.iter().map(format_turn).collect::<Vec<_>>().join("\n\n");
    BundleSection { text, tokens: total }
}

async fn assemble_kb(kb: &dyn KbSource, query: &str, top_k: usize, threshold: f32, budget_tokens: i64) -> BundleSection {
    let mut hits = kb.search(query, top_k, threshold).await;
    hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

    let mut text = String::new();
    let mut used = 0i64;
    for hit in hits {
        let chunk_tokens = estimate_tokens(&hit.chunk_text);
        if used + chunk_tokens > budget_tokens {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&format!("[{} / {}] {}", hit.document_title, hit.folder, hit.chunk_text));
        used += chunk_tokens;
    }
    BundleSection { text, tokens: used }
}

pub struct AssembleInputs<'a> {
    pub kb: &'a dyn KbSource,
    pub conversation: &'a dyn ConversationSource,
    pub user_prefs: &'a dyn UserPrefsSource,
    pub query: &'a str,
    pub session_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub query_type: QueryType,
    pub confidence: f32,
    pub budget: TypeBudget,
    pub config: &'a TokenBudgetConfig,
}

pub async fn assemble(inputs: AssembleInputs<'_>) -> ContextBundle {
    let available = (inputs.budget.total_tokens as i64 - inputs.config.shell_reserve as i64).max(0);
    let context_files_cap = (inputs.budget.total_tokens as f32 * inputs.config.context_files_fraction) as i64;

    let system = assemble_context_files(inputs.kb, context_files_cap).await;
    let user = assemble_user_prefs(inputs.user_prefs, inputs.user_id, inputs.config.user_prefs_max as i64);

    let remaining_for_conv = (available - system.tokens - user.tokens).max(0);
    let conversation = assemble_conversation(
        inputs.conversation,
        inputs.session_id,
        inputs.budget.conversation_turns,
        remaining_for_conv,
    )
    .await;

    let kb = if inputs.query_type == QueryType::General {
        BundleSection::empty()
    } else {
        let remaining_for_kb = (available - system.tokens - user.tokens - conversation.tokens).max(0);
        let top_k = inputs.budget.kb_docs * 2;
        let threshold = inputs.kb.default_threshold();
        assemble_kb(inputs.kb, inputs.query, top_k, threshold, remaining_for_kb).await
    };

    let mut bundle = ContextBundle {
        query_type: inputs.query_type,
        classification_confidence: inputs.confidence,
        system,
        user,
        conversation,
        kb,
        total_tokens: 0,
        cache_hit: false,
    };
    bundle.recompute_total();

    // Step 6: enforce the hard cap, dropping lowest priority last.
    let cap = inputs.budget.total_tokens as i64;
    if bundle.total_tokens > cap {
        warn!(
            "bundle over budget ({} > {}), trimming sections",
            bundle.total_tokens, cap
        );
        if bundle.total_tokens > cap {
            bundle.total_tokens -= bundle.kb.tokens;
            bundle.kb = BundleSection::empty();
        }
        if bundle.total_tokens > cap {
            bundle.total_tokens -= bundle.conversation.tokens;
            bundle.conversation = BundleSection::empty();
        }
        if bundle.total_tokens > cap {
            bundle.total_tokens -= bundle.user.tokens;
            bundle.user = BundleSection::empty();
        }
        if bundle.total_tokens > cap {
            bundle.total_tokens -= bundle.system.tokens;
            bundle.system = BundleSection::empty();
        }
    }

    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::sources::{ContextFileSection, KbSearchHit, NoOpUserPrefs};
    use async_trait::async_trait;

    struct FakeKb {
        files: Vec<ContextFileSection>,
        hits: Vec<KbSearchHit>,
        version: u64,
    }

    #[async_trait]
    impl KbSource for FakeKb {
        async fn context_files(&self) -> Vec<ContextFileSection> {
            self.files.clone()
        }
        async fn search(&self, _query: &str, top_k: usize, threshold: f32) -> Vec<KbSearchHit> {
            self.hits
                .iter()
                .filter(|h| h.similarity >= threshold)
                .take(top_k)
                .cloned()
                .collect()
        }
        fn kb_version(&self) -> u64 {
            self.version
        }
    }

    struct FakeConversation {
        turns: Vec<ConversationTurn>,
    }

    #[async_trait]
    impl ConversationSource for FakeConversation {
        async fn recent_turns(&self, _session_id: &str, limit: usize) -> Vec<ConversationTurn> {
            let start = self.turns.len().saturating_sub(limit);
            self.turns[start..].to_vec()
        }
    }

    fn default_budget() -> TypeBudget {
        TypeBudget { total_tokens: 2_000, kb_docs: 2, conversation_turns: 3 }
    }

    #[tokio::test]
    async fn bundle_never_exceeds_type_budget() {
        let kb = FakeKb {
            files: vec![ContextFileSection {
                title: "big doc".into(),
                text: "x".repeat(20_000),
                token_count: 5_000,
            }],
            hits: vec![KbSearchHit {
                document_title: "manual".into(),
                folder: "docs".into(),
                chunk_text: "y".repeat(20_000),
                similarity: 0.9,
            }],
            version: 1,
        };
        let conversation = FakeConversation {
            turns: (0..10)
                .map(|i| ConversationTurn {
                    user_content: format!("question {}", i),
                    assistant_content: "z".repeat(5_000),
                })
                .collect(),
        };
        let prefs = NoOpUserPrefs;
        let config = TokenBudgetConfig::from_env();
        let budget = default_budget();

        let bundle = assemble(AssembleInputs {
            kb: &kb,
            conversation: &conversation,
            user_prefs: &prefs,
            query: "what is my battery level?",
            session_id: Some("s1"),
            user_id: None,
            query_type: QueryType::System,
            confidence: 0.9,
            budget,
            config: &config,
        })
        .await;

        assert!(bundle.total_tokens <= budget.total_tokens as i64);
    }

    #[tokio::test]
    async fn general_query_skips_kb_search() {
        let kb = FakeKb { files: vec![], hits: vec![], version: 1 };
        let conversation = FakeConversation { turns: vec![] };
        let prefs = NoOpUserPrefs;
        let config = TokenBudgetConfig::from_env();
        let budget = TypeBudget { total_tokens: 1_000, kb_docs: 0, conversation_turns: 2 };

        let bundle = assemble(AssembleInputs {
            kb: &kb,
            conversation: &conversation,
            user_prefs: &prefs,
            query: "hello",
            session_id: None,
            user_id: None,
            query_type: QueryType::General,
            confidence: 0.0,
            budget,
            config: &config,
        })
        .await;

        assert!(bundle.kb.is_empty());
    }

    #[tokio::test]
    async fn empty_kb_store_still_produces_a_bundle() {
        let kb = FakeKb { files: vec![], hits: vec![], version: 1 };
        let conversation = FakeConversation { turns: vec![] };
        let prefs = NoOpUserPrefs;
        let config = TokenBudgetConfig::from_env();

        let bundle = assemble(AssembleInputs {
            kb: &kb,
            conversation: &conversation,
            user_prefs: &prefs,
            query: "plan next week",
            session_id: None,
            user_id: None,
            query_type: QueryType::Planning,
            confidence: 0.5,
            budget: default_budget(),
            config: &config,
        })
        .await;

        assert!(bundle.kb.is_empty());
        assert!(bundle.system.is_empty());
    }
}
