// src/context/types.rs
// Core value types for query classification and context assembly.

use serde::{Deserialize, Serialize};

/// The four classes a query can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum QueryType {
    #[serde(rename = "SYSTEM")]
    System,
    #[serde(rename = "RESEARCH")]
    Research,
    #[serde(rename = "PLANNING")]
    Planning,
    #[serde(rename = "GENERAL")]
    #[default]
    General,
}

impl QueryType {
    /// Fixed tie-break order used when two classes score equally.
    pub const TIE_BREAK_ORDER: [QueryType; 4] = [
        QueryType::System,
        QueryType::Planning,
        QueryType::Research,
        QueryType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::System => "SYSTEM",
            QueryType::Research => "RESEARCH",
            QueryType::Planning => "PLANNING",
            QueryType::General => "GENERAL",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single section of an assembled bundle, kept separate so the drop
/// order in step 6 of bundle assembly (kb -> conv -> user -> system) can
/// discard sections without re-deriving them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleSection {
    pub text: String,
    pub tokens: i64,
}

impl BundleSection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Assembled, prompt-ready context for a single query.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextBundle {
    pub query_type: QueryType,
    pub classification_confidence: f32,
    pub system: BundleSection,
    pub user: BundleSection,
    pub conversation: BundleSection,
    pub kb: BundleSection,
    pub total_tokens: i64,
    pub cache_hit: bool,
}

impl ContextBundle {
    pub fn recompute_total(&mut self) {
        self.total_tokens = self.system.tokens + self.user.tokens + self.conversation.tokens + self.kb.tokens;
    }

    /// Render all present sections into a single prompt string, in a fixed
    /// reading order: system context, user preferences, conversation
    /// history, then knowledge-base excerpts.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.system.is_empty() {
            out.push_str("# Context Files\n");
            out.push_str(&self.system.text);
            out.push_str("\n\n");
        }
        if !self.user.is_empty() {
            out.push_str("# User Preferences\n");
            out.push_str(&self.user.text);
            out.push_str("\n\n");
        }
        if !self.conversation.is_empty() {
            out.push_str("# Recent Conversation\n");
            out.push_str(&self.conversation.text);
            out.push_str("\n\n");
        }
        if !self.kb.is_empty() {
            out.push_str("# Knowledge Base\n");
            out.push_str(&self.kb.text);
            out.push_str("\n\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_break_order_matches_design_doc() {
        assert_eq!(
            QueryType::TIE_BREAK_ORDER,
            [QueryType::System, QueryType::Planning, QueryType::Research, QueryType::General]
        );
    }

    #[test]
    fn format_omits_empty_sections() {
        let bundle = ContextBundle {
            query_type: QueryType::General,
            classification_confidence: 0.0,
            system: BundleSection::empty(),
            user: BundleSection::empty(),
            conversation: BundleSection { text: "hi".into(), tokens: 1 },
            kb: BundleSection::empty(),
            total_tokens: 1,
            cache_hit: false,
        };
        let rendered = bundle.format();
        assert!(rendered.contains("Recent Conversation"));
        assert!(!rendered.contains("Knowledge Base"));
        assert!(!rendered.contains("Context Files"));
    }
}
