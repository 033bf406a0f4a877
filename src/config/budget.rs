// src/config/budget.rs
// Per-query-type token budgets for the Context Manager (see design doc §4.1)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::context::types::QueryType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TypeBudget {
    pub total_tokens: usize,
    pub kb_docs: usize,
    pub conversation_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetConfig {
    pub shell_reserve: usize,
    pub user_prefs_max: usize,
    pub context_files_fraction: f32,
    pub cache_ttl_seconds: i64,
    budgets: HashMap<QueryType, TypeBudget>,
}

impl TokenBudgetConfig {
    pub fn from_env() -> Self {
        let mut budgets = HashMap::new();
        budgets.insert(
            QueryType::System,
            TypeBudget {
                total_tokens: super::helpers::env_usize("TOKEN_BUDGET_SYSTEM_TOTAL", 2_000),
                kb_docs: super::helpers::env_usize("TOKEN_BUDGET_SYSTEM_KB_DOCS", 2),
                conversation_turns: super::helpers::env_usize("TOKEN_BUDGET_SYSTEM_CONV_TURNS", 3),
            },
        );
        budgets.insert(
            QueryType::Research,
            TypeBudget {
                total_tokens: super::helpers::env_usize("TOKEN_BUDGET_RESEARCH_TOTAL", 4_000),
                kb_docs: super::helpers::env_usize("TOKEN_BUDGET_RESEARCH_KB_DOCS", 5),
                conversation_turns: super::helpers::env_usize("TOKEN_BUDGET_RESEARCH_CONV_TURNS", 4),
            },
        );
        budgets.insert(
            QueryType::Planning,
            TypeBudget {
                total_tokens: super::helpers::env_usize("TOKEN_BUDGET_PLANNING_TOTAL", 3_500),
                kb_docs: super::helpers::env_usize("TOKEN_BUDGET_PLANNING_KB_DOCS", 4),
                conversation_turns: super::helpers::env_usize("TOKEN_BUDGET_PLANNING_CONV_TURNS", 4),
            },
        );
        budgets.insert(
            QueryType::General,
            TypeBudget {
                total_tokens: super::helpers::env_usize("TOKEN_BUDGET_GENERAL_TOTAL", 1_000),
                kb_docs: super::helpers::env_usize("TOKEN_BUDGET_GENERAL_KB_DOCS", 0),
                conversation_turns: super::helpers::env_usize("TOKEN_BUDGET_GENERAL_CONV_TURNS", 2),
            },
        );

        Self {
            shell_reserve: super::helpers::env_usize("TOKEN_BUDGET_SHELL_RESERVE", 200),
            user_prefs_max: super::helpers::env_usize("TOKEN_BUDGET_USER_PREFS_MAX", 200),
            context_files_fraction: super::helpers::env_f32("TOKEN_BUDGET_CONTEXT_FILES_FRACTION", 0.4),
            cache_ttl_seconds: super::helpers::env_u64("CACHE_TTL_SECONDS", 300) as i64,
            budgets,
        }
    }

    pub fn for_type(&self, query_type: QueryType) -> TypeBudget {
        self.budgets
            .get(&query_type)
            .copied()
            .expect("every QueryType variant has a budget entry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_doc_table() {
        let cfg = TokenBudgetConfig::from_env();
        assert_eq!(cfg.for_type(QueryType::System).total_tokens, 2_000);
        assert_eq!(cfg.for_type(QueryType::Research).total_tokens, 4_000);
        assert_eq!(cfg.for_type(QueryType::Planning).total_tokens, 3_500);
        assert_eq!(cfg.for_type(QueryType::General).total_tokens, 1_000);
        assert_eq!(cfg.for_type(QueryType::General).kb_docs, 0);
        assert_eq!(cfg.shell_reserve, 200);
    }
}
