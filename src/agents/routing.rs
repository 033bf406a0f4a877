// src/agents/routing.rs
// Deterministic routing overrides (design doc §4.3) that run before any LLM
// call. Data, not code, matching context/keywords.rs's rationale.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_ROUTING_YAML: &str = include_str!("default_routing.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTables {
    pub kb_fast_path_patterns: Vec<String>,
    pub meta_keywords: Vec<String>,
}

impl RoutingTables {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load_from_env() -> Self {
        if let Ok(path) = std::env::var("ORCHESTRATOR_ROUTING_PATH") {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match Self::parse(&raw) {
                    Ok(tables) => {
                        info!("loaded orchestrator routing tables from {}", path);
                        return tables;
                    }
                    Err(e) => warn!("failed to parse {}: {}; using defaults", path, e),
                },
                Err(e) => warn!("could not read {}: {}; using defaults", path, e),
            }
        }
        Self::parse(DEFAULT_ROUTING_YAML).expect("embedded default_routing.yaml must parse")
    }

    /// Override 1: query matches an informational pattern, bypass the LLM
    /// and go straight to `search_kb`.
    pub fn matches_kb_fast_path(&self, normalized_query: &str) -> bool {
        self.kb_fast_path_patterns.iter().any(|p| normalized_query.contains(p.as_str()))
    }

    /// Override 2: query is about the system's own identity, or otherwise
    /// off-topic. The manager replies directly without any tool use.
    pub fn matches_meta(&self, normalized_query: &str) -> bool {
        self.meta_keywords.iter().any(|p| normalized_query.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routing_parses() {
        let tables = RoutingTables::parse(DEFAULT_ROUTING_YAML).unwrap();
        assert!(!tables.kb_fast_path_patterns.is_empty());
        assert!(!tables.meta_keywords.is_empty());
    }

    #[test]
    fn kb_fast_path_matches_informational_queries() {
        let tables = RoutingTables::load_from_env();
        assert!(tables.matches_kb_fast_path("what is the charging threshold policy"));
        assert!(!tables.matches_kb_fast_path("what is my battery level right now"));
    }

    #[test]
    fn meta_matches_identity_queries() {
        let tables = RoutingTables::load_from_env();
        assert!(tables.matches_meta("who are you"));
        assert!(!tables.matches_meta("what is my battery soc"));
    }
}
