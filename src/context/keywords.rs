// src/context/keywords.rs
// Keyword tables are data, not code (design doc §9), so classifier tuning
// does not require a rebuild: defaults are embedded, but an operator can
// point CLASSIFIER_KEYWORDS_PATH at a file on disk to override them.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::types::QueryType;

const DEFAULT_KEYWORDS_YAML: &str = include_str!("default_keywords.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub pattern: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRule {
    #[serde(default)]
    pub starts_with: Vec<String>,
    #[serde(default)]
    pub contains_any: Vec<String>,
    pub result: QueryType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTables {
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
    pub system: Vec<Keyword>,
    pub research: Vec<Keyword>,
    pub planning: Vec<Keyword>,
    pub general: Vec<Keyword>,
}

impl KeywordTables {
    pub fn for_type(&self, t: QueryType) -> &[Keyword] {
        match t {
            QueryType::System => &self.system,
            QueryType::Research => &self.research,
            QueryType::Planning => &self.planning,
            QueryType::General => &self.general,
        }
    }

    fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Load from `CLASSIFIER_KEYWORDS_PATH` if set and readable, else fall
    /// back to the embedded defaults.
    pub fn load_from_env() -> Self {
        if let Ok(path) = std::env::var("CLASSIFIER_KEYWORDS_PATH") {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match Self::parse(&raw) {
                    Ok(tables) => {
                        info!("loaded classifier keyword tables from {}", path);
                        return tables;
                    }
                    Err(e) => warn!("failed to parse {}: {}; using defaults", path, e),
                },
                Err(e) => warn!("could not read {}: {}; using defaults", path, e),
            }
        }
        Self::parse(DEFAULT_KEYWORDS_YAML).expect("embedded default_keywords.yaml must parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keywords_parse() {
        let tables = KeywordTables::parse(DEFAULT_KEYWORDS_YAML).unwrap();
        assert!(!tables.system.is_empty());
        assert!(!tables.overrides.is_empty());
    }
}
