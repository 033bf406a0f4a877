// src/context/classifier.rs
// Query classification: keyword scoring with weighted matches (design doc §4.1).

use regex::Regex;
use std::sync::OnceLock;

use super::keywords::KeywordTables;
use super::types::QueryType;

const EPSILON: f32 = 1e-6;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").unwrap())
}

/// Classifies free-text queries into one of the four `QueryType`s.
pub struct Classifier {
    tables: KeywordTables,
}

impl Classifier {
    pub fn new(tables: KeywordTables) -> Self {
        Self { tables }
    }

    pub fn from_env() -> Self {
        Self::new(KeywordTables::load_from_env())
    }

    /// Lowercase and collapse whitespace, matching the normalization used
    /// for cache keys (§4.1 caching).
    pub fn normalize(query: &str) -> String {
        let lower = query.to_lowercase();
        lower.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn tokens(normalized: &str) -> Vec<String> {
        word_re().find_iter(normalized).map(|m| m.as_str().to_string()).collect()
    }

    fn score(&self, normalized: &str, tokens: &[String], t: QueryType) -> f32 {
        let mut score = 0.0f32;
        for kw in self.tables.for_type(t) {
            if kw.pattern.contains(' ') {
                // Phrase match: score against the whole normalized string.
                if normalized.contains(&kw.pattern) {
                    score += kw.weight;
                }
            } else if tokens.iter().any(|tok| tok == &kw.pattern) {
                score += kw.weight;
            }
        }
        score
    }

    fn check_overrides(&self, normalized: &str) -> Option<QueryType> {
        for rule in &self.tables.overrides {
            let starts = rule.starts_with.iter().any(|p| normalized.starts_with(p.as_str()));
            let contains = rule.contains_any.iter().any(|p| normalized.contains(p.as_str()));
            if starts || contains {
                return Some(rule.result);
            }
        }
        None
    }

    /// Classify a query, returning `(type, confidence)`. Deterministic and
    /// pure: same input always yields the same output.
    pub fn classify(&self, query: &str) -> (QueryType, f32) {
        let normalized = Self::normalize(query);
        let tokens = Self::tokens(&normalized);

        if tokens.is_empty() {
            return (QueryType::General, 0.0);
        }

        if let Some(forced) = self.check_overrides(&normalized) {
            return (forced, 1.0);
        }

        let mut scores: Vec<(QueryType, f32)> = QueryType::TIE_BREAK_ORDER
            .iter()
            .map(|&t| (t, self.score(&normalized, &tokens, t)))
            .collect();

        // Stable sort descending by score; TIE_BREAK_ORDER's original
        // relative order is preserved for equal scores.
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let (top_type, top_score) = scores[0];
        if top_score <= 0.0 {
            return (QueryType::General, 0.0);
        }

        let second_score = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0);
        let confidence = top_score / (top_score + second_score + EPSILON);

        (top_type, confidence.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::from_env()
    }

    #[test]
    fn empty_query_is_general_zero_confidence() {
        let (t, c) = classifier().classify("");
        assert_eq!(t, QueryType::General);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn punctuation_only_is_general_zero_confidence() {
        let (t, c) = classifier().classify("???!!!");
        assert_eq!(t, QueryType::General);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn battery_level_question_is_system() {
        let (t, _) = classifier().classify("what is my battery level?");
        assert_eq!(t, QueryType::System);
    }

    #[test]
    fn planning_query_routes_to_planning() {
        let (t, _) = classifier().classify("plan next 24 hours of miner operation");
        assert_eq!(t, QueryType::Planning);
    }

    #[test]
    fn research_query_routes_to_research() {
        let (t, _) =
            classifier().classify("latest best practices for lifepo4 charge acceptance in cold temps");
        assert_eq!(t, QueryType::Research);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let query = "what is my battery level right now?";
        let first = c.classify(query);
        let second = c.classify(query);
        assert_eq!(first, second);
    }

    #[test]
    fn normalize_collapses_whitespace_and_lowercases() {
        assert_eq!(Classifier::normalize("  What   IS\tthis "), "what is this");
    }
}
