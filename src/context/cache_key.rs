// src/context/cache_key.rs
// Cache key = hash of {classified_type, query_normalized, session_id, user_id, kb_version}.

use crate::utils::hash::sha256_hash;

use super::classifier::Classifier;
use super::types::QueryType;

pub fn bundle_cache_key(
    query_type: QueryType,
    raw_query: &str,
    session_id: Option<&str>,
    user_id: Option<&str>,
    kb_version: u64,
) -> String {
    let normalized = Classifier::normalize(raw_query);
    let raw = format!(
        "{}|{}|{}|{}|{}",
        query_type.as_str(),
        normalized,
        session_id.unwrap_or(""),
        user_id.unwrap_or(""),
        kb_version
    );
    sha256_hash(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_for_identical_inputs() {
        let a = bundle_cache_key(QueryType::System, "What is my BATTERY level?", Some("s1"), None, 1);
        let b = bundle_cache_key(QueryType::System, "what is my battery level?", Some("s1"), None, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn key_changes_with_kb_version() {
        let a = bundle_cache_key(QueryType::System, "q", Some("s1"), None, 1);
        let b = bundle_cache_key(QueryType::System, "q", Some("s1"), None, 2);
        assert_ne!(a, b);
    }
}
