// src/error.rs
// Core error taxonomy shared across every subsystem.
//
// Kinds mirror the design doc's error taxonomy: invalid input, not found,
// upstream transient/permanent, rate limited, deadline exceeded, partial
// sync, cache unavailable, internal. Cache-unavailable never reaches this
// enum in practice -- the cache degrades silently at the call site -- but
// the variant exists so a future caller can choose to surface it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    #[error("upstream permanent error: {0}")]
    UpstreamPermanent(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error is safe to surface verbatim to a user in a
    /// `response` field, or whether it must go out as an RPC-level
    /// `error` with `response` omitted (see design doc's propagation policy).
    pub fn is_user_safe(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_) | CoreError::NotFound(_) | CoreError::RateLimited { .. }
        )
    }

    /// Short machine-readable kind, used in `agent_executions.error` and RPC error fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::NotFound(_) => "not_found",
            CoreError::UpstreamTransient(_) => "upstream_transient",
            CoreError::UpstreamPermanent(_) => "upstream_permanent",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::DeadlineExceeded { .. } => "deadline",
            CoreError::CacheUnavailable(_) => "cache_unavailable",
            CoreError::Internal(_) => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::InvalidInput(_) => 400,
            CoreError::NotFound(_) => 404,
            CoreError::UpstreamTransient(_) => 503,
            CoreError::UpstreamPermanent(_) => 502,
            CoreError::RateLimited { .. } => 429,
            CoreError::DeadlineExceeded { .. } => 504,
            CoreError::CacheUnavailable(_) => 200,
            CoreError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CoreError::UpstreamTransient(err.to_string());
        }
        match err.status().map(|s| s.as_u16()) {
            Some(429) => CoreError::RateLimited { retry_after_secs: 60 },
            Some(s) if s >= 500 => CoreError::UpstreamTransient(err.to_string()),
            Some(_) => CoreError::UpstreamPermanent(err.to_string()),
            None => CoreError::UpstreamTransient(err.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_safe_errors_are_correctly_classified() {
        assert!(CoreError::InvalidInput("bad".into()).is_user_safe());
        assert!(CoreError::NotFound("x".into()).is_user_safe());
        assert!(!CoreError::Internal("boom".into()).is_user_safe());
        assert!(!CoreError::UpstreamPermanent("boom".into()).is_user_safe());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(CoreError::InvalidInput("".into()).http_status(), 400);
        assert_eq!(CoreError::NotFound("".into()).http_status(), 404);
        assert_eq!(CoreError::DeadlineExceeded { elapsed_ms: 1 }.http_status(), 504);
        assert_eq!(CoreError::RateLimited { retry_after_secs: 1 }.http_status(), 429);
    }
}
