// src/observability/mod.rs
// Per-execution records (design doc §2's Observability row, §3's
// `AgentExecution` entity): one row per `ask` call regardless of outcome,
// plus the health snapshots `agents.health` and `health` read from.
// Grounded in the teacher's budget/mod.rs usage-tracking table: a plain
// sqlx insert keyed by session, no ORM.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::telemetry::types::{PollerHealth, Vendor};
use crate::telemetry::Telemetry;

/// A single row of `agent_executions` (design doc §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionRecord {
    pub id: i64,
    pub session_id: String,
    pub agent_role: String,
    pub query_type: Option<String>,
    pub tokens_in: i64,
    pub cache_hit: bool,
    pub duration_ms: i64,
    pub tools_used: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Owns the `agent_executions` table. A storage outage here is the one
/// failure mode the Context Manager's contract (design doc §4.1) lets
/// surface to the caller; everywhere else it's logged and swallowed, which
/// is why `Orchestrator::finish` only warns on error rather than failing
/// the whole `ask`.
pub struct ExecutionLog {
    pool: SqlitePool,
}

impl ExecutionLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        session_id: &str,
        agent_role: &str,
        query_type: &str,
        tokens_in: i64,
        cache_hit: bool,
        duration_ms: i64,
        tools_used: &[String],
        error: Option<&str>,
    ) -> CoreResult<i64> {
        let now = Utc::now().timestamp();
        let tools_json = serde_json::to_string(tools_used).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            "INSERT INTO agent_executions
                (session_id, agent_role, query_type, tokens_in, cache_hit, duration_ms, tools_used, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(agent_role)
        .bind(query_type)
        .bind(tokens_in)
        .bind(cache_hit)
        .bind(duration_ms)
        .bind(tools_json)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn recent_for_session(&self, session_id: &str, limit: i64) -> CoreResult<Vec<AgentExecutionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM agent_executions WHERE session_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Error rate over the last `window` executions, used by
    /// `agents.health` to flag a degraded agent (design doc §6).
    pub async fn recent_error_rate(&self, agent_role: &str, window: i64) -> CoreResult<f32> {
        let rows = sqlx::query(
            "SELECT error FROM agent_executions WHERE agent_role = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(agent_role)
        .bind(window)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        if rows.is_empty() {
            return Ok(0.0);
        }
        let errors = rows.iter().filter(|r| r.try_get::<Option<String>, _>("error").ok().flatten().is_some()).count();
        Ok(errors as f32 / rows.len() as f32)
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> CoreResult<AgentExecutionRecord> {
        let created: i64 = row.try_get("created_at").map_err(CoreError::from)?;
        let tools_raw: String = row.try_get("tools_used").map_err(CoreError::from)?;
        let tools_used = serde_json::from_str(&tools_raw).unwrap_or_default();
        Ok(AgentExecutionRecord {
            id: row.try_get("id").map_err(CoreError::from)?,
            session_id: row.try_get("session_id").map_err(CoreError::from)?,
            agent_role: row.try_get("agent_role").map_err(CoreError::from)?,
            query_type: row.try_get("query_type").ok(),
            tokens_in: row.try_get("tokens_in").map_err(CoreError::from)?,
            cache_hit: row.try_get("cache_hit").map_err(CoreError::from)?,
            duration_ms: row.try_get("duration_ms").map_err(CoreError::from)?,
            tools_used,
            error: row.try_get("error").ok(),
            created_at: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
        })
    }
}

/// One agent's health, as reported by `agents.health` (design doc §6).
/// "Degraded" mirrors the poller health shape (§4.4): too many recent
/// errors rather than a hard down/up bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_role: String,
    pub status: &'static str,
    pub recent_error_rate: f32,
}

const DEGRADED_ERROR_RATE: f32 = 0.5;
const HEALTH_WINDOW: i64 = 20;

pub async fn agents_health(log: &ExecutionLog) -> Vec<AgentHealth> {
    let roles = ["manager", "status", "planner", "research"];
    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        let rate = match log.recent_error_rate(role, HEALTH_WINDOW).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!("failed to compute error rate for {}: {}", role, e);
                0.0
            }
        };
        let status = if rate >= DEGRADED_ERROR_RATE { "degraded" } else { "healthy" };
        out.push(AgentHealth { agent_role: role.to_string(), status, recent_error_rate: rate });
    }
    out
}

/// Overall `health` RPC body (design doc §6): api liveness, db
/// connectivity, and both poller health snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub api: &'static str,
    pub db_connected: bool,
    pub pollers: VendorHealthPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorHealthPair {
    pub solark: PollerHealth,
    pub victron: PollerHealth,
}

pub async fn system_health(pool: &SqlitePool, telemetry: &Telemetry) -> SystemHealth {
    let db_connected = sqlx::query("SELECT 1").fetch_one(pool).await.is_ok();
    SystemHealth {
        api: "ok",
        db_connected,
        pollers: VendorHealthPair { solark: telemetry.health(Vendor::SolArk), victron: telemetry.health(Vendor::Victron) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool_with_schema;

    #[tokio::test]
    async fn record_and_fetch_round_trips() {
        let pool = test_pool_with_schema().await;
        let log = ExecutionLog::new(pool);

        log.record("s1", "status", "SYSTEM", 1200, false, 340, &["latest_sample".to_string()], None)
            .await
            .unwrap();

        let records = log.recent_for_session("s1", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_role, "status");
        assert_eq!(records[0].tools_used, vec!["latest_sample".to_string()]);
    }

    #[tokio::test]
    async fn error_rate_counts_only_recorded_errors() {
        let pool = test_pool_with_schema().await;
        let log = ExecutionLog::new(pool);

        log.record("s1", "planner", "PLANNING", 100, false, 10, &[], None).await.unwrap();
        log.record("s1", "planner", "PLANNING", 100, false, 10, &[], Some("deadline")).await.unwrap();

        let rate = log.recent_error_rate("planner", 20).await.unwrap();
        assert!((rate - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn agents_health_flags_degraded_when_error_rate_high() {
        let pool = test_pool_with_schema().await;
        let log = ExecutionLog::new(pool);

        for _ in 0..5 {
            log.record("s1", "research", "RESEARCH", 100, false, 10, &[], Some("model_error")).await.unwrap();
        }

        let health = agents_health(&log).await;
        let research = health.iter().find(|h| h.agent_role == "research").unwrap();
        assert_eq!(research.status, "degraded");
    }
}
