// src/config/orchestrator.rs
// Agent orchestrator tuning: iteration caps and the per-query deadline

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub manager_max_iterations: u32,
    pub specialist_max_iterations: u32,
    pub query_deadline: Duration,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            manager_max_iterations: super::helpers::env_u32("MANAGER_MAX_ITERATIONS", 3),
            specialist_max_iterations: super::helpers::env_u32("SPECIALIST_MAX_ITERATIONS", 5),
            query_deadline: Duration::from_secs(super::helpers::env_u64("QUERY_DEADLINE_SECONDS", 60)),
        }
    }
}
