// src/telemetry/types.rs
// Shared types for the two vendor pollers (design doc §4.4, §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    #[serde(rename = "solark")]
    SolArk,
    #[serde(rename = "victron")]
    Victron,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::SolArk => "solark",
            Vendor::Victron => "victron",
        }
    }

    pub fn all() -> [Vendor; 2] {
        [Vendor::SolArk, Vendor::Victron]
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single normalized telemetry reading, common shape across both vendors
/// (design doc §3: one table per vendor but a shared row shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub vendor: Vendor,
    pub plant_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub soc: f32,
    pub battery_power: f32,
    pub battery_voltage: f32,
    pub battery_current: f32,
    pub pv_power: f32,
    pub load_power: f32,
    pub grid_power: f32,
    pub pv_to_load: bool,
    pub pv_to_battery: bool,
    pub battery_to_load: bool,
    pub grid_to_load: bool,
}

/// Synchronous health snapshot for a vendor (design doc §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerHealth {
    pub vendor: Vendor,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub requests_this_hour: u32,
    pub rate_limit_max: u32,
}

impl PollerHealth {
    pub fn new(vendor: Vendor, rate_limit_max: u32) -> Self {
        Self {
            vendor,
            last_attempt_at: None,
            last_success_at: None,
            consecutive_failures: 0,
            requests_this_hour: 0,
            rate_limit_max,
        }
    }

    /// `is_healthy = consecutive_failures < F AND now - last_success < stale_window`.
    pub fn is_healthy(&self, max_consecutive_failures: u32, stale_window: chrono::Duration) -> bool {
        if self.consecutive_failures >= max_consecutive_failures {
            return false;
        }
        match self.last_success_at {
            Some(last) => Utc::now() - last < stale_window,
            None => false,
        }
    }

    pub fn staleness(&self) -> Option<chrono::Duration> {
        self.last_success_at.map(|last| Utc::now() - last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_succeeded_is_unhealthy() {
        let health = PollerHealth::new(Vendor::SolArk, 120);
        assert!(!health.is_healthy(5, chrono::Duration::seconds(600)));
    }

    #[test]
    fn recent_success_within_window_is_healthy() {
        let mut health = PollerHealth::new(Vendor::Victron, 60);
        health.last_success_at = Some(Utc::now());
        health.consecutive_failures = 0;
        assert!(health.is_healthy(5, chrono::Duration::seconds(1800)));
    }

    #[test]
    fn too_many_consecutive_failures_is_unhealthy_even_if_recent() {
        let mut health = PollerHealth::new(Vendor::Victron, 60);
        health.last_success_at = Some(Utc::now());
        health.consecutive_failures = 5;
        assert!(!health.is_healthy(5, chrono::Duration::seconds(1800)));
    }
}
