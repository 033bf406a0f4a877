// src/config/telemetry.rs
// Per-vendor poller configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::telemetry::types::Vendor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPollerConfig {
    pub poll_interval: Duration,
    pub rate_limit_per_hour: u32,
    pub max_consecutive_failures: u32,
    pub stale_window: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub solark: VendorPollerConfig,
    pub victron: VendorPollerConfig,
    pub solark_api_base: String,
    pub solark_api_key: String,
    pub solark_plant_id: String,
    pub victron_api_base: String,
    pub victron_api_token: String,
    pub victron_installation_id: String,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            solark: VendorPollerConfig {
                poll_interval: Duration::from_secs(super::helpers::env_u64("POLL_INTERVAL_SOLARK", 60)),
                rate_limit_per_hour: super::helpers::env_u32("RATE_LIMIT_SOLARK_PER_HOUR", 120),
                max_consecutive_failures: super::helpers::env_u32("SOLARK_MAX_CONSECUTIVE_FAILURES", 5),
                stale_window: Duration::from_secs(super::helpers::env_u64("SOLARK_STALE_WINDOW_SECONDS", 600)),
                base_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(300),
            },
            victron: VendorPollerConfig {
                poll_interval: Duration::from_secs(super::helpers::env_u64("POLL_INTERVAL_VICTRON", 300)),
                rate_limit_per_hour: super::helpers::env_u32("RATE_LIMIT_VICTRON_PER_HOUR", 60),
                max_consecutive_failures: super::helpers::env_u32("VICTRON_MAX_CONSECUTIVE_FAILURES", 5),
                stale_window: Duration::from_secs(super::helpers::env_u64("VICTRON_STALE_WINDOW_SECONDS", 1800)),
                base_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(300),
            },
            solark_api_base: super::helpers::env_or("SOLARK_API_BASE", "https://api.solarkcloud.com"),
            solark_api_key: super::helpers::env_or("SOLARK_API_KEY", ""),
            solark_plant_id: super::helpers::env_or("SOLARK_PLANT_ID", ""),
            victron_api_base: super::helpers::env_or("VICTRON_API_BASE", "https://vrmapi.victronenergy.com/v2"),
            victron_api_token: super::helpers::env_or("VICTRON_API_TOKEN", ""),
            victron_installation_id: super::helpers::env_or("VICTRON_INSTALLATION_ID", ""),
        }
    }

    pub fn for_vendor(&self, vendor: Vendor) -> &VendorPollerConfig {
        match vendor {
            Vendor::SolArk => &self.solark,
            Vendor::Victron => &self.victron,
        }
    }
}
