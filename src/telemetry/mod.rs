// src/telemetry/mod.rs
// Telemetry Pollers subsystem (design doc §4.4): one background poller per
// vendor plus the handle the HTTP layer and agent tools read health/samples
// through.

pub mod poller;
pub mod provider;
pub mod rate_limit;
pub mod solark;
pub mod store;
pub mod types;
pub mod victron;

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::config::telemetry::TelemetryConfig;

use poller::Poller;
use provider::TelemetryProvider;
use solark::SolArkProvider;
use store::TelemetryStore;
use types::{PollerHealth, TelemetrySample, Vendor};
use victron::VictronProvider;

/// Owns both vendor pollers and the shared store they write through.
/// Constructed once at startup, handed to the HTTP layer and the agent
/// orchestrator's Status/Planner tools as a read handle.
pub struct Telemetry {
    store: Arc<TelemetryStore>,
    solark: Arc<Poller>,
    victron: Arc<Poller>,
}

impl Telemetry {
    pub fn new(pool: SqlitePool, config: &TelemetryConfig) -> Self {
        let store = Arc::new(TelemetryStore::new(pool));

        let solark_provider: Arc<dyn TelemetryProvider> = Arc::new(SolArkProvider::new(
            config.solark_api_base.clone(),
            config.solark_api_key.clone(),
            config.solark_plant_id.clone(),
        ));
        let victron_provider: Arc<dyn TelemetryProvider> = Arc::new(VictronProvider::new(
            config.victron_api_base.clone(),
            config.victron_api_token.clone(),
            config.victron_installation_id.clone(),
        ));

        Self {
            solark: Arc::new(Poller::new(Vendor::SolArk, solark_provider, store.clone(), config.solark.clone())),
            victron: Arc::new(Poller::new(Vendor::Victron, victron_provider, store.clone(), config.victron.clone())),
            store,
        }
    }

    /// Spawn both poller loops. Handles are detached -- the pollers run for
    /// the lifetime of the process, same as the teacher's background task
    /// manager (design doc §4.4, §9: no restart policy beyond the loop's own
    /// backoff).
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        vec![self.solark.clone().spawn(), self.victron.clone().spawn()]
    }

    pub async fn latest(&self, vendor: Vendor) -> crate::error::CoreResult<Option<TelemetrySample>> {
        self.store.latest(vendor).await
    }

    pub async fn history(&self, vendor: Vendor, since_hours: i64, limit: i64) -> crate::error::CoreResult<Vec<TelemetrySample>> {
        self.store.history(vendor, since_hours, limit).await
    }

    pub fn health(&self, vendor: Vendor) -> PollerHealth {
        match vendor {
            Vendor::SolArk => self.solark.health(),
            Vendor::Victron => self.victron.health(),
        }
    }

    pub fn is_healthy(&self, vendor: Vendor) -> bool {
        match vendor {
            Vendor::SolArk => self.solark.is_healthy(),
            Vendor::Victron => self.victron.is_healthy(),
        }
    }

    pub fn all_health(&self) -> Vec<PollerHealth> {
        Vendor::all().iter().map(|v| self.health(*v)).collect()
    }
}
