// src/telemetry/poller.rs
// One cooperative loop per vendor (design doc §4.4), grounded in the
// tokio::spawn + time::interval(MissedTickBehavior::Skip) shape used
// throughout the background task manager.

use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tokio::task::JoinHandle;

use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::telemetry::VendorPollerConfig;
use crate::error::CoreError;
use crate::metrics;

use super::provider::TelemetryProvider;
use super::rate_limit::HourlyBucket;
use super::store::TelemetryStore;
use super::types::{PollerHealth, Vendor};

fn backoff_with_jitter(base: std::time::Duration, max: std::time::Duration, failures: u32) -> std::time::Duration {
    let scale = 2u32.saturating_pow(failures.min(16));
    let backoff = base.saturating_mul(scale).min(max);
    let jitter_ms = rand::thread_rng().gen_range(0..=100);
    backoff + std::time::Duration::from_millis(jitter_ms)
}

pub struct Poller {
    vendor: Vendor,
    provider: Arc<dyn TelemetryProvider>,
    store: Arc<TelemetryStore>,
    bucket: HourlyBucket,
    health: RwLock<PollerHealth>,
    config: VendorPollerConfig,
}

impl Poller {
    pub fn new(
        vendor: Vendor,
        provider: Arc<dyn TelemetryProvider>,
        store: Arc<TelemetryStore>,
        config: VendorPollerConfig,
    ) -> Self {
        Self {
            vendor,
            provider,
            store,
            bucket: HourlyBucket::new(config.rate_limit_per_hour),
            health: RwLock::new(PollerHealth::new(vendor, config.rate_limit_per_hour)),
            config,
        }
    }

    pub fn health(&self) -> PollerHealth {
        self.health.read().clone()
    }

    pub fn is_healthy(&self) -> bool {
        let health = self.health.read();
        health.is_healthy(
            self.config.max_consecutive_failures,
            chrono::Duration::from_std(self.config.stale_window).unwrap_or(chrono::Duration::seconds(600)),
        )
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(&self) {
        info!("{} poller started (interval: {:?})", self.vendor, self.config.poll_interval);
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if !self.bucket.try_consume() {
                let wait = self.bucket.time_until_refill();
                warn!("{} rate limit exhausted, sleeping {:?}", self.vendor, wait);
                time::sleep(wait).await;
                continue;
            }

            self.attempt_once().await;
        }
    }

    async fn attempt_once(&self) {
        self.health.write().last_attempt_at = Some(chrono::Utc::now());

        match self.provider.fetch_latest().await {
            Ok(sample) => match self.store.upsert(&sample).await {
                Ok(()) => {
                    let mut health = self.health.write();
                    health.last_success_at = Some(chrono::Utc::now());
                    health.consecutive_failures = 0;
                    health.requests_this_hour = self.bucket.requests_this_hour();
                    drop(health);
                    metrics::record_poller_attempt(self.vendor.as_str(), true);
                    metrics::set_poller_health(self.vendor.as_str(), true);
                }
                Err(e) => {
                    error!("{} persist failed: {}", self.vendor, e);
                    self.record_failure().await;
                }
            },
            Err(CoreError::RateLimited { .. }) => {
                warn!("{} returned 429, forcing bucket to empty", self.vendor);
                self.bucket.force_exhausted();
                self.record_failure().await;
            }
            Err(e) => {
                error!("{} fetch failed: {}", self.vendor, e);
                self.record_failure().await;
            }
        }
    }

    async fn record_failure(&self) {
        let failures = {
            let mut health = self.health.write();
            health.consecutive_failures += 1;
            health.requests_this_hour = self.bucket.requests_this_hour();
            health.consecutive_failures
        };
        metrics::record_poller_attempt(self.vendor.as_str(), false);
        metrics::set_poller_health(self.vendor.as_str(), self.is_healthy());

        let backoff = backoff_with_jitter(self.config.base_backoff, self.config.max_backoff, failures);
        time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_max() {
        let base = std::time::Duration::from_secs(1);
        let max = std::time::Duration::from_secs(10);
        let backoff = backoff_with_jitter(base, max, 20);
        assert!(backoff <= max + std::time::Duration::from_millis(100));
    }
}
