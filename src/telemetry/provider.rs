// src/telemetry/provider.rs
// Vendor telemetry APIs are external collaborators (design doc §1); this
// trait is the narrow interface pollers depend on so the vendor-specific
// HTTP shape never leaks into the poller loop.

use async_trait::async_trait;

use crate::error::CoreResult;

use super::types::TelemetrySample;

#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Fetch the current reading. A 429 must surface as
    /// `CoreError::RateLimited` so the poller can reconcile its bucket.
    async fn fetch_latest(&self) -> CoreResult<TelemetrySample>;
}
