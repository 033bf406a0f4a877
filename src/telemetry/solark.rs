// src/telemetry/solark.rs
// SolArk cloud API collaborator.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::CoreError;

use super::provider::TelemetryProvider;
use super::types::{TelemetrySample, Vendor};

#[derive(Debug, Deserialize)]
struct SolArkReading {
    plant_id: Option<String>,
    soc: f32,
    #[serde(rename = "batPower")]
    bat_power: f32,
    #[serde(rename = "batVoltage")]
    bat_voltage: f32,
    #[serde(rename = "batCurrent")]
    bat_current: f32,
    #[serde(rename = "pvPower")]
    pv_power: f32,
    #[serde(rename = "loadPower")]
    load_power: f32,
    #[serde(rename = "gridPower")]
    grid_power: f32,
}

pub struct SolArkProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    plant_id: String,
}

impl SolArkProvider {
    pub fn new(api_base: String, api_key: String, plant_id: String) -> Self {
        Self { client: reqwest::Client::new(), api_base, api_key, plant_id }
    }
}

#[async_trait]
impl TelemetryProvider for SolArkProvider {
    async fn fetch_latest(&self) -> crate::error::CoreResult<TelemetrySample> {
        let url = format!("{}/plant/{}/flow", self.api_base, self.plant_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 3600 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!(
                "solark responded {}",
                response.status()
            )));
        }

        let reading: SolArkReading = response.json().await?;

        Ok(TelemetrySample {
            vendor: Vendor::SolArk,
            plant_id: reading.plant_id,
            timestamp: Utc::now(),
            soc: reading.soc,
            battery_power: reading.bat_power,
            battery_voltage: reading.bat_voltage,
            battery_current: reading.bat_current,
            pv_power: reading.pv_power,
            load_power: reading.load_power,
            grid_power: reading.grid_power,
            pv_to_load: reading.pv_power > 0.0 && reading.load_power > 0.0,
            pv_to_battery: reading.pv_power > 0.0 && reading.bat_power > 0.0,
            battery_to_load: reading.bat_power < 0.0,
            grid_to_load: reading.grid_power > 0.0,
        })
    }
}
