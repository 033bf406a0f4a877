// src/telemetry/victron.rs
// Victron VRM API collaborator.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::error::CoreError;

use super::provider::TelemetryProvider;
use super::types::{TelemetrySample, Vendor};

#[derive(Debug, Deserialize)]
struct VictronWidget {
    #[serde(rename = "Soc")]
    soc: Option<f32>,
    #[serde(rename = "BatteryPower")]
    battery_power: Option<f32>,
    #[serde(rename = "BatteryVoltage")]
    battery_voltage: Option<f32>,
    #[serde(rename = "BatteryCurrent")]
    battery_current: Option<f32>,
    #[serde(rename = "PvPower")]
    pv_power: Option<f32>,
    #[serde(rename = "AcLoad")]
    ac_load: Option<f32>,
    #[serde(rename = "GridConsumption")]
    grid_consumption: Option<f32>,
    #[serde(rename = "LastUpdate")]
    last_update: Option<i64>,
}

pub struct VictronProvider {
    client: reqwest::Client,
    api_base: String,
    api_token: String,
    installation_id: String,
}

impl VictronProvider {
    pub fn new(api_base: String, api_token: String, installation_id: String) -> Self {
        Self { client: reqwest::Client::new(), api_base, api_token, installation_id }
    }
}

#[async_trait]
impl TelemetryProvider for VictronProvider {
    async fn fetch_latest(&self) -> crate::error::CoreResult<TelemetrySample> {
        let url = format!(
            "{}/installations/{}/diagnostics",
            self.api_base, self.installation_id
        );
        let response = self
            .client
            .get(&url)
            .header("X-Authorization", format!("Token {}", self.api_token))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 3600 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!(
                "victron responded {}",
                response.status()
            )));
        }

        let widget: VictronWidget = response.json().await?;
        let timestamp = widget
            .last_update
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        let pv_power = widget.pv_power.unwrap_or(0.0);
        let battery_power = widget.battery_power.unwrap_or(0.0);
        let load_power = widget.ac_load.unwrap_or(0.0);
        let grid_power = widget.grid_consumption.unwrap_or(0.0);

        Ok(TelemetrySample {
            vendor: Vendor::Victron,
            plant_id: Some(self.installation_id.clone()),
            timestamp,
            soc: widget.soc.unwrap_or(0.0),
            battery_power,
            battery_voltage: widget.battery_voltage.unwrap_or(0.0),
            battery_current: widget.battery_current.unwrap_or(0.0),
            pv_power,
            load_power,
            grid_power,
            pv_to_load: pv_power > 0.0 && load_power > 0.0,
            pv_to_battery: pv_power > 0.0 && battery_power > 0.0,
            battery_to_load: battery_power < 0.0,
            grid_to_load: grid_power > 0.0,
        })
    }
}
