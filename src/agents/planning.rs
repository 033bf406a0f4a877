// src/agents/planning.rs
// Pure, deterministic planning heuristics backing the Planner specialist's
// `battery_plan`/`miner_plan`/`energy_plan` tools. Read-only by construction
// (design doc §9 non-goal: "real inverter control") -- these functions only
// ever produce advisory text from telemetry samples already on hand.

use crate::telemetry::types::TelemetrySample;

const LOW_SOC_PCT: f32 = 20.0;
const HIGH_SOC_PCT: f32 = 80.0;
const MINER_SURPLUS_WATTS: f32 = 500.0;
const MINER_MIN_SOC_PCT: f32 = 60.0;

pub fn battery_plan(sample: &TelemetrySample) -> String {
    let charging = sample.battery_power > 0.0;
    let mode = if sample.soc < LOW_SOC_PCT {
        "conserve: SOC is low, avoid discretionary loads until it recovers"
    } else if sample.soc > HIGH_SOC_PCT {
        "healthy: SOC is high, safe to run discretionary loads"
    } else {
        "moderate: SOC is mid-range, monitor before adding load"
    };

    format!(
        "Battery plan ({}): SOC {:.1}%, {} at {:.0}W (PV {:.0}W, load {:.0}W). Recommendation: {}.",
        sample.vendor,
        sample.soc,
        if charging { "charging" } else { "discharging" },
        sample.battery_power.abs(),
        sample.pv_power,
        sample.load_power,
        mode
    )
}

pub fn miner_plan(sample: &TelemetrySample) -> String {
    let surplus = sample.pv_power - sample.load_power;
    let recommend_on = surplus >= MINER_SURPLUS_WATTS && sample.soc >= MINER_MIN_SOC_PCT;

    let verdict = if recommend_on {
        format!(
            "enable: {:.0}W of PV surplus available and SOC {:.1}% clears the {:.0}% floor",
            surplus, sample.soc, MINER_MIN_SOC_PCT
        )
    } else if surplus < MINER_SURPLUS_WATTS {
        format!("hold off: only {:.0}W of surplus, below the {:.0}W threshold", surplus, MINER_SURPLUS_WATTS)
    } else {
        format!("hold off: SOC {:.1}% is below the {:.0}% floor for discretionary load", sample.soc, MINER_MIN_SOC_PCT)
    };

    format!("Miner plan ({}): {}.", sample.vendor, verdict)
}

/// Projects a 24h energy balance from recent history's average PV/load
/// power. `history` is assumed ordered ascending by timestamp (as returned
/// by `TelemetryStore::history`); an empty slice yields an explicit
/// "insufficient data" result rather than a divide-by-zero.
pub fn energy_plan(history: &[TelemetrySample]) -> String {
    if history.is_empty() {
        return "Energy plan: insufficient telemetry history to project the next 24 hours.".to_string();
    }

    let n = history.len() as f32;
    let avg_pv: f32 = history.iter().map(|s| s.pv_power).sum::<f32>() / n;
    let avg_load: f32 = history.iter().map(|s| s.load_power).sum::<f32>() / n;
    let net_watts = avg_pv - avg_load;
    let projected_kwh_24h = net_watts * 24.0 / 1000.0;

    let outlook = if projected_kwh_24h >= 0.0 {
        format!("projected surplus of {:.1} kWh over the next 24h", projected_kwh_24h)
    } else {
        format!("projected deficit of {:.1} kWh over the next 24h", projected_kwh_24h.abs())
    };

    format!(
        "Energy plan ({}): average PV {:.0}W, average load {:.0}W over {} samples, {}.",
        history[0].vendor, avg_pv, avg_load, history.len(), outlook
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::Vendor;
    use chrono::Utc;

    fn sample(soc: f32, battery_power: f32, pv_power: f32, load_power: f32) -> TelemetrySample {
        TelemetrySample {
            vendor: Vendor::SolArk,
            plant_id: None,
            timestamp: Utc::now(),
            soc,
            battery_power,
            battery_voltage: 53.0,
            battery_current: 0.0,
            pv_power,
            load_power,
            grid_power: 0.0,
            pv_to_load: pv_power > 0.0,
            pv_to_battery: battery_power > 0.0,
            battery_to_load: battery_power < 0.0,
            grid_to_load: false,
        }
    }

    #[test]
    fn battery_plan_flags_low_soc_as_conserve() {
        let plan = battery_plan(&sample(10.0, -200.0, 100.0, 300.0));
        assert!(plan.contains("conserve"));
    }

    #[test]
    fn miner_plan_recommends_on_with_surplus_and_high_soc() {
        let plan = miner_plan(&sample(70.0, 600.0, 1500.0, 400.0));
        assert!(plan.contains("enable"));
    }

    #[test]
    fn miner_plan_holds_off_with_low_soc_despite_surplus() {
        let plan = miner_plan(&sample(30.0, 600.0, 1500.0, 400.0));
        assert!(plan.contains("hold off"));
    }

    #[test]
    fn energy_plan_reports_insufficient_data_when_empty() {
        assert!(energy_plan(&[]).contains("insufficient"));
    }

    #[test]
    fn energy_plan_projects_surplus() {
        let samples = vec![sample(50.0, 100.0, 1000.0, 300.0), sample(55.0, 120.0, 1100.0, 320.0)];
        let plan = energy_plan(&samples);
        assert!(plan.contains("surplus"));
    }
}
