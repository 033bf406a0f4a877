// src/telemetry/store.rs
// Persistence for telemetry samples: one table per vendor (design doc §6),
// idempotent upsert on (vendor, timestamp), ordered reads.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{CoreError, CoreResult};

use super::types::{TelemetrySample, Vendor};

pub struct TelemetryStore {
    pool: SqlitePool,
}

fn table_name(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::SolArk => "telemetry_solark",
        Vendor::Victron => "telemetry_victron",
    }
}

impl TelemetryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Pollers are the sole writers of their table (§4.4); writes are
    /// idempotent on `(vendor, timestamp)` via `ON CONFLICT`.
    pub async fn upsert(&self, sample: &TelemetrySample) -> CoreResult<()> {
        let table = table_name(sample.vendor);
        let sql = format!(
            "INSERT INTO {table} (
                plant_id, timestamp, soc, batt_power, batt_voltage, batt_current,
                pv_power, load_power, grid_power, pv_to_load, pv_to_bat, bat_to_load, grid_to_load, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(timestamp) DO UPDATE SET
                plant_id = excluded.plant_id,
                soc = excluded.soc,
                batt_power = excluded.batt_power,
                batt_voltage = excluded.batt_voltage,
                batt_current = excluded.batt_current,
                pv_power = excluded.pv_power,
                load_power = excluded.load_power,
                grid_power = excluded.grid_power,
                pv_to_load = excluded.pv_to_load,
                pv_to_bat = excluded.pv_to_bat,
                bat_to_load = excluded.bat_to_load,
                grid_to_load = excluded.grid_to_load"
        );

        sqlx::query(&sql)
            .bind(&sample.plant_id)
            .bind(sample.timestamp.timestamp())
            .bind(sample.soc)
            .bind(sample.battery_power)
            .bind(sample.battery_voltage)
            .bind(sample.battery_current)
            .bind(sample.pv_power)
            .bind(sample.load_power)
            .bind(sample.grid_power)
            .bind(sample.pv_to_load)
            .bind(sample.pv_to_battery)
            .bind(sample.battery_to_load)
            .bind(sample.grid_to_load)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;

        Ok(())
    }

    fn row_to_sample(vendor: Vendor, row: &sqlx::sqlite::SqliteRow) -> CoreResult<TelemetrySample> {
        let ts: i64 = row.try_get("timestamp").map_err(CoreError::from)?;
        Ok(TelemetrySample {
            vendor,
            plant_id: row.try_get("plant_id").ok(),
            timestamp: DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now),
            soc: row.try_get("soc").map_err(CoreError::from)?,
            battery_power: row.try_get("batt_power").map_err(CoreError::from)?,
            battery_voltage: row.try_get("batt_voltage").map_err(CoreError::from)?,
            battery_current: row.try_get("batt_current").map_err(CoreError::from)?,
            pv_power: row.try_get("pv_power").map_err(CoreError::from)?,
            load_power: row.try_get("load_power").map_err(CoreError::from)?,
            grid_power: row.try_get("grid_power").map_err(CoreError::from)?,
            pv_to_load: row.try_get("pv_to_load").map_err(CoreError::from)?,
            pv_to_battery: row.try_get("pv_to_bat").map_err(CoreError::from)?,
            battery_to_load: row.try_get("bat_to_load").map_err(CoreError::from)?,
            grid_to_load: row.try_get("grid_to_load").map_err(CoreError::from)?,
        })
    }

    pub async fn latest(&self, vendor: Vendor) -> CoreResult<Option<TelemetrySample>> {
        let table = table_name(vendor);
        let sql = format!("SELECT * FROM {table} ORDER BY timestamp DESC LIMIT 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await.map_err(CoreError::from)?;
        row.map(|r| Self::row_to_sample(vendor, &r)).transpose()
    }

    /// Ascending by timestamp, deduplicated by construction (upsert already
    /// guarantees one row per `(vendor, timestamp)`).
    pub async fn history(&self, vendor: Vendor, since_hours: i64, limit: i64) -> CoreResult<Vec<TelemetrySample>> {
        let table = table_name(vendor);
        let since = Utc::now() - chrono::Duration::hours(since_hours.max(0));
        let sql = format!(
            "SELECT * FROM {table} WHERE timestamp >= ? ORDER BY timestamp ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(since.timestamp())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;

        rows.iter().map(|r| Self::row_to_sample(vendor, r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        for table in ["telemetry_solark", "telemetry_victron"] {
            let sql = format!(
                "CREATE TABLE {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plant_id TEXT,
                    timestamp INTEGER NOT NULL UNIQUE,
                    soc REAL NOT NULL,
                    batt_power REAL NOT NULL,
                    batt_voltage REAL NOT NULL,
                    batt_current REAL NOT NULL,
                    pv_power REAL NOT NULL,
                    load_power REAL NOT NULL,
                    grid_power REAL NOT NULL,
                    pv_to_load BOOLEAN NOT NULL,
                    pv_to_bat BOOLEAN NOT NULL,
                    bat_to_load BOOLEAN NOT NULL,
                    grid_to_load BOOLEAN NOT NULL,
                    created_at INTEGER NOT NULL
                )"
            );
            sqlx::query(&sql).execute(&pool).await.unwrap();
        }
        pool
    }

    fn sample(vendor: Vendor, ts: i64) -> TelemetrySample {
        TelemetrySample {
            vendor,
            plant_id: Some("p1".into()),
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
            soc: 67.0,
            battery_power: 230.0,
            battery_voltage: 53.1,
            battery_current: 4.3,
            pv_power: 500.0,
            load_power: 270.0,
            grid_power: 0.0,
            pv_to_load: true,
            pv_to_battery: true,
            battery_to_load: false,
            grid_to_load: false,
        }
    }

    #[tokio::test]
    async fn duplicate_timestamp_upsert_stores_one_row() {
        let pool = test_pool().await;
        let store = TelemetryStore::new(pool.clone());
        store.upsert(&sample(Vendor::SolArk, 1000)).await.unwrap();
        store.upsert(&sample(Vendor::SolArk, 1000)).await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) as c FROM telemetry_solark")
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("c")
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn history_is_ascending_by_timestamp() {
        let pool = test_pool().await;
        let store = TelemetryStore::new(pool);
        let now = Utc::now().timestamp();
        store.upsert(&sample(Vendor::SolArk, now - 100)).await.unwrap();
        store.upsert(&sample(Vendor::SolArk, now - 50)).await.unwrap();
        store.upsert(&sample(Vendor::SolArk, now)).await.unwrap();

        let history = store.history(Vendor::SolArk, 1, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].timestamp <= history[1].timestamp);
        assert!(history[1].timestamp <= history[2].timestamp);
    }

    #[tokio::test]
    async fn latest_returns_none_when_empty() {
        let pool = test_pool().await;
        let store = TelemetryStore::new(pool);
        assert!(store.latest(Vendor::Victron).await.unwrap().is_none());
    }
}
