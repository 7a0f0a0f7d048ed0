//! Simulated device source.
//!
//! Lets the gateway run against a plain SQLite file with no hardware
//! attached: every active meter with register mappings produces one value
//! per mapped data point, shaped as a slow daily swing plus measurement
//! noise.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

use joule_core::RawReading;
use joule_db::Database;
use joule_sync::{DeviceSource, SyncResult};

/// [`DeviceSource`] backed by the local configuration instead of hardware.
pub struct SimulatedSource {
    db: Arc<Database>,
}

impl SimulatedSource {
    pub fn new(db: Arc<Database>) -> Self {
        SimulatedSource { db }
    }
}

/// Rough magnitude for a data point, so the simulated values look like the
/// quantity they claim to be.
fn simulated_base(data_point: &str) -> f64 {
    match data_point {
        p if p.contains("energy") => 1_250.0,
        p if p.contains("power") => 4.2,
        p if p.contains("voltage") => 230.0,
        p if p.contains("current") => 9.5,
        _ => 100.0,
    }
}

#[async_trait]
impl DeviceSource for SimulatedSource {
    async fn collect(&self) -> SyncResult<Vec<RawReading>> {
        let meters = self.db.meters().list_active().await?;
        let now = Utc::now();

        let mut mapped = Vec::new();
        for meter in meters {
            let points = self
                .db
                .device_registers()
                .data_points_for_meter(&meter.id)
                .await?;
            if points.is_empty() {
                debug!(meter = %meter.meter_number, "Meter has no register mappings");
                continue;
            }
            mapped.push((meter, points));
        }

        let day_phase =
            (now.timestamp() % 86_400) as f64 / 86_400.0 * std::f64::consts::TAU;
        let mut rng = StdRng::from_entropy();

        let mut readings = Vec::new();
        for (meter, points) in mapped {
            for point in points {
                let base = simulated_base(&point.data_point);
                let swing = base * 0.25 * day_phase.sin();
                let noise = base * 0.02 * rng.gen_range(-1.0..1.0);

                readings.push(RawReading {
                    meter_number: meter.meter_number.clone(),
                    data_point: point.data_point,
                    value: (base + swing + noise).max(0.0),
                    unit: point.unit,
                    timestamp: now,
                });
            }
        }

        debug!(count = readings.len(), "Simulated collection pass");
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joule_core::{DeviceRegister, Meter, Register, DEFAULT_TENANT_ID};
    use joule_db::DbConfig;
    use uuid::Uuid;

    async fn seeded_db() -> (Arc<Database>, String) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let now = Utc::now();

        let meter = Meter {
            id: Uuid::new_v4().to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            meter_number: "SIM-1".to_string(),
            name: "Sim meter".to_string(),
            location: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.meters().upsert(&meter).await.unwrap();

        let register = Register {
            id: Uuid::new_v4().to_string(),
            register_code: "1-0:1.8.0".to_string(),
            name: "Active energy import".to_string(),
            data_point: "active_energy_import".to_string(),
            unit: "kWh".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.registers().upsert(&register).await.unwrap();

        let link = DeviceRegister {
            id: Uuid::new_v4().to_string(),
            meter_id: meter.id.clone(),
            register_id: register.id,
            scale_factor: 1.0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.device_registers().upsert(&link).await.unwrap();

        (db, meter.meter_number)
    }

    #[tokio::test]
    async fn test_collect_produces_one_reading_per_mapping() {
        let (db, meter_number) = seeded_db().await;
        let source = SimulatedSource::new(db);

        let readings = source.collect().await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].meter_number, meter_number);
        assert_eq!(readings[0].data_point, "active_energy_import");
        assert_eq!(readings[0].unit, "kWh");
        assert!(readings[0].value >= 0.0);
    }

    #[tokio::test]
    async fn test_collect_skips_meters_without_mappings() {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let now = Utc::now();
        let meter = Meter {
            id: Uuid::new_v4().to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            meter_number: "SIM-2".to_string(),
            name: "Unmapped meter".to_string(),
            location: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.meters().upsert(&meter).await.unwrap();

        let source = SimulatedSource::new(db);
        assert!(source.collect().await.unwrap().is_empty());
    }
}
