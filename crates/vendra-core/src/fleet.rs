//! Fleet management
//!
//! Vehicle lookups plus the scheduled-availability reactivator, the
//! second background loop: vehicles parked in maintenance return to
//! active once their hold window lapses.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::FleetConfig;
use crate::models::{Vehicle, VehicleStatus};
use crate::{Error, Result};

pub struct Fleet {
    pool: PgPool,
}

impl Fleet {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Active vehicles serving a route, oldest first
    pub async fn vehicles_on_route(&self, route: &str) -> Result<Vec<Vehicle>> {
        let vehicles = sqlx::query_as::<_, Vehicle>(
            "SELECT * FROM vehicles WHERE route = $1 AND status = 'active' ORDER BY created_at ASC",
        )
        .bind(route)
        .fetch_all(&self.pool)
        .await?;

        Ok(vehicles)
    }

    /// Park a vehicle for maintenance until `available_from`
    pub async fn set_maintenance(
        &self,
        vehicle_id: Uuid,
        available_from: DateTime<Utc>,
    ) -> Result<Vehicle> {
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            UPDATE vehicles SET status = $1, available_from = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(VehicleStatus::Maintenance)
        .bind(available_from)
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("vehicle {} not found", vehicle_id)))?;

        Ok(vehicle)
    }

    /// Flip vehicles whose maintenance window has lapsed back to active.
    /// Returns the number reactivated.
    pub async fn reactivate_due(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vehicles
            SET status = 'active', available_from = NULL, updated_at = NOW()
            WHERE status = 'maintenance'
              AND available_from IS NOT NULL
              AND available_from <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Background loop driving [`Fleet::reactivate_due`]
pub struct AvailabilityReactivator {
    fleet: Fleet,
    config: FleetConfig,
}

impl AvailabilityReactivator {
    pub fn new(pool: PgPool, config: FleetConfig) -> Self {
        Self { fleet: Fleet::new(pool), config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.config.reactivate_interval(),
            "availability reactivator started"
        );

        let mut ticker = interval(self.config.reactivate_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.fleet.reactivate_due().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "vehicles reactivated"),
                        Err(e) => error!("vehicle reactivation failed: {}", e),
                    }
                }
            }
        }

        info!("availability reactivator stopped");
    }
}
