//! Delivery tracking
//!
//! Status and location updates land as append-only snapshots; the
//! delivery row mirrors the latest snapshot type. Out-of-order updates
//! are dropped (and counted) rather than rewriting history. Snapshot
//! timestamps are monotonic per delivery, clock skew is clamped to one
//! millisecond past the previous snapshot.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::event_types;
use crate::models::{DeliveryOrder, DeliverySnapshot, OutboxRecord, SnapshotType};
use crate::outbox;
use crate::{Error, Result};

/// Status/location update from a driver or a provider webhook
#[derive(Debug, Clone)]
pub struct TrackingUpdate {
    pub snapshot_type: SnapshotType,
    pub data: serde_json::Value,
    pub triggered_by: String,
    pub triggered_event: String,
}

impl TrackingUpdate {
    pub fn location(lat: Decimal, lng: Decimal, triggered_by: impl Into<String>) -> Self {
        Self {
            snapshot_type: SnapshotType::InTransit,
            data: json!({ "lat": lat.to_string(), "lng": lng.to_string() }),
            triggered_by: triggered_by.into(),
            triggered_event: "location_update".to_string(),
        }
    }

    pub fn status(
        snapshot_type: SnapshotType,
        triggered_by: impl Into<String>,
        triggered_event: impl Into<String>,
    ) -> Self {
        Self {
            snapshot_type,
            data: json!({}),
            triggered_by: triggered_by.into(),
            triggered_event: triggered_event.into(),
        }
    }
}

pub struct DeliveryTracker {
    pool: PgPool,
    out_of_order: AtomicU64,
}

impl DeliveryTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, out_of_order: AtomicU64::new(0) }
    }

    /// Updates dropped because they arrived after a later lifecycle stage
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order.load(Ordering::Relaxed)
    }

    /// Append a snapshot and mirror its type onto the delivery. Returns
    /// `None` when the update arrived out of order and was ignored.
    pub async fn append_snapshot(
        &self,
        delivery_id: Uuid,
        update: TrackingUpdate,
    ) -> Result<Option<DeliverySnapshot>> {
        let mut tx = self.pool.begin().await?;

        let delivery = sqlx::query_as::<_, DeliveryOrder>(
            "SELECT * FROM deliveries WHERE id = $1 FOR UPDATE",
        )
        .bind(delivery_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("delivery {} not found", delivery_id)))?;

        let previous = sqlx::query_as::<_, DeliverySnapshot>(
            "SELECT * FROM delivery_snapshots WHERE delivery_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(delivery_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ref prev) = previous {
            if !prev.snapshot_type.can_follow(update.snapshot_type) {
                self.out_of_order.fetch_add(1, Ordering::Relaxed);
                warn!(
                    delivery_id = %delivery_id,
                    previous = ?prev.snapshot_type,
                    received = ?update.snapshot_type,
                    "out-of-order tracking update ignored"
                );
                return Ok(None);
            }
        }

        if update.snapshot_type == SnapshotType::Assigned && delivery.tracking_number.is_none() {
            return Err(Error::validation(
                "delivery cannot be assigned without a tracking number",
            ));
        }

        let created_at = monotonic_timestamp(Utc::now(), previous.as_ref().map(|p| p.created_at));

        let snapshot = sqlx::query_as::<_, DeliverySnapshot>(
            r#"
            INSERT INTO delivery_snapshots (
                id, delivery_id, snapshot_type, snapshot_data,
                triggered_by, triggered_event, previous_snapshot_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(delivery_id)
        .bind(update.snapshot_type)
        .bind(&update.data)
        .bind(&update.triggered_by)
        .bind(&update.triggered_event)
        .bind(previous.as_ref().map(|p| p.id))
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        let new_status = update.snapshot_type.delivery_status();
        let status_changed = new_status != delivery.status;

        sqlx::query(
            r#"
            UPDATE deliveries SET
                status = $1,
                actual_pickup_time = CASE
                    WHEN $2 AND actual_pickup_time IS NULL THEN $3
                    ELSE actual_pickup_time
                END,
                actual_delivery_time = CASE WHEN $4 THEN $3 ELSE actual_delivery_time END,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(new_status)
        .bind(update.snapshot_type == SnapshotType::InTransit)
        .bind(created_at)
        .bind(update.snapshot_type == SnapshotType::Delivered)
        .bind(delivery_id)
        .execute(&mut *tx)
        .await?;

        if status_changed {
            let record = OutboxRecord::new(
                delivery_id,
                "delivery",
                event_types::DELIVERY_STATUS_CHANGED,
                json!({
                    "delivery_id": delivery_id,
                    "order_id": delivery.order_id,
                    "tracking_number": delivery.tracking_number,
                    "from": delivery.status,
                    "to": new_status,
                }),
            );
            outbox::enqueue(&mut tx, &record).await?;
        }

        tx.commit().await?;

        info!(
            delivery_id = %delivery_id,
            snapshot_type = ?update.snapshot_type,
            "snapshot appended"
        );

        Ok(Some(snapshot))
    }

    /// Record a driver location ping as an in-transit snapshot
    pub async fn record_location(
        &self,
        delivery_id: Uuid,
        lat: Decimal,
        lng: Decimal,
        triggered_by: impl Into<String>,
    ) -> Result<Option<DeliverySnapshot>> {
        self.append_snapshot(delivery_id, TrackingUpdate::location(lat, lng, triggered_by))
            .await
    }

    /// All snapshots for a delivery, oldest first
    pub async fn timeline(&self, delivery_id: Uuid) -> Result<Vec<DeliverySnapshot>> {
        let snapshots = sqlx::query_as::<_, DeliverySnapshot>(
            "SELECT * FROM delivery_snapshots WHERE delivery_id = $1 ORDER BY created_at ASC",
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(snapshots)
    }

    /// Latest known position: the newest snapshot carrying lat/lng
    pub async fn current_location(&self, delivery_id: Uuid) -> Result<Option<(Decimal, Decimal)>> {
        let snapshots = self.timeline(delivery_id).await?;
        Ok(snapshots.iter().rev().find_map(|s| s.location()))
    }

    /// Public tracking lookup
    pub async fn find_by_tracking(&self, tracking_number: &str) -> Result<Option<DeliveryOrder>> {
        let delivery = sqlx::query_as::<_, DeliveryOrder>(
            "SELECT * FROM deliveries WHERE tracking_number = $1",
        )
        .bind(tracking_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }

    pub async fn get_delivery(&self, delivery_id: Uuid) -> Result<Option<DeliveryOrder>> {
        let delivery = sqlx::query_as::<_, DeliveryOrder>(
            "SELECT * FROM deliveries WHERE id = $1",
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }
}

/// Snapshot timestamps never move backwards within a delivery; a skewed
/// clock is clamped to one millisecond past the previous snapshot.
fn monotonic_timestamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_timestamp_normal_flow() {
        let prev = Utc::now();
        let now = prev + Duration::seconds(5);
        assert_eq!(monotonic_timestamp(now, Some(prev)), now);
    }

    #[test]
    fn test_monotonic_timestamp_clamps_skew() {
        let prev = Utc::now();
        let skewed = prev - Duration::seconds(30);
        assert_eq!(monotonic_timestamp(skewed, Some(prev)), prev + Duration::milliseconds(1));

        // Equal timestamps also advance
        assert_eq!(monotonic_timestamp(prev, Some(prev)), prev + Duration::milliseconds(1));
    }

    #[test]
    fn test_monotonic_timestamp_first_snapshot() {
        let now = Utc::now();
        assert_eq!(monotonic_timestamp(now, None), now);
    }

    #[test]
    fn test_location_update_shape() {
        use rust_decimal_macros::dec;

        let update = TrackingUpdate::location(dec!(13.7563), dec!(100.5018), "driver-7");
        assert_eq!(update.snapshot_type, SnapshotType::InTransit);
        assert_eq!(update.data["lat"], "13.7563");
        assert_eq!(update.data["lng"], "100.5018");
        assert_eq!(update.triggered_event, "location_update");
    }
}
