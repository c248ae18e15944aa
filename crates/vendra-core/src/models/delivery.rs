use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a delivery is carried out
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "delivery_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    SelfDelivery,
    ThirdParty,
}

/// Delivery lifecycle status, mirrors the latest snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed | DeliveryStatus::Cancelled)
    }
}

/// Tracked delivery for an order (1:1)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub method: DeliveryMethod,
    pub status: DeliveryStatus,
    pub delivery_fee: Decimal,
    pub cod_amount: Decimal,
    pub tracking_number: Option<String>,
    pub vehicle_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub route: Option<String>,
    pub planned_delivery_date: DateTime<Utc>,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub requires_manual_coordination: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot kinds, a subset of the delivery lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "snapshot_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Created,
    Assigned,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl SnapshotType {
    /// Delivery status implied by a snapshot of this type
    pub fn delivery_status(&self) -> DeliveryStatus {
        match self {
            SnapshotType::Created => DeliveryStatus::Pending,
            SnapshotType::Assigned => DeliveryStatus::Assigned,
            SnapshotType::InTransit => DeliveryStatus::InTransit,
            SnapshotType::Delivered => DeliveryStatus::Delivered,
            SnapshotType::Failed => DeliveryStatus::Failed,
            SnapshotType::Cancelled => DeliveryStatus::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SnapshotType::Delivered | SnapshotType::Failed | SnapshotType::Cancelled)
    }

    /// Whether `next` may be appended after a snapshot of this type.
    /// Repeats of `InTransit` carry location updates and are allowed.
    pub fn can_follow(&self, next: SnapshotType) -> bool {
        use SnapshotType::*;

        match (self, next) {
            (_, Cancelled) if !self.is_terminal() => true,
            (Created, Assigned) => true,
            (Created, InTransit) => true,
            (Assigned, InTransit) => true,
            (InTransit, InTransit) => true,
            (InTransit, Delivered) => true,
            (InTransit, Failed) => true,
            (Assigned, Failed) => true,
            _ => false,
        }
    }
}

/// Append-only record of a delivery's state at a point in time.
/// Snapshots form a linked list per delivery via `previous_snapshot_id`;
/// the current state is the fold of the chain.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliverySnapshot {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub snapshot_type: SnapshotType,
    pub snapshot_data: serde_json::Value,
    pub triggered_by: String,
    pub triggered_event: String,
    pub previous_snapshot_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DeliverySnapshot {
    /// Latitude/longitude carried by the snapshot payload, if any
    pub fn location(&self) -> Option<(Decimal, Decimal)> {
        let parse = |key: &str| -> Option<Decimal> {
            let value = self.snapshot_data.get(key)?;
            if let Some(s) = value.as_str() {
                s.parse().ok()
            } else {
                value.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        };
        Some((parse("lat")?, parse("lng")?))
    }
}

/// Fleet vehicle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "vehicle_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Maintenance,
    Inactive,
}

/// Self-fleet vehicle
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate_number: String,
    /// Home-base route the vehicle serves
    pub route: String,
    pub status: VehicleStatus,
    pub max_daily_capacity: i32,
    /// Set while in maintenance; the reactivator flips the vehicle back
    /// to active once this passes.
    pub available_from: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Third-party courier configuration
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryProvider {
    pub id: Uuid,
    pub name: String,
    /// Lower value wins when several providers cover a destination
    pub priority: i32,
    pub supported_provinces: Vec<String>,
    pub max_weight_kg: Decimal,
    pub has_api: bool,
    pub api_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_transitions() {
        assert!(SnapshotType::Created.can_follow(SnapshotType::Assigned));
        assert!(SnapshotType::Assigned.can_follow(SnapshotType::InTransit));
        assert!(SnapshotType::InTransit.can_follow(SnapshotType::InTransit));
        assert!(SnapshotType::InTransit.can_follow(SnapshotType::Delivered));
        assert!(SnapshotType::Assigned.can_follow(SnapshotType::Cancelled));
        assert!(!SnapshotType::Delivered.can_follow(SnapshotType::InTransit));
        assert!(!SnapshotType::Delivered.can_follow(SnapshotType::Cancelled));
        assert!(!SnapshotType::Created.can_follow(SnapshotType::Delivered));
    }

    #[test]
    fn test_snapshot_location_parsing() {
        let snapshot = DeliverySnapshot {
            id: Uuid::new_v4(),
            delivery_id: Uuid::new_v4(),
            snapshot_type: SnapshotType::InTransit,
            snapshot_data: json!({"lat": "13.7563", "lng": "100.5018"}),
            triggered_by: "driver".to_string(),
            triggered_event: "location_update".to_string(),
            previous_snapshot_id: None,
            created_at: Utc::now(),
        };

        let (lat, lng) = snapshot.location().unwrap();
        assert_eq!(lat.to_string(), "13.7563");
        assert_eq!(lng.to_string(), "100.5018");

        let empty = DeliverySnapshot { snapshot_data: json!({}), ..snapshot };
        assert!(empty.location().is_none());
    }
}
