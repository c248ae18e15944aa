use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Outbox delivery state
///
/// `Processing` marks rows claimed by a worker so a second worker does not
/// double-dispatch them; a claim that never completes falls back to
/// `Failed` via retry accounting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "outbox_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

/// Domain event pending broker publication, co-committed with the state
/// change that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxRecord {
    pub event_id: Uuid,
    /// Aggregate identity, the broker partition key
    pub aggregate_id: Uuid,
    /// "order" | "payment" | "delivery"
    pub aggregate_type: String,
    /// e.g. order.created, order.status_changed, delivery.created
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            sent_at: None,
            last_attempt_at: None,
        }
    }
}
