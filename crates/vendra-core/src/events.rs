//! Broker message envelope and topic routing
//!
//! Every cross-boundary event is wrapped in the same envelope; `id` is the
//! outbox record's event id and consumers deduplicate on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::OutboxRecord;

/// Envelope schema version
pub const ENVELOPE_VERSION: i32 = 1;

/// Producing service name stamped on every envelope
pub const SOURCE: &str = "vendra";

/// Broker topics, one per aggregate domain
pub mod topics {
    pub const ORDER_EVENTS: &str = "order-events";
    pub const PAYMENT_EVENTS: &str = "payment-events";
    pub const DELIVERY_EVENTS: &str = "delivery-events";
}

/// Event type names
pub mod event_types {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_CONFIRMED: &str = "order.confirmed";
    pub const ORDER_SHIPPED: &str = "order.shipped";
    pub const ORDER_DELIVERED: &str = "order.delivered";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const ORDER_UPDATED: &str = "order.updated";
    pub const ORDER_PAYMENT_COMPLETED: &str = "order.payment_completed";
    pub const PAYMENT_CREATED: &str = "payment.created";
    pub const PAYMENT_COMPLETED: &str = "payment.completed";
    pub const PAYMENT_REFUNDED: &str = "payment.refunded";
    pub const DELIVERY_CREATED: &str = "delivery.created";
    pub const DELIVERY_STATUS_CHANGED: &str = "delivery.status_changed";
}

/// Wire envelope published to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub timestamp: DateTime<Utc>,
    pub version: i32,
    pub source: String,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Build the envelope for an outbox record
    pub fn from_record(record: &OutboxRecord) -> Self {
        Self {
            id: record.event_id,
            event_type: record.event_type.clone(),
            aggregate_id: record.aggregate_id,
            aggregate_type: record.aggregate_type.clone(),
            timestamp: record.created_at,
            version: ENVELOPE_VERSION,
            source: SOURCE.to_string(),
            data: record.payload.clone(),
        }
    }

    /// Broker topic for this envelope's aggregate domain
    pub fn topic(&self) -> &'static str {
        topic_for(&self.aggregate_type)
    }

    /// Broker partition key; per-aggregate ordering follows from it
    pub fn key(&self) -> String {
        self.aggregate_id.to_string()
    }
}

/// Topic for an aggregate type; unknown aggregates land on order-events
pub fn topic_for(aggregate_type: &str) -> &'static str {
    match aggregate_type {
        "payment" => topics::PAYMENT_EVENTS,
        "delivery" => topics::DELIVERY_EVENTS,
        _ => topics::ORDER_EVENTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_from_record() {
        let record = OutboxRecord::new(
            Uuid::new_v4(),
            "order",
            event_types::ORDER_CREATED,
            json!({"total": "21.98"}),
        );

        let envelope = EventEnvelope::from_record(&record);
        assert_eq!(envelope.id, record.event_id);
        assert_eq!(envelope.event_type, "order.created");
        assert_eq!(envelope.topic(), topics::ORDER_EVENTS);
        assert_eq!(envelope.key(), record.aggregate_id.to_string());
        assert_eq!(envelope.version, ENVELOPE_VERSION);
    }

    #[test]
    fn test_topic_routing() {
        assert_eq!(topic_for("order"), "order-events");
        assert_eq!(topic_for("payment"), "payment-events");
        assert_eq!(topic_for("delivery"), "delivery-events");
        assert_eq!(topic_for("unknown"), "order-events");
    }

    #[test]
    fn test_envelope_serializes_type_field() {
        let record =
            OutboxRecord::new(Uuid::new_v4(), "payment", event_types::PAYMENT_COMPLETED, json!({}));
        let envelope = EventEnvelope::from_record(&record);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "payment.completed");
        assert_eq!(value["source"], "vendra");
    }
}
