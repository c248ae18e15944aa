pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fleet;
pub mod models;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod shipping;

// Re-export commonly used types
pub use cache::Cache;
pub use config::{CacheConfig, Config, DatabaseConfig, DispatchConfig, FleetConfig, OutboxConfig, ServerConfig};
pub use error::{Error, Result};
pub use events::{EventEnvelope, topic_for};
pub use fleet::{AvailabilityReactivator, Fleet};
pub use models::{
    Address, AuditAction, CoverageArea, CoverageQuery, CreateCoverageAreaRequest, CreateOrderItem,
    CreateOrderRequest, Currency, DeliveryMethod, DeliveryOrder, DeliveryProvider,
    DeliverySnapshot, DeliveryStatus, Order, OrderAuditEntry, OrderItem, OrderStatus,
    OutboxRecord, OutboxStatus, PaidStatus, Payment, PaymentMethod, PaymentStatus, PaymentTiming,
    RecordPaymentRequest, SnapshotType, UpdateOrderRequest, Vehicle, VehicleStatus,
};
pub use order::{OrderDetail, OrderFilter, OrderService, OrderTotals, TransitionError};
pub use outbox::{EventBroker, LogBroker, OutboxQueue, OutboxWorker, PgOutboxStore};
pub use payment::{
    derive_paid_status, OrderPaymentSummary, PaymentLedger, PaymentReconciliation, StoreAnalytics,
};
pub use shipping::{
    CoverageResolver, DeliveryDispatcher, DeliveryTracker, DispatchRequest, FeeCalculator,
    HttpProviderClient, ProviderClient, TrackingUpdate,
};

/// Current version of vendra
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("Test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
