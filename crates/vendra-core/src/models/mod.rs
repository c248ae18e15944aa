pub mod address;
pub mod coverage;
pub mod delivery;
pub mod order;
pub mod outbox;
pub mod payment;

pub use address::Address;
pub use coverage::{CoverageArea, CoverageQuery, CreateCoverageAreaRequest};
pub use delivery::{
    DeliveryMethod, DeliveryOrder, DeliveryProvider, DeliverySnapshot, DeliveryStatus,
    SnapshotType, Vehicle, VehicleStatus,
};
pub use order::{
    AuditAction, CreateOrderItem, CreateOrderRequest, Order, OrderAuditEntry, OrderItem,
    OrderStatus, PaidStatus, UpdateOrderRequest,
};
pub use outbox::{OutboxRecord, OutboxStatus};
pub use payment::{
    Payment, PaymentMethod, PaymentStatus, PaymentTiming, RecordPaymentRequest,
};

use serde::{Deserialize, Serialize};

/// Supported settlement currencies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "currency", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Thb,
    Usd,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Thb => write!(f, "THB"),
            Currency::Usd => write!(f, "USD"),
        }
    }
}
