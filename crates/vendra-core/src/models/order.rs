use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

/// Payment projection over an order's payments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "paid_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaidStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Refunded,
    Overpaid,
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    /// Immutable human-visible code, e.g. ORD-20260315-7K2Q4N
    pub code: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub paid_status: PaidStatus,
    pub currency: super::Currency,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub tax_enabled: bool,
    pub total: Decimal,
    pub shipping_address_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    /// Optimistic concurrency version, bumped on every mutation
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub price_overridden: bool,
    pub override_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit actions recorded against an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    StatusChange,
    Cancel,
    ItemChange,
}

/// Append-only audit trail entry, exactly one per state-mutating operation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderAuditEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: AuditAction,
    pub details: serde_json::Value,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Create order request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,

    #[validate(length(min = 1, message = "order requires at least one item"))]
    pub items: Vec<CreateOrderItem>,

    #[serde(default)]
    pub discount: Decimal,

    #[serde(default)]
    pub shipping_fee: Decimal,

    #[serde(default)]
    pub tax: Decimal,

    #[serde(default)]
    pub tax_enabled: bool,

    pub shipping_address_id: Option<Uuid>,

    pub payment_method: Option<String>,

    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderItem {
    pub product_id: Uuid,

    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,

    pub unit_price: Decimal,

    #[serde(default)]
    pub price_overridden: bool,

    pub override_reason: Option<String>,
}

/// Update order request, permitted while pending or confirmed only.
/// Every field is optional; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub discount: Option<Decimal>,
    pub shipping_fee: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub tax_enabled: Option<bool>,
    pub shipping_address_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl UpdateOrderRequest {
    pub fn is_empty(&self) -> bool {
        self.discount.is_none()
            && self.shipping_fee.is_none()
            && self.tax.is_none()
            && self.tax_enabled.is_none()
            && self.shipping_address_id.is_none()
            && self.payment_method.is_none()
            && self.notes.is_none()
    }
}
