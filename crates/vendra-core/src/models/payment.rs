use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How the money moves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    CodCash,
    CodTransfer,
    DigitalWallet,
}

impl PaymentMethod {
    /// COD variants settle at the doorstep and carry delivery context
    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMethod::CodCash | PaymentMethod::CodTransfer)
    }

    /// Timing implied by the method
    pub fn timing(&self) -> PaymentTiming {
        if self.is_cod() {
            PaymentTiming::Cod
        } else {
            PaymentTiming::Prepaid
        }
    }
}

/// When the money is collected relative to delivery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_timing", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentTiming {
    Prepaid,
    Cod,
}

/// Payment record lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_record_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Refunded | PaymentStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;

        match (self, next) {
            (Pending, Processing) => true,
            (Pending, Cancelled) => true,
            (Pending, Failed) => true,
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            (Processing, Cancelled) => true,
            (Completed, Refunded) => true,
            _ => false,
        }
    }
}

/// Money tracked against an order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub method: PaymentMethod,
    /// Acquiring channel, e.g. promptpay, counter, kbank
    pub channel: String,
    pub timing: PaymentTiming,
    pub amount: Decimal,
    pub currency: super::Currency,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub store_id: Option<Uuid>,
    /// COD context
    pub delivery_id: Option<Uuid>,
    pub collected_by: Option<String>,
    pub collection_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to record a payment intent against an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub order_id: Uuid,
    pub method: PaymentMethod,

    #[serde(default)]
    pub channel: String,

    pub amount: Decimal,

    #[serde(default)]
    pub currency: super::Currency,

    pub store_id: Option<Uuid>,
    pub delivery_id: Option<Uuid>,
    pub collected_by: Option<String>,
    pub collection_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Processing));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Completed));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Processing));
    }

    #[test]
    fn test_cod_methods() {
        assert!(PaymentMethod::CodCash.is_cod());
        assert!(PaymentMethod::CodTransfer.is_cod());
        assert!(!PaymentMethod::BankTransfer.is_cod());
        assert_eq!(PaymentMethod::CodCash.timing(), PaymentTiming::Cod);
        assert_eq!(PaymentMethod::Cash.timing(), PaymentTiming::Prepaid);
    }
}
