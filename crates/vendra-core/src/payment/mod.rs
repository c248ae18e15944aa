//! Payments: ledger writes and read-side reconciliation

pub mod ledger;
pub mod reconciliation;

pub use ledger::{derive_paid_status, PaymentLedger, OVERPAYMENT_TOLERANCE};
pub use reconciliation::{
    CustomerPaymentEntry, DailyPoint, MethodBreakdown, OrderPaymentSummary,
    PaymentReconciliation, PaymentTimelineEvent, StoreAnalytics,
};
