//! Payment reconciliation
//!
//! Read-side aggregations over the payment ledger: per-order summaries,
//! store analytics, customer history and event timelines. Nothing here
//! mutates state.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{OrderStatus, Payment, PaymentMethod, PaymentStatus};
use crate::{Error, Result};

/// Per-order rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaymentSummary {
    pub order_id: Uuid,
    pub total: Decimal,
    pub paid: Decimal,
    pub pending: Decimal,
    pub refunded: Decimal,
    pub payment_methods: Vec<PaymentMethod>,
    pub transaction_count: i64,
    pub last_payment_at: Option<DateTime<Utc>>,
}

/// Per-method share of a store's takings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodBreakdown {
    pub method: PaymentMethod,
    pub count: i64,
    pub amount: Decimal,
    pub percentage: Decimal,
}

/// One day of a store's completed payments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub count: i64,
}

/// Store-level analytics over a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAnalytics {
    pub store_id: Uuid,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_amount: Decimal,
    pub total_count: i64,
    pub methods: Vec<MethodBreakdown>,
    pub daily: Vec<DailyPoint>,
}

/// A customer payment with its order context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerPaymentEntry {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub order_code: String,
    pub order_status: OrderStatus,
    pub order_total: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One event in an order's payment history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTimelineEvent {
    pub payment_id: Uuid,
    pub event: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SummaryRow {
    paid: Decimal,
    pending: Decimal,
    refunded: Decimal,
    transaction_count: i64,
    last_payment_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct MethodRow {
    method: PaymentMethod,
    count: i64,
    amount: Decimal,
}

#[derive(FromRow)]
struct DailyRow {
    date: NaiveDate,
    amount: Decimal,
    count: i64,
}

#[derive(FromRow)]
struct CustomerRow {
    payment_id: Uuid,
    order_id: Uuid,
    order_code: String,
    order_status: OrderStatus,
    order_total: Decimal,
    method: PaymentMethod,
    status: PaymentStatus,
    amount: Decimal,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

pub struct PaymentReconciliation {
    pool: PgPool,
}

impl PaymentReconciliation {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Roll up an order's payments
    pub async fn order_summary(&self, order_id: Uuid) -> Result<OrderPaymentSummary> {
        let total: Option<Decimal> =
            sqlx::query_scalar("SELECT total FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;
        let total =
            total.ok_or_else(|| Error::not_found(format!("order {} not found", order_id)))?;

        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS paid,
                COALESCE(SUM(amount) FILTER (WHERE status IN ('pending', 'processing')), 0) AS pending,
                COALESCE(SUM(amount) FILTER (WHERE status = 'refunded'), 0) AS refunded,
                COUNT(*) AS transaction_count,
                MAX(paid_at) AS last_payment_at
            FROM payments WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        let payment_methods: Vec<PaymentMethod> = sqlx::query_scalar(
            "SELECT DISTINCT method FROM payments WHERE order_id = $1 ORDER BY method",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderPaymentSummary {
            order_id,
            total,
            paid: row.paid,
            pending: row.pending,
            refunded: row.refunded,
            payment_methods,
            transaction_count: row.transaction_count,
            last_payment_at: row.last_payment_at,
        })
    }

    /// Completed-payment analytics for a store over an inclusive range
    pub async fn store_analytics(
        &self,
        store_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<StoreAnalytics> {
        if date_from > date_to {
            return Err(Error::validation("date_from must not be after date_to"));
        }

        let method_rows = sqlx::query_as::<_, MethodRow>(
            r#"
            SELECT method, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS amount
            FROM payments
            WHERE store_id = $1
              AND status = 'completed'
              AND paid_at::date BETWEEN $2 AND $3
            GROUP BY method
            ORDER BY amount DESC
            "#,
        )
        .bind(store_id)
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await?;

        let total_amount: Decimal = method_rows.iter().map(|r| r.amount).sum();
        let total_count: i64 = method_rows.iter().map(|r| r.count).sum();

        let methods = method_rows
            .into_iter()
            .map(|row| MethodBreakdown {
                method: row.method,
                count: row.count,
                amount: row.amount,
                percentage: method_percentage(row.amount, total_amount),
            })
            .collect();

        let daily = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT paid_at::date AS date, COALESCE(SUM(amount), 0) AS amount, COUNT(*) AS count
            FROM payments
            WHERE store_id = $1
              AND status = 'completed'
              AND paid_at::date BETWEEN $2 AND $3
            GROUP BY paid_at::date
            ORDER BY date ASC
            "#,
        )
        .bind(store_id)
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| DailyPoint { date: row.date, amount: row.amount, count: row.count })
        .collect();

        Ok(StoreAnalytics {
            store_id,
            date_from,
            date_to,
            total_amount,
            total_count,
            methods,
            daily,
        })
    }

    /// A customer's most recent payments with order context
    pub async fn customer_history(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CustomerPaymentEntry>> {
        let limit = if limit > 0 { limit.min(200) } else { 20 };

        let rows = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT
                p.id AS payment_id,
                p.order_id,
                o.code AS order_code,
                o.status AS order_status,
                o.total AS order_total,
                p.method,
                p.status,
                p.amount,
                p.paid_at,
                p.created_at
            FROM payments p
            JOIN orders o ON o.id = p.order_id
            WHERE p.customer_id = $1
            ORDER BY p.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CustomerPaymentEntry {
                payment_id: row.payment_id,
                order_id: row.order_id,
                order_code: row.order_code,
                order_status: row.order_status,
                order_total: row.order_total,
                method: row.method,
                status: row.status,
                amount: row.amount,
                paid_at: row.paid_at,
                created_at: row.created_at,
            })
            .collect())
    }

    /// Chronological payment events for an order
    pub async fn timeline(&self, order_id: Uuid) -> Result<Vec<PaymentTimelineEvent>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(timeline_events(&payments))
    }

    /// All payments against an order, oldest first
    pub async fn order_payments(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }
}

/// Share of the range total taken by one method, two decimals. A zero
/// total yields zero rather than dividing.
fn method_percentage(amount: Decimal, total_amount: Decimal) -> Decimal {
    if total_amount > Decimal::ZERO {
        (amount / total_amount * Decimal::from(100)).round_dp(2)
    } else {
        Decimal::ZERO
    }
}

/// Expand payments into their created/completed/refunded events,
/// chronologically ordered.
fn timeline_events(payments: &[Payment]) -> Vec<PaymentTimelineEvent> {
    let mut events = Vec::new();
    for payment in payments {
        events.push(PaymentTimelineEvent {
            payment_id: payment.id,
            event: "created".to_string(),
            method: payment.method,
            amount: payment.amount,
            at: payment.created_at,
        });

        if let Some(paid_at) = payment.paid_at {
            events.push(PaymentTimelineEvent {
                payment_id: payment.id,
                event: "completed".to_string(),
                method: payment.method,
                amount: payment.amount,
                at: paid_at,
            });
        }

        if payment.status == PaymentStatus::Refunded {
            events.push(PaymentTimelineEvent {
                payment_id: payment.id,
                event: "refunded".to_string(),
                method: payment.method,
                amount: payment.amount,
                at: payment.updated_at,
            });
        }
    }

    events.sort_by_key(|e| e.at);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, PaymentTiming};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_method_percentage() {
        assert_eq!(method_percentage(dec!(25), dec!(100)), dec!(25));
        assert_eq!(method_percentage(dec!(100), dec!(100)), dec!(100));

        // Thirds round at the second decimal and still cover the range
        let first = method_percentage(dec!(1), dec!(3));
        let second = method_percentage(dec!(2), dec!(3));
        assert_eq!(first, dec!(33.33));
        assert_eq!(second, dec!(66.67));
        assert_eq!(first + second, dec!(100.00));
    }

    #[test]
    fn test_method_percentage_zero_total() {
        assert_eq!(method_percentage(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(method_percentage(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    fn payment(
        status: PaymentStatus,
        created_offset_secs: i64,
        paid_offset_secs: Option<i64>,
        updated_offset_secs: i64,
    ) -> Payment {
        let base = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            method: PaymentMethod::BankTransfer,
            channel: "promptpay".to_string(),
            timing: PaymentTiming::Prepaid,
            amount: dec!(100),
            currency: Currency::Thb,
            status,
            paid_at: paid_offset_secs.map(|s| base + Duration::seconds(s)),
            store_id: None,
            delivery_id: None,
            collected_by: None,
            collection_address: None,
            created_at: base + Duration::seconds(created_offset_secs),
            updated_at: base + Duration::seconds(updated_offset_secs),
        }
    }

    #[test]
    fn test_timeline_orders_events() {
        // First payment completes, second is created later then refunded
        let completed = payment(PaymentStatus::Completed, 0, Some(20), 20);
        let refunded = payment(PaymentStatus::Refunded, 10, Some(30), 40);

        let events = timeline_events(&[completed.clone(), refunded.clone()]);
        let labels: Vec<(&str, Uuid)> =
            events.iter().map(|e| (e.event.as_str(), e.payment_id)).collect();

        assert_eq!(
            labels,
            vec![
                ("created", completed.id),
                ("created", refunded.id),
                ("completed", completed.id),
                ("completed", refunded.id),
                ("refunded", refunded.id),
            ]
        );
    }

    #[test]
    fn test_timeline_pending_payment_only_creates() {
        let pending = payment(PaymentStatus::Pending, 0, None, 0);
        let events = timeline_events(&[pending]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "created");
    }
}
