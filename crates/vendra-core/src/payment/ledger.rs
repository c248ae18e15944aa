//! Payment ledger
//!
//! Records payment intents and drives their status transitions. After
//! every transition the owning order's paid status is recomputed from the
//! projection over its payments; reaching `paid` emits
//! `order.payment_completed` through the outbox in the same transaction.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::events::event_types;
use crate::models::{
    Order, OutboxRecord, PaidStatus, Payment, PaymentStatus, RecordPaymentRequest,
};
use crate::outbox;
use crate::{Error, Result};

/// Completed + in-flight payments may exceed the order total by 10%;
/// anything beyond is rejected at write time.
pub const OVERPAYMENT_TOLERANCE: Decimal = dec!(1.10);

/// Equality tolerance when comparing paid amounts against the total
const PAID_EPSILON: Decimal = dec!(0.01);

/// The only allowed mapping from payment sums to an order's paid status
pub fn derive_paid_status(total: Decimal, completed: Decimal, refunded: Decimal) -> PaidStatus {
    if total > Decimal::ZERO && refunded > Decimal::ZERO && refunded >= completed {
        return PaidStatus::Refunded;
    }

    let net = completed - refunded;
    if net <= Decimal::ZERO {
        return PaidStatus::Unpaid;
    }
    if (net - total).abs() <= PAID_EPSILON {
        return PaidStatus::Paid;
    }
    if net > total {
        return PaidStatus::Overpaid;
    }

    PaidStatus::PartiallyPaid
}

pub struct PaymentLedger {
    pool: PgPool,
    cache: Cache,
}

impl PaymentLedger {
    pub fn new(pool: PgPool, cache: Cache) -> Self {
        Self { pool, cache }
    }

    /// Record a payment intent in `pending`. The write is prechecked
    /// against the order's remaining balance with the overpayment
    /// tolerance applied.
    pub async fn record_payment(&self, request: RecordPaymentRequest) -> Result<Payment> {
        if request.amount <= Decimal::ZERO {
            return Err(Error::validation("payment amount must be positive"));
        }
        if request.method.is_cod() && request.delivery_id.is_none() {
            return Err(Error::validation(
                "cash-on-delivery payments require a delivery context",
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Lock the order row so concurrent payments cannot both pass the
        // remaining-balance check
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(request.order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {} not found", request.order_id)))?;

        let (completed, processing) = payment_sums(&mut tx, order.id).await?;
        let remaining = order.total - completed - processing;

        if request.amount > remaining * OVERPAYMENT_TOLERANCE {
            warn!(
                order_id = %order.id,
                amount = %request.amount,
                remaining = %remaining,
                "payment rejected, exceeds remaining balance tolerance"
            );
            return Err(Error::validation(format!(
                "payment of {} exceeds the remaining balance of {} plus tolerance",
                request.amount, remaining
            )));
        }

        let channel = if request.channel.is_empty() {
            format!("{:?}", request.method).to_lowercase()
        } else {
            request.channel.clone()
        };

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, order_id, customer_id, method, channel, timing,
                amount, currency, status, store_id, delivery_id,
                collected_by, collection_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(order.customer_id)
        .bind(request.method)
        .bind(&channel)
        .bind(request.method.timing())
        .bind(request.amount)
        .bind(request.currency)
        .bind(PaymentStatus::Pending)
        .bind(request.store_id)
        .bind(request.delivery_id)
        .bind(request.collected_by.as_ref())
        .bind(request.collection_address.as_ref())
        .fetch_one(&mut *tx)
        .await?;

        let record = OutboxRecord::new(
            payment.id,
            "payment",
            event_types::PAYMENT_CREATED,
            json!({
                "payment_id": payment.id,
                "order_id": order.id,
                "method": payment.method,
                "timing": payment.timing,
                "amount": payment.amount,
                "currency": payment.currency,
            }),
        );
        outbox::enqueue(&mut tx, &record).await?;

        tx.commit().await?;

        info!(payment_id = %payment.id, order_id = %order.id, amount = %payment.amount, "payment recorded");

        Ok(payment)
    }

    /// Move a payment along its lifecycle and reproject the order's paid
    /// status in the same transaction.
    pub async fn transition_status(
        &self,
        payment_id: Uuid,
        new_status: PaymentStatus,
    ) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE id = $1 FOR UPDATE",
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("payment {} not found", payment_id)))?;

        if !payment.status.can_transition_to(new_status) {
            return Err(Error::invalid_transition(payment.status, new_status));
        }

        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET
                status = $1,
                paid_at = CASE WHEN $2 THEN NOW() ELSE paid_at END,
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(new_status)
        .bind(new_status == PaymentStatus::Completed)
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;

        match new_status {
            PaymentStatus::Completed => {
                let record = OutboxRecord::new(
                    payment_id,
                    "payment",
                    event_types::PAYMENT_COMPLETED,
                    json!({
                        "payment_id": payment_id,
                        "order_id": payment.order_id,
                        "amount": updated.amount,
                        "method": updated.method,
                    }),
                );
                outbox::enqueue(&mut tx, &record).await?;
            }
            PaymentStatus::Refunded => {
                let record = OutboxRecord::new(
                    payment_id,
                    "payment",
                    event_types::PAYMENT_REFUNDED,
                    json!({
                        "payment_id": payment_id,
                        "order_id": payment.order_id,
                        "amount": updated.amount,
                    }),
                );
                outbox::enqueue(&mut tx, &record).await?;
            }
            _ => {}
        }

        self.reproject_order(&mut tx, payment.order_id).await?;

        tx.commit().await?;
        self.cache.invalidate(&cache::order_key(payment.order_id)).await;

        info!(
            payment_id = %payment_id,
            order_id = %payment.order_id,
            status = ?new_status,
            "payment transitioned"
        );

        Ok(updated)
    }

    /// Recompute the order's paid status from its payments. Idempotent;
    /// the status only moves when the projection output changes. Reaching
    /// `paid` emits `order.payment_completed` through the outbox.
    async fn reproject_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> Result<()> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {} not found", order_id)))?;

        let completed: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE order_id = $1 AND status = 'completed'",
        )
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await?;

        let refunded: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE order_id = $1 AND status = 'refunded'",
        )
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await?;

        let paid_status = derive_paid_status(order.total, completed, refunded);
        if paid_status == order.paid_status {
            return Ok(());
        }

        sqlx::query("UPDATE orders SET paid_status = $1, updated_at = NOW() WHERE id = $2")
            .bind(paid_status)
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        if paid_status == PaidStatus::Paid {
            let record = OutboxRecord::new(
                order_id,
                "order",
                event_types::ORDER_PAYMENT_COMPLETED,
                json!({
                    "order_id": order_id,
                    "code": order.code,
                    "total": order.total,
                    "paid": completed,
                }),
            );
            outbox::enqueue(tx, &record).await?;
        }

        info!(
            order_id = %order_id,
            from = ?order.paid_status,
            to = ?paid_status,
            "order paid status reprojected"
        );

        Ok(())
    }
}

/// Sums of completed and in-flight payment amounts for an order
async fn payment_sums(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<(Decimal, Decimal)> {
    let completed: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE order_id = $1 AND status = 'completed'",
    )
    .bind(order_id)
    .fetch_one(&mut **tx)
    .await?;

    let processing: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE order_id = $1 AND status = 'processing'",
    )
    .bind(order_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok((completed, processing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpaid_when_nothing_completed() {
        assert_eq!(
            derive_paid_status(dec!(1000), Decimal::ZERO, Decimal::ZERO),
            PaidStatus::Unpaid
        );
    }

    #[test]
    fn test_partially_paid() {
        assert_eq!(derive_paid_status(dec!(1000), dec!(400), Decimal::ZERO), PaidStatus::PartiallyPaid);
        assert_eq!(derive_paid_status(dec!(1000), dec!(999.98), Decimal::ZERO), PaidStatus::PartiallyPaid);
    }

    #[test]
    fn test_paid_with_tolerance() {
        assert_eq!(derive_paid_status(dec!(1000), dec!(1000), Decimal::ZERO), PaidStatus::Paid);
        assert_eq!(derive_paid_status(dec!(1000), dec!(999.99), Decimal::ZERO), PaidStatus::Paid);
        assert_eq!(derive_paid_status(dec!(1000), dec!(1000.01), Decimal::ZERO), PaidStatus::Paid);
    }

    #[test]
    fn test_overpaid() {
        assert_eq!(derive_paid_status(dec!(1000), dec!(1050), Decimal::ZERO), PaidStatus::Overpaid);
        assert_eq!(derive_paid_status(dec!(1000), dec!(1000.02), Decimal::ZERO), PaidStatus::Overpaid);
    }

    #[test]
    fn test_refunded_when_refunds_cover_completions() {
        assert_eq!(derive_paid_status(dec!(1000), Decimal::ZERO, dec!(1000)), PaidStatus::Refunded);
        assert_eq!(derive_paid_status(dec!(1000), dec!(500), dec!(500)), PaidStatus::Refunded);
        // Partial refund below the completed sum stays on the net path
        assert_eq!(derive_paid_status(dec!(1000), dec!(1000), dec!(400)), PaidStatus::PartiallyPaid);
    }

    #[test]
    fn test_projection_is_idempotent() {
        for _ in 0..3 {
            assert_eq!(derive_paid_status(dec!(500), dec!(500), Decimal::ZERO), PaidStatus::Paid);
        }
    }

    #[test]
    fn test_overpayment_precheck_boundary() {
        // Order total 1000, completed 950: remaining 50, tolerance 55
        let remaining = dec!(1000) - dec!(950);
        let limit = remaining * OVERPAYMENT_TOLERANCE;
        assert_eq!(limit, dec!(55.00));

        // 200 over the limit (the S5 scenario), 55.01 just over, 55 at it
        assert!(dec!(200) > limit);
        assert!(dec!(55.01) > limit);
        assert!(dec!(55) <= limit);
    }
}
