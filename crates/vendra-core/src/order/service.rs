//! Order Service
//!
//! Owns every order mutation. Each operation opens one transaction
//! covering the state change, the audit entry and the outbox record, with
//! an optimistic version check retried once on a lost update.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cache::{self, Cache};
use crate::events::event_types;
use crate::models::{
    AuditAction, CreateOrderItem, CreateOrderRequest, Order, OrderItem, OrderStatus, PaidStatus,
    UpdateOrderRequest,
};
use crate::order::calculation::{item_total, OrderTotals};
use crate::order::state::check_transition;
use crate::outbox;
use crate::{Error, Result};

const ORDER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Order detail with line items
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Filter for order listings
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub limit: i64,
}

pub struct OrderService {
    pool: PgPool,
    cache: Cache,
}

impl OrderService {
    pub fn new(pool: PgPool, cache: Cache) -> Self {
        Self { pool, cache }
    }

    /// Create a new order with its items, audit entry and outbox event in
    /// one transaction.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        user_id: Option<Uuid>,
    ) -> Result<OrderDetail> {
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        validate_items(&request.items)?;

        if request.discount < Decimal::ZERO
            || request.shipping_fee < Decimal::ZERO
            || request.tax < Decimal::ZERO
        {
            return Err(Error::validation("monetary fields must not be negative"));
        }

        let totals = OrderTotals::compute(
            &request.items,
            request.shipping_fee,
            request.tax,
            request.tax_enabled,
            request.discount,
        );

        let order_id = Uuid::new_v4();
        let code = generate_order_code();

        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                id, code, customer_id, status, paid_status, currency,
                subtotal, discount, shipping_fee, tax, tax_enabled, total,
                shipping_address_id, payment_method, notes, version
            )
            VALUES ($1, $2, $3, $4, $5, 'THB', $6, $7, $8, $9, $10, $11, $12, $13, $14, 1)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(&code)
        .bind(request.customer_id)
        .bind(OrderStatus::Pending)
        .bind(PaidStatus::Unpaid)
        .bind(totals.subtotal)
        .bind(totals.discount)
        .bind(totals.shipping_fee)
        .bind(totals.tax)
        .bind(request.tax_enabled)
        .bind(totals.total)
        .bind(request.shipping_address_id)
        .bind(request.payment_method.as_ref())
        .bind(request.notes.as_ref())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            items.push(insert_item(&mut tx, order_id, item).await?);
        }

        insert_audit(
            &mut tx,
            order_id,
            AuditAction::Create,
            json!({
                "code": code,
                "item_count": items.len(),
                "total": order.total,
            }),
            user_id,
        )
        .await?;

        let record = crate::models::OutboxRecord::new(
            order_id,
            "order",
            event_types::ORDER_CREATED,
            json!({
                "order_id": order_id,
                "code": code,
                "customer_id": request.customer_id,
                "status": order.status,
                "total": order.total,
                "currency": order.currency,
            }),
        );
        outbox::enqueue(&mut tx, &record).await?;

        tx.commit().await?;

        info!(order_id = %order_id, code = %code, total = %order.total, "order created");

        Ok(OrderDetail { order, items })
    }

    /// Advance an order along the lifecycle graph. Retries once internally
    /// on a lost update before surfacing the concurrency error.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        user_id: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<Order> {
        match self
            .try_update_status(order_id, new_status, user_id, reason.clone())
            .await
        {
            Err(Error::ConcurrentModification(_)) => {
                warn!(order_id = %order_id, "version conflict, retrying status update");
                self.try_update_status(order_id, new_status, user_id, reason)
                    .await
            }
            other => other,
        }
    }

    async fn try_update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        user_id: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_order(&mut tx, order_id).await?;

        if new_status == OrderStatus::Cancelled {
            if current.status == OrderStatus::Cancelled {
                return Err(Error::AlreadyCancelled(current.code));
            }
            if current.status == OrderStatus::Delivered {
                return Err(Error::CannotModify(
                    "delivered orders cannot be cancelled".to_string(),
                ));
            }
            if reason.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(Error::validation("cancellation requires a reason"));
            }
        }

        check_transition(current.status, new_status)?;

        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders SET
                status = $1,
                version = version + 1,
                updated_at = NOW(),
                confirmed_at = CASE WHEN $2 THEN NOW() ELSE confirmed_at END,
                cancelled_at = CASE WHEN $3 THEN NOW() ELSE cancelled_at END,
                cancelled_reason = CASE WHEN $3 THEN $4 ELSE cancelled_reason END
            WHERE id = $5 AND version = $6
            RETURNING *
            "#,
        )
        .bind(new_status)
        .bind(new_status == OrderStatus::Confirmed)
        .bind(new_status == OrderStatus::Cancelled)
        .bind(reason.as_ref())
        .bind(order_id)
        .bind(current.version)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::concurrent(format!("order {} changed underneath us", order_id)))?;

        let action = if new_status == OrderStatus::Cancelled {
            AuditAction::Cancel
        } else {
            AuditAction::StatusChange
        };

        let mut details = json!({
            "from": current.status,
            "to": new_status,
        });
        if let Some(ref reason) = reason {
            details["reason"] = json!(reason);
        }
        insert_audit(&mut tx, order_id, action, details, user_id).await?;

        let mut payload = json!({
            "order_id": order_id,
            "code": updated.code,
            "from": current.status,
            "to": new_status,
            "total": updated.total,
        });
        if let Some(ref reason) = reason {
            payload["reason"] = json!(reason);
        }
        let record = crate::models::OutboxRecord::new(
            order_id,
            "order",
            new_status.event_type(),
            payload,
        );
        outbox::enqueue(&mut tx, &record).await?;

        tx.commit().await?;
        self.cache.invalidate(&cache::order_key(order_id)).await;

        info!(
            order_id = %order_id,
            from = current.status.as_str(),
            to = new_status.as_str(),
            "order status updated"
        );

        Ok(updated)
    }

    /// Cancel an order, recording the reason
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: String,
        user_id: Option<Uuid>,
    ) -> Result<Order> {
        self.update_status(order_id, OrderStatus::Cancelled, user_id, Some(reason))
            .await
    }

    /// Update mutable order fields; permitted while pending or confirmed.
    /// Only actual deltas are written to the audit trail; a no-op update
    /// returns the order untouched.
    pub async fn update_order(
        &self,
        order_id: Uuid,
        request: UpdateOrderRequest,
        user_id: Option<Uuid>,
    ) -> Result<Order> {
        if request.is_empty() {
            return sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::not_found(format!("order {} not found", order_id)));
        }

        match self.try_update_order(order_id, &request, user_id).await {
            Err(Error::ConcurrentModification(_)) => {
                warn!(order_id = %order_id, "version conflict, retrying order update");
                self.try_update_order(order_id, &request, user_id).await
            }
            other => other,
        }
    }

    async fn try_update_order(
        &self,
        order_id: Uuid,
        request: &UpdateOrderRequest,
        user_id: Option<Uuid>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_order(&mut tx, order_id).await?;

        if !matches!(current.status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Err(Error::CannotModify(format!(
                "order {} is {}",
                current.code,
                current.status.as_str()
            )));
        }

        let discount = request.discount.unwrap_or(current.discount);
        let shipping_fee = request.shipping_fee.unwrap_or(current.shipping_fee);
        let tax = request.tax.unwrap_or(current.tax);
        let tax_enabled = request.tax_enabled.unwrap_or(current.tax_enabled);
        let shipping_address_id =
            request.shipping_address_id.or(current.shipping_address_id);
        let payment_method =
            request.payment_method.clone().or_else(|| current.payment_method.clone());
        let notes = request.notes.clone().or_else(|| current.notes.clone());

        if discount < Decimal::ZERO || shipping_fee < Decimal::ZERO || tax < Decimal::ZERO {
            return Err(Error::validation("monetary fields must not be negative"));
        }

        let mut deltas = serde_json::Map::new();
        record_delta(&mut deltas, "discount", &current.discount, &discount);
        record_delta(&mut deltas, "shipping_fee", &current.shipping_fee, &shipping_fee);
        record_delta(&mut deltas, "tax", &current.tax, &tax);
        record_delta(&mut deltas, "tax_enabled", &current.tax_enabled, &tax_enabled);
        record_delta(
            &mut deltas,
            "shipping_address_id",
            &current.shipping_address_id,
            &shipping_address_id,
        );
        record_delta(&mut deltas, "payment_method", &current.payment_method, &payment_method);
        record_delta(&mut deltas, "notes", &current.notes, &notes);

        if deltas.is_empty() {
            return Ok(current);
        }

        let total = OrderTotals::recompute_total(
            current.subtotal,
            shipping_fee,
            tax,
            tax_enabled,
            discount,
        );

        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders SET
                discount = $1, shipping_fee = $2, tax = $3, tax_enabled = $4,
                shipping_address_id = $5, payment_method = $6, notes = $7,
                total = $8, version = version + 1, updated_at = NOW()
            WHERE id = $9 AND version = $10
            RETURNING *
            "#,
        )
        .bind(discount)
        .bind(shipping_fee)
        .bind(tax)
        .bind(tax_enabled)
        .bind(shipping_address_id)
        .bind(payment_method.as_ref())
        .bind(notes.as_ref())
        .bind(total)
        .bind(order_id)
        .bind(current.version)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::concurrent(format!("order {} changed underneath us", order_id)))?;

        insert_audit(
            &mut tx,
            order_id,
            AuditAction::Update,
            serde_json::Value::Object(deltas.clone()),
            user_id,
        )
        .await?;

        let record = crate::models::OutboxRecord::new(
            order_id,
            "order",
            event_types::ORDER_UPDATED,
            json!({
                "order_id": order_id,
                "code": updated.code,
                "changes": deltas,
                "total": updated.total,
            }),
        );
        outbox::enqueue(&mut tx, &record).await?;

        tx.commit().await?;
        self.cache.invalidate(&cache::order_key(order_id)).await;

        Ok(updated)
    }

    /// Add a line item; permitted while the order is pending
    pub async fn add_item(
        &self,
        order_id: Uuid,
        item: CreateOrderItem,
        user_id: Option<Uuid>,
    ) -> Result<OrderDetail> {
        item.validate().map_err(|e| Error::Validation(e.to_string()))?;
        validate_items(std::slice::from_ref(&item))?;

        let mut tx = self.pool.begin().await?;

        let current = fetch_order(&mut tx, order_id).await?;
        if current.status != OrderStatus::Pending {
            return Err(Error::CannotModify(format!(
                "items can only change while pending, order {} is {}",
                current.code,
                current.status.as_str()
            )));
        }

        let inserted = insert_item(&mut tx, order_id, &item).await?;

        let subtotal = current.subtotal + inserted.total_price;
        let order = self
            .apply_item_change(
                &mut tx,
                &current,
                subtotal,
                json!({
                    "added": {
                        "item_id": inserted.id,
                        "product_id": inserted.product_id,
                        "quantity": inserted.quantity,
                        "total_price": inserted.total_price,
                    }
                }),
                user_id,
            )
            .await?;

        let items = fetch_items(&mut tx, order_id).await?;
        tx.commit().await?;
        self.cache.invalidate(&cache::order_key(order_id)).await;

        Ok(OrderDetail { order, items })
    }

    /// Remove a line item; permitted while the order is pending. The last
    /// item cannot be removed, an order always has at least one.
    pub async fn remove_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_order(&mut tx, order_id).await?;
        if current.status != OrderStatus::Pending {
            return Err(Error::CannotModify(format!(
                "items can only change while pending, order {} is {}",
                current.code,
                current.status.as_str()
            )));
        }

        let item_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;
        if item_count <= 1 {
            return Err(Error::validation("an order must keep at least one item"));
        }

        let removed = sqlx::query_as::<_, OrderItem>(
            "DELETE FROM order_items WHERE id = $1 AND order_id = $2 RETURNING *",
        )
        .bind(item_id)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("order item {} not found", item_id)))?;

        let subtotal = current.subtotal - removed.total_price;
        let order = self
            .apply_item_change(
                &mut tx,
                &current,
                subtotal,
                json!({
                    "removed": {
                        "item_id": removed.id,
                        "product_id": removed.product_id,
                        "quantity": removed.quantity,
                        "total_price": removed.total_price,
                    }
                }),
                user_id,
            )
            .await?;

        let items = fetch_items(&mut tx, order_id).await?;
        tx.commit().await?;
        self.cache.invalidate(&cache::order_key(order_id)).await;

        Ok(OrderDetail { order, items })
    }

    async fn apply_item_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        current: &Order,
        subtotal: Decimal,
        details: serde_json::Value,
        user_id: Option<Uuid>,
    ) -> Result<Order> {
        let total = OrderTotals::recompute_total(
            subtotal,
            current.shipping_fee,
            current.tax,
            current.tax_enabled,
            current.discount,
        );

        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders SET subtotal = $1, total = $2, version = version + 1, updated_at = NOW()
            WHERE id = $3 AND version = $4
            RETURNING *
            "#,
        )
        .bind(subtotal)
        .bind(total)
        .bind(current.id)
        .bind(current.version)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::concurrent(format!("order {} changed underneath us", current.id)))?;

        insert_audit(tx, current.id, AuditAction::ItemChange, details.clone(), user_id).await?;

        let record = crate::models::OutboxRecord::new(
            current.id,
            "order",
            event_types::ORDER_UPDATED,
            json!({
                "order_id": current.id,
                "code": updated.code,
                "changes": details,
                "total": updated.total,
            }),
        );
        outbox::enqueue(tx, &record).await?;

        Ok(updated)
    }

    /// Fetch an order with its items, read through the cache
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderDetail>> {
        let key = cache::order_key(order_id);
        if let Some(detail) = self.cache.get::<OrderDetail>(&key).await {
            return Ok(Some(detail));
        }

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let detail = OrderDetail { order, items };
        self.cache.put(&key, &detail).await;

        Ok(Some(detail))
    }

    /// List orders, newest first
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let limit = if filter.limit > 0 { filter.limit } else { 50 };

        let mut sql = String::from("SELECT * FROM orders WHERE 1=1");
        let mut bind_idx = 0;

        if filter.customer_id.is_some() {
            bind_idx += 1;
            sql.push_str(&format!(" AND customer_id = ${}", bind_idx));
        }
        if filter.status.is_some() {
            bind_idx += 1;
            sql.push_str(&format!(" AND status = ${}", bind_idx));
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${}", bind_idx + 1));

        let mut query = sqlx::query_as::<_, Order>(&sql);
        if let Some(customer_id) = filter.customer_id {
            query = query.bind(customer_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        query = query.bind(limit);

        let orders = query.fetch_all(&self.pool).await?;
        Ok(orders)
    }
}

async fn fetch_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> Result<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("order {} not found", order_id)))
}

async fn fetch_items(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(items)
}

async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    item: &CreateOrderItem,
) -> Result<OrderItem> {
    let total_price = item_total(item.unit_price, item.quantity);

    let inserted = sqlx::query_as::<_, OrderItem>(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id, quantity, unit_price, total_price,
            price_overridden, override_reason
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(total_price)
    .bind(item.price_overridden)
    .bind(item.override_reason.as_ref())
    .fetch_one(&mut **tx)
    .await?;

    Ok(inserted)
}

async fn insert_audit(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    action: AuditAction,
    details: serde_json::Value,
    user_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_audit (id, order_id, action, details, user_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(action)
    .bind(details)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn validate_items(items: &[CreateOrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(Error::validation("order requires at least one item"));
    }
    for item in items {
        if item.quantity <= 0 {
            return Err(Error::validation("item quantity must be positive"));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(Error::validation("item unit price must not be negative"));
        }
        if item.price_overridden && item.override_reason.is_none() {
            return Err(Error::validation("price override requires a reason"));
        }
    }
    Ok(())
}

fn record_delta<T: PartialEq + serde::Serialize>(
    deltas: &mut serde_json::Map<String, serde_json::Value>,
    field: &str,
    old: &T,
    new: &T,
) {
    if old != new {
        deltas.insert(field.to_string(), json!({ "from": old, "to": new }));
    }
}

/// Human-visible order code, e.g. ORD-20260315-7K2Q4N
fn generate_order_code() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ORDER_CODE_ALPHABET[rng.gen_range(0..ORDER_CODE_ALPHABET.len())] as char)
        .collect();

    format!("ORD-{}-{}", date, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i32, unit_price: Decimal) -> CreateOrderItem {
        CreateOrderItem {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            price_overridden: false,
            override_reason: None,
        }
    }

    #[test]
    fn test_validate_items_rejects_empty() {
        let err = validate_items(&[]).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_validate_items_rejects_bad_values() {
        assert!(validate_items(&[item(0, dec!(10))]).is_err());
        assert!(validate_items(&[item(-1, dec!(10))]).is_err());
        assert!(validate_items(&[item(1, dec!(-0.01))]).is_err());
        assert!(validate_items(&[item(2, dec!(10.99))]).is_ok());
        assert!(validate_items(&[item(1, Decimal::ZERO)]).is_ok());
    }

    #[test]
    fn test_override_requires_reason() {
        let mut overridden = item(1, dec!(5));
        overridden.price_overridden = true;
        assert!(validate_items(std::slice::from_ref(&overridden)).is_err());

        overridden.override_reason = Some("wholesale customer".to_string());
        assert!(validate_items(std::slice::from_ref(&overridden)).is_ok());
    }

    #[test]
    fn test_order_code_shape() {
        let code = generate_order_code();
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].bytes().all(|b| ORDER_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_record_delta_skips_equal_values() {
        let mut deltas = serde_json::Map::new();
        record_delta(&mut deltas, "discount", &dec!(5), &dec!(5));
        assert!(deltas.is_empty());

        record_delta(&mut deltas, "discount", &dec!(5), &dec!(10));
        assert_eq!(deltas["discount"]["from"], json!("5"));
        assert_eq!(deltas["discount"]["to"], json!("10"));
    }
}
