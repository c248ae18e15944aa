//! Delivery dispatcher
//!
//! Turns a confirmed order into a tracked delivery: resolves coverage,
//! prices the leg, then either assigns a fleet vehicle (capacity counted
//! inside the insert transaction) or books a third-party provider.
//! Provider calls happen before the transaction opens so no lock is held
//! across the network.

use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::map_unique_violation;
use crate::events::event_types;
use crate::models::{
    Address, CoverageArea, CoverageQuery, DeliveryMethod, DeliveryOrder, DeliveryProvider,
    DeliveryStatus, Order, OutboxRecord, SnapshotType, Vehicle,
};
use crate::outbox;
use crate::shipping::coverage::CoverageResolver;
use crate::shipping::fees::FeeCalculator;
use crate::shipping::providers::{
    create_shipment_with_retry, ProviderClient, ProviderShipmentRequest,
};
use crate::{Error, Result};

/// RFC 4648 base32, used for tracking number suffixes
const TRACKING_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Dispatch input; distance is the straight-line estimate to the
/// destination and weight drives provider eligibility.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub order_id: Uuid,
    pub distance_km: Decimal,
    pub weight_kg: Decimal,
}

/// Outcome of provider/vehicle selection carried into persistence
struct DispatchPlan {
    method: DeliveryMethod,
    vehicle: Option<Vehicle>,
    provider: Option<DeliveryProvider>,
    provider_order_id: Option<String>,
    tracking_number: Option<String>,
    route: Option<String>,
    planned_delivery_date: chrono::DateTime<Utc>,
    delivery_fee: Decimal,
    requires_manual_coordination: bool,
    coverage_area_id: Option<Uuid>,
}

pub struct DeliveryDispatcher {
    pool: PgPool,
    resolver: CoverageResolver,
    provider_client: Arc<dyn ProviderClient>,
    config: DispatchConfig,
}

impl DeliveryDispatcher {
    pub fn new(
        pool: PgPool,
        resolver: CoverageResolver,
        provider_client: Arc<dyn ProviderClient>,
        config: DispatchConfig,
    ) -> Self {
        Self { pool, resolver, provider_client, config }
    }

    /// Create the delivery for an order. Invoked by the order-confirmed
    /// consumer, or directly by an operator.
    pub async fn dispatch_order(&self, request: DispatchRequest) -> Result<DeliveryOrder> {
        let order = self.fetch_order(request.order_id).await?;

        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM deliveries WHERE order_id = $1")
                .bind(order.id)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(Error::conflict(format!("order {} already has a delivery", order.code)));
        }

        let address = self.fetch_address(&order).await?;
        let query = CoverageQuery {
            province: address.province.clone(),
            district: address.district.clone(),
            subdistrict: address.subdistrict.clone(),
            postal_code: address.postal_code.clone(),
        };

        let coverage = match self.resolver.resolve(&query).await {
            Ok(area) => Some(area),
            Err(Error::LocationNotCovered(province)) if self.config.soft_coverage_miss => {
                warn!(
                    order_id = %order.id,
                    province = %province,
                    "destination not covered, falling back to manual coordination"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let plan = match coverage {
            Some(area) if area.is_self_delivery_area => {
                self.plan_self_delivery(&order, &area, &request).await?
            }
            Some(area) => self.plan_third_party(&order, &address, &area, &request).await?,
            None => DispatchPlan {
                method: DeliveryMethod::ThirdParty,
                vehicle: None,
                provider: None,
                provider_order_id: None,
                tracking_number: None,
                route: None,
                planned_delivery_date: Utc::now() + Duration::hours(72),
                delivery_fee: Decimal::ZERO,
                requires_manual_coordination: true,
                coverage_area_id: None,
            },
        };

        self.persist(&order, plan).await
    }

    /// Self-delivery: fee from the area, tracking number minted here. The
    /// vehicle is picked later, inside the insert transaction, so the
    /// capacity check and the insert cannot race.
    async fn plan_self_delivery(
        &self,
        order: &Order,
        area: &CoverageArea,
        request: &DispatchRequest,
    ) -> Result<DispatchPlan> {
        let fee = FeeCalculator::calculate(area, request.distance_km, order.total);
        let zone = area.delivery_zone.as_deref().unwrap_or(&self.config.default_zone);

        Ok(DispatchPlan {
            method: DeliveryMethod::SelfDelivery,
            vehicle: None,
            provider: None,
            provider_order_id: None,
            tracking_number: Some(generate_tracking_number(zone)),
            route: area.delivery_route.clone(),
            planned_delivery_date: Utc::now() + Duration::hours(area.standard_hours as i64),
            delivery_fee: fee,
            requires_manual_coordination: false,
            coverage_area_id: Some(area.id),
        })
    }

    /// Third-party: pick the highest-priority provider covering the
    /// province and weight, then call its API (outside any transaction).
    /// Terminal API failure or a provider without one flips the delivery
    /// to manual coordination.
    async fn plan_third_party(
        &self,
        order: &Order,
        address: &Address,
        area: &CoverageArea,
        request: &DispatchRequest,
    ) -> Result<DispatchPlan> {
        let fee = FeeCalculator::calculate(area, request.distance_km, order.total);
        let planned = Utc::now() + Duration::hours(area.standard_hours as i64);

        let provider = sqlx::query_as::<_, DeliveryProvider>(
            r#"
            SELECT * FROM delivery_providers
            WHERE is_active
              AND $1 = ANY(supported_provinces)
              AND max_weight_kg >= $2
            ORDER BY priority ASC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(&address.province)
        .bind(request.weight_kg)
        .fetch_optional(&self.pool)
        .await?;

        let Some(provider) = provider else {
            warn!(order_id = %order.id, "no eligible provider, manual coordination");
            return Ok(DispatchPlan {
                method: DeliveryMethod::ThirdParty,
                vehicle: None,
                provider: None,
                provider_order_id: None,
                tracking_number: None,
                route: None,
                planned_delivery_date: planned,
                delivery_fee: fee,
                requires_manual_coordination: true,
                coverage_area_id: Some(area.id),
            });
        };

        let mut provider_order_id = None;
        let mut tracking_number = None;
        let mut manual = !provider.has_api;

        if provider.has_api {
            let shipment = ProviderShipmentRequest {
                order_id: order.id,
                order_code: order.code.clone(),
                destination_province: address.province.clone(),
                destination_postal_code: address.postal_code.clone(),
                weight_kg: request.weight_kg,
                cod_amount: cod_amount(order),
            };

            match create_shipment_with_retry(self.provider_client.as_ref(), &provider, &shipment)
                .await
            {
                Ok(response) => {
                    provider_order_id = Some(response.provider_order_id);
                    tracking_number = response.tracking_number;
                }
                Err(e) => {
                    warn!(
                        order_id = %order.id,
                        provider = %provider.name,
                        "provider booking failed, manual coordination: {}",
                        e
                    );
                    manual = true;
                }
            }
        }

        Ok(DispatchPlan {
            method: DeliveryMethod::ThirdParty,
            vehicle: None,
            provider: Some(provider),
            provider_order_id,
            tracking_number,
            route: None,
            planned_delivery_date: planned,
            delivery_fee: fee,
            requires_manual_coordination: manual,
            coverage_area_id: Some(area.id),
        })
    }

    /// Persist the delivery with its initial snapshot and outbox event in
    /// one transaction; self-delivery vehicle assignment happens here too.
    async fn persist(&self, order: &Order, mut plan: DispatchPlan) -> Result<DeliveryOrder> {
        let mut tx = self.pool.begin().await?;

        if plan.method == DeliveryMethod::SelfDelivery {
            match self
                .select_vehicle(&mut tx, plan.route.as_deref(), plan.planned_delivery_date)
                .await?
            {
                Some(vehicle) => plan.vehicle = Some(vehicle),
                None => {
                    warn!(order_id = %order.id, "fleet at capacity, manual coordination");
                    plan.requires_manual_coordination = true;
                }
            }
        }

        let delivery_id = Uuid::new_v4();
        let delivery = sqlx::query_as::<_, DeliveryOrder>(
            r#"
            INSERT INTO deliveries (
                id, order_id, customer_id, method, status,
                delivery_fee, cod_amount, tracking_number, vehicle_id,
                provider_id, route, planned_delivery_date,
                requires_manual_coordination
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(delivery_id)
        .bind(order.id)
        .bind(order.customer_id)
        .bind(plan.method)
        .bind(DeliveryStatus::Pending)
        .bind(plan.delivery_fee)
        .bind(cod_amount(order))
        .bind(plan.tracking_number.as_ref())
        .bind(plan.vehicle.as_ref().map(|v| v.id))
        .bind(plan.provider.as_ref().map(|p| p.id))
        .bind(plan.route.as_ref())
        .bind(plan.planned_delivery_date)
        .bind(plan.requires_manual_coordination)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "tracking number already exists"))?;

        let snapshot_data = json!({
            "delivery_fee": plan.delivery_fee,
            "coverage_area_id": plan.coverage_area_id,
            "vehicle_id": plan.vehicle.as_ref().map(|v| v.id),
            "provider_id": plan.provider.as_ref().map(|p| p.id),
            "provider_order_id": plan.provider_order_id,
            "requires_manual_coordination": plan.requires_manual_coordination,
        });

        sqlx::query(
            r#"
            INSERT INTO delivery_snapshots (
                id, delivery_id, snapshot_type, snapshot_data,
                triggered_by, triggered_event, previous_snapshot_id, created_at
            )
            VALUES ($1, $2, $3, $4, 'dispatcher', 'order.confirmed', NULL, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(delivery_id)
        .bind(SnapshotType::Created)
        .bind(&snapshot_data)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let record = OutboxRecord::new(
            delivery_id,
            "delivery",
            event_types::DELIVERY_CREATED,
            json!({
                "delivery_id": delivery_id,
                "order_id": order.id,
                "order_code": order.code,
                "method": plan.method,
                "tracking_number": plan.tracking_number,
                "delivery_fee": plan.delivery_fee,
                "requires_manual_coordination": plan.requires_manual_coordination,
            }),
        );
        outbox::enqueue(&mut tx, &record).await?;

        tx.commit().await?;

        info!(
            delivery_id = %delivery_id,
            order_id = %order.id,
            method = ?delivery.method,
            manual = delivery.requires_manual_coordination,
            "delivery created"
        );

        Ok(delivery)
    }

    /// Pick an active vehicle on the route with same-day capacity left.
    /// Candidate rows are locked so the load count stays valid until the
    /// delivery insert commits. Least-loaded wins, oldest vehicle breaks
    /// ties.
    async fn select_vehicle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        route: Option<&str>,
        planned_date: chrono::DateTime<Utc>,
    ) -> Result<Option<Vehicle>> {
        let Some(route) = route else {
            return Ok(None);
        };

        let candidates = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT * FROM vehicles
            WHERE status = 'active' AND route = $1
            ORDER BY created_at ASC
            FOR UPDATE
            "#,
        )
        .bind(route)
        .fetch_all(&mut **tx)
        .await?;

        let mut best: Option<(Vehicle, i64)> = None;
        for vehicle in candidates {
            let load: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM deliveries
                WHERE vehicle_id = $1
                  AND planned_delivery_date::date = $2::date
                  AND status NOT IN ('cancelled', 'failed')
                "#,
            )
            .bind(vehicle.id)
            .bind(planned_date)
            .fetch_one(&mut **tx)
            .await?;

            if load >= vehicle.max_daily_capacity as i64 {
                continue;
            }

            match best {
                Some((_, best_load)) if best_load <= load => {}
                _ => best = Some((vehicle, load)),
            }
        }

        Ok(best.map(|(vehicle, _)| vehicle))
    }

    async fn fetch_order(&self, order_id: Uuid) -> Result<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {} not found", order_id)))
    }

    async fn fetch_address(&self, order: &Order) -> Result<Address> {
        let address_id = order
            .shipping_address_id
            .ok_or_else(|| Error::validation(format!("order {} has no shipping address", order.code)))?;

        sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = $1")
            .bind(address_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("address {} not found", address_id)))
    }
}

/// COD orders collect the full total at the doorstep
fn cod_amount(order: &Order) -> Decimal {
    let is_cod = order
        .payment_method
        .as_deref()
        .map(|m| m.starts_with("cod"))
        .unwrap_or(false);

    if is_cod {
        order.total
    } else {
        Decimal::ZERO
    }
}

/// `<zone>-<yymmdd>-<6-char-base32>`
fn generate_tracking_number(zone: &str) -> String {
    let date = Utc::now().format("%y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| TRACKING_ALPHABET[rng.gen_range(0..TRACKING_ALPHABET.len())] as char)
        .collect();

    format!("{}-{}-{}", zone, date, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, PaidStatus};
    use rust_decimal_macros::dec;

    fn order(payment_method: Option<&str>, total: Decimal) -> Order {
        Order {
            id: Uuid::new_v4(),
            code: "ORD-20260301-A7Q2MX".to_string(),
            customer_id: Uuid::new_v4(),
            status: OrderStatus::Confirmed,
            paid_status: PaidStatus::Unpaid,
            currency: crate::models::Currency::Thb,
            subtotal: total,
            discount: Decimal::ZERO,
            shipping_fee: Decimal::ZERO,
            tax: Decimal::ZERO,
            tax_enabled: false,
            total,
            shipping_address_id: Some(Uuid::new_v4()),
            payment_method: payment_method.map(String::from),
            notes: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            confirmed_at: Some(Utc::now()),
            cancelled_at: None,
            cancelled_reason: None,
        }
    }

    #[test]
    fn test_tracking_number_shape() {
        let tracking = generate_tracking_number("BKK-Z1");
        let parts: Vec<&str> = tracking.rsplitn(3, '-').collect();
        // rsplitn yields suffix, date, zone (zone may itself contain dashes)
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 6);
        assert!(parts[0].bytes().all(|b| TRACKING_ALPHABET.contains(&b)));
        assert_eq!(parts[1].len(), 6);
        assert!(parts[1].bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(parts[2], "BKK-Z1");
    }

    #[test]
    fn test_tracking_numbers_differ() {
        let a = generate_tracking_number("GEN");
        let b = generate_tracking_number("GEN");
        // Six base32 chars of entropy; collision here means the RNG broke
        assert_ne!(a, b);
    }

    #[test]
    fn test_cod_amount_follows_payment_method() {
        assert_eq!(cod_amount(&order(Some("cod_cash"), dec!(750))), dec!(750));
        assert_eq!(cod_amount(&order(Some("cod_transfer"), dec!(750))), dec!(750));
        assert_eq!(cod_amount(&order(Some("bank_transfer"), dec!(750))), Decimal::ZERO);
        assert_eq!(cod_amount(&order(None, dec!(750))), Decimal::ZERO);
    }
}
