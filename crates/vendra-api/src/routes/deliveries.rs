use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use vendra_core::models::{DeliveryOrder, DeliverySnapshot};
use vendra_core::shipping::DispatchRequest;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub distance_km: Decimal,
    #[serde(default)]
    pub weight_kg: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub lat: Decimal,
    pub lng: Decimal,
    pub driver: String,
}

/// Operator-facing dispatch; the order-confirmed consumer calls the same
/// dispatcher internally.
pub async fn create_delivery(
    State(state): State<AppState>,
    Json(request): Json<CreateDeliveryRequest>,
) -> ApiResult<(StatusCode, Json<DeliveryOrder>)> {
    let delivery = state
        .dispatcher
        .dispatch_order(DispatchRequest {
            order_id: request.order_id,
            distance_km: request.distance_km,
            weight_kg: request.weight_kg,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(delivery)))
}

/// Public tracking lookup by tracking number
pub async fn track(
    State(state): State<AppState>,
    Path(tracking_number): Path<String>,
) -> ApiResult<Json<DeliveryOrder>> {
    let delivery = state
        .tracker
        .find_by_tracking(&tracking_number)
        .await?
        .ok_or_else(|| {
            vendra_core::Error::not_found(format!("delivery {} not found", tracking_number))
        })?;

    Ok(Json(delivery))
}

/// Driver location ping
pub async fn update_location(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
    Json(update): Json<LocationUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    let snapshot = state
        .tracker
        .record_location(delivery_id, update.lat, update.lng, update.driver)
        .await?;

    Ok(Json(serde_json::json!({
        "recorded": snapshot.is_some(),
        "snapshot_id": snapshot.map(|s| s.id),
    })))
}

/// Full snapshot timeline for a delivery
pub async fn history(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeliverySnapshot>>> {
    state
        .tracker
        .get_delivery(delivery_id)
        .await?
        .ok_or_else(|| {
            vendra_core::Error::not_found(format!("delivery {} not found", delivery_id))
        })?;

    let timeline = state.tracker.timeline(delivery_id).await?;
    Ok(Json(timeline))
}
