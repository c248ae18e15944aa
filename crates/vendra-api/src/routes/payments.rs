use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use vendra_core::models::{Payment, PaymentStatus, RecordPaymentRequest};
use vendra_core::payment::{
    CustomerPaymentEntry, OrderPaymentSummary, PaymentTimelineEvent, StoreAnalytics,
};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

pub async fn record_payment(
    State(state): State<AppState>,
    Json(request): Json<RecordPaymentRequest>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    let payment = state.ledger.record_payment(request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<Payment>> {
    let payment = state
        .reconciliation
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| vendra_core::Error::not_found(format!("payment {} not found", payment_id)))?;

    Ok(Json(payment))
}

pub async fn transition_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<Json<Payment>> {
    let payment = state
        .ledger
        .transition_status(payment_id, request.status)
        .await?;

    Ok(Json(payment))
}

pub async fn order_payment_summary(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderPaymentSummary>> {
    let summary = state.reconciliation.order_summary(order_id).await?;
    Ok(Json(summary))
}

pub async fn order_payment_timeline(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PaymentTimelineEvent>>> {
    let timeline = state.reconciliation.timeline(order_id).await?;
    Ok(Json(timeline))
}

pub async fn order_payments(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Payment>>> {
    let payments = state.reconciliation.order_payments(order_id).await?;
    Ok(Json(payments))
}

pub async fn customer_payments(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<CustomerPaymentEntry>>> {
    let history = state
        .reconciliation
        .customer_history(customer_id, query.limit)
        .await?;

    Ok(Json(history))
}

pub async fn store_analytics(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<StoreAnalytics>> {
    let analytics = state
        .reconciliation
        .store_analytics(store_id, query.date_from, query.date_to)
        .await?;

    Ok(Json(analytics))
}
