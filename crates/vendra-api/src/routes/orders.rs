use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use vendra_core::models::{
    CreateOrderItem, CreateOrderRequest, Order, OrderStatus, UpdateOrderRequest,
};
use vendra_core::order::{OrderDetail, OrderFilter};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    pub user_id: Option<Uuid>,
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    let detail = state.orders.create_order(request, None).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| vendra_core::Error::not_found(format!("order {} not found", order_id)))?;

    Ok(Json(detail))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let orders = state
        .orders
        .list_orders(OrderFilter {
            customer_id: query.customer_id,
            status: query.status,
            limit: query.limit,
        })
        .await?;

    Ok(Json(orders))
}

pub async fn update_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> ApiResult<Json<Order>> {
    let order = state.orders.update_order(order_id, request, None).await?;
    Ok(Json(order))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Order>> {
    let order = state
        .orders
        .update_status(order_id, request.status, request.user_id, request.reason)
        .await?;

    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<Order>> {
    let order = state
        .orders
        .cancel(order_id, request.reason, request.user_id)
        .await?;

    Ok(Json(order))
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(item): Json<CreateOrderItem>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    let detail = state.orders.add_item(order_id, item, None).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state.orders.remove_item(order_id, item_id, None).await?;
    Ok(Json(detail))
}
