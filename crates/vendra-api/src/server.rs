use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::routes::{coverage, deliveries, health, orders, payments};
use crate::state::AppState;

/// Assemble the full route tree over the shared state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Orders
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order).put(orders::update_order))
        .route("/orders/:id/status", put(orders::update_status))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/items", post(orders::add_item))
        .route("/orders/:id/items/:item_id", axum::routing::delete(orders::remove_item))
        // Order-scoped payment reads
        .route("/orders/:id/payment-summary", get(payments::order_payment_summary))
        .route("/orders/:id/payment-timeline", get(payments::order_payment_timeline))
        .route("/orders/:id/payments", get(payments::order_payments))
        // Payments
        .route("/payments", post(payments::record_payment))
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/status", put(payments::transition_payment))
        .route("/customers/:id/payments", get(payments::customer_payments))
        .route("/stores/:id/analytics", get(payments::store_analytics))
        // Deliveries
        .route("/deliveries", post(deliveries::create_delivery))
        // The bare segment is a tracking-number lookup; the nested routes
        // address the delivery by id
        .route("/deliveries/:id", get(deliveries::track))
        .route("/deliveries/:id/location", post(deliveries::update_location))
        .route("/deliveries/:id/history", get(deliveries::history))
        // Coverage administration
        .route("/coverage-areas", post(coverage::create_area).get(coverage::list_areas))
        // Health
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
