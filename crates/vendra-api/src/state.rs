use sqlx::PgPool;
use std::sync::Arc;

use vendra_core::payment::{PaymentLedger, PaymentReconciliation};
use vendra_core::shipping::{CoverageResolver, DeliveryDispatcher, DeliveryTracker};
use vendra_core::{Cache, Config, HttpProviderClient, OrderService};

/// Shared application state for all routes
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orders: Arc<OrderService>,
    pub ledger: Arc<PaymentLedger>,
    pub reconciliation: Arc<PaymentReconciliation>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub tracker: Arc<DeliveryTracker>,
    pub coverage: Arc<CoverageResolver>,
}

impl AppState {
    /// Wire the services over one pool and cache
    pub fn new(pool: PgPool, cache: Cache, config: &Config) -> Self {
        let provider_client = Arc::new(HttpProviderClient::new());

        Self {
            orders: Arc::new(OrderService::new(pool.clone(), cache.clone())),
            ledger: Arc::new(PaymentLedger::new(pool.clone(), cache.clone())),
            reconciliation: Arc::new(PaymentReconciliation::new(pool.clone())),
            dispatcher: Arc::new(DeliveryDispatcher::new(
                pool.clone(),
                CoverageResolver::new(pool.clone(), cache.clone()),
                provider_client,
                config.dispatch.clone(),
            )),
            tracker: Arc::new(DeliveryTracker::new(pool.clone())),
            coverage: Arc::new(CoverageResolver::new(pool.clone(), cache)),
            pool,
        }
    }
}
