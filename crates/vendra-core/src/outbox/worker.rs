//! Outbox worker
//!
//! A single cooperative loop per worker: each tick retires exhausted
//! records, claims a batch, publishes sequentially and marks the outcome.
//! Shutdown interrupts between records; an in-flight publish is bounded by
//! the publish timeout. Per-order ordering holds because the claim scan is
//! ordered by created_at, the batch publish is sequential and the broker
//! key is the aggregate id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::OutboxConfig;
use crate::events::EventEnvelope;
use crate::outbox::{EventBroker, OutboxQueue};
use crate::Result;

/// Operational counters exposed for monitoring. A non-zero `cancelled`
/// count means events exceeded the retry budget and need operator
/// attention; they are never silently dropped.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    pub published: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

impl WorkerCounters {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub struct OutboxWorker {
    store: Arc<dyn OutboxQueue>,
    broker: Arc<dyn EventBroker>,
    config: OutboxConfig,
    counters: Arc<WorkerCounters>,
}

impl OutboxWorker {
    pub fn new(
        store: Arc<dyn OutboxQueue>,
        broker: Arc<dyn EventBroker>,
        config: OutboxConfig,
    ) -> Self {
        Self { store, broker, config, counters: Arc::new(WorkerCounters::default()) }
    }

    pub fn counters(&self) -> Arc<WorkerCounters> {
        self.counters.clone()
    }

    /// Run until the shutdown signal flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.config.poll_interval(),
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "outbox worker started"
        );

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(&shutdown).await {
                        error!("outbox tick failed: {}", e);
                    }
                }
            }
        }

        info!("outbox worker stopped");
    }

    /// One poll cycle. Public so deployments driving the worker from an
    /// external scheduler (and tests) can tick it directly.
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<()> {
        self.retire_exhausted().await?;

        let mut batch = self.store.claim_pending(self.config.batch_size).await?;
        batch.extend(
            self.store
                .claim_failed_for_retry(
                    self.config.max_retries,
                    self.config.retry_backoff(),
                    self.config.batch_size,
                )
                .await?,
        );

        for record in batch {
            if *shutdown.borrow() {
                // Claimed but unpublished rows return to failed so the
                // next worker picks them up
                self.store.mark_failed(record.event_id).await?;
                break;
            }

            let envelope = EventEnvelope::from_record(&record);
            let published =
                timeout(self.config.publish_timeout(), self.broker.publish(&envelope)).await;

            match published {
                Ok(Ok(())) => {
                    self.store.mark_sent(record.event_id).await?;
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    warn!(event_id = %record.event_id, "publish failed: {}", e);
                    self.store.mark_failed(record.event_id).await?;
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    warn!(event_id = %record.event_id, "publish timed out");
                    self.store.mark_failed(record.event_id).await?;
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        Ok(())
    }

    /// Move retry-exhausted records to cancelled. The underlying state
    /// change is never rolled back; the counter is the operational alert.
    async fn retire_exhausted(&self) -> Result<()> {
        let exhausted = self
            .store
            .list_exhausted(self.config.max_retries, self.config.batch_size)
            .await?;

        for record in exhausted {
            error!(
                event_id = %record.event_id,
                event_type = %record.event_type,
                retry_count = record.retry_count,
                "outbox event exhausted retries, cancelling"
            );
            self.store.mark_cancelled(record.event_id).await?;
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_types;
    use crate::models::{OutboxRecord, OutboxStatus};
    use crate::outbox::{InMemoryBroker, InMemoryOutbox};
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_config() -> OutboxConfig {
        OutboxConfig {
            poll_interval_secs: 1,
            batch_size: 10,
            max_retries: 3,
            retry_backoff_secs: 0,
            publish_timeout_secs: 5,
        }
    }

    fn worker_fixture() -> (Arc<InMemoryOutbox>, Arc<InMemoryBroker>, OutboxWorker) {
        let store = Arc::new(InMemoryOutbox::new());
        let broker = Arc::new(InMemoryBroker::new());
        let worker = OutboxWorker::new(store.clone(), broker.clone(), test_config());
        (store, broker, worker)
    }

    fn shutdown_rx() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the test duration
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_publishes_pending_in_order() {
        let (store, broker, worker) = worker_fixture();
        let order_id = Uuid::new_v4();

        let mut first = OutboxRecord::new(order_id, "order", event_types::ORDER_CREATED, json!({}));
        first.created_at = Utc::now() - chrono::Duration::seconds(5);
        let second = OutboxRecord::new(order_id, "order", event_types::ORDER_CONFIRMED, json!({}));
        store.push(second.clone());
        store.push(first.clone());

        worker.tick(&shutdown_rx()).await.unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].id, first.event_id);
        assert_eq!(published[1].id, second.event_id);
        assert!(store.snapshot().iter().all(|r| r.status == OutboxStatus::Sent));
        assert_eq!(worker.counters().published(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_cancels_record() {
        let (store, broker, worker) = worker_fixture();
        let record = OutboxRecord::new(Uuid::new_v4(), "order", event_types::ORDER_CREATED, json!({}));
        let event_id = record.event_id;
        store.push(record);

        // Three ticks, three failed publishes
        broker.fail_next(3);
        let shutdown = shutdown_rx();
        for _ in 0..3 {
            worker.tick(&shutdown).await.unwrap();
        }

        let after_failures = store.snapshot();
        assert_eq!(after_failures[0].status, OutboxStatus::Failed);
        assert_eq!(after_failures[0].retry_count, 3);
        assert_eq!(worker.counters().cancelled(), 0);

        // Fourth tick retires the record instead of retrying again
        worker.tick(&shutdown).await.unwrap();

        let after_retire = store.snapshot();
        assert_eq!(after_retire[0].status, OutboxStatus::Cancelled);
        assert_eq!(after_retire[0].retry_count, 3);
        assert_eq!(worker.counters().cancelled(), 1);
        assert_eq!(event_id, after_retire[0].event_id);
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_failure_then_recovery() {
        let (store, broker, worker) = worker_fixture();
        store.push(OutboxRecord::new(Uuid::new_v4(), "order", event_types::ORDER_CREATED, json!({})));

        broker.fail_next(1);
        let shutdown = shutdown_rx();
        worker.tick(&shutdown).await.unwrap();
        assert_eq!(store.snapshot()[0].status, OutboxStatus::Failed);
        assert_eq!(store.snapshot()[0].retry_count, 1);

        // Broker recovers; retry claim publishes the record
        worker.tick(&shutdown).await.unwrap();
        assert_eq!(store.snapshot()[0].status, OutboxStatus::Sent);
        assert_eq!(broker.published().len(), 1);
        assert_eq!(worker.counters().published(), 1);
        assert_eq!(worker.counters().failed(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_between_records() {
        let (store, broker, worker) = worker_fixture();
        for _ in 0..5 {
            store.push(OutboxRecord::new(
                Uuid::new_v4(),
                "order",
                event_types::ORDER_CREATED,
                json!({}),
            ));
        }

        let (tx, rx) = watch::channel(true);
        worker.tick(&rx).await.unwrap();
        drop(tx);

        // Shutdown was already signalled: nothing published, the one
        // claimed record returned to the failed pool for the next worker
        assert!(broker.published().is_empty());
        let snapshot = store.snapshot();
        assert!(snapshot.iter().all(|r| r.status != OutboxStatus::Sent));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_store, _broker, worker) = worker_fixture();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
