//! Transactional outbox: durable per-order event queue and the worker
//! that forwards it to the broker with at-least-once semantics.

pub mod broker;
pub mod store;
pub mod worker;

pub use broker::{EventBroker, InMemoryBroker, LogBroker};
pub use store::{enqueue, InMemoryOutbox, OutboxQueue, PgOutboxStore};
pub use worker::{OutboxWorker, WorkerCounters};
