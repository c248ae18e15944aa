//! Message broker seam
//!
//! Producers publish envelopes keyed on the aggregate id so consumers see
//! per-aggregate ordering. Wiring a real client (Kafka, Redis streams) is
//! deployment plumbing; the worker only depends on this trait.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::events::EventEnvelope;
use crate::Result;

#[async_trait]
pub trait EventBroker: Send + Sync + 'static {
    /// Publish one envelope; resolves once the broker acknowledges
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Broker that only logs; the development default
pub struct LogBroker;

#[async_trait]
impl EventBroker for LogBroker {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        info!(
            topic = envelope.topic(),
            key = %envelope.key(),
            event_type = %envelope.event_type,
            event_id = %envelope.id,
            "published event"
        );
        Ok(())
    }
}

/// Capturing broker with failure injection, for tests
pub struct InMemoryBroker {
    published: Mutex<Vec<EventEnvelope>>,
    fail_remaining: AtomicUsize,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self { published: Mutex::new(Vec::new()), fail_remaining: AtomicUsize::new(0) }
    }

    /// Fail the next `n` publish calls with a network error
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBroker for InMemoryBroker {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(crate::Error::network("injected broker failure"));
        }

        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
