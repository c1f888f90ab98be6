use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::types::{Delivery, JobMessage};

/// Queueing port for the worker pipeline (§4.6). Implementations must
/// preserve per-queue FIFO publish order and support at-least-once delivery
/// via `ack` / `nack_requeue`.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares `preprocess_queue`, `graph_queue`, `delete_queue` and each
    /// one's `*_retry`/`*_dlq` companion. Every worker mode calls this on
    /// boot, since the publisher side always needs the full topology.
    async fn declare_topology(&self) -> Result<()>;

    /// Publishes a job onto `queue` with no `x-retries` header (i.e. 0).
    async fn publish(&self, queue: &str, job: &JobMessage) -> Result<()>;

    /// Opens a single consumer on `queue`, capped at `prefetch` unacked
    /// deliveries. Callers drain it strictly one at a time.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<BoxStream<'static, Result<Delivery>>>;

    /// Settles a successfully processed delivery.
    async fn ack(&self, delivery: Delivery) -> Result<()>;

    /// Settles a delivery that failed due to cancellation: `Nack(requeue=true)`
    /// so the same message is redelivered without touching `x-retries`.
    async fn nack_requeue(&self, delivery: Delivery) -> Result<()>;

    /// Settles a delivery that failed processing: republishes to the queue's
    /// `*_retry` companion with `x-retries` incremented, then acks the
    /// original so it isn't redelivered twice.
    async fn retry(&self, delivery: Delivery) -> Result<()>;

    /// Settles a delivery that has exhausted its retry budget: republishes to
    /// the queue's `*_dlq` companion verbatim, then acks the original.
    async fn dead_letter(&self, delivery: Delivery) -> Result<()>;
}
