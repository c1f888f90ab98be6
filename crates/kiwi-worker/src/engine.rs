//! Job dispatcher (C6, §4.6): one serialized consumer per queue, each
//! transitioning `BatchStatus` around a pipeline phase and settling the
//! delivery (ack / retry / dead-letter) according to the outcome.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kiwi_ai::AiClient;
use kiwi_broker::{Broker, Delivery, DELETE_QUEUE, GRAPH_QUEUE, PREPROCESS_QUEUE};
use kiwi_core::config::{MAX_QUEUE_RETRIES, WorkerConfig};
use kiwi_core::domain::BatchStatusKind;
use kiwi_loader::{BlobStore, FileLoader, LoaderConfig};
use kiwi_store::GraphStore;

use crate::error::Result;
use crate::{delete, graph, preprocess};

/// Which queues a worker process drains (§4.6.1). Every mode still declares
/// the full topology on boot since the publisher side always needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    Full,
    Preprocess,
    Graph,
}

impl WorkerMode {
    pub fn queues(self) -> &'static [&'static str] {
        match self {
            WorkerMode::Full => &[PREPROCESS_QUEUE, GRAPH_QUEUE, DELETE_QUEUE],
            WorkerMode::Preprocess => &[PREPROCESS_QUEUE],
            WorkerMode::Graph => &[GRAPH_QUEUE, DELETE_QUEUE],
        }
    }
}

pub struct WorkerEngine {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
    loader: Arc<FileLoader>,
    loader_config: LoaderConfig,
    blobs: Arc<dyn BlobStore>,
    broker: Arc<dyn Broker>,
    config: WorkerConfig,
}

impl WorkerEngine {
    pub fn new(
        store: Arc<GraphStore>,
        ai: Arc<AiClient>,
        loader: Arc<FileLoader>,
        loader_config: LoaderConfig,
        blobs: Arc<dyn BlobStore>,
        broker: Arc<dyn Broker>,
        config: WorkerConfig,
    ) -> Self {
        Self { store, ai, loader, loader_config, blobs, broker, config }
    }

    /// Declares the full queue topology, runs the stale-batch recovery sweep,
    /// then drains `mode`'s queues until `cancel` fires.
    pub async fn run(self: Arc<Self>, mode: WorkerMode, cancel: CancellationToken) -> Result<()> {
        self.broker.declare_topology().await?;
        crate::recovery::sweep_on_boot(&self.store, &self.broker).await?;

        let consumers = mode.queues().iter().map(|&queue| {
            let engine = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.drain(queue, cancel).await })
        });

        for handle in consumers {
            if let Err(e) = handle.await {
                error!(error = %e, "queue consumer task panicked");
            }
        }
        Ok(())
    }

    /// Funnels one queue's deliveries into a single serialized processor
    /// (§4.6: "processing is strictly one-at-a-time per worker").
    async fn drain(&self, queue: &str, cancel: CancellationToken) {
        let mut stream = match self.broker.consume(queue, self.config.prefetch).await {
            Ok(s) => s,
            Err(e) => {
                error!(queue, error = %e, "failed to open consumer");
                return;
            }
        };

        loop {
            let delivery = tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => next,
            };
            let Some(delivery) = delivery else { break };
            match delivery {
                Ok(delivery) => self.process_one(queue, delivery, &cancel).await,
                Err(e) => error!(queue, error = %e, "delivery error"),
            }
        }
    }

    async fn process_one(&self, queue: &str, delivery: Delivery, cancel: &CancellationToken) {
        let job = delivery.job.clone();
        self.mark_in_flight(queue, &job).await;

        let result = self.run_phase(queue, &job, cancel).await;
        match result {
            Ok(()) => {
                if let Err(e) = self.broker.ack(delivery).await {
                    error!(queue, error = %e, "ack failed");
                }
            }
            Err(e) if e.is_cancelled() => {
                if let Err(e) = self.broker.nack_requeue(delivery).await {
                    error!(queue, error = %e, "nack_requeue failed");
                }
            }
            Err(e) => {
                warn!(queue, correlation_id = %job.correlation_id, batch_id = job.batch_id, error = %e, "phase failed");
                self.reset_on_failure(queue, &job).await;
                if should_dead_letter(delivery.retries) {
                    if let Err(e) = self.broker.dead_letter(delivery).await {
                        error!(queue, error = %e, "dead_letter failed");
                    }
                } else if let Err(e) = self.broker.retry(delivery).await {
                    error!(queue, error = %e, "retry failed");
                }
            }
        }
    }

    /// Before a delivery is processed: stamps `BatchStatus` with the
    /// in-flight state for this queue (§4.6). `delete_queue` has no
    /// per-batch status of its own.
    async fn mark_in_flight(&self, queue: &str, job: &kiwi_broker::JobMessage) {
        let Some(state) = in_flight_state(queue) else { return };
        let _ = self
            .store
            .create_batch_status(&job.correlation_id, job.batch_id, job.total_batches, job.project_id, &job.project_files, job.operation.as_str())
            .await;
        let _ = self.store.set_batch_status(&job.correlation_id, job.batch_id, state.as_str()).await;
    }

    async fn reset_on_failure(&self, queue: &str, job: &kiwi_broker::JobMessage) {
        let Some(state) = in_flight_state(queue) else { return };
        let safe = state.last_safe_state();
        if let Err(e) = self.store.set_batch_status(&job.correlation_id, job.batch_id, safe.as_str()).await {
            error!(error = %e, "failed to reset batch status after failure");
        }
    }

    async fn run_phase(&self, queue: &str, job: &kiwi_broker::JobMessage, cancel: &CancellationToken) -> Result<()> {
        match queue {
            PREPROCESS_QUEUE => {
                let forwarded = preprocess::run(&self.store, &self.ai, &self.loader, &self.blobs, job, cancel).await?;
                self.store
                    .set_batch_status(&job.correlation_id, job.batch_id, BatchStatusKind::Preprocessed.as_str())
                    .await?;
                self.broker.publish(GRAPH_QUEUE, &forwarded).await?;
                info!(correlation_id = %job.correlation_id, batch_id = job.batch_id, "preprocess complete");
                Ok(())
            }
            GRAPH_QUEUE => {
                graph::run(&self.store, &self.ai, &self.blobs, &self.loader_config, self.config.parallel_files, job, cancel)
                    .await?;
                info!(correlation_id = %job.correlation_id, batch_id = job.batch_id, "extract+merge complete");
                Ok(())
            }
            DELETE_QUEUE => {
                delete::run(&self.store, &self.ai, &self.blobs, job).await?;
                info!(project_id = job.project_id, "project graph delete complete");
                Ok(())
            }
            other => {
                warn!(queue = other, "no phase handler for queue, acking unhandled delivery");
                Ok(())
            }
        }
    }
}

fn in_flight_state(queue: &str) -> Option<BatchStatusKind> {
    match queue {
        PREPROCESS_QUEUE => Some(BatchStatusKind::Preprocessing),
        GRAPH_QUEUE => Some(BatchStatusKind::Extracting),
        _ => None,
    }
}

/// `x-retries >= MAX_QUEUE_RETRIES` routes to the DLQ instead of another
/// retry (§4.6, §8).
fn should_dead_letter(retries: u32) -> bool {
    retries + 1 >= MAX_QUEUE_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mode_drains_all_three_queues() {
        assert_eq!(WorkerMode::Full.queues(), &[PREPROCESS_QUEUE, GRAPH_QUEUE, DELETE_QUEUE]);
    }

    #[test]
    fn preprocess_mode_drains_only_its_own_queue() {
        assert_eq!(WorkerMode::Preprocess.queues(), &[PREPROCESS_QUEUE]);
    }

    #[test]
    fn graph_mode_drains_graph_and_delete_queues() {
        assert_eq!(WorkerMode::Graph.queues(), &[GRAPH_QUEUE, DELETE_QUEUE]);
    }

    #[test]
    fn in_flight_state_matches_the_queue_a_delivery_came_from() {
        assert_eq!(in_flight_state(PREPROCESS_QUEUE), Some(BatchStatusKind::Preprocessing));
        assert_eq!(in_flight_state(GRAPH_QUEUE), Some(BatchStatusKind::Extracting));
        assert_eq!(in_flight_state(DELETE_QUEUE), None);
    }

    #[test]
    fn dead_letters_only_once_the_next_retry_would_hit_the_cap() {
        assert!(!should_dead_letter(MAX_QUEUE_RETRIES - 2));
        assert!(should_dead_letter(MAX_QUEUE_RETRIES - 1));
        assert!(should_dead_letter(MAX_QUEUE_RETRIES));
    }
}
