use kiwi_core::domain::BatchOperation;
use serde::{Deserialize, Serialize};

/// One queued unit of pipeline work (§4.6). Carried verbatim from publish
/// through retry/DLQ republish; `project_files` is only populated for the
/// preprocess phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub message: String,
    pub project_id: i64,
    pub correlation_id: String,
    pub batch_id: i32,
    pub total_batches: i32,
    #[serde(default)]
    pub project_files: Vec<i64>,
    pub operation: BatchOperation,
}

/// A delivered message, with its `x-retries` header count already parsed out.
/// Settlement (ack / requeue / retry) is driven by `Broker::ack`,
/// `Broker::nack_requeue`, `Broker::retry`, and `Broker::dead_letter`.
pub struct Delivery {
    pub queue: String,
    pub job: JobMessage,
    pub retries: u32,
    pub token: DeliveryToken,
}

/// Broker-specific settlement handle, opaque to callers.
pub enum DeliveryToken {
    Lapin(lapin::message::Delivery),
    Fake(u64),
}

pub const PREPROCESS_QUEUE: &str = "preprocess_queue";
pub const GRAPH_QUEUE: &str = "graph_queue";
pub const DELETE_QUEUE: &str = "delete_queue";

pub const MAIN_QUEUES: &[&str] = &[PREPROCESS_QUEUE, GRAPH_QUEUE, DELETE_QUEUE];

pub fn retry_queue_name(queue: &str) -> String {
    format!("{queue}_retry")
}

pub fn dlq_queue_name(queue: &str) -> String {
    format!("{queue}_dlq")
}
