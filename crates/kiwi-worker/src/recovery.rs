//! Stale-batch recovery (§4.6): on boot, a single worker elected via
//! `try_acquire_lock` on [`kiwi_store::RECOVERY_LEADER_LOCK_KEY`] scans for
//! batches stuck in an in-flight state past [`kiwi_core::config::STALE_BATCH_HOURS`]
//! and republishes each to the queue matching its reset state.

use std::sync::Arc;

use tracing::info;

use kiwi_broker::{Broker, JobMessage, GRAPH_QUEUE, PREPROCESS_QUEUE};
use kiwi_core::config::STALE_BATCH_HOURS;
use kiwi_core::domain::{BatchOperation, BatchStatusKind};
use kiwi_store::{GraphStore, RECOVERY_LEADER_LOCK_KEY};

use crate::error::Result;

fn batch_status_kind_from_str(s: &str) -> BatchStatusKind {
    match s {
        "pending" => BatchStatusKind::Pending,
        "preprocessing" => BatchStatusKind::Preprocessing,
        "preprocessed" => BatchStatusKind::Preprocessed,
        "extracting" => BatchStatusKind::Extracting,
        "indexing" => BatchStatusKind::Indexing,
        "completed" => BatchStatusKind::Completed,
        _ => BatchStatusKind::Failed,
    }
}

fn batch_operation_from_str(s: &str) -> BatchOperation {
    match s {
        "update" => BatchOperation::Update,
        _ => BatchOperation::Index,
    }
}

fn queue_for(state: BatchStatusKind) -> Option<&'static str> {
    match state {
        BatchStatusKind::Pending => Some(PREPROCESS_QUEUE),
        BatchStatusKind::Preprocessed => Some(GRAPH_QUEUE),
        _ => None,
    }
}

/// Runs the recovery sweep if this worker wins the leader election;
/// otherwise returns immediately (§4.6: "a second worker on the same boot
/// observes the recovery lock held and skips the sweep").
pub async fn sweep_on_boot(store: &Arc<GraphStore>, broker: &Arc<dyn Broker>) -> Result<()> {
    let Some(lock) = store.try_acquire_lock(RECOVERY_LEADER_LOCK_KEY).await? else {
        info!("stale-batch recovery lock held elsewhere, skipping sweep");
        return Ok(());
    };

    let stale = store.find_stale_batches(STALE_BATCH_HOURS).await?;
    info!(count = stale.len(), "stale-batch recovery sweep");

    for batch in stale {
        let current = batch_status_kind_from_str(&batch.status);
        let reset = current.last_safe_state();
        store.set_batch_status(&batch.correlation_id, batch.batch_id, reset.as_str()).await?;

        if let Some(queue) = queue_for(reset) {
            let job = JobMessage {
                message: String::new(),
                project_id: batch.project_id,
                correlation_id: batch.correlation_id.clone(),
                batch_id: batch.batch_id,
                total_batches: batch.total_batches,
                project_files: batch.file_ids.clone(),
                operation: batch_operation_from_str(&batch.operation),
            };
            broker.publish(queue, &job).await?;
            info!(
                correlation_id = %batch.correlation_id,
                batch_id = batch.batch_id,
                reset_to = reset.as_str(),
                "republished stale batch"
            );
        }
    }

    lock.release().await?;
    Ok(())
}
