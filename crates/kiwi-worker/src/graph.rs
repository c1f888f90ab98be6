//! Extract+merge phase (§4.6): rechunks each batch file's cleaned blob,
//! drives [`kiwi_extract::ExtractEngine`] into the staging area, then
//! [`kiwi_merge::MergeEngine`] reconciles it into the project graph.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use kiwi_ai::types::CallOptions;
use kiwi_ai::AiClient;
use kiwi_broker::JobMessage;
use kiwi_core::domain::{BatchOperation, BatchStatusKind, StatType};
use kiwi_core::ProjectState;
use kiwi_extract::{ExtractBatch, ExtractEngine, ExtractFile};
use kiwi_loader::{chunk_text, BlobStore, LoaderConfig};
use kiwi_merge::{MergeBatch, MergeEngine};
use kiwi_store::GraphStore;

use crate::error::{Result, WorkerError};

fn blob_key(public_id: &str) -> String {
    format!("{public_id}.txt")
}

fn stat_type_for(operation: BatchOperation) -> StatType {
    match operation {
        BatchOperation::Index => StatType::GraphCreation,
        BatchOperation::Update => StatType::GraphUpdate,
    }
}

fn project_state_for(operation: BatchOperation) -> ProjectState {
    match operation {
        BatchOperation::Index => ProjectState::Create,
        BatchOperation::Update => ProjectState::Update,
    }
}

/// Runs §4.6's extract+merge phase for one batch, transitioning `BatchStatus`
/// through `extracting` -> `indexing` -> `completed` as it goes.
pub async fn run(
    store: &Arc<GraphStore>,
    ai: &Arc<AiClient>,
    blobs: &Arc<dyn BlobStore>,
    loader_config: &LoaderConfig,
    parallel_files: usize,
    job: &JobMessage,
    cancel: &CancellationToken,
) -> Result<()> {
    // `BatchStatus` already sits at `extracting`: the dispatcher sets it
    // before routing the delivery here.
    let started = Instant::now();

    let amount = job.project_files.len().max(1) as f64;
    crate::eta::estimate(store, stat_type_for(job.operation), amount, &job.correlation_id, job.batch_id).await?;

    let mut files = Vec::with_capacity(job.project_files.len());
    for &file_id in &job.project_files {
        let pf = store.get_project_file(file_id).await?.ok_or(WorkerError::MissingProjectFile(file_id))?;
        let text = blobs.get(&blob_key(&pf.public_id)).await?;
        let text = String::from_utf8_lossy(&text).into_owned();
        let units = chunk_text(&text, loader_config.max_tokens_per_unit)?;
        files.push(ExtractFile { project_file_id: pf.id, units });
    }

    let extract_engine = ExtractEngine::new(store.clone(), ai.clone(), parallel_files);
    let opts = CallOptions::default();
    extract_engine
        .extract(
            &ExtractBatch {
                correlation_id: job.correlation_id.clone(),
                batch_id: job.batch_id,
                project_id: job.project_id,
                files,
            },
            &opts,
            cancel,
        )
        .await?;

    store.set_batch_status(&job.correlation_id, job.batch_id, BatchStatusKind::Indexing.as_str()).await?;

    let merge_engine = MergeEngine::new(store.clone(), ai.clone());
    merge_engine
        .merge(
            &MergeBatch {
                correlation_id: job.correlation_id.clone(),
                batch_id: job.batch_id,
                project_id: job.project_id,
            },
            project_state_for(job.operation),
            cancel,
        )
        .await?;

    let amount = job.project_files.len().max(1) as f64;
    crate::eta::record(store, stat_type_for(job.operation), amount, started.elapsed().as_millis() as i64).await?;
    store.set_batch_status(&job.correlation_id, job.batch_id, BatchStatusKind::Completed.as_str()).await?;
    Ok(())
}
