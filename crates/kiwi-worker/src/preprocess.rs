//! Preprocess phase (§4.6): decodes each of a batch's raw files, writes the
//! cleaned text to the blob store under `<project_file public_id>.txt`,
//! populates `ProjectFile.token_count`/`metadata`, then hands the batch on to
//! `graph_queue`.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use kiwi_ai::AiClient;
use kiwi_broker::{JobMessage, GRAPH_QUEUE};
use kiwi_core::domain::StatType;
use kiwi_loader::{describe_file, BlobStore, FileLoader};
use kiwi_store::GraphStore;

use crate::error::{Result, WorkerError};

fn blob_key(public_id: &str) -> String {
    format!("{public_id}.txt")
}

/// Runs §4.6's preprocess phase for one batch's `project_files`, writing the
/// cleaned text blob and populated metadata for each. Spreadsheets expand
/// into one extra `ProjectFile` per sheet beyond the first; the caller
/// forwards the (possibly grown) file id list onward to `graph_queue`.
pub async fn run(
    store: &Arc<GraphStore>,
    ai: &Arc<AiClient>,
    loader: &Arc<FileLoader>,
    blobs: &Arc<dyn BlobStore>,
    job: &JobMessage,
    cancel: &CancellationToken,
) -> Result<JobMessage> {
    let started = Instant::now();
    let mut all_file_ids = Vec::with_capacity(job.project_files.len());

    let amount = job.project_files.len().max(1) as f64;
    crate::eta::estimate(store, StatType::FileProcessing, amount, &job.correlation_id, job.batch_id).await?;

    for &file_id in &job.project_files {
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        all_file_ids.extend(preprocess_file(store, ai, loader, blobs, file_id, job.project_id, cancel).await?);
    }

    let amount = all_file_ids.len().max(1) as f64;
    crate::eta::record(store, StatType::FileProcessing, amount, started.elapsed().as_millis() as i64).await?;

    Ok(JobMessage {
        message: job.message.clone(),
        project_id: job.project_id,
        correlation_id: job.correlation_id.clone(),
        batch_id: job.batch_id,
        total_batches: job.total_batches,
        project_files: all_file_ids,
        operation: job.operation,
    })
}

async fn preprocess_file(
    store: &Arc<GraphStore>,
    ai: &Arc<AiClient>,
    loader: &Arc<FileLoader>,
    blobs: &Arc<dyn BlobStore>,
    file_id: i64,
    project_id: i64,
    cancel: &CancellationToken,
) -> Result<Vec<i64>> {
    let file = store
        .get_project_file(file_id)
        .await?
        .ok_or(WorkerError::MissingProjectFile(file_id))?;
    let raw = blobs.get(&file.file_key).await?;
    let logical_files = loader.load(&file.public_id, &file.name, &raw, cancel).await?;

    let mut ids = Vec::with_capacity(logical_files.len());
    for (i, logical) in logical_files.into_iter().enumerate() {
        let target = if i == 0 {
            file.clone()
        } else {
            store
                .create_project_file(project_id, &logical.name, &format!("{}#{}", file.file_key, logical.name))
                .await?
        };

        let full_text: String = logical.chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
        blobs.put(&blob_key(&target.public_id), full_text.as_bytes()).await?;

        let token_count = logical.chunks.iter().map(|c| c.token_count).sum();
        let description = describe_file(ai, &full_text, cancel).await?;
        let metadata = serde_json::json!({ "description": description });
        store.set_project_file_preprocessed(target.id, token_count, metadata).await?;

        ids.push(target.id);
    }
    Ok(ids)
}

pub const FORWARD_QUEUE: &str = GRAPH_QUEUE;
