//! Delete phase (§4.6): under the project lock, wipes the graph then removes
//! the blobs of whatever files were tombstoned first. Thin wrapper over
//! [`kiwi_merge::MergeEngine::delete_project_graph`].

use std::sync::Arc;

use kiwi_ai::AiClient;
use kiwi_broker::JobMessage;
use kiwi_loader::BlobStore;
use kiwi_merge::MergeEngine;
use kiwi_store::GraphStore;

use crate::error::Result;

pub async fn run(store: &Arc<GraphStore>, ai: &Arc<AiClient>, blobs: &Arc<dyn BlobStore>, job: &JobMessage) -> Result<()> {
    let merge_engine = MergeEngine::new(store.clone(), ai.clone());
    merge_engine.delete_project_graph(job.project_id, blobs.as_ref()).await?;
    Ok(())
}
