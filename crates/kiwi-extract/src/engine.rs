//! Structured extraction (C4, §4.4): turns a batch's logical files into
//! staged units/entities/relationships ready for the merge engine (C5).
//!
//! Grounded on `kiwi-tools`' one-struct-per-operation shape and the
//! teacher's bounded-parallelism style (`skynet-agent`'s tool loop caps
//! rounds; here `ParallelFiles` caps in-flight files via `buffer_unordered`
//! rather than a hand-rolled semaphore, since every file's work is already
//! one future).

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use kiwi_ai::types::CallOptions;
use kiwi_ai::AiClient;
use kiwi_core::ids::{new_public_id, stable_public_id};
use kiwi_loader::Chunk;
use kiwi_store::types::{StagedEntity, StagedRelationship, StagedUnit};
use kiwi_store::GraphStore;

use crate::error::{ExtractError, Result};
use crate::prompt::extraction_prompt;
use crate::types::{canonicalize_name, ExtractionResult};

/// One physical file's already-chunked unit text, scoped to a `ProjectFile`
/// row the preprocess phase created.
#[derive(Debug, Clone)]
pub struct ExtractFile {
    pub project_file_id: i64,
    pub units: Vec<Chunk>,
}

/// One extraction job: a batch coordinate plus the files it covers (§4.4).
#[derive(Debug, Clone)]
pub struct ExtractBatch {
    pub correlation_id: String,
    pub batch_id: i32,
    pub project_id: i64,
    pub files: Vec<ExtractFile>,
}

pub struct ExtractEngine {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
    parallel_files: usize,
}

impl ExtractEngine {
    pub fn new(store: Arc<GraphStore>, ai: Arc<AiClient>, parallel_files: usize) -> Self {
        Self {
            store,
            ai,
            parallel_files: parallel_files.max(1),
        }
    }

    /// Runs §4.4 end to end for one batch. On any unit failure (after C1's
    /// own in-op retries are exhausted) the whole batch's staging area is
    /// dropped and `BatchStatus` transitions to `failed`.
    pub async fn extract(
        &self,
        batch: &ExtractBatch,
        opts: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // A child token lets one file's failure stop the others in flight
        // (errgroup-style cancellation, §5) without cancelling the caller's
        // token for anything past this call.
        let child = cancel.child_token();

        let results: Vec<Result<()>> = stream::iter(batch.files.iter().cloned())
            .map(|file| {
                let store = self.store.clone();
                let ai = self.ai.clone();
                let correlation_id = batch.correlation_id.clone();
                let batch_id = batch.batch_id;
                let project_id = batch.project_id;
                let opts = opts.clone();
                let child = child.clone();
                async move {
                    let result = process_file(
                        &store,
                        &ai,
                        &correlation_id,
                        batch_id,
                        project_id,
                        &file,
                        &opts,
                        &child,
                    )
                    .await;
                    if result.is_err() {
                        child.cancel();
                    }
                    result
                }
            })
            .buffer_unordered(self.parallel_files)
            .collect()
            .await;

        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            // Best-effort cleanup: the failure itself is what's reported.
            let _ = self.store.delete_staged(&batch.correlation_id, batch.batch_id).await;
            let _ = self
                .store
                .fail_batch_status(&batch.correlation_id, batch.batch_id, &err.to_string())
                .await;
            return Err(err);
        }
        Ok(())
    }
}

/// Processes one file's units sequentially, preserving cheap rate-limit
/// control within a file while multiple files run concurrently (§4.4).
#[allow(clippy::too_many_arguments)]
async fn process_file(
    store: &GraphStore,
    ai: &AiClient,
    correlation_id: &str,
    batch_id: i32,
    project_id: i64,
    file: &ExtractFile,
    opts: &CallOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    for unit in &file.units {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        process_unit(store, ai, correlation_id, batch_id, project_id, file.project_file_id, unit, opts, cancel)
            .await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn process_unit(
    store: &GraphStore,
    ai: &AiClient,
    correlation_id: &str,
    batch_id: i32,
    project_id: i64,
    project_file_id: i64,
    unit: &Chunk,
    opts: &CallOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let unit_public_id = new_public_id();
    store
        .stage_units(
            correlation_id,
            batch_id,
            project_id,
            &[StagedUnit {
                public_id: unit_public_id.clone(),
                project_file_id,
                text: unit.text.clone(),
                token_count: unit.token_count,
            }],
        )
        .await?;

    let extracted: ExtractionResult = ai
        .complete_structured(&extraction_prompt(&unit.text), opts, cancel)
        .await?;

    // Canonical name -> extracted type, so relationship endpoints (which
    // only carry names) can recover a type-pair for their staging key.
    let mut type_by_name: HashMap<String, String> = HashMap::with_capacity(extracted.entities.len());
    let mut staged_entities = Vec::with_capacity(extracted.entities.len());
    for entity in &extracted.entities {
        let canonical = canonicalize_name(&entity.name);
        type_by_name.insert(canonical.clone(), entity.entity_type.clone());
        let entity_public_id = stable_public_id(
            "entity",
            &format!("{project_id}:{canonical}:{}", entity.entity_type),
        );
        staged_entities.push(StagedEntity {
            public_id: entity_public_id,
            name: entity.name.clone(),
            description: entity.description.clone(),
            entity_type: entity.entity_type.clone(),
            source_unit_public_id: unit_public_id.clone(),
            source_description: entity.description.clone(),
        });
    }
    if !staged_entities.is_empty() {
        store
            .stage_entities(correlation_id, batch_id, project_id, &staged_entities)
            .await?;
    }

    let mut staged_relationships = Vec::with_capacity(extracted.relationships.len());
    for rel in &extracted.relationships {
        let source_canonical = canonicalize_name(&rel.source_name);
        let target_canonical = canonicalize_name(&rel.target_name);
        let source_type = type_by_name
            .get(&source_canonical)
            .cloned()
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let target_type = type_by_name
            .get(&target_canonical)
            .cloned()
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let relationship_public_id = stable_public_id(
            "relationship",
            &format!(
                "{project_id}:{source_canonical}:{source_type}:{target_canonical}:{target_type}"
            ),
        );
        staged_relationships.push(StagedRelationship {
            public_id: relationship_public_id,
            source_name: rel.source_name.clone(),
            target_name: rel.target_name.clone(),
            source_type,
            target_type,
            description: rel.description.clone(),
            rank: rel.rank.clamp(0.0, 10.0),
            source_unit_public_id: unit_public_id.clone(),
            source_description: rel.description.clone(),
        });
    }
    if !staged_relationships.is_empty() {
        store
            .stage_relationships(correlation_id, batch_id, project_id, &staged_relationships)
            .await?;
    }

    Ok(())
}
