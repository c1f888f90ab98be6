//! Merge engine (C5, §4.5): reconciles one extraction batch's staged
//! units/entities/relationships into the graph under the project's advisory
//! lock, resolving name-collision and duplicate-relationship merges before
//! the staging area is dropped.
//!
//! Grounded on `kiwi-extract::engine::ExtractEngine`'s shape (one struct
//! holding `Arc<GraphStore>` + `Arc<AiClient>`, a single top-level method
//! driving an ordered sequence of store calls) and on `kiwi-store`'s own
//! doc comments, which already name every operation this module calls
//! (`TransferEntitySources`, `FindDuplicateRelationships`, ...).

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use kiwi_ai::AiClient;
use kiwi_core::ids::stable_public_id;
use kiwi_core::ProjectState;
use kiwi_extract::canonicalize_name;
use kiwi_loader::BlobStore;
use kiwi_store::types::{EntityInput, StagedEntity, StagedRelationship, TextUnitInput};
use kiwi_store::GraphStore;

use crate::error::{MergeError, Result};
use crate::types::{MergeBatch, MergeOutcome};

/// Entity/relationship ids per description job (§4.5 step 8). The teacher
/// has no equivalent; sized the way extraction bounds unit batches (a few
/// dozen per request keeps one C1 call well inside token limits).
const DESCRIPTION_JOB_BATCH_SIZE: usize = 25;

pub struct MergeEngine {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
}

/// Follows a loser -> survivor chain to its current root. Chains are short
/// (a handful of trigram/duplicate collisions per batch) so no cycle guard
/// beyond the caller never inserting `id -> id` is needed.
fn resolve(redirect: &HashMap<i64, i64>, mut id: i64) -> i64 {
    while let Some(&next) = redirect.get(&id) {
        id = next;
    }
    id
}

impl MergeEngine {
    pub fn new(store: Arc<GraphStore>, ai: Arc<AiClient>) -> Self {
        Self { store, ai }
    }

    /// Runs §4.5 steps 1-9 for one batch under the project's advisory lock,
    /// restoring `ready` on every exit path.
    pub async fn merge(
        &self,
        batch: &MergeBatch,
        state: ProjectState,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome> {
        let lock = self.store.acquire_project_lock(batch.project_id).await?;
        self.store.set_project_state(batch.project_id, state.as_str()).await?;

        let result = self.merge_inner(batch, cancel).await;

        let restore = self.store.set_project_state(batch.project_id, ProjectState::Ready.as_str()).await;
        lock.release().await?;
        restore?;
        result
    }

    async fn merge_inner(&self, batch: &MergeBatch, cancel: &CancellationToken) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();

        // Step 1: load the write-ahead area staged by C4.
        let staged_units = self.store.load_staged_units(&batch.correlation_id, batch.batch_id).await?;
        let staged_entities = self.store.load_staged_entities(&batch.correlation_id, batch.batch_id).await?;
        let staged_relationships =
            self.store.load_staged_relationships(&batch.correlation_id, batch.batch_id).await?;

        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        // Step 3: upsert text units, grouped by the physical file each batch
        // of staged units belongs to (upsert_text_units takes one
        // project_file_id per call).
        let mut units_by_file: HashMap<i64, Vec<TextUnitInput>> = HashMap::new();
        for u in &staged_units {
            units_by_file.entry(u.project_file_id).or_default().push(TextUnitInput {
                public_id: u.public_id.clone(),
                text: u.text.clone(),
                token_count: u.token_count,
            });
        }
        let mut unit_ids: HashMap<String, i64> = HashMap::with_capacity(staged_units.len());
        for (file_id, units) in &units_by_file {
            let ids = self.store.upsert_text_units(*file_id, units).await?;
            unit_ids.extend(ids);
        }
        outcome.text_units = unit_ids.len();

        // Step 2 (entities) + step 4: dedupe staged entity occurrences by
        // public_id, embed each unique entity once, upsert, then fold away
        // trigram name collisions within the same (project, type).
        let mut unique_entities: Vec<&StagedEntity> = Vec::new();
        let mut seen_entity_ids: HashMap<&str, usize> = HashMap::new();
        for e in &staged_entities {
            seen_entity_ids.entry(e.public_id.as_str()).or_insert_with(|| {
                unique_entities.push(e);
                unique_entities.len() - 1
            });
        }
        let entity_texts: Vec<String> =
            unique_entities.iter().map(|e| format!("{}: {}", e.name, e.description)).collect();
        let entity_embeddings = self.ai.embed_chunks(&entity_texts, cancel).await?;
        let entity_inputs: Vec<EntityInput> = unique_entities
            .iter()
            .zip(entity_embeddings.into_iter())
            .map(|(e, embedding)| EntityInput {
                public_id: e.public_id.clone(),
                name: e.name.clone(),
                description: e.description.clone(),
                entity_type: e.entity_type.clone(),
                embedding: Some(embedding),
            })
            .collect();
        let mut entity_ids = self.store.upsert_entities(batch.project_id, &entity_inputs).await?;
        outcome.entities_upserted = entity_ids.len();

        let touched_entity_ids: Vec<i64> = entity_ids.values().copied().collect();
        let collisions = self
            .store
            .find_entities_with_similar_names_for_entity_ids(batch.project_id, &touched_entity_ids)
            .await?;
        let mut entity_redirect: HashMap<i64, i64> = HashMap::new();
        for (a, b) in collisions {
            let ra = resolve(&entity_redirect, a);
            let rb = resolve(&entity_redirect, b);
            if ra == rb {
                continue;
            }
            let (survivor, loser) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.store.transfer_entity_sources(loser, survivor).await?;
            self.store.rewrite_relationship_endpoints(loser, survivor).await?;
            self.store.delete_entity(loser).await?;
            entity_redirect.insert(loser, survivor);
            outcome.entities_merged_away += 1;
        }
        for id in entity_ids.values_mut() {
            *id = resolve(&entity_redirect, *id);
        }

        // Step 2 (relationships) + step 5: dedupe staged relationship
        // occurrences by public_id (already a stable content key from C4),
        // keeping the strongest rank seen, then upsert and fold away
        // duplicate endpoint pairs.
        let mut unique_rels: Vec<StagedRelationship> = Vec::new();
        let mut rel_index: HashMap<String, usize> = HashMap::new();
        for r in staged_relationships {
            match rel_index.get(&r.public_id) {
                Some(&idx) => {
                    if r.rank > unique_rels[idx].rank {
                        unique_rels[idx].rank = r.rank;
                    }
                }
                None => {
                    rel_index.insert(r.public_id.clone(), unique_rels.len());
                    unique_rels.push(r);
                }
            }
        }

        let rel_texts: Vec<String> = unique_rels.iter().map(|r| r.description.clone()).collect();
        let rel_embeddings = self.ai.embed_chunks(&rel_texts, cancel).await?;

        let mut rel_tuples: Vec<(String, i64, i64, String, f32, Option<Vec<f32>>)> =
            Vec::with_capacity(unique_rels.len());
        for (r, embedding) in unique_rels.iter().zip(rel_embeddings.into_iter()) {
            let source_key = stable_public_id(
                "entity",
                &format!("{}:{}:{}", batch.project_id, canonicalize_name(&r.source_name), r.source_type),
            );
            let target_key = stable_public_id(
                "entity",
                &format!("{}:{}:{}", batch.project_id, canonicalize_name(&r.target_name), r.target_type),
            );
            let (Some(&source_id), Some(&target_id)) = (entity_ids.get(&source_key), entity_ids.get(&target_key))
            else {
                warn!(relationship = %r.public_id, "skipping relationship with unresolved endpoint");
                continue;
            };
            rel_tuples.push((r.public_id.clone(), source_id, target_id, r.description.clone(), r.rank, Some(embedding)));
        }
        let mut relationship_ids = self.store.upsert_relationships(batch.project_id, &rel_tuples).await?;
        outcome.relationships_upserted = relationship_ids.len();

        let duplicates = self.store.find_duplicate_relationships(batch.project_id).await?;
        let mut rel_redirect: HashMap<i64, i64> = HashMap::new();
        for (a, b) in duplicates {
            let ra = resolve(&rel_redirect, a.id);
            let rb = resolve(&rel_redirect, b.id);
            if ra == rb {
                continue;
            }
            let (survivor, loser) = if a.rank > b.rank {
                (a.id, b.id)
            } else if b.rank > a.rank {
                (b.id, a.id)
            } else if a.id < b.id {
                (a.id, b.id)
            } else {
                (b.id, a.id)
            };
            self.store.transfer_relationship_sources(loser, survivor).await?;
            self.store.delete_relationship(loser).await?;
            self.store.set_relationship_rank(survivor, a.rank.max(b.rank)).await?;
            rel_redirect.insert(loser, survivor);
            outcome.relationships_merged_away += 1;
        }
        for id in relationship_ids.values_mut() {
            *id = resolve(&rel_redirect, *id);
        }

        // Step 6: per-occurrence source provenance, resolved through both
        // redirect maps so a merged-away survivor still gets every source.
        let entity_source_texts: Vec<String> =
            staged_entities.iter().map(|e| e.source_description.clone()).collect();
        let entity_source_embeddings = self.ai.embed_chunks(&entity_source_texts, cancel).await?;
        let mut entity_source_tuples: Vec<(String, i64, i64, String, Option<Vec<f32>>)> =
            Vec::with_capacity(staged_entities.len());
        for (e, embedding) in staged_entities.iter().zip(entity_source_embeddings.into_iter()) {
            let (Some(&raw_entity_id), Some(&text_unit_id)) =
                (entity_ids.get(&e.public_id), unit_ids.get(&e.source_unit_public_id))
            else {
                continue;
            };
            let entity_id = resolve(&entity_redirect, raw_entity_id);
            let source_public_id =
                stable_public_id("entity_source", &format!("{}:{}", e.public_id, e.source_unit_public_id));
            entity_source_tuples.push((
                source_public_id,
                entity_id,
                text_unit_id,
                e.source_description.clone(),
                Some(embedding),
            ));
        }
        if !entity_source_tuples.is_empty() {
            self.store.upsert_entity_sources(&entity_source_tuples).await?;
        }

        let rel_source_texts: Vec<String> = unique_rels.iter().map(|r| r.source_description.clone()).collect();
        let rel_source_embeddings = self.ai.embed_chunks(&rel_source_texts, cancel).await?;
        let mut rel_source_tuples: Vec<(String, i64, i64, String, Option<Vec<f32>>)> =
            Vec::with_capacity(unique_rels.len());
        for (r, embedding) in unique_rels.iter().zip(rel_source_embeddings.into_iter()) {
            let (Some(&raw_rel_id), Some(&text_unit_id)) =
                (relationship_ids.get(&r.public_id), unit_ids.get(&r.source_unit_public_id))
            else {
                continue;
            };
            let relationship_id = resolve(&rel_redirect, raw_rel_id);
            let source_public_id =
                stable_public_id("relationship_source", &format!("{}:{}", r.public_id, r.source_unit_public_id));
            rel_source_tuples.push((
                source_public_id,
                relationship_id,
                text_unit_id,
                r.source_description.clone(),
                Some(embedding),
            ));
        }
        if !rel_source_tuples.is_empty() {
            self.store.upsert_relationship_sources(&rel_source_tuples).await?;
        }

        // Step 7: prune anything left sourceless by the merges above.
        outcome.entities_pruned =
            self.store.delete_entities_without_sources(batch.project_id).await?.len();
        outcome.relationships_pruned =
            self.store.delete_relationships_without_sources(batch.project_id).await?.len();

        // Step 8: optionally enqueue description regeneration, partitioned
        // over every entity/relationship this batch touched.
        let survivor_entities: Vec<i64> = entity_ids.values().copied().collect();
        let survivor_relationships: Vec<i64> = relationship_ids.values().copied().collect();
        outcome.description_jobs_enqueued = self
            .enqueue_description_jobs(&batch.correlation_id, &survivor_entities, &survivor_relationships)
            .await?;

        // Step 9: the write-ahead area's job is done.
        self.store.delete_staged(&batch.correlation_id, batch.batch_id).await?;

        Ok(outcome)
    }

    async fn enqueue_description_jobs(
        &self,
        correlation_id: &str,
        entity_ids: &[i64],
        relationship_ids: &[i64],
    ) -> Result<usize> {
        if entity_ids.is_empty() && relationship_ids.is_empty() {
            return Ok(0);
        }
        let entity_chunks = entity_ids.chunks(DESCRIPTION_JOB_BATCH_SIZE);
        let relationship_chunks = relationship_ids.chunks(DESCRIPTION_JOB_BATCH_SIZE);
        let mut job_id: i32 = 0;
        let mut enqueued = 0usize;
        for chunk in entity_chunks {
            self.store.create_description_job(correlation_id, job_id, chunk, &[]).await?;
            job_id += 1;
            enqueued += 1;
        }
        for chunk in relationship_chunks {
            self.store.create_description_job(correlation_id, job_id, &[], chunk).await?;
            job_id += 1;
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// Graph deletion for a project (§4.5 final paragraph): under the
    /// project lock, wipe the graph through C3, then delete the blobs of
    /// whatever files were tombstoned first (their `project_files` rows
    /// don't survive the C3 delete, so the file keys are captured before it
    /// runs).
    pub async fn delete_project_graph(&self, project_id: i64, blobs: &dyn BlobStore) -> Result<()> {
        let lock = self.store.acquire_project_lock(project_id).await?;
        self.store.set_project_state(project_id, ProjectState::Update.as_str()).await?;

        let result = self.delete_project_graph_inner(project_id, blobs).await;

        let restore = self.store.set_project_state(project_id, ProjectState::Ready.as_str()).await;
        lock.release().await?;
        restore?;
        result
    }

    async fn delete_project_graph_inner(&self, project_id: i64, blobs: &dyn BlobStore) -> Result<()> {
        let deleted_files = self.store.list_deleted_files(project_id).await?;
        self.store.delete_project_graph(project_id).await?;
        for (_id, file_key) in deleted_files {
            if let Err(e) = blobs.delete(&file_key).await {
                warn!(file_key = %file_key, error = %e, "failed to delete tombstoned blob");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_follows_chain_to_root() {
        let mut redirect = HashMap::new();
        redirect.insert(3, 2);
        redirect.insert(2, 1);
        assert_eq!(resolve(&redirect, 3), 1);
        assert_eq!(resolve(&redirect, 1), 1);
        assert_eq!(resolve(&redirect, 99), 99);
    }
}
