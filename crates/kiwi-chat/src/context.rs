//! Normal-mode retrieval and context assembly (§4.7): hybrid search for the
//! entity leg, [`kiwi_store::GraphStore::incident_relationships`] ranked by
//! `rank` as the relationship leg (no relationship-level hybrid search
//! exists in `kiwi-store`, see `DESIGN.md`), and shortest-path subgraph
//! expansion across the top entity cluster. Source snippets are deduped by
//! `text_unit_id` and formatted with `[[<public_id>]]` citation tokens the
//! model is instructed to cite inline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kiwi_ai::AiClient;
use kiwi_store::types::Relationship;
use kiwi_store::GraphStore;

use crate::error::Result;

/// How many entities feed subgraph expansion (kept small since the cost is
/// quadratic in pairs); matches the teacher's pattern of bounding expensive
/// fan-out steps to a fixed small constant rather than the full top-k.
const SUBGRAPH_CLUSTER_SIZE: usize = 5;
const SUBGRAPH_MAX_HOPS: usize = 4;
const SOURCES_PER_ITEM: i64 = 5;

/// Assembles the context block fed to the model as a system prompt
/// extension, or `None` when nothing relevant was found for `prompt`.
pub async fn build_context(
    store: &Arc<GraphStore>,
    ai: &Arc<AiClient>,
    project_id: i64,
    prompt: &str,
    top_k_entities: i64,
    top_k_relationships: i64,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    let embedding = ai.embed(prompt, cancel).await?;
    let entities = store
        .hybrid_search_entities(project_id, &embedding, prompt, top_k_entities)
        .await?;
    let entity_ids: Vec<i64> = entities.iter().map(|(e, _)| e.id).collect();

    let relationships = top_relationships(store, project_id, &entity_ids, top_k_relationships).await?;
    expand_subgraph(store, project_id, &entity_ids).await?;

    let mut seen_units: HashSet<i64> = HashSet::new();
    let mut sections = Vec::new();

    for (entity, _) in &entities {
        let sources = store
            .get_entity_source_descriptions_batch(entity.id, 0, SOURCES_PER_ITEM)
            .await?;
        for source in sources {
            if !seen_units.insert(source.text_unit_id) {
                continue;
            }
            if let Some(unit) = store.get_text_unit(source.text_unit_id).await? {
                sections.push(format!(
                    "Entity {} ({}): {}\n[[{}]]",
                    entity.name, entity.entity_type, source.description, unit.public_id
                ));
            }
        }
    }

    for relationship in &relationships {
        let sources = store
            .get_relationship_source_descriptions_batch(relationship.id, 0, SOURCES_PER_ITEM)
            .await?;
        for source in sources {
            if !seen_units.insert(source.text_unit_id) {
                continue;
            }
            if let Some(unit) = store.get_text_unit(source.text_unit_id).await? {
                sections.push(format!(
                    "Relationship: {}\n[[{}]]",
                    source.description, unit.public_id
                ));
            }
        }
    }

    if sections.is_empty() {
        return Ok(None);
    }
    Ok(Some(sections.join("\n\n")))
}

/// Relationships incident to the entity cluster, deduped and ranked by
/// `rank` descending, capped to `top_k`.
async fn top_relationships(
    store: &GraphStore,
    project_id: i64,
    entity_ids: &[i64],
    top_k: i64,
) -> Result<Vec<Relationship>> {
    let mut by_id: HashMap<i64, Relationship> = HashMap::new();
    for &entity_id in entity_ids {
        for relationship in store.incident_relationships(project_id, entity_id).await? {
            by_id.entry(relationship.id).or_insert(relationship);
        }
    }
    let mut relationships: Vec<Relationship> = by_id.into_values().collect();
    relationships.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal));
    relationships.truncate(top_k.max(0) as usize);
    Ok(relationships)
}

/// Walks shortest paths across the top entity cluster to surface the
/// connecting subgraph. The intermediate entity ids aren't used by
/// `build_context` directly yet (the relationship leg above already covers
/// the one-hop neighbourhood); this establishes the bridging entities a
/// future multi-hop context expansion would fold in.
async fn expand_subgraph(store: &GraphStore, project_id: i64, entity_ids: &[i64]) -> Result<Vec<i64>> {
    let cluster: Vec<i64> = entity_ids.iter().take(SUBGRAPH_CLUSTER_SIZE).copied().collect();
    let mut bridging = Vec::new();
    for i in 0..cluster.len() {
        for j in (i + 1)..cluster.len() {
            if let Some(path) = store
                .shortest_path_between_entities(project_id, cluster[i], cluster[j], SUBGRAPH_MAX_HOPS)
                .await?
            {
                bridging.extend(path.iter().map(|step| step.entity_id));
            }
        }
    }
    Ok(bridging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwi_store::types::Relationship;

    fn rel(id: i64, rank: f32) -> Relationship {
        Relationship {
            id,
            public_id: format!("rel-{id}"),
            project_id: 1,
            source_id: 1,
            target_id: 2,
            rank,
            description: "related to".to_string(),
        }
    }

    #[test]
    fn relationships_sort_by_rank_descending() {
        let mut relationships = vec![rel(1, 0.2), rel(2, 0.9), rel(3, 0.5)];
        relationships.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap());
        let ids: Vec<i64> = relationships.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
