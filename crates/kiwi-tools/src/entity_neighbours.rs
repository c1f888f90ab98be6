//! `get_entity_neighbours(entity_id, query, limit)` (§4.8): ranked one-hop
//! neighbours via hybrid search over incident relationships.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_ai::AiClient;
use kiwi_store::GraphStore;
use tokio_util::sync::CancellationToken;

use crate::tool::{optional_limit, required_str, Tool, ToolResult};

const DEFAULT_LIMIT: i64 = 10;

pub struct GetEntityNeighboursTool {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
    project_id: i64,
}

impl GetEntityNeighboursTool {
    pub fn new(store: Arc<GraphStore>, ai: Arc<AiClient>, project_id: i64) -> Self {
        Self { store, ai, project_id }
    }
}

#[async_trait]
impl Tool for GetEntityNeighboursTool {
    fn name(&self) -> &str {
        "get_entity_neighbours"
    }

    fn description(&self) -> &str {
        "Lists the entities directly connected to a given entity by a relationship, ranked by \
         relevance to an optional query."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_id": { "type": "string", "description": "The entity's id." },
                "query": { "type": "string", "description": "Optional free-text relevance query." },
                "limit": { "type": "integer", "description": "Maximum neighbours to return (default 10)." }
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let entity_id = match required_str(&input, "entity_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        let query = input.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let limit = optional_limit(&input, DEFAULT_LIMIT);

        let entity = match self.store.get_entity_by_public_id(self.project_id, entity_id).await {
            Ok(Some(e)) => e,
            Ok(None) => return ToolResult::error(format!("no entity with id {entity_id}")),
            Err(e) => return ToolResult::error(format!("get_entity_neighbours failed: {e}")),
        };

        let incident = match self.store.incident_relationships(self.project_id, entity.id).await {
            Ok(rels) => rels,
            Err(e) => return ToolResult::error(format!("get_entity_neighbours failed: {e}")),
        };
        let neighbour_ids: Vec<i64> = incident
            .iter()
            .map(|r| if r.source_id == entity.id { r.target_id } else { r.source_id })
            .collect();
        if neighbour_ids.is_empty() {
            return ToolResult::success("No neighbours found for this entity.");
        }

        let cancel = CancellationToken::new();
        let embedding = if query.trim().is_empty() {
            vec![0.0; self.ai.embed_dim()]
        } else {
            match self.ai.embed(query, &cancel).await {
                Ok(e) => e,
                Err(e) => return ToolResult::error(format!("embedding failed: {e}")),
            }
        };

        match self
            .store
            .hybrid_search_entities_among(self.project_id, &embedding, query, &neighbour_ids, limit)
            .await
        {
            Ok(rows) => ToolResult::success(crate::search_entities::format_entities(&rows)),
            Err(e) => ToolResult::error(format!("get_entity_neighbours failed: {e}")),
        }
    }
}
