//! `path_between_entities(a_id, b_id, max_hops)` (§4.8): shortest weighted
//! path, alternating entity/relationship nodes.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_store::GraphStore;

use crate::tool::{required_str, Tool, ToolResult};

const DEFAULT_MAX_HOPS: usize = 6;

pub struct PathBetweenEntitiesTool {
    store: Arc<GraphStore>,
    project_id: i64,
}

impl PathBetweenEntitiesTool {
    pub fn new(store: Arc<GraphStore>, project_id: i64) -> Self {
        Self { store, project_id }
    }
}

#[async_trait]
impl Tool for PathBetweenEntitiesTool {
    fn name(&self) -> &str {
        "path_between_entities"
    }

    fn description(&self) -> &str {
        "Finds the shortest path between two entities, preferring stronger-ranked \
         relationships, and returns the alternating chain of entities and relationships."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "a_id": { "type": "string", "description": "First entity's id." },
                "b_id": { "type": "string", "description": "Second entity's id." },
                "max_hops": { "type": "integer", "description": "Maximum hops to search (default 6)." }
            },
            "required": ["a_id", "b_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let a_id = match required_str(&input, "a_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        let b_id = match required_str(&input, "b_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        let max_hops = input
            .get("max_hops")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_HOPS);

        let a = match self.store.get_entity_by_public_id(self.project_id, a_id).await {
            Ok(Some(e)) => e,
            Ok(None) => return ToolResult::error(format!("no entity with id {a_id}")),
            Err(e) => return ToolResult::error(format!("path_between_entities failed: {e}")),
        };
        let b = match self.store.get_entity_by_public_id(self.project_id, b_id).await {
            Ok(Some(e)) => e,
            Ok(None) => return ToolResult::error(format!("no entity with id {b_id}")),
            Err(e) => return ToolResult::error(format!("path_between_entities failed: {e}")),
        };

        let path = match self
            .store
            .shortest_path_between_entities(self.project_id, a.id, b.id, max_hops)
            .await
        {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("path_between_entities failed: {e}")),
        };
        let Some(steps) = path else {
            return ToolResult::success(format!("No path found between {a_id} and {b_id} within {max_hops} hops."));
        };

        let mut out = String::new();
        for step in &steps {
            let entity = match self.store.get_entity(step.entity_id).await {
                Ok(Some(e)) => e,
                _ => continue,
            };
            out.push_str(&format!("entity: {} ({})\n", entity.name, entity.public_id));
            if let Some(rel_id) = step.via_relationship_id {
                if let Ok(Some(rel)) = self.store.get_relationship(rel_id).await {
                    out.push_str(&format!("  -> relationship: {} (rank {})\n", rel.description, rel.rank));
                }
            }
        }
        ToolResult::success(out)
    }
}
