//! `get_entity_sources(entity_id, cursor, limit)` (§4.8): paginated source
//! descriptions, cursor = last id.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_store::GraphStore;

use crate::tool::{optional_limit, required_str, Tool, ToolResult};

const DEFAULT_LIMIT: i64 = 20;

pub struct GetEntitySourcesTool {
    store: Arc<GraphStore>,
    project_id: i64,
}

impl GetEntitySourcesTool {
    pub fn new(store: Arc<GraphStore>, project_id: i64) -> Self {
        Self { store, project_id }
    }
}

#[async_trait]
impl Tool for GetEntitySourcesTool {
    fn name(&self) -> &str {
        "get_entity_sources"
    }

    fn description(&self) -> &str {
        "Paginates the per-text-unit source descriptions that evidenced an entity. Pass the \
         last returned source id as `cursor` to fetch the next page."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_id": { "type": "string", "description": "The entity's id." },
                "cursor": { "type": "integer", "description": "Last source id seen, 0 for the first page." },
                "limit": { "type": "integer", "description": "Page size (default 20)." }
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let entity_id = match required_str(&input, "entity_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        let cursor = input.get("cursor").and_then(|v| v.as_i64()).unwrap_or(0);
        let limit = optional_limit(&input, DEFAULT_LIMIT);

        let entity = match self.store.get_entity_by_public_id(self.project_id, entity_id).await {
            Ok(Some(e)) => e,
            Ok(None) => return ToolResult::error(format!("no entity with id {entity_id}")),
            Err(e) => return ToolResult::error(format!("get_entity_sources failed: {e}")),
        };

        match self
            .store
            .get_entity_source_descriptions_batch(entity.id, cursor, limit)
            .await
        {
            Ok(rows) if rows.is_empty() => ToolResult::success("No further sources."),
            Ok(rows) => {
                let mut out = String::new();
                for row in &rows {
                    out.push_str(&format!("- [cursor {}] {}\n", row.id, row.description));
                }
                ToolResult::success(out)
            }
            Err(e) => ToolResult::error(format!("get_entity_sources failed: {e}")),
        }
    }
}
