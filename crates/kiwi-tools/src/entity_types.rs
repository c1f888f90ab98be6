//! `get_entity_types()` (§4.8): `[{type, count}]` descending by count.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_store::GraphStore;

use crate::tool::{Tool, ToolResult};

pub struct GetEntityTypesTool {
    store: Arc<GraphStore>,
    project_id: i64,
}

impl GetEntityTypesTool {
    pub fn new(store: Arc<GraphStore>, project_id: i64) -> Self {
        Self { store, project_id }
    }
}

#[async_trait]
impl Tool for GetEntityTypesTool {
    fn name(&self) -> &str {
        "get_entity_types"
    }

    fn description(&self) -> &str {
        "Lists every entity type present in the project's graph along with how many entities \
         of each type exist, descending by count."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        match self.store.get_entity_types(self.project_id).await {
            Ok(rows) if rows.is_empty() => ToolResult::success("No entities in this project yet."),
            Ok(rows) => {
                let mut out = String::new();
                for (entity_type, count) in rows {
                    out.push_str(&format!("- {entity_type}: {count}\n"));
                }
                ToolResult::success(out)
            }
            Err(e) => ToolResult::error(format!("get_entity_types failed: {e}")),
        }
    }
}
