//! `get_entity_details(entity_id)` (§4.8): full description and type.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_store::GraphStore;

use crate::tool::{required_str, Tool, ToolResult};

pub struct GetEntityDetailsTool {
    store: Arc<GraphStore>,
    project_id: i64,
}

impl GetEntityDetailsTool {
    pub fn new(store: Arc<GraphStore>, project_id: i64) -> Self {
        Self { store, project_id }
    }
}

#[async_trait]
impl Tool for GetEntityDetailsTool {
    fn name(&self) -> &str {
        "get_entity_details"
    }

    fn description(&self) -> &str {
        "Returns the full name, type, and description for one entity given its id."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_id": { "type": "string", "description": "The entity's id." }
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let entity_id = match required_str(&input, "entity_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        match self.store.get_entity_by_public_id(self.project_id, entity_id).await {
            Ok(Some(entity)) => ToolResult::success(format!(
                "id: {}\nname: {}\ntype: {}\ndescription: {}",
                entity.public_id, entity.name, entity.entity_type, entity.description
            )),
            Ok(None) => ToolResult::error(format!("no entity with id {entity_id}")),
            Err(e) => ToolResult::error(format!("get_entity_details failed: {e}")),
        }
    }
}
