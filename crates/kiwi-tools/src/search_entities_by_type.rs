//! `search_entities_by_type(query, type, limit)` (§4.8).

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_ai::AiClient;
use kiwi_store::GraphStore;
use tokio_util::sync::CancellationToken;

use crate::search_entities::format_entities;
use crate::tool::{optional_limit, required_str, Tool, ToolResult};

const DEFAULT_LIMIT: i64 = 10;

pub struct SearchEntitiesByTypeTool {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
    project_id: i64,
}

impl SearchEntitiesByTypeTool {
    pub fn new(store: Arc<GraphStore>, ai: Arc<AiClient>, project_id: i64) -> Self {
        Self { store, ai, project_id }
    }
}

#[async_trait]
impl Tool for SearchEntitiesByTypeTool {
    fn name(&self) -> &str {
        "search_entities_by_type"
    }

    fn description(&self) -> &str {
        "Hybrid semantic and keyword search over entities restricted to a single entity type."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Free-text search query." },
                "type": { "type": "string", "description": "Entity type to restrict results to." },
                "limit": { "type": "integer", "description": "Maximum results to return (default 10)." }
            },
            "required": ["query", "type"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match required_str(&input, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let entity_type = match required_str(&input, "type") {
            Ok(t) => t,
            Err(e) => return e,
        };
        let limit = optional_limit(&input, DEFAULT_LIMIT);
        let cancel = CancellationToken::new();
        let embedding = match self.ai.embed(query, &cancel).await {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("embedding failed: {e}")),
        };
        match self
            .store
            .hybrid_search_entities_by_type(self.project_id, &embedding, query, entity_type, limit)
            .await
        {
            Ok(rows) => ToolResult::success(format_entities(&rows)),
            Err(e) => ToolResult::error(format!("search_entities_by_type failed: {e}")),
        }
    }
}
