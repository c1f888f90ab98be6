//! `search_entities(query, limit)` (§4.8): hybrid semantic+keyword search.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_ai::AiClient;
use kiwi_store::GraphStore;
use tokio_util::sync::CancellationToken;

use crate::tool::{optional_limit, required_str, Tool, ToolResult};

const DEFAULT_LIMIT: i64 = 10;

pub struct SearchEntitiesTool {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
    project_id: i64,
}

impl SearchEntitiesTool {
    pub fn new(store: Arc<GraphStore>, ai: Arc<AiClient>, project_id: i64) -> Self {
        Self { store, ai, project_id }
    }
}

/// Formats `[{id, name, type, description}]` as plain text for model
/// consumption, one entity per paragraph.
pub(crate) fn format_entities(rows: &[(kiwi_store::types::Entity, kiwi_store::types::HybridResult)]) -> String {
    if rows.is_empty() {
        return "No matching entities found.".to_string();
    }
    let mut out = String::new();
    for (entity, _) in rows {
        out.push_str(&format!(
            "- id: {}\n  name: {}\n  type: {}\n  description: {}\n",
            entity.public_id, entity.name, entity.entity_type, entity.description
        ));
    }
    out
}

#[async_trait]
impl Tool for SearchEntitiesTool {
    fn name(&self) -> &str {
        "search_entities"
    }

    fn description(&self) -> &str {
        "Hybrid semantic and keyword search over the project's entities. Returns matching \
         entities with their id, name, type, and description, ranked by relevance."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Free-text search query." },
                "limit": { "type": "integer", "description": "Maximum results to return (default 10)." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match required_str(&input, "query") {
            Ok(q) => q,
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
            .hybrid_search_entities(self.project_id, &embedding, query, limit)
            .await
        {
            Ok(rows) => ToolResult::success(format_entities(&rows)),
            Err(e) => ToolResult::error(format!("search_entities failed: {e}")),
        }
    }
}
