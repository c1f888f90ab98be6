//! Builds the closed C8 tool set for one project and adapts it to
//! [`kiwi_ai::tool_loop::ToolHandler`] for the agentic chat loop, mirroring
//! the teacher's `tools::to_definitions` conversion from `Tool` to
//! `ToolDefinition`.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_ai::types::{ToolCallResult, ToolDefinition};
use kiwi_ai::{AiClient, ToolHandler, ToolHandlers};
use kiwi_store::GraphStore;

use crate::entity_details::GetEntityDetailsTool;
use crate::entity_neighbours::GetEntityNeighboursTool;
use crate::entity_sources::GetEntitySourcesTool;
use crate::entity_types::GetEntityTypesTool;
use crate::path_between_entities::PathBetweenEntitiesTool;
use crate::relationship_sources::GetRelationshipSourcesTool;
use crate::search_entities::SearchEntitiesTool;
use crate::search_entities_by_type::SearchEntitiesByTypeTool;
use crate::source_document_metadata::GetSourceDocumentMetadataTool;
use crate::tool::Tool;

/// The nine graph tools bound to one project (§4.8).
pub fn build_tool_set(store: Arc<GraphStore>, ai: Arc<AiClient>, project_id: i64) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(SearchEntitiesTool::new(store.clone(), ai.clone(), project_id)),
        Box::new(SearchEntitiesByTypeTool::new(store.clone(), ai.clone(), project_id)),
        Box::new(GetEntityTypesTool::new(store.clone(), project_id)),
        Box::new(GetEntityNeighboursTool::new(store.clone(), ai.clone(), project_id)),
        Box::new(GetEntityDetailsTool::new(store.clone(), project_id)),
        Box::new(PathBetweenEntitiesTool::new(store.clone(), project_id)),
        Box::new(GetEntitySourcesTool::new(store.clone(), project_id)),
        Box::new(GetRelationshipSourcesTool::new(store.clone(), project_id)),
        Box::new(GetSourceDocumentMetadataTool::new(store)),
    ]
}

pub fn to_tool_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Wraps one [`Tool`] as a [`ToolHandler`] so the C1 tool loop (which only
/// knows about `ToolCallResult`) can invoke it without depending on
/// `kiwi-tools`' own `ToolResult` shape.
pub struct ToolAdapter(Box<dyn Tool>);

impl ToolAdapter {
    pub fn new(tool: Box<dyn Tool>) -> Self {
        Self(tool)
    }
}

#[async_trait]
impl ToolHandler for ToolAdapter {
    async fn call(&self, input: serde_json::Value) -> ToolCallResult {
        let result = self.0.execute(input).await;
        if result.is_error {
            ToolCallResult::error("", result.content)
        } else {
            ToolCallResult::ok("", result.content)
        }
    }
}

/// Builds the [`ToolHandlers`] map the C1 tool loop dispatches by name,
/// alongside the tool definitions sent to the model.
pub fn build_tool_handlers(tools: Vec<Box<dyn Tool>>) -> (ToolHandlers, Vec<ToolDefinition>) {
    let mut handlers = ToolHandlers::new();
    let mut defs = Vec::with_capacity(tools.len());
    for tool in tools {
        defs.push(ToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        });
        handlers.insert(tool.name().to_string(), Arc::new(ToolAdapter::new(tool)));
    }
    (handlers, defs)
}
