//! `get_source_document_metadata(text_unit_public_ids[])` (§4.8): resolves
//! units to `(file_name, file_key, metadata)`.

use std::sync::Arc;

use async_trait::async_trait;
use kiwi_store::GraphStore;

use crate::tool::{Tool, ToolResult};

pub struct GetSourceDocumentMetadataTool {
    store: Arc<GraphStore>,
}

impl GetSourceDocumentMetadataTool {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetSourceDocumentMetadataTool {
    fn name(&self) -> &str {
        "get_source_document_metadata"
    }

    fn description(&self) -> &str {
        "Resolves a list of text unit ids (as seen in citations) to their originating file's \
         name, file key, and structured metadata."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text_unit_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Text unit ids to resolve."
                }
            },
            "required": ["text_unit_ids"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let ids: Vec<String> = match input.get("text_unit_ids").and_then(|v| v.as_array()) {
            Some(arr) => arr.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            None => return ToolResult::error("missing required parameter: text_unit_ids"),
        };
        if ids.is_empty() {
            return ToolResult::error("text_unit_ids must not be empty");
        }

        match self.store.get_source_document_metadata(&ids).await {
            Ok(rows) if rows.is_empty() => ToolResult::success("No matching text units found."),
            Ok(rows) => {
                let mut out = String::new();
                for (unit_id, file_name, file_key, metadata) in &rows {
                    out.push_str(&format!("- unit: {unit_id}\n  file: {file_name} ({file_key})\n"));
                    if let Some(meta) = metadata {
                        out.push_str(&format!("  metadata: {meta}\n"));
                    }
                }
                ToolResult::success(out)
            }
            Err(e) => ToolResult::error(format!("get_source_document_metadata failed: {e}")),
        }
    }
}
