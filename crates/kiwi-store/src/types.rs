use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub public_id: String,
    pub name: String,
    pub description: String,
    pub state: String,
    pub project_type: Option<String>,
    pub hidden: bool,
    pub group_id: Option<i64>,
    pub user_id: Option<i64>,
    pub graph_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: i64,
    pub public_id: String,
    pub project_id: i64,
    pub name: String,
    pub file_key: String,
    pub deleted: bool,
    pub token_count: i64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnitInput {
    pub public_id: String,
    pub text: String,
    pub token_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: i64,
    pub public_id: String,
    pub project_file_id: i64,
    pub text: String,
    pub token_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInput {
    pub public_id: String,
    pub name: String,
    pub description: String,
    pub entity_type: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub public_id: String,
    pub project_id: i64,
    pub name: String,
    pub description: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipInput {
    pub public_id: String,
    pub source_public_id: String,
    pub target_public_id: String,
    pub description: String,
    pub rank: f32,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub public_id: String,
    pub project_id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub rank: f32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySourceInput {
    pub public_id: String,
    pub entity_public_id: String,
    pub text_unit_public_id: String,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySource {
    pub id: i64,
    pub public_id: String,
    pub entity_id: i64,
    pub text_unit_id: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSourceInput {
    pub public_id: String,
    pub relationship_public_id: String,
    pub text_unit_public_id: String,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSource {
    pub id: i64,
    pub public_id: String,
    pub relationship_id: i64,
    pub text_unit_id: i64,
    pub description: String,
}

/// A candidate from the semantic leg of hybrid search (§4.3).
#[derive(Debug, Clone)]
pub struct SemanticCandidate {
    pub id: i64,
    pub distance: f64,
}

/// A candidate from the keyword leg of hybrid search (§4.3).
#[derive(Debug, Clone)]
pub struct KeywordCandidate {
    pub id: i64,
    pub ts_rank: f64,
    pub hit_count: u32,
}

/// One ranked result out of `hybrid_rank` (§4.3): distance drives primary
/// order, keyword stats are exposed for the caller's own blend.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridResult {
    pub id: i64,
    pub distance: Option<f64>,
    pub ts_rank: Option<f64>,
    pub keyword_hits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub correlation_id: String,
    pub batch_id: i32,
    pub total_batches: i32,
    pub project_id: i64,
    pub file_ids: Vec<i64>,
    pub operation: String,
    pub status: String,
    pub estimated_duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionJobStatus {
    pub correlation_id: String,
    pub job_id: i32,
    pub entity_ids: Vec<i64>,
    pub relationship_ids: Vec<i64>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedUnit {
    pub public_id: String,
    pub project_file_id: i64,
    pub text: String,
    pub token_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedEntity {
    pub public_id: String,
    pub name: String,
    pub description: String,
    pub entity_type: String,
    pub source_unit_public_id: String,
    pub source_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedRelationship {
    pub public_id: String,
    pub source_name: String,
    pub target_name: String,
    pub source_type: String,
    pub target_type: String,
    pub description: String,
    pub rank: f32,
    pub source_unit_public_id: String,
    pub source_description: String,
}
