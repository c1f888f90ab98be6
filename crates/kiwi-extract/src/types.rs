//! The structured shape C1 `CompleteStructured` is asked to return for one
//! text unit (§4.4): `{entities: [...], relationships: [...]}`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedRelationship {
    pub source_name: String,
    pub target_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rank: f32,
}

/// Canonicalizes a name for collision-stable keys (§4.4): trimmed, lowercased,
/// internal whitespace collapsed to a single space. Used both to key staged
/// relationships by `(project_id, canonicalized names, type-pair)` and to
/// match a relationship endpoint back to its entity's extracted type.
pub fn canonicalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_collapses_whitespace_and_case() {
        assert_eq!(canonicalize_name("  Acme   Corp \n"), "acme corp");
        assert_eq!(canonicalize_name("ACME CORP"), "acme corp");
    }
}
