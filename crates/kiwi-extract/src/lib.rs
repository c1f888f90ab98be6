//! Extraction engine (C4): turns preprocessed text units into staged
//! entities and relationships for the merge engine (C5) to reconcile.

pub mod engine;
pub mod error;
pub mod prompt;
pub mod types;

pub use engine::{ExtractBatch, ExtractEngine, ExtractFile};
pub use error::{ExtractError, Result};
pub use prompt::extraction_prompt;
pub use types::{canonicalize_name, ExtractedEntity, ExtractedRelationship, ExtractionResult};
