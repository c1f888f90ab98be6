//! Knowledge-graph store (C3): PostgreSQL + pgvector + pg_trgm schema,
//! advisory locking, staging area, and hybrid vector/keyword retrieval.

pub mod batches;
pub mod entities;
pub mod error;
pub mod hybrid;
pub mod locks;
pub mod project_files;
pub mod projects;
pub mod relationships;
pub mod schema;
pub mod sources;
pub mod staging;
pub mod store;
pub mod text_units;
pub mod types;

pub use error::{Result, StoreError};
pub use locks::{AdvisoryLockGuard, RECOVERY_LEADER_LOCK_KEY};
pub use relationships::{edge_weight, PathStep};
pub use store::GraphStore;
