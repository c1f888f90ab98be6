//! Job dispatcher and worker (C6): consumes the three durable queues,
//! running preprocess, extract+merge, and delete phases against the
//! project graph, with stale-batch recovery on boot (§4.6).

pub mod delete;
pub mod engine;
pub mod error;
pub mod eta;
pub mod graph;
pub mod preprocess;
pub mod recovery;

pub use engine::{WorkerEngine, WorkerMode};
pub use error::{Result, WorkerError};
