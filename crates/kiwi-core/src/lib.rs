//! Shared types, config, error taxonomy, and id/retry helpers used across
//! every `kiwi-*` crate.

pub mod config;
pub mod domain;
pub mod error;
pub mod ids;
pub mod retry;

pub use config::KiwiConfig;
pub use domain::*;
pub use error::{ErrorKind, KiwiError, Result};
