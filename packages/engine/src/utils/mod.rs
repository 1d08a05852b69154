// packages/engine/src/utils/mod.rs
//! Common utilities shared by every engine module
//!
//! - **errors**: `EngineError` taxonomy and the crate-wide `Result` alias
//! - **config**: layered engine configuration (defaults, file, environment)
//! - **fs**: atomic file writes used by the template and settings stores

pub mod config;
pub mod errors;
pub mod fs;

pub use config::EngineConfig;
pub use errors::{ActionFailure, EngineError, Result};
