// packages/engine/src/lib.rs
//! Autopilot Engine Library
//!
//! Conditional-operation execution engine for game automation: loads
//! declarative operation templates, evaluates rule conditions against live
//! context every tick and dispatches atomic operations against a controller.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **rules**: Template model, condition grammar and the rule evaluator
//! - **template**: Fragment merging and template persistence
//! - **operations**: Atomic operations, built-ins and the registry
//! - **runtime**: GPU lane, runtime context, operator and session loop
//! - **events**: Reportable events and their sinks
//! - **settings**: Persisted settings and property adapters
//! - **observability**: Tracing and metrics setup
//! - **utils**: Configuration, errors and filesystem helpers

// Public module exports
pub mod events;
pub mod observability;
pub mod operations;
pub mod rules;
pub mod runtime;
pub mod settings;
pub mod template;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use operations::{AtomicOperation, OperationRegistry};
pub use rules::{Condition, OperationDescriptor, OperationTemplate, RuleNode};
pub use runtime::{GpuLane, Operator, OperatorState, RuntimeContext, Session};
pub use template::TemplateStore;
pub use utils::config::EngineConfig;
pub use utils::errors::{ActionFailure, EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
