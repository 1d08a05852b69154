// packages/engine/src/operations/mod.rs
//! Atomic operations
//!
//! This module provides:
//! - The `AtomicOperation` capability set (`execute`, `stop`)
//! - Built-in variants (turn, press, wait, set_fact, recognize)
//! - A registry mapping descriptor names to constructors
//! - Field schemas describing each variant's parameters
//!
//! ```text
//! OperationDescriptor ──compile──► CompiledOperation ──bind(ctx)──► Box<dyn AtomicOperation>
//!        (YAML)          (load time, validated)          (per dispatch)
//! ```

pub mod atomic;
pub mod builtin;
pub mod registry;
pub mod schema;

pub use atomic::{AtomicOperation, OperationBase, StopSignal};
pub use registry::{Binder, CompiledOperation, Factory, OperationRegistry};
pub use schema::{validate_params, FieldSchema, FieldType};
