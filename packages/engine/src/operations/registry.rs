// packages/engine/src/operations/registry.rs
//! Lookup from descriptor name to operation constructor
//!
//! Binding happens in two steps. `compile` checks a descriptor once, at
//! load time, and yields a `CompiledOperation`; `bind` then creates a fresh
//! `AtomicOperation` for every dispatch.

use crate::operations::atomic::AtomicOperation;
use crate::operations::builtin::register_builtins;
use crate::operations::schema::{validate_params, FieldSchema};
use crate::rules::model::OperationDescriptor;
use crate::runtime::context::RuntimeContext;
use crate::utils::errors::{EngineError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Creates an operation bound to a context
pub type Binder = Box<dyn Fn(Arc<RuntimeContext>) -> Box<dyn AtomicOperation> + Send + Sync>;

/// Checks a descriptor's params and prepares its binder
pub type Factory = Arc<dyn Fn(&OperationDescriptor) -> Result<Binder> + Send + Sync>;

struct RegistryEntry {
    fields: Vec<FieldSchema>,
    factory: Factory,
}

/// A validated descriptor, ready to bind
pub struct CompiledOperation {
    descriptor: OperationDescriptor,
    binder: Binder,
}

impl CompiledOperation {
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn is_async(&self) -> bool {
        self.descriptor.async_op
    }

    pub fn bind(&self, context: Arc<RuntimeContext>) -> Box<dyn AtomicOperation> {
        (self.binder)(context)
    }
}

impl std::fmt::Debug for CompiledOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledOperation")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registered operation variants
#[derive(Default)]
pub struct OperationRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl OperationRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `turn`, `press`, `wait`, `set_fact` and `recognize`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Add or replace a variant
    pub fn register<F>(&mut self, name: impl Into<String>, fields: Vec<FieldSchema>, factory: F) -> &mut Self
    where
        F: Fn(&OperationDescriptor) -> Result<Binder> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registered operation '{}' ({} fields)", name, fields.len());
        self.entries.insert(
            name,
            RegistryEntry {
                fields,
                factory: Arc::new(factory),
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Field schema of a variant, for the configuration UI
    pub fn fields(&self, name: &str) -> Option<&[FieldSchema]> {
        self.entries.get(name).map(|e| e.fields.as_slice())
    }

    pub fn validate(&self, descriptor: &OperationDescriptor) -> Result<()> {
        self.compile(descriptor).map(|_| ())
    }

    pub fn compile(&self, descriptor: &OperationDescriptor) -> Result<CompiledOperation> {
        let entry = self.entries.get(&descriptor.name).ok_or_else(|| {
            EngineError::ConfigError(format!("unknown operation '{}'", descriptor.name))
        })?;

        validate_params(&descriptor.name, &entry.fields, &descriptor.params)?;
        let binder = (entry.factory)(descriptor)?;

        Ok(CompiledOperation {
            descriptor: descriptor.clone(),
            binder,
        })
    }

    /// Compile and bind in one step
    pub fn instantiate(
        &self,
        descriptor: &OperationDescriptor,
        context: Arc<RuntimeContext>,
    ) -> Result<Box<dyn AtomicOperation>> {
        Ok(self.compile(descriptor)?.bind(context))
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}
