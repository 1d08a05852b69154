// packages/engine/src/rules/model.rs
//! Declarative template model
//!
//! A fragment file looks like:
//!
//! ```yaml
//! imports: [common]
//! rules:
//!   - id: turn-left
//!     when: facing == east
//!     priority: 10
//!     exclusive: true
//!     operations:
//!       - name: turn
//!         params: { distance: -90 }
//! ```

use crate::rules::condition::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

/// A named atomic operation with its parameters. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDescriptor {
    /// Registry name of the operation variant
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,

    /// Dispatch without blocking the tick
    #[serde(default, skip_serializing_if = "is_false")]
    pub async_op: bool,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            async_op: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.async_op = true;
        self
    }
}

/// A condition plus the operations it triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleNode {
    /// Unique across all fragments of a template
    pub id: String,

    #[serde(default)]
    pub when: Condition,

    /// Higher wins among matching exclusive rules
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub exclusive: bool,

    /// A failing operation aborts the whole tick
    #[serde(default, skip_serializing_if = "is_false")]
    pub critical: bool,

    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

impl RuleNode {
    pub fn new(id: impl Into<String>, when: Condition) -> Self {
        Self {
            id: id.into(),
            when,
            priority: 0,
            exclusive: false,
            critical: false,
            operations: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }
}

/// One raw template file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fragment {
    /// Defaults to the file stem when loaded from disk
    #[serde(default)]
    pub name: String,

    /// Fragments that must precede this one in the merged order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,

    #[serde(default)]
    pub rules: Vec<RuleNode>,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_import(mut self, name: impl Into<String>) -> Self {
        self.imports.push(name.into());
        self
    }

    pub fn with_rule(mut self, rule: RuleNode) -> Self {
        self.rules.push(rule);
        self
    }
}

/// A complete template: the ordered rules of all its fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationTemplate {
    pub sub_dir: String,
    pub name: String,

    /// Fragment names in merge order
    #[serde(default)]
    pub fragments: Vec<String>,

    #[serde(default)]
    pub rules: Vec<RuleNode>,
}

impl OperationTemplate {
    pub fn rule(&self, id: &str) -> Option<&RuleNode> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn operation_count(&self) -> usize {
        self.rules.iter().map(|r| r.operations.len()).sum()
    }
}
