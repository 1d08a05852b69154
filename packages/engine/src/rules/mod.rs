// packages/engine/src/rules/mod.rs
//! Declarative rules
//!
//! - **Model**: fragments, rule nodes, operation descriptors, templates
//! - **Condition**: condition expression grammar and evaluation
//! - **Evaluator**: selects the rules that fire for a fact snapshot

pub mod condition;
pub mod evaluator;
pub mod model;

pub use condition::{CompareOp, Condition, ConditionError, FactSource, Literal};
pub use evaluator::{evaluate, matching_ids};
pub use model::{Fragment, OperationDescriptor, OperationTemplate, RuleNode};
