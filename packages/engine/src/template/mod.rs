// packages/engine/src/template/mod.rs
//! Template persistence and merge
//!
//! - **Merge**: pure fragment merge and the merged-artifact encoding
//! - **Store**: reads fragments or merged artifacts, writes artifacts atomically

pub mod merge;
pub mod store;

pub use merge::{merge, MergedArtifact};
pub use store::TemplateStore;
