// packages/engine/src/settings/mod.rs
//! Runtime-adjustable settings
//!
//! A `SettingsStore` persists scalars to YAML; a `PropertyAdapter` binds one
//! of them to an engine parameter, converting on read and write.

pub mod property;
pub mod store;

pub use property::{truthy, Converter, PropertyAdapter};
pub use store::SettingsStore;
