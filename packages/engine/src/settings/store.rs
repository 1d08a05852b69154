// packages/engine/src/settings/store.rs
//! Persisted key/value settings

use crate::utils::errors::{EngineError, Result};
use crate::utils::fs::atomic_write;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flat map of settings, optionally backed by a YAML file
#[derive(Debug, Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl SettingsStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a YAML-backed store; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(data) if data.trim().is_empty() => BTreeMap::new(),
            Ok(data) => serde_yaml::from_str(&data)
                .map_err(|e| EngineError::parse(path.display().to_string(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(EngineError::io(&path, e)),
        };
        debug!("Opened settings {:?} ({} keys)", path, values.len());

        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Set and persist
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.into(), value);
        self.persist(&values)
    }

    /// Remove and persist; returns the old value
    pub fn remove(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut values = self.values.write();
        let old = values.remove(key);
        if old.is_some() {
            self.persist(&values)?;
        }
        Ok(old)
    }

    fn persist(&self, values: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_yaml::to_string(values)?;
        atomic_write(path, data.as_bytes())
    }
}
