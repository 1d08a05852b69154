// packages/engine/src/settings/property.rs
//! Binds one persisted setting to a runtime parameter

use crate::settings::store::SettingsStore;
use crate::utils::errors::{EngineError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Value transform applied on read or on write
pub type Converter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Accessor for a named setting with an optional converter on each side.
///
/// `get` returns the stored value (or the default) passed through the
/// get-time converter. `set` stores the value after the set-time converter.
#[derive(Clone)]
pub struct PropertyAdapter {
    store: Arc<SettingsStore>,
    key: String,
    default: Value,
    on_get: Option<Converter>,
    on_set: Option<Converter>,
}

impl PropertyAdapter {
    pub fn new(store: Arc<SettingsStore>, key: impl Into<String>, default: Value) -> Self {
        Self {
            store,
            key: key.into(),
            default,
            on_get: None,
            on_set: None,
        }
    }

    pub fn on_get<F>(mut self, convert: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.on_get = Some(Arc::new(convert));
        self
    }

    pub fn on_set<F>(mut self, convert: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.on_set = Some(Arc::new(convert));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> Value {
        let value = self.store.get(&self.key).unwrap_or_else(|| self.default.clone());
        match &self.on_get {
            Some(convert) => convert(value),
            None => value,
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.get()).map_err(|e| {
            EngineError::ConfigError(format!("setting '{}' has the wrong type: {}", self.key, e))
        })
    }

    pub fn set(&self, value: Value) -> Result<()> {
        let value = match &self.on_set {
            Some(convert) => convert(value),
            None => value,
        };
        self.store.set(self.key.clone(), value)
    }
}

impl std::fmt::Debug for PropertyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyAdapter")
            .field("key", &self.key)
            .field("default", &self.default)
            .field("on_get", &self.on_get.is_some())
            .field("on_set", &self.on_set.is_some())
            .finish()
    }
}

/// Reads "yes"/"on"/"1" style strings as booleans
pub fn truthy(value: Value) -> Value {
    match value {
        Value::String(s) => Value::Bool(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )),
        Value::Number(n) => Value::Bool(n.as_f64().map_or(false, |n| n != 0.0)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_when_unset() {
        let store = Arc::new(SettingsStore::in_memory());
        let prop = PropertyAdapter::new(store, "tick_interval_ms", json!(200));
        assert_eq!(prop.get(), json!(200));
        assert_eq!(prop.get_as::<u64>().unwrap(), 200);
    }

    #[test]
    fn test_converters_apply_on_each_side() {
        let store = Arc::new(SettingsStore::in_memory());
        let prop = PropertyAdapter::new(Arc::clone(&store), "read_from_merged", json!(false))
            .on_get(truthy)
            .on_set(|v| Value::String(v.to_string()));

        prop.set(json!(true)).unwrap();
        assert_eq!(store.get("read_from_merged"), Some(json!("true")));
        assert!(prop.get_as::<bool>().unwrap());

        store.set("read_from_merged", json!("off")).unwrap();
        assert!(!prop.get_as::<bool>().unwrap());
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let store = Arc::new(SettingsStore::in_memory());
        store.set("hold_ms", json!("long")).unwrap();
        let prop = PropertyAdapter::new(store, "hold_ms", json!(50));
        assert!(matches!(prop.get_as::<u64>(), Err(EngineError::ConfigError(_))));
    }
}
