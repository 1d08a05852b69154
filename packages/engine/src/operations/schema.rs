// packages/engine/src/operations/schema.rs
//! Field metadata for operation parameters
//!
//! Consumed by the configuration UI to render editable parameters. The
//! engine only declares fields and checks descriptor params against them.

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Editor widget used for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Combo,
    KeyValue,
    CodeEditor,
}

/// Description of one configurable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Parameter key; appended to the owning variable name by the UI
    pub var_suffix: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,

    pub field_type: FieldType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placeholder: String,

    #[serde(default)]
    pub required: bool,

    /// Allowed values for `combo` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Syntax of `code_editor` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl FieldSchema {
    pub fn new(var_suffix: impl Into<String>, title: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            var_suffix: var_suffix.into(),
            title: title.into(),
            icon: String::new(),
            field_type,
            placeholder: String::new(),
            required: false,
            options: Vec::new(),
            default: None,
            language: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Check `params` of operation `operation` against its declared fields
pub fn validate_params(
    operation: &str,
    fields: &[FieldSchema],
    params: &BTreeMap<String, serde_json::Value>,
) -> Result<()> {
    for key in params.keys() {
        if !fields.iter().any(|f| &f.var_suffix == key) {
            return Err(EngineError::ConfigError(format!(
                "operation '{}' has no parameter '{}'",
                operation, key
            )));
        }
    }

    for field in fields {
        let value = params.get(&field.var_suffix).filter(|v| !v.is_null());
        match value {
            None if field.required && field.default.is_none() => {
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' is missing required parameter '{}'",
                    operation, field.var_suffix
                )));
            }
            Some(value) if field.field_type == FieldType::Combo && !field.options.is_empty() => {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if !field.options.contains(&text) {
                    return Err(EngineError::ConfigError(format!(
                        "operation '{}': '{}' is not one of {:?} for '{}'",
                        operation, text, field.options, field.var_suffix
                    )));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("key", "Key", FieldType::Text).required(),
            FieldSchema::new("mode", "Mode", FieldType::Combo).options(["tap", "hold"]),
        ]
    }

    fn params(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_accepts_valid_params() {
        assert!(validate_params("press", &fields(), &params(&[("key", json!("f"))])).is_ok());
        assert!(validate_params(
            "press",
            &fields(),
            &params(&[("key", json!("f")), ("mode", json!("hold"))])
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_missing_unknown_and_bad_option() {
        assert!(validate_params("press", &fields(), &params(&[])).is_err());
        assert!(validate_params("press", &fields(), &params(&[("key", json!(null))])).is_err());
        assert!(validate_params(
            "press",
            &fields(),
            &params(&[("key", json!("f")), ("speed", json!(2))])
        )
        .is_err());
        assert!(validate_params(
            "press",
            &fields(),
            &params(&[("key", json!("f")), ("mode", json!("spam"))])
        )
        .is_err());
    }

    #[test]
    fn test_serializes_snake_case() {
        let field = FieldSchema::new("script", "Script", FieldType::CodeEditor).language("lua");
        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["field_type"], json!("code_editor"));
        assert_eq!(value["language"], json!("lua"));
        assert!(value.get("options").is_none());
    }
}
