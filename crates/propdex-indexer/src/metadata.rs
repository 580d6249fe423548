//! Configuration metadata documents.
//!
//! A document lists `groups`, `properties` and `hints` for one source. Every
//! field other than `name` is optional, and unknown fields are ignored.

use crate::IndexerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deprecation severity of a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeprecationLevel {
    #[default]
    None,
    Warning,
    Error,
}

/// A parsed metadata document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub groups: Vec<GroupDeclaration>,

    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,

    #[serde(default)]
    pub hints: Vec<HintDeclaration>,
}

impl MetadataDocument {
    /// Parse a document, attributing failures to `path`.
    pub fn from_json(content: &str, path: &Path) -> Result<Self, IndexerError> {
        serde_json::from_str(content).map_err(|e| IndexerError::parse(path, e))
    }

    /// Read and parse a document from disk.
    pub fn load(path: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, path)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.properties.is_empty() && self.hints.is_empty()
    }
}

/// A namespace declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDeclaration {
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "type")]
    pub type_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub source_type: Option<String>,

    #[serde(default)]
    pub source_method: Option<String>,
}

/// A leaf key declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDeclaration {
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "type")]
    pub type_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub source_type: Option<String>,

    #[serde(default)]
    pub default_value: Option<serde_json::Value>,

    /// Legacy boolean flag, superseded by `deprecation`
    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub deprecation: Option<Deprecation>,
}

impl PropertyDeclaration {
    /// Effective deprecation level. A deprecation entry without a level is a warning.
    pub fn deprecation_level(&self) -> DeprecationLevel {
        match &self.deprecation {
            Some(deprecation) => deprecation.level.unwrap_or(DeprecationLevel::Warning),
            None if self.deprecated => DeprecationLevel::Warning,
            None => DeprecationLevel::None,
        }
    }

    /// Default value rendered for display.
    ///
    /// Arrays and objects have no single textual form and yield `None`.
    pub fn default_value_text(&self) -> Option<String> {
        render_scalar(self.default_value.as_ref()?, self.type_name.as_deref())
    }
}

/// Render a JSON scalar the way it would be written in a properties file.
pub(crate) fn render_scalar(value: &serde_json::Value, type_name: Option<&str>) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if is_integral_type(type_name) {
                if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                    if n.is_f64() {
                        return Some(format!("{}", f as i64));
                    }
                }
            }
            Some(n.to_string())
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_integral_type(type_name: Option<&str>) -> bool {
    matches!(
        type_name,
        Some(
            "java.lang.Integer"
                | "java.lang.Long"
                | "java.lang.Short"
                | "java.lang.Byte"
                | "int"
                | "long"
                | "short"
                | "byte"
        )
    )
}

/// Deprecation details of a property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deprecation {
    #[serde(default)]
    pub level: Option<DeprecationLevel>,

    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default)]
    pub replacement: Option<String>,
}

/// Value choices for a property, its map keys (`.keys`) or its map values (`.values`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintDeclaration {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub values: Vec<HintValue>,

    #[serde(default)]
    pub providers: Vec<ValueProvider>,
}

/// One literal choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintValue {
    #[serde(default)]
    pub value: serde_json::Value,

    #[serde(default)]
    pub description: Option<String>,
}

/// A named value provider. Kept for documentation only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueProvider {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}
