//! Descriptor parser: converts raw TOML/JSON text into a [`File`].

use std::path::Path;

use super::file::File;
use super::identity;
use crate::error::{CompileError, CompileResult};

/// Supported descriptor input formats.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorFormat {
    /// TOML format (`Appfile` / `Appfile.toml`).
    Toml,
    /// JSON format (`Appfile.json`).
    Json,
}

impl DescriptorFormat {
    /// Pick the format from a file name, defaulting to TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => DescriptorFormat::Json,
            _ => DescriptorFormat::Toml,
        }
    }
}

/// Parse descriptor content into a [`File`]. The result has no path or
/// identity; see [`parse_descriptor_file`] for the on-disk entry point.
pub fn parse_descriptor(content: &str, format: DescriptorFormat) -> CompileResult<File> {
    match format {
        DescriptorFormat::Json => {
            serde_json::from_str(content).map_err(|e| CompileError::Parse(e.to_string()))
        }
        DescriptorFormat::Toml => {
            // Parse TOML → toml::Value, then convert to serde_json::Value,
            // and finally deserialize into File. The two-step conversion
            // keeps free-form config maps (serde_json::Value) intact.
            let toml_val: toml::Value =
                toml::from_str(content).map_err(|e| CompileError::Parse(e.to_string()))?;
            let json_val = toml_value_to_json(toml_val);
            serde_json::from_value(json_val).map_err(|e| CompileError::Parse(e.to_string()))
        }
    }
}

/// Parse a descriptor from disk, recording its absolute path and loading
/// its persisted identity if the identity file exists.
pub fn parse_descriptor_file(path: &Path) -> CompileResult<File> {
    let path = std::fs::canonicalize(path)?;
    let content = std::fs::read_to_string(&path)?;
    let mut file = parse_descriptor(&content, DescriptorFormat::from_path(&path))?;
    file.path = Some(path.clone());
    if let Some(id) = identity::load_id(&path)? {
        file.id = id;
    }
    Ok(file)
}

/// Convert a [`toml::Value`] into a [`serde_json::Value`].
///
/// TOML has no null type, so `Datetime` values are stringified.
fn toml_value_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(tbl) => {
            let map: serde_json::Map<String, serde_json::Value> = tbl
                .into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}
