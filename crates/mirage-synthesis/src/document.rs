//! Generated-document handling
//!
//! Model output is free text. Turning it into a configuration document is
//! three explicit steps:
//! 1. [`extract_object_block`]: first balanced top-level `{...}` block
//! 2. [`parse_document`]: strict JSON parse, then lenient YAML parse
//! 3. [`normalize`]: strip metadata, assign identity, enforce the plugin rule

use crate::config::Protocol;
use crate::error::DocumentError;
use chrono::{DateTime, SecondsFormat, Utc};
use mirage_trace::blocks::extract_object_block;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Keys describing the schema itself rather than the configuration
pub const SCHEMA_METADATA_KEYS: [&str; 2] = ["$schema", "title"];

/// Which parser accepted a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// Strict JSON
    Json,
    /// Lenient YAML fallback
    Yaml,
}

/// Parse raw model output into a JSON object
///
/// # Errors
/// Returns [`DocumentError`] when the output is empty, neither parser
/// accepts it, or the root is not a mapping.
pub fn parse_document(raw: &str) -> Result<(Map<String, Value>, ParseStage), DocumentError> {
    let block = extract_object_block(raw);
    if block.is_empty() {
        return Err(DocumentError::Empty);
    }

    let (value, stage) = match serde_json::from_str::<Value>(block) {
        Ok(value) => (value, ParseStage::Json),
        Err(json_err) => match serde_yaml::from_str::<Value>(block) {
            Ok(value) => {
                tracing::debug!("Strict parse failed ({}), lenient parse succeeded", json_err);
                (value, ParseStage::Yaml)
            }
            Err(yaml_err) => {
                return Err(DocumentError::Unparseable {
                    json: json_err.to_string(),
                    yaml: yaml_err.to_string(),
                })
            }
        },
    };

    match value {
        Value::Object(map) => Ok((map, stage)),
        other => Err(DocumentError::NotAnObject(type_name(&other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a parsed document with a given identity
///
/// - drops [`SCHEMA_METADATA_KEYS`]
/// - sets `id` and `timestamp` (RFC 3339, UTC)
/// - removes any per-service `id`
/// - plugin-capable protocols get an explicit `plugin` (null when absent),
///   all other services lose the field
///
/// # Errors
/// Returns [`DocumentError::ServicesNotAList`] if `services` is present but
/// not a list.
pub fn normalize_with(
    mut document: Map<String, Value>,
    id: Uuid,
    timestamp: DateTime<Utc>,
) -> Result<Map<String, Value>, DocumentError> {
    for key in SCHEMA_METADATA_KEYS {
        document.remove(key);
    }
    document.insert("id".into(), Value::String(id.to_string()));
    document.insert(
        "timestamp".into(),
        Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    match document.get_mut("services") {
        None => {}
        Some(Value::Array(services)) => {
            for service in services.iter_mut().filter_map(Value::as_object_mut) {
                service.remove("id");
                let plugin_allowed = service
                    .get("protocol")
                    .and_then(Value::as_str)
                    .and_then(Protocol::parse)
                    .is_some_and(Protocol::supports_plugin);
                if plugin_allowed {
                    service.entry("plugin").or_insert(Value::Null);
                } else {
                    service.remove("plugin");
                }
            }
        }
        Some(_) => return Err(DocumentError::ServicesNotAList),
    }

    Ok(document)
}

/// Normalize with a fresh v4 id and the current time
///
/// # Errors
/// See [`normalize_with`].
pub fn normalize(document: Map<String, Value>) -> Result<Map<String, Value>, DocumentError> {
    normalize_with(document, Uuid::new_v4(), Utc::now())
}
