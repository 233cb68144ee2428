//! Schema validation of normalized configuration documents
//!
//! The bundled reference schema describes the honeypot's service file format
//! (draft-07). Any other draft-07 schema can be supplied instead.

use crate::error::SynthesisError;
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Bundled reference schema
pub const REFERENCE_SCHEMA: &str = include_str!("../schema/services_schema.json");

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (empty for the root)
    pub path: String,
    /// Validator message
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Compiled configuration schema
pub struct ConfigValidator {
    compiled: JSONSchema,
    schema: Value,
}

impl ConfigValidator {
    /// Compile a draft-07 schema
    ///
    /// # Errors
    /// Returns [`SynthesisError::InvalidSchema`] if the schema does not compile.
    pub fn new(schema: Value) -> Result<Self, SynthesisError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| SynthesisError::InvalidSchema(e.to_string()))?;
        Ok(Self { compiled, schema })
    }

    /// Compile the bundled reference schema
    ///
    /// # Errors
    /// Only fails if the bundled schema is corrupt.
    pub fn reference() -> Result<Self, SynthesisError> {
        Self::new(serde_json::from_str(REFERENCE_SCHEMA)?)
    }

    /// Schema document, for inclusion in generation prompts
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a document
    ///
    /// # Errors
    /// Returns every violation found; never panics on malformed input.
    pub fn validate(&self, document: &Value) -> Result<(), Vec<SchemaViolation>> {
        self.compiled.validate(document).map_err(|errors| {
            errors
                .map(|error| SchemaViolation {
                    path: error.instance_path.to_string(),
                    message: error.to_string(),
                })
                .collect()
        })
    }

    /// Whether a document is valid
    #[inline]
    #[must_use]
    pub fn is_valid(&self, document: &Value) -> bool {
        self.compiled.is_valid(document)
    }
}

impl fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigValidator")
            .field(
                "title",
                &self.schema.get("title").and_then(Value::as_str).unwrap_or("untitled"),
            )
            .finish_non_exhaustive()
    }
}
