//! The narrow validator interface the pipeline consumes

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::flags::ValidatorFlags;

/// One validation error, in the shape repair and diagnostics consume.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorObject {
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "schemaPath", skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<String>,
    #[serde(rename = "instancePath")]
    pub instance_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Result of validating one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub errors: Vec<ErrorObject>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn valid() -> Self {
        Self { ok: true, errors: Vec::new() }
    }
}

/// Compilation failure, with a structured payload for ref classification.
#[derive(Error, Debug, Clone)]
#[error("schema compilation failed: {message}")]
pub struct CompileError {
    pub message: String,
    /// Free-form payload; the external-ref classifier walks it for
    /// candidate references.
    pub details: Value,
}

impl CompileError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let details = serde_json::json!({"message": message});
        Self { message, details }
    }
}

/// A compiled schema ready to validate instances.
pub trait CompiledSchema: Send + Sync + std::fmt::Debug {
    fn validate(&self, instance: &Value) -> ValidationOutcome;
}

/// The validator collaborator.
///
/// Implementations are stage-scoped: one Source and one Planning instance
/// per run, never shared across runs.
pub trait Validator: Send + Sync {
    /// Compile `schema` for validation.
    ///
    /// # Errors
    /// Returns a [`CompileError`] whose `details` payload carries whatever
    /// the backend reported, so unresolved-ref failures stay classifiable.
    fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>, CompileError>;

    /// The instance's option flags.
    fn options(&self) -> &ValidatorFlags;

    /// Register a schema resource under an optional URI.
    fn add_schema(&mut self, schema: Value, uri: Option<String>) -> Result<(), CompileError>;

    /// Fetch a previously registered schema by URI.
    fn get_schema(&self, uri: &str) -> Option<Arc<dyn CompiledSchema>>;
}
