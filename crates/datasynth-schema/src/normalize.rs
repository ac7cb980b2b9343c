//! The Normalize stage
//!
//! Source schema → canonical AST + pointer map + notes. Embedded duplicate
//! meta-schema declarations are stripped so the canonical form has exactly
//! one dialect, detected at the root.

use serde_json::Value;
use thiserror::Error;

use datasynth_diagnostics::{Diagnostic, DiagnosticCode};
use datasynth_utils::pointer::{PointerError, PointerMap, join};

use crate::ast::SchemaNode;
use crate::dialect::Dialect;
use crate::parse::parse_node;

/// Errors that abort normalization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid constraint at {pointer}: {reason}")]
    InvalidConstraint { pointer: String, reason: String },

    #[error("pointer error: {0}")]
    Pointer(#[from] PointerError),
}

/// Output of the Normalize stage. Write-once per run.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Canonical JSON form of the schema (embedded duplicate meta stripped).
    pub schema: Value,
    pub root: SchemaNode,
    pub dialect: Dialect,
    pub ptr_map: PointerMap,
    /// Explanatory notes, all with phase NORMALIZE.
    pub notes: Vec<Diagnostic>,
}

impl Normalized {
    /// Resolve an internal `#/...` reference against the canonical JSON.
    #[must_use]
    pub fn resolve_internal_ref(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        if pointer.is_empty() {
            return Some(&self.schema);
        }
        self.schema.pointer(pointer)
    }
}

/// Normalize a source schema.
///
/// # Errors
/// Fails on malformed constraints (non-positive `multipleOf`, non-finite
/// bounds, malformed `enum`/`type`).
pub fn normalize(schema: &Value) -> Result<Normalized, NormalizeError> {
    let dialect = Dialect::detect(schema);
    let mut notes = Vec::new();

    let mut canonical = schema.clone();
    let root_meta = schema.get("$schema").and_then(Value::as_str).map(str::to_string);
    if let Some(root_meta) = &root_meta
        && let Some(obj) = canonical.as_object_mut()
    {
        for (key, sub) in obj.iter_mut() {
            if key != "$schema" {
                strip_embedded_meta(sub, root_meta, &join("", key), &mut notes);
            }
        }
    }

    let mut ptr_map = PointerMap::new();
    let root = parse_node(&canonical, "", "", dialect, &mut ptr_map, &mut notes)?;

    Ok(Normalized {
        schema: canonical,
        root,
        dialect,
        ptr_map,
        notes,
    })
}

fn strip_embedded_meta(value: &mut Value, root_meta: &str, path: &str, notes: &mut Vec<Diagnostic>) {
    match value {
        Value::Object(obj) => {
            if obj.get("$schema").and_then(Value::as_str) == Some(root_meta) {
                obj.remove("$schema");
                notes.push(Diagnostic::with_details(
                    DiagnosticCode::EmbeddedMetaSchemaStripped,
                    path,
                    serde_json::json!({"meta": root_meta}),
                ));
            }
            for (key, sub) in obj.iter_mut() {
                strip_embedded_meta(sub, root_meta, &join(path, key), notes);
            }
        }
        Value::Array(items) => {
            for (idx, sub) in items.iter_mut().enumerate() {
                strip_embedded_meta(sub, root_meta, &format!("{path}/{idx}"), notes);
            }
        }
        _ => {}
    }
}
