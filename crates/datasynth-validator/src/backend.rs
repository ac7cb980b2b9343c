//! jsonschema-backed implementation of the validator interface
//!
//! Everything specific to the backing library lives here: draft mapping,
//! option plumbing, resource registration, and the error-object mapping.
//! The rest of the system consumes the neutral [`ErrorObject`] shape.

use jsonschema::{Draft, ValidationError};
use serde_json::{Value, json};
use std::sync::Arc;

use datasynth_schema::Dialect;

use crate::flags::ValidatorFlags;
use crate::traits::{CompileError, CompiledSchema, ErrorObject, ValidationOutcome, Validator};

/// Keywords recognized when deriving the error keyword from a schema path.
const KNOWN_KEYWORDS: &[&str] = &[
    "type", "enum", "const", "pattern", "format", "minimum", "maximum", "exclusiveMinimum",
    "exclusiveMaximum", "multipleOf", "minLength", "maxLength", "minItems", "maxItems",
    "uniqueItems", "contains", "minContains", "maxContains", "items", "prefixItems",
    "additionalItems", "required", "properties", "patternProperties", "additionalProperties",
    "unevaluatedProperties", "unevaluatedItems", "propertyNames", "minProperties",
    "maxProperties", "dependentRequired", "dependentSchemas", "allOf", "anyOf", "oneOf", "not",
    "if", "$ref",
];

fn draft_for(dialect: Dialect) -> Draft {
    match dialect {
        Dialect::Draft4 => Draft::Draft4,
        Dialect::Draft7 => Draft::Draft7,
        Dialect::Draft2019 => Draft::Draft201909,
        Dialect::Draft2020 => Draft::Draft202012,
    }
}

/// A dialect-pinned validator instance backed by the jsonschema crate.
pub struct DialectValidator {
    dialect: Dialect,
    flags: ValidatorFlags,
    resources: Vec<(String, Value)>,
}

impl DialectValidator {
    #[must_use]
    pub fn new(dialect: Dialect, flags: ValidatorFlags) -> Self {
        Self { dialect, flags, resources: Vec::new() }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self, schema: &Value) -> Result<jsonschema::Validator, CompileError> {
        let mut options = jsonschema::options().with_draft(draft_for(self.dialect));
        if self.flags.validate_formats {
            options = options.should_validate_formats(true);
        }
        for (uri, doc) in &self.resources {
            let resource = jsonschema::Resource::from_contents(doc.clone());
            options = options.with_resource(uri.clone(), resource);
        }
        options.build(schema).map_err(|e| compile_error(&e))
    }
}

impl Validator for DialectValidator {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>, CompileError> {
        Ok(Arc::new(Compiled(self.build(schema)?)))
    }

    fn options(&self) -> &ValidatorFlags {
        &self.flags
    }

    fn add_schema(&mut self, schema: Value, uri: Option<String>) -> Result<(), CompileError> {
        let uri = uri
            .or_else(|| schema.get("$id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| CompileError::new("schema resource needs a URI or an $id"))?;
        self.resources.push((uri, schema));
        Ok(())
    }

    fn get_schema(&self, uri: &str) -> Option<Arc<dyn CompiledSchema>> {
        let (_, doc) = self.resources.iter().find(|(u, _)| u == uri)?;
        self.build(doc).ok().map(|v| Arc::new(Compiled(v)) as Arc<dyn CompiledSchema>)
    }
}

#[derive(Debug)]
struct Compiled(jsonschema::Validator);

impl CompiledSchema for Compiled {
    fn validate(&self, instance: &Value) -> ValidationOutcome {
        let errors: Vec<ErrorObject> = self.0.iter_errors(instance).map(|e| error_object(&e)).collect();
        ValidationOutcome { ok: errors.is_empty(), errors }
    }
}

fn compile_error(error: &ValidationError<'_>) -> CompileError {
    let message = error.to_string();
    let details = json!({
        "message": message,
        "schemaPath": error.schema_path().to_string(),
    });
    CompileError { message, details }
}

/// Map a backend error into the neutral error-object shape.
///
/// The keyword is the last keyword-looking segment of the schema path; the
/// params payload is populated only for the error kinds repair consumes
/// structurally.
fn error_object(error: &ValidationError<'_>) -> ErrorObject {
    let schema_path = error.schema_path().to_string();
    let keyword = keyword_of(&schema_path);
    let params = match error.kind() {
        jsonschema::error::ValidationErrorKind::Required { property } => {
            Some(json!({"missingProperty": property}))
        }
        jsonschema::error::ValidationErrorKind::AdditionalProperties { unexpected } => {
            Some(json!({"additionalProperties": unexpected}))
        }
        jsonschema::error::ValidationErrorKind::UnevaluatedProperties { unexpected } => {
            Some(json!({"unevaluatedProperties": unexpected}))
        }
        _ => None,
    };
    ErrorObject {
        keyword,
        message: Some(error.to_string()),
        schema_path: Some(schema_path),
        instance_path: error.instance_path().to_string(),
        params,
    }
}

fn keyword_of(schema_path: &str) -> String {
    schema_path
        .rsplit('/')
        .find(|segment| KNOWN_KEYWORDS.contains(segment))
        .unwrap_or("schema")
        .to_string()
}
