//! External-ref detection and skip-eligibility classification

use serde_json::{Value, json};
use std::collections::BTreeSet;

use datasynth_diagnostics::{Diagnostic, DiagnosticCode};
use datasynth_validator::{CompileError, Validator};

use crate::policy::RunMode;

/// Maximum recursion depth when walking an error payload for refs.
const EXTRACT_DEPTH: usize = 4;

/// Payload keys that may carry candidate references.
const REF_KEYS: &[&str] = &["missingRef", "missingSchema", "ref", "message"];

/// Is `reference` external (absolute, or not `#`-local)?
#[must_use]
pub fn is_external_ref(reference: &str) -> bool {
    !reference.is_empty() && !reference.starts_with('#')
}

/// Does the schema contain any external `$ref`?
#[must_use]
pub fn schema_has_external_refs(schema: &Value) -> bool {
    !collect_external_refs(schema).is_empty()
}

/// All external references in the schema, sorted and deduplicated.
#[must_use]
pub fn collect_external_refs(schema: &Value) -> Vec<String> {
    let mut refs = BTreeSet::new();
    walk_refs(schema, &mut refs);
    refs.into_iter().collect()
}

fn walk_refs(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str)
                && is_external_ref(reference)
            {
                refs.insert(reference.to_string());
            }
            for sub in obj.values() {
                walk_refs(sub, refs);
            }
        }
        Value::Array(items) => {
            for sub in items {
                walk_refs(sub, refs);
            }
        }
        _ => {}
    }
}

/// A compile failure classified for skip-eligibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRefFailure {
    /// Candidate references extracted from the error payload.
    pub refs: Vec<String>,
    /// True when every reported missing ref is external.
    pub skip_eligible: bool,
    pub message: String,
}

/// Attempt compilation with the Source validator and classify a failure.
///
/// Returns `None` when the schema compiles. The error payload is walked
/// recursively (`missingRef`/`missingSchema`/`ref`/`params.ref`/`errors[]`/
/// `cause`/`message`, depth-capped) for candidate references;
/// `skip_eligible` is set only when candidates exist and all are external.
#[must_use]
pub fn classify_external_ref_failure(
    validator: &dyn Validator,
    schema: &Value,
) -> Option<ExternalRefFailure> {
    let error = match validator.compile(schema) {
        Ok(_) => return None,
        Err(error) => error,
    };
    Some(classify_compile_error(&error, schema))
}

fn classify_compile_error(error: &CompileError, schema: &Value) -> ExternalRefFailure {
    let mut candidates = BTreeSet::new();
    extract_refs(&error.details, 0, &mut candidates);
    // Error payloads vary by backend; the schema's own external refs anchor
    // the candidate set when the payload mentions none of them.
    if candidates.is_empty() {
        for reference in collect_external_refs(schema) {
            candidates.insert(reference);
        }
    }
    let refs: Vec<String> = candidates.into_iter().collect();
    let skip_eligible = !refs.is_empty() && refs.iter().all(|r| is_external_ref(r));
    ExternalRefFailure {
        refs,
        skip_eligible,
        message: error.message.clone(),
    }
}

fn extract_refs(value: &Value, depth: usize, out: &mut BTreeSet<String>) {
    if depth > EXTRACT_DEPTH {
        return;
    }
    match value {
        Value::Object(obj) => {
            for key in REF_KEYS {
                if let Some(Value::String(s)) = obj.get(*key) {
                    if *key == "message" {
                        extract_refs_from_text(s, out);
                    } else {
                        out.insert(s.clone());
                    }
                }
            }
            for key in ["params", "cause"] {
                if let Some(sub) = obj.get(key) {
                    extract_refs(sub, depth + 1, out);
                }
            }
            if let Some(Value::Array(errors)) = obj.get("errors") {
                for sub in errors {
                    extract_refs(sub, depth + 1, out);
                }
            }
        }
        Value::String(s) => extract_refs_from_text(s, out),
        _ => {}
    }
}

/// Pull URL-shaped references out of free-form error text.
fn extract_refs_from_text(text: &str, out: &mut BTreeSet<String>) {
    for scheme in ["https://", "http://"] {
        let mut rest = text;
        while let Some(start) = rest.find(scheme) {
            let tail = &rest[start..];
            let end = tail
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ')')
                .unwrap_or(tail.len());
            let candidate = tail[..end].trim_end_matches([',', '.', ';']);
            if candidate.len() > scheme.len() {
                out.insert(candidate.to_string());
            }
            rest = &tail[end.min(tail.len())..];
        }
    }
}

/// The policy diagnostic for one unresolved external reference.
#[must_use]
pub fn create_external_ref_diagnostic(
    reference: &str,
    mode: RunMode,
    skipped_validation: Option<bool>,
    policy: Option<&str>,
) -> Diagnostic {
    let mut details = json!({
        "ref": reference,
        "mode": mode.as_str(),
    });
    if let Some(skipped) = skipped_validation {
        details["skippedValidation"] = json!(skipped);
    }
    if let Some(policy) = policy {
        details["policy"] = json!(policy);
    }
    Diagnostic::with_details(DiagnosticCode::ExternalRefUnresolved, "", details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasynth_schema::Dialect;
    use datasynth_validator::{ValidateOptions, source_validator};

    #[test]
    fn test_external_detection() {
        assert!(is_external_ref("https://example.com/s.json"));
        assert!(is_external_ref("other.json#/defs/a"));
        assert!(!is_external_ref("#/$defs/a"));
        assert!(!is_external_ref("#"));
    }

    #[test]
    fn test_collect_external_refs() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"$ref": "#/$defs/local"},
                "b": {"$ref": "https://example.com/b.json"},
                "c": {"items": {"$ref": "https://example.com/c.json#/X"}}
            }
        });
        let refs = collect_external_refs(&schema);
        assert_eq!(
            refs,
            vec![
                "https://example.com/b.json".to_string(),
                "https://example.com/c.json#/X".to_string()
            ]
        );
        assert!(schema_has_external_refs(&schema));
    }

    #[test]
    fn test_classify_skip_eligible() {
        let validator = source_validator(Dialect::Draft2020, &ValidateOptions::default());
        let schema = json!({"$ref": "https://example.com/external.schema.json#/Supplier"});
        let failure = classify_external_ref_failure(&validator, &schema).expect("compile fails");
        assert!(failure.skip_eligible);
        assert!(
            failure
                .refs
                .iter()
                .any(|r| r.starts_with("https://example.com/external.schema.json"))
        );
    }

    #[test]
    fn test_classify_compiling_schema_returns_none() {
        let validator = source_validator(Dialect::Draft2020, &ValidateOptions::default());
        assert!(classify_external_ref_failure(&validator, &json!({"type": "string"})).is_none());
    }

    #[test]
    fn test_extract_refs_nested_payload() {
        let payload = json!({
            "errors": [
                {"params": {"ref": "https://example.com/a.json"}},
                {"cause": {"missingRef": "https://example.com/b.json"}}
            ],
            "message": "could not resolve https://example.com/c.json, giving up"
        });
        let mut out = BTreeSet::new();
        extract_refs(&payload, 0, &mut out);
        let refs: Vec<&str> = out.iter().map(String::as_str).collect();
        assert_eq!(
            refs,
            vec![
                "https://example.com/a.json",
                "https://example.com/b.json",
                "https://example.com/c.json"
            ]
        );
    }

    #[test]
    fn test_depth_cap() {
        let mut deep = json!({"missingRef": "https://example.com/deep.json"});
        for _ in 0..6 {
            deep = json!({"cause": deep});
        }
        let mut out = BTreeSet::new();
        extract_refs(&deep, 0, &mut out);
        assert!(out.is_empty(), "payload beyond depth 4 must be ignored");
    }

    #[test]
    fn test_diagnostic_shape() {
        let diag = create_external_ref_diagnostic(
            "https://example.com/x.json",
            RunMode::Strict,
            Some(true),
            Some("warn"),
        );
        let details = diag.details.unwrap();
        assert_eq!(details["ref"], "https://example.com/x.json");
        assert_eq!(details["mode"], "strict");
        assert_eq!(details["skippedValidation"], true);
        assert_eq!(details["policy"], "warn");

        let bare = create_external_ref_diagnostic("https://e.com/y", RunMode::Strict, None, None);
        let details = bare.details.unwrap();
        assert!(details.get("skippedValidation").is_none());
    }
}
