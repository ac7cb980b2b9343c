//! Tier-2 rules: structural, guarded corrections

use serde_json::{Value, json};

use datasynth_compose::{NameDecider, Plan};
use datasynth_diagnostics::{Diagnostic, DiagnosticCode};
use datasynth_schema::{SchemaKind, SchemaNode};
use datasynth_validator::{CompiledSchema, ErrorObject};

use crate::locate::{minimal_value, node_for_instance_path};

/// Result of one Tier-2 application.
pub struct Tier2Outcome {
    pub detail: Value,
    pub diagnostics: Vec<Diagnostic>,
}

/// Apply a Tier-2 rule for `error`.
#[must_use]
pub fn apply(
    plan: &Plan,
    error: &ErrorObject,
    item: &mut Value,
    compiled: &dyn CompiledSchema,
) -> Option<Tier2Outcome> {
    match error.keyword.as_str() {
        "required" => apply_required(plan, error, item),
        "additionalProperties" | "unevaluatedProperties" => {
            apply_rename(plan, error, item, compiled)
        }
        _ => None,
    }
}

/// Insert a minimal value at the missing property.
fn apply_required(plan: &Plan, error: &ErrorObject, item: &mut Value) -> Option<Tier2Outcome> {
    let missing = error.params.as_ref()?.get("missingProperty")?.as_str()?.to_string();
    let node = node_for_instance_path(plan, &error.instance_path);
    let value = property_schema(node, &missing)
        .map_or_else(|| json!({}), |sub| minimal_value(plan, sub));
    let target = item.pointer_mut(&error.instance_path)?.as_object_mut()?;
    target.insert(missing.clone(), value);
    Some(Tier2Outcome {
        detail: json!({"added": missing}),
        diagnostics: Vec::new(),
    })
}

fn property_schema<'a>(node: Option<&'a SchemaNode>, name: &str) -> Option<&'a SchemaNode> {
    match &node?.kind {
        SchemaKind::Object(keywords) => keywords.property(name),
        _ => None,
    }
}

/// Rename offending extra keys onto the legal name set.
///
/// Only runs when the coverage index has a rename-capable decider at the
/// node (a `propertyNames` enum or pseudo-enum). Offenders are processed in
/// UTF-16 code-point order; targets are assigned round-robin. Every rename
/// is preflighted: it is rejected when it surfaces a new dependent-schema
/// or branch error relative to the pre-rename baseline.
fn apply_rename(
    plan: &Plan,
    error: &ErrorObject,
    item: &mut Value,
    compiled: &dyn CompiledSchema,
) -> Option<Tier2Outcome> {
    let params = error.params.as_ref()?;
    let offenders = params
        .get("additionalProperties")
        .or_else(|| params.get("unevaluatedProperties"))?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect::<Vec<_>>();
    if offenders.is_empty() {
        return None;
    }

    let node = node_for_instance_path(plan, &error.instance_path)?;
    let mut diagnostics = Vec::new();

    let Some(decider) = plan.coverage.get(&node.canon_path) else {
        // A closed view reachable only through composition has no index to
        // consult; renaming blind would guess at legality.
        if composed_view(plan, &error.instance_path) {
            diagnostics.push(Diagnostic::with_details(
                DiagnosticCode::MustcoverIndexMissing,
                &node.canon_path,
                json!({"instancePath": error.instance_path}),
            ));
            return Some(Tier2Outcome { detail: json!({"renamed": []}), diagnostics });
        }
        return None;
    };
    if !decider.supports_rename() {
        return None;
    }
    if matches!(decider, NameDecider::PseudoEnum(_)) {
        diagnostics.push(Diagnostic::with_details(
            DiagnosticCode::RepairPnamesPatternEnum,
            &node.canon_path,
            json!({"names": decider.allowed_names().len()}),
        ));
    }

    let object = item.pointer(&error.instance_path)?.as_object()?.clone();
    let mut available: Vec<String> = decider
        .allowed_names()
        .iter()
        .filter(|name| !object.contains_key(*name))
        .cloned()
        .collect();

    let mut offenders = offenders;
    offenders.sort_by_key(|name| name.encode_utf16().collect::<Vec<u16>>());

    // Baseline for the preflight: dependent/branch errors already present.
    let baseline = dependent_branch_errors(&compiled.validate(item).errors);

    let mut renamed: Vec<(String, String)> = Vec::new();
    let mut cursor = 0usize;
    for offender in &offenders {
        if available.is_empty() {
            break;
        }
        let target_name = available[cursor % available.len()].clone();

        let mut candidate = item.clone();
        if !rename_key(&mut candidate, &error.instance_path, offender, &target_name) {
            continue;
        }
        let after = dependent_branch_errors(&compiled.validate(&candidate).errors);
        if after.0 > baseline.0 || after.1 > baseline.1 {
            let reason = if after.0 > baseline.0 { "dependent" } else { "branch" };
            diagnostics.push(Diagnostic::with_details(
                DiagnosticCode::RepairRenamePreflightFail,
                &node.canon_path,
                json!({"from": offender, "to": target_name, "reason": reason}),
            ));
            continue;
        }

        *item = candidate;
        available.retain(|n| n != &target_name);
        if !available.is_empty() {
            cursor = (cursor + 1) % available.len();
        }
        renamed.push((offender.clone(), target_name));
    }

    if renamed.is_empty() && diagnostics.is_empty() {
        return None;
    }
    Some(Tier2Outcome {
        detail: json!({"renamed": renamed}),
        diagnostics,
    })
}

/// Counts of (dependent, branch) errors in a validation result.
fn dependent_branch_errors(errors: &[ErrorObject]) -> (usize, usize) {
    let dependent = errors
        .iter()
        .filter(|e| e.keyword == "dependentRequired" || e.keyword == "dependentSchemas")
        .count();
    let branch = errors.iter().filter(|e| e.keyword == "oneOf").count();
    (dependent, branch)
}

fn rename_key(item: &mut Value, instance_path: &str, from: &str, to: &str) -> bool {
    let Some(object) = item
        .pointer_mut(instance_path)
        .and_then(Value::as_object_mut)
    else {
        return false;
    };
    let Some(value) = object.remove(from) else { return false };
    object.insert(to.to_string(), value);
    true
}

/// Does the instance path land inside a composed view of the schema?
fn composed_view(plan: &Plan, instance_path: &str) -> bool {
    // The root composition is the common case; nested compositions are
    // found by walking raw (unresolved) kinds along the path prefix.
    if matches!(plan.normalized.root.kind, SchemaKind::Composition(_)) {
        return true;
    }
    let mut checked = String::new();
    for token in instance_path.trim_start_matches('/').split('/') {
        if token.is_empty() {
            continue;
        }
        checked.push('/');
        checked.push_str(token);
        if plan.branch_targets.contains_key(&checked) {
            return true;
        }
    }
    false
}
