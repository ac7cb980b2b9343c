//! Source schema → canonical AST
//!
//! Parsing rewrites dialect quirks into one canonical shape:
//!
//! - draft-04 boolean `exclusiveMinimum`/`exclusiveMaximum` become numeric
//!   bounds (numeric spellings under draft-04 are tolerated with a note),
//! - pre-2020 array-form `items` becomes `prefixItems` + `items`,
//! - union `type` arrays become an `anyOf` of single-type views,
//! - `dependencies` splits into `dependentRequired`/`dependentSchemas`.
//!
//! When `exclusiveMinimum` and `minimum` are both present the tighter bound
//! wins and the slack one is dropped.

use serde_json::{Map, Value};

use datasynth_diagnostics::{Diagnostic, DiagnosticCode};
use datasynth_utils::pointer::{PointerMap, join};

use crate::ast::{
    AdditionalProperties, ArrayKeywords, Composition, IfThenElse, NumberKeywords, ObjectKeywords,
    SchemaKind, SchemaNode, StringKeywords,
};
use crate::dialect::Dialect;
use crate::normalize::NormalizeError;

/// Keywords that make a `$ref` sibling set worth keeping as a base schema.
const SHAPE_KEYWORDS: &[&str] = &[
    "type", "enum", "const", "properties", "required", "items", "prefixItems", "minimum",
    "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf", "minLength", "maxLength",
    "pattern", "format", "minItems", "maxItems", "uniqueItems", "contains", "patternProperties",
    "additionalProperties", "propertyNames", "minProperties", "maxProperties",
];

/// Parse one canonical node out of `value`.
///
/// `canon_path` is where the node lands in the canonical tree, `orig_path`
/// where it came from; the pair is recorded in `ptr_map`.
pub fn parse_node(
    value: &Value,
    canon_path: &str,
    orig_path: &str,
    dialect: Dialect,
    ptr_map: &mut PointerMap,
    notes: &mut Vec<Diagnostic>,
) -> Result<SchemaNode, NormalizeError> {
    ptr_map.map_canon_to_orig(canon_path, orig_path)?;

    let obj = match value {
        Value::Bool(true) => return Ok(SchemaNode::any(canon_path)),
        Value::Bool(false) => {
            let mut node = SchemaNode::any(canon_path);
            node.kind = SchemaKind::Never;
            return Ok(node);
        }
        Value::Object(obj) => obj,
        other => {
            return Err(NormalizeError::InvalidConstraint {
                pointer: orig_path.to_string(),
                reason: format!("schema must be an object or boolean, got {other}"),
            });
        }
    };

    let enum_values = match obj.get("enum") {
        Some(Value::Array(items)) => Some(items.clone()),
        Some(other) => {
            return Err(NormalizeError::InvalidConstraint {
                pointer: orig_path.to_string(),
                reason: format!("enum must be an array, got {other}"),
            });
        }
        None => None,
    };
    let const_value = obj.get("const").cloned();
    let default = obj.get("default").cloned();
    let examples = match obj.get("examples") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let kind = parse_kind(obj, canon_path, orig_path, dialect, ptr_map, notes)?;

    Ok(SchemaNode {
        canon_path: canon_path.to_string(),
        kind,
        enum_values,
        const_value,
        default,
        examples,
    })
}

fn parse_kind(
    obj: &Map<String, Value>,
    canon_path: &str,
    orig_path: &str,
    dialect: Dialect,
    ptr_map: &mut PointerMap,
    notes: &mut Vec<Diagnostic>,
) -> Result<SchemaKind, NormalizeError> {
    if let Some(target) = obj.get("$ref").and_then(Value::as_str) {
        let reference = SchemaKind::Reference(target.to_string());
        let has_siblings = obj.keys().any(|k| SHAPE_KEYWORDS.contains(&k.as_str()))
            || has_composition(obj);
        if !has_siblings {
            return Ok(reference);
        }
        // 2019-09+ gives $ref siblings conjunctive meaning; older dialects
        // ignore them, and dropping them canonically would lose intent.
        let mut trimmed = obj.clone();
        trimmed.remove("$ref");
        let base = parse_node(
            &Value::Object(trimmed),
            &join(canon_path, "base"),
            orig_path,
            dialect,
            ptr_map,
            notes,
        )?;
        let mut ref_node = SchemaNode::any(&join(canon_path, "$ref"));
        ref_node.kind = reference;
        ptr_map.map_canon_to_orig(&ref_node.canon_path, &join(orig_path, "$ref"))?;
        return Ok(SchemaKind::Composition(Composition {
            base: Some(Box::new(base)),
            all_of: vec![ref_node],
            any_of: Vec::new(),
            one_of: Vec::new(),
            not: None,
            if_then_else: None,
        }));
    }

    if has_composition(obj) {
        return parse_composition(obj, canon_path, orig_path, dialect, ptr_map, notes);
    }

    match obj.get("type") {
        Some(Value::String(type_name)) => {
            parse_typed(obj, type_name, canon_path, orig_path, dialect, ptr_map, notes)
        }
        Some(Value::Array(type_names)) => {
            // Union type: canonically an anyOf of single-type views.
            let mut branches = Vec::with_capacity(type_names.len());
            for (idx, entry) in type_names.iter().enumerate() {
                let Some(type_name) = entry.as_str() else {
                    return Err(NormalizeError::InvalidConstraint {
                        pointer: orig_path.to_string(),
                        reason: "type array entries must be strings".to_string(),
                    });
                };
                let branch_path = format!("{}/anyOf/{idx}", if canon_path == "/" { "" } else { canon_path });
                ptr_map.map_canon_to_orig(&branch_path, &join(orig_path, "type"))?;
                let kind = parse_typed(obj, type_name, &branch_path, orig_path, dialect, ptr_map, notes)?;
                let mut node = SchemaNode::any(&branch_path);
                node.kind = kind;
                branches.push(node);
            }
            Ok(SchemaKind::Composition(Composition {
                base: None,
                all_of: Vec::new(),
                any_of: branches,
                one_of: Vec::new(),
                not: None,
                if_then_else: None,
            }))
        }
        Some(other) => Err(NormalizeError::InvalidConstraint {
            pointer: orig_path.to_string(),
            reason: format!("type must be a string or array, got {other}"),
        }),
        None => {
            if obj.contains_key("enum") || obj.contains_key("const") {
                return Ok(SchemaKind::EnumOnly);
            }
            if let Some(inferred) = infer_type(obj) {
                return parse_typed(obj, inferred, canon_path, orig_path, dialect, ptr_map, notes);
            }
            Ok(SchemaKind::Any)
        }
    }
}

fn has_composition(obj: &Map<String, Value>) -> bool {
    ["allOf", "anyOf", "oneOf", "not", "if"].iter().any(|k| obj.contains_key(*k))
}

/// Keyword-based type inference for schemas without `type`.
fn infer_type(obj: &Map<String, Value>) -> Option<&'static str> {
    const OBJECT_HINTS: &[&str] = &[
        "properties", "required", "patternProperties", "additionalProperties", "propertyNames",
        "minProperties", "maxProperties", "dependentRequired", "dependentSchemas",
    ];
    const ARRAY_HINTS: &[&str] =
        &["items", "prefixItems", "minItems", "maxItems", "uniqueItems", "contains"];
    const STRING_HINTS: &[&str] = &["minLength", "maxLength", "pattern", "format"];
    const NUMBER_HINTS: &[&str] =
        &["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf"];

    if OBJECT_HINTS.iter().any(|k| obj.contains_key(*k)) {
        Some("object")
    } else if ARRAY_HINTS.iter().any(|k| obj.contains_key(*k)) {
        Some("array")
    } else if STRING_HINTS.iter().any(|k| obj.contains_key(*k)) {
        Some("string")
    } else if NUMBER_HINTS.iter().any(|k| obj.contains_key(*k)) {
        Some("number")
    } else {
        None
    }
}

fn parse_composition(
    obj: &Map<String, Value>,
    canon_path: &str,
    orig_path: &str,
    dialect: Dialect,
    ptr_map: &mut PointerMap,
    notes: &mut Vec<Diagnostic>,
) -> Result<SchemaKind, NormalizeError> {
    let mut parse_list = |keyword: &str| -> Result<Vec<SchemaNode>, NormalizeError> {
        let Some(Value::Array(entries)) = obj.get(keyword) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let sub_canon = format!("{}/{keyword}/{idx}", if canon_path == "/" { "" } else { canon_path });
            let sub_orig = format!("{}/{keyword}/{idx}", if orig_path == "/" { "" } else { orig_path });
            out.push(parse_node(entry, &sub_canon, &sub_orig, dialect, ptr_map, notes)?);
        }
        Ok(out)
    };

    let all_of = parse_list("allOf")?;
    let any_of = parse_list("anyOf")?;
    let one_of = parse_list("oneOf")?;

    let not = match obj.get("not") {
        Some(sub) => Some(Box::new(parse_node(
            sub,
            &join(canon_path, "not"),
            &join(orig_path, "not"),
            dialect,
            ptr_map,
            notes,
        )?)),
        None => None,
    };

    let if_then_else = match obj.get("if") {
        Some(if_schema) => {
            let r#if = parse_node(
                if_schema,
                &join(canon_path, "if"),
                &join(orig_path, "if"),
                dialect,
                ptr_map,
                notes,
            )?;
            let then = match obj.get("then") {
                Some(sub) => Some(parse_node(
                    sub,
                    &join(canon_path, "then"),
                    &join(orig_path, "then"),
                    dialect,
                    ptr_map,
                    notes,
                )?),
                None => None,
            };
            let r#else = match obj.get("else") {
                Some(sub) => Some(parse_node(
                    sub,
                    &join(canon_path, "else"),
                    &join(orig_path, "else"),
                    dialect,
                    ptr_map,
                    notes,
                )?),
                None => None,
            };
            Some(Box::new(IfThenElse { r#if, then, r#else }))
        }
        None => None,
    };

    // Sibling shape keywords become the composition base.
    let base = if obj.keys().any(|k| SHAPE_KEYWORDS.contains(&k.as_str())) {
        let mut trimmed = obj.clone();
        for keyword in ["allOf", "anyOf", "oneOf", "not", "if", "then", "else", "enum", "const"] {
            trimmed.remove(keyword);
        }
        Some(Box::new(parse_node(
            &Value::Object(trimmed),
            &join(canon_path, "base"),
            orig_path,
            dialect,
            ptr_map,
            notes,
        )?))
    } else {
        None
    };

    Ok(SchemaKind::Composition(Composition {
        base,
        all_of,
        any_of,
        one_of,
        not,
        if_then_else,
    }))
}

fn parse_typed(
    obj: &Map<String, Value>,
    type_name: &str,
    canon_path: &str,
    orig_path: &str,
    dialect: Dialect,
    ptr_map: &mut PointerMap,
    notes: &mut Vec<Diagnostic>,
) -> Result<SchemaKind, NormalizeError> {
    match type_name {
        "object" => Ok(SchemaKind::Object(parse_object(
            obj, canon_path, orig_path, dialect, ptr_map, notes,
        )?)),
        "array" => Ok(SchemaKind::Array(parse_array(
            obj, canon_path, orig_path, dialect, ptr_map, notes,
        )?)),
        "string" => Ok(SchemaKind::String(parse_string(obj))),
        "number" => Ok(SchemaKind::Number(parse_number(obj, orig_path, dialect, notes)?)),
        "integer" => Ok(SchemaKind::Integer(parse_number(obj, orig_path, dialect, notes)?)),
        "boolean" => Ok(SchemaKind::Boolean),
        "null" => Ok(SchemaKind::Null),
        other => Err(NormalizeError::InvalidConstraint {
            pointer: orig_path.to_string(),
            reason: format!("unknown type: {other}"),
        }),
    }
}

fn parse_string(obj: &Map<String, Value>) -> StringKeywords {
    StringKeywords {
        min_length: obj.get("minLength").and_then(Value::as_u64),
        max_length: obj.get("maxLength").and_then(Value::as_u64),
        pattern: obj.get("pattern").and_then(Value::as_str).map(str::to_string),
        format: obj.get("format").and_then(Value::as_str).map(str::to_string),
    }
}

fn parse_number(
    obj: &Map<String, Value>,
    orig_path: &str,
    dialect: Dialect,
    notes: &mut Vec<Diagnostic>,
) -> Result<NumberKeywords, NormalizeError> {
    let get = |key: &str| obj.get(key).and_then(Value::as_f64);

    let multiple_of = get("multipleOf");
    if let Some(mo) = multiple_of
        && (mo <= 0.0 || !mo.is_finite())
    {
        return Err(NormalizeError::InvalidConstraint {
            pointer: orig_path.to_string(),
            reason: format!("multipleOf must be a positive finite number, got {mo}"),
        });
    }

    let mut minimum = get("minimum");
    let mut maximum = get("maximum");
    let mut exclusive_minimum = None;
    let mut exclusive_maximum = None;

    // draft-04 spells exclusivity as a boolean modifier on minimum/maximum.
    match obj.get("exclusiveMinimum") {
        Some(Value::Bool(true)) if dialect == Dialect::Draft4 => {
            exclusive_minimum = minimum.take();
        }
        Some(Value::Bool(_)) => {}
        Some(Value::Number(n)) => {
            if dialect == Dialect::Draft4 {
                notes.push(Diagnostic::with_details(
                    DiagnosticCode::Draft06PatternTolerated,
                    orig_path,
                    serde_json::json!({"keyword": "exclusiveMinimum"}),
                ));
            }
            exclusive_minimum = n.as_f64();
        }
        _ => {}
    }
    match obj.get("exclusiveMaximum") {
        Some(Value::Bool(true)) if dialect == Dialect::Draft4 => {
            exclusive_maximum = maximum.take();
        }
        Some(Value::Bool(_)) => {}
        Some(Value::Number(n)) => {
            if dialect == Dialect::Draft4 {
                notes.push(Diagnostic::with_details(
                    DiagnosticCode::Draft06PatternTolerated,
                    orig_path,
                    serde_json::json!({"keyword": "exclusiveMaximum"}),
                ));
            }
            exclusive_maximum = n.as_f64();
        }
        _ => {}
    }

    for bound in [minimum, maximum, exclusive_minimum, exclusive_maximum].into_iter().flatten() {
        if !bound.is_finite() {
            return Err(NormalizeError::InvalidConstraint {
                pointer: orig_path.to_string(),
                reason: "numeric bounds must be finite".to_string(),
            });
        }
    }

    // Tighter bound wins when both spellings are present.
    if let (Some(min), Some(xmin)) = (minimum, exclusive_minimum) {
        if xmin >= min {
            minimum = None;
        } else {
            exclusive_minimum = None;
        }
    }
    if let (Some(max), Some(xmax)) = (maximum, exclusive_maximum) {
        if xmax <= max {
            maximum = None;
        } else {
            exclusive_maximum = None;
        }
    }

    Ok(NumberKeywords {
        minimum,
        maximum,
        exclusive_minimum,
        exclusive_maximum,
        multiple_of,
    })
}

fn parse_object(
    obj: &Map<String, Value>,
    canon_path: &str,
    orig_path: &str,
    dialect: Dialect,
    ptr_map: &mut PointerMap,
    notes: &mut Vec<Diagnostic>,
) -> Result<ObjectKeywords, NormalizeError> {
    let mut keywords = ObjectKeywords::default();

    if let Some(Value::Object(props)) = obj.get("properties") {
        for (name, sub) in props {
            let sub_canon = join(&join(canon_path, "properties"), name);
            let sub_orig = join(&join(orig_path, "properties"), name);
            keywords.properties.push((
                name.clone(),
                parse_node(sub, &sub_canon, &sub_orig, dialect, ptr_map, notes)?,
            ));
        }
    }

    if let Some(Value::Array(required)) = obj.get("required") {
        keywords.required = required
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    if let Some(Value::Object(pattern_props)) = obj.get("patternProperties") {
        for (pattern, sub) in pattern_props {
            let sub_canon = join(&join(canon_path, "patternProperties"), pattern);
            let sub_orig = join(&join(orig_path, "patternProperties"), pattern);
            keywords.pattern_properties.push((
                pattern.clone(),
                parse_node(sub, &sub_canon, &sub_orig, dialect, ptr_map, notes)?,
            ));
        }
    }

    keywords.additional = match obj.get("additionalProperties") {
        Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
        Some(Value::Bool(true)) | None => AdditionalProperties::Allowed,
        Some(sub) => AdditionalProperties::Schema(Box::new(parse_node(
            sub,
            &join(canon_path, "additionalProperties"),
            &join(orig_path, "additionalProperties"),
            dialect,
            ptr_map,
            notes,
        )?)),
    };

    if let Some(sub) = obj.get("propertyNames") {
        keywords.property_names = Some(Box::new(parse_node(
            sub,
            &join(canon_path, "propertyNames"),
            &join(orig_path, "propertyNames"),
            dialect,
            ptr_map,
            notes,
        )?));
    }

    keywords.min_properties = obj.get("minProperties").and_then(Value::as_u64);
    keywords.max_properties = obj.get("maxProperties").and_then(Value::as_u64);
    keywords.unevaluated_properties_false =
        matches!(obj.get("unevaluatedProperties"), Some(Value::Bool(false)));

    // dependentRequired/dependentSchemas, plus the pre-2019 combined form.
    if let Some(Value::Object(deps)) = obj.get("dependentRequired") {
        for (name, list) in deps {
            if let Value::Array(names) = list {
                keywords.dependent_required.push((
                    name.clone(),
                    names.iter().filter_map(Value::as_str).map(str::to_string).collect(),
                ));
            }
        }
    }
    if let Some(Value::Object(deps)) = obj.get("dependentSchemas") {
        for (name, sub) in deps {
            let sub_canon = join(&join(canon_path, "dependentSchemas"), name);
            let sub_orig = join(&join(orig_path, "dependentSchemas"), name);
            keywords.dependent_schemas.push((
                name.clone(),
                parse_node(sub, &sub_canon, &sub_orig, dialect, ptr_map, notes)?,
            ));
        }
    }
    if let Some(Value::Object(deps)) = obj.get("dependencies") {
        for (name, dep) in deps {
            match dep {
                Value::Array(names) => keywords.dependent_required.push((
                    name.clone(),
                    names.iter().filter_map(Value::as_str).map(str::to_string).collect(),
                )),
                sub => {
                    let sub_canon = join(&join(canon_path, "dependentSchemas"), name);
                    let sub_orig = join(&join(orig_path, "dependencies"), name);
                    keywords.dependent_schemas.push((
                        name.clone(),
                        parse_node(sub, &sub_canon, &sub_orig, dialect, ptr_map, notes)?,
                    ));
                }
            }
        }
    }

    Ok(keywords)
}

fn parse_array(
    obj: &Map<String, Value>,
    canon_path: &str,
    orig_path: &str,
    dialect: Dialect,
    ptr_map: &mut PointerMap,
    notes: &mut Vec<Diagnostic>,
) -> Result<ArrayKeywords, NormalizeError> {
    let mut keywords = ArrayKeywords {
        min_items: obj.get("minItems").and_then(Value::as_u64),
        max_items: obj.get("maxItems").and_then(Value::as_u64),
        unique_items: matches!(obj.get("uniqueItems"), Some(Value::Bool(true))),
        min_contains: obj.get("minContains").and_then(Value::as_u64),
        max_contains: obj.get("maxContains").and_then(Value::as_u64),
        ..Default::default()
    };

    if let Some(Value::Array(prefix)) = obj.get("prefixItems") {
        for (idx, sub) in prefix.iter().enumerate() {
            let sub_canon = format!("{}/prefixItems/{idx}", if canon_path == "/" { "" } else { canon_path });
            let sub_orig = format!("{}/prefixItems/{idx}", if orig_path == "/" { "" } else { orig_path });
            keywords
                .prefix_items
                .push(parse_node(sub, &sub_canon, &sub_orig, dialect, ptr_map, notes)?);
        }
    }

    match obj.get("items") {
        // Pre-2020 tuple form: items array is canonical prefixItems.
        Some(Value::Array(tuple)) if dialect != Dialect::Draft2020 => {
            for (idx, sub) in tuple.iter().enumerate() {
                let sub_canon = format!("{}/prefixItems/{idx}", if canon_path == "/" { "" } else { canon_path });
                let sub_orig = format!("{}/items/{idx}", if orig_path == "/" { "" } else { orig_path });
                keywords
                    .prefix_items
                    .push(parse_node(sub, &sub_canon, &sub_orig, dialect, ptr_map, notes)?);
            }
            if let Some(additional) = obj.get("additionalItems")
                && !matches!(additional, Value::Bool(true))
            {
                keywords.items = Some(Box::new(parse_node(
                    additional,
                    &join(canon_path, "items"),
                    &join(orig_path, "additionalItems"),
                    dialect,
                    ptr_map,
                    notes,
                )?));
            }
        }
        Some(sub) if !sub.is_array() => {
            keywords.items = Some(Box::new(parse_node(
                sub,
                &join(canon_path, "items"),
                &join(orig_path, "items"),
                dialect,
                ptr_map,
                notes,
            )?));
        }
        _ => {}
    }

    if let Some(sub) = obj.get("contains") {
        keywords.contains = Some(Box::new(parse_node(
            sub,
            &join(canon_path, "contains"),
            &join(orig_path, "contains"),
            dialect,
            ptr_map,
            notes,
        )?));
    }

    Ok(keywords)
}
