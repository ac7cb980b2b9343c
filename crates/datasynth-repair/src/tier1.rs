//! Tier-1 rules: value-local, idempotent corrections

use serde_json::{Value, json};

use datasynth_compose::Plan;
use datasynth_regex::synthesize;
use datasynth_schema::{SchemaKind, SchemaNode};
use datasynth_utils::rat::{decimals_of, quantize_decimal};
use datasynth_utils::rng::XorShift32;
use datasynth_validator::ErrorObject;

use crate::locate::{minimal_value, node_for_instance_path};

/// Decimal precision for exclusive-bound nudges on non-integers.
const NUDGE_PRECISION: i32 = 6;

/// Apply a Tier-1 rule for `error`, returning the action detail on success.
#[must_use]
pub fn apply(plan: &Plan, error: &ErrorObject, item: &mut Value) -> Option<Value> {
    let node = node_for_instance_path(plan, &error.instance_path);
    let target = item.pointer_mut(&error.instance_path)?;

    match error.keyword.as_str() {
        "type" => {
            let node = node?;
            *target = minimal_value(plan, node);
            Some(json!({"to": kind_name(&node.kind)}))
        }
        "const" => {
            let pinned = node?.const_value.clone()?;
            *target = pinned.clone();
            Some(json!({"const": pinned}))
        }
        "enum" => {
            let first = node?.enum_values.as_ref()?.first()?.clone();
            *target = first.clone();
            Some(json!({"enum": first}))
        }
        "pattern" => {
            let SchemaKind::String(keywords) = &node?.kind else { return None };
            let pattern = keywords.pattern.as_ref()?;
            let mut rng = XorShift32::new(0x5EED_CAFE, &error.instance_path);
            let witness = synthesize(pattern, &mut rng)?;
            *target = Value::String(witness.clone());
            Some(json!({"pattern": pattern, "witness": witness}))
        }
        "minimum" => {
            let bound = number_keywords(node)?.minimum?;
            clamp_to(target, bound);
            Some(json!({"clampedTo": bound}))
        }
        "maximum" => {
            let bound = number_keywords(node)?.maximum?;
            clamp_to(target, bound);
            Some(json!({"clampedTo": bound}))
        }
        "exclusiveMinimum" => nudge(node?, target, true),
        "exclusiveMaximum" => nudge(node?, target, false),
        "multipleOf" => {
            let keywords = number_keywords(node)?;
            let mo = keywords.multiple_of?;
            let v = target.as_f64()?;
            let mut snapped = quantize_decimal((v / mo).round() * mo, decimals_of(mo));
            if let Some(min) = keywords.minimum {
                snapped = snapped.max(min);
            }
            if let Some(max) = keywords.maximum {
                snapped = snapped.min(max);
            }
            set_number(target, snapped);
            Some(json!({"snappedTo": snapped}))
        }
        "minLength" => {
            let keywords = string_keywords(node)?;
            let min = keywords.min_length? as usize;
            let s = target.as_str()?.to_string();
            if s.chars().count() < min {
                let padded: String =
                    s.chars().chain(std::iter::repeat('x')).take(min).collect();
                *target = Value::String(padded);
            }
            Some(json!({"paddedTo": min}))
        }
        "maxLength" => {
            let keywords = string_keywords(node)?;
            let max = keywords.max_length? as usize;
            let s = target.as_str()?.to_string();
            let truncated: String = s.chars().take(max).collect();
            *target = Value::String(truncated);
            Some(json!({"truncatedTo": max}))
        }
        "minItems" => {
            let SchemaKind::Array(keywords) = &node?.kind else { return None };
            let min = keywords.min_items? as usize;
            let arr = target.as_array_mut()?;
            while arr.len() < min {
                let filler = keywords
                    .prefix_items
                    .get(arr.len())
                    .or(keywords.items.as_deref())
                    .map_or_else(|| json!({}), |sub| minimal_value(plan, sub));
                arr.push(filler);
            }
            Some(json!({"grownTo": min}))
        }
        "maxItems" => {
            let SchemaKind::Array(keywords) = &node?.kind else { return None };
            let max = keywords.max_items? as usize;
            target.as_array_mut()?.truncate(max);
            Some(json!({"truncatedTo": max}))
        }
        "uniqueItems" => {
            let arr = target.as_array_mut()?;
            let mut seen = Vec::new();
            arr.retain(|value| {
                let key = value.to_string();
                if seen.contains(&key) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            });
            Some(json!({"deduped": true}))
        }
        "minContains" | "contains" => {
            let SchemaKind::Array(keywords) = &node?.kind else { return None };
            let contains = keywords.contains.as_deref()?;
            let min = keywords.min_contains.unwrap_or(1) as usize;
            let witness = minimal_value(plan, contains);
            let arr = target.as_array_mut()?;
            for _ in 0..min {
                arr.push(witness.clone());
            }
            Some(json!({"injectedWitnesses": min}))
        }
        "maxContains" => {
            let arr = target.as_array_mut()?;
            if !arr.is_empty() {
                arr.pop();
            }
            Some(json!({"removedFromTail": 1}))
        }
        _ => None,
    }
}

fn nudge(node: &SchemaNode, target: &mut Value, lower: bool) -> Option<Value> {
    let keywords = number_keywords(Some(node))?;
    let bound = if lower { keywords.exclusive_minimum? } else { keywords.exclusive_maximum? };
    if matches!(node.kind, SchemaKind::Integer(_)) {
        let delta: i64 = if lower { 1 } else { -1 };
        set_number(target, bound + delta as f64);
        Some(json!({"delta": delta}))
    } else {
        let epsilon = 10f64.powi(-NUDGE_PRECISION);
        let nudged = if lower { bound + epsilon } else { bound - epsilon };
        set_number(target, quantize_decimal(nudged, NUDGE_PRECISION as u32));
        Some(json!({"epsilon": format!("1e-{NUDGE_PRECISION}")}))
    }
}

// The error already witnessed the violation, so the inclusive clamp is
// simply the bound itself.
fn clamp_to(target: &mut Value, bound: f64) {
    set_number(target, bound);
}

fn set_number(target: &mut Value, v: f64) {
    let v = if v == 0.0 { 0.0 } else { v };
    *target = if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        Value::from(v as i64)
    } else {
        serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
    };
}

fn number_keywords(node: Option<&SchemaNode>) -> Option<&datasynth_schema::NumberKeywords> {
    match &node?.kind {
        SchemaKind::Number(keywords) | SchemaKind::Integer(keywords) => Some(keywords),
        _ => None,
    }
}

fn string_keywords(node: Option<&SchemaNode>) -> Option<&datasynth_schema::StringKeywords> {
    match &node?.kind {
        SchemaKind::String(keywords) => Some(keywords),
        _ => None,
    }
}

fn kind_name(kind: &SchemaKind) -> &'static str {
    match kind {
        SchemaKind::Object(_) => "object",
        SchemaKind::Array(_) => "array",
        SchemaKind::String(_) => "string",
        SchemaKind::Number(_) => "number",
        SchemaKind::Integer(_) => "integer",
        SchemaKind::Boolean => "boolean",
        SchemaKind::Null => "null",
        _ => "any",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasynth_compose::{ComposeContext, compose};
    use datasynth_schema::{Dialect, normalize};
    use datasynth_validator::{ValidateOptions, Validator, source_validator};
    use std::sync::Arc;

    fn plan_for(schema: Value) -> Plan {
        let normalized = Arc::new(normalize(&schema).unwrap());
        let ctx = ComposeContext::new(
            source_validator(Dialect::Draft2020, &ValidateOptions::default())
                .options()
                .clone(),
            "test",
        );
        compose(normalized, &ctx).unwrap()
    }

    fn error_at(keyword: &str, instance_path: &str) -> ErrorObject {
        ErrorObject {
            keyword: keyword.to_string(),
            message: None,
            schema_path: None,
            instance_path: instance_path.to_string(),
            params: None,
        }
    }

    #[test]
    fn test_type_coercion_to_minimal() {
        let plan = plan_for(json!({"type": "string"}));
        let mut item = json!(42);
        apply(&plan, &error_at("type", ""), &mut item).unwrap();
        assert_eq!(item, json!(""));
    }

    #[test]
    fn test_const_assignment() {
        let plan = plan_for(json!({"const": "pinned"}));
        let mut item = json!("wrong");
        apply(&plan, &error_at("const", ""), &mut item).unwrap();
        assert_eq!(item, json!("pinned"));
    }

    #[test]
    fn test_enum_first_member() {
        let plan = plan_for(json!({"enum": ["a", "b", "c"]}));
        let mut item = json!("z");
        apply(&plan, &error_at("enum", ""), &mut item).unwrap();
        assert_eq!(item, json!("a"));
    }

    #[test]
    fn test_pattern_witness() {
        let plan = plan_for(json!({"type": "string", "pattern": "^(on|off)$"}));
        let mut item = json!("maybe");
        apply(&plan, &error_at("pattern", ""), &mut item).unwrap();
        assert!(item == json!("on") || item == json!("off"));
    }

    #[test]
    fn test_minimum_clamp() {
        let plan = plan_for(json!({"type": "number", "minimum": 10}));
        let mut item = json!(3);
        apply(&plan, &error_at("minimum", ""), &mut item).unwrap();
        assert_eq!(item, json!(10));
    }

    #[test]
    fn test_exclusive_minimum_integer_delta() {
        let plan = plan_for(json!({"type": "integer", "exclusiveMinimum": 4}));
        let mut item = json!(2);
        let detail = apply(&plan, &error_at("exclusiveMinimum", ""), &mut item).unwrap();
        assert_eq!(item, json!(5));
        assert_eq!(detail["delta"], 1);
    }

    #[test]
    fn test_exclusive_maximum_number_epsilon() {
        let plan = plan_for(json!({"type": "number", "exclusiveMaximum": 1}));
        let mut item = json!(7);
        let detail = apply(&plan, &error_at("exclusiveMaximum", ""), &mut item).unwrap();
        assert!(item.as_f64().unwrap() < 1.0);
        assert_eq!(detail["epsilon"], "1e-6");
    }

    #[test]
    fn test_multiple_of_snap_then_clamp() {
        let plan = plan_for(json!({"type": "number", "multipleOf": 0.5, "minimum": 2}));
        let mut item = json!(2.3);
        apply(&plan, &error_at("multipleOf", ""), &mut item).unwrap();
        assert_eq!(item.as_f64().unwrap(), 2.5);
    }

    #[test]
    fn test_min_length_pad() {
        let plan = plan_for(json!({"type": "string", "minLength": 5}));
        let mut item = json!("ab");
        apply(&plan, &error_at("minLength", ""), &mut item).unwrap();
        assert_eq!(item, json!("abxxx"));
    }

    #[test]
    fn test_max_length_truncate() {
        let plan = plan_for(json!({"type": "string", "maxLength": 3}));
        let mut item = json!("abcdef");
        apply(&plan, &error_at("maxLength", ""), &mut item).unwrap();
        assert_eq!(item, json!("abc"));
    }

    #[test]
    fn test_min_items_grow_prefix_first() {
        let plan = plan_for(json!({
            "type": "array",
            "prefixItems": [{"const": "head"}],
            "items": {"type": "integer"},
            "minItems": 3
        }));
        let mut item = json!([]);
        apply(&plan, &error_at("minItems", ""), &mut item).unwrap();
        assert_eq!(item, json!(["head", 0, 0]));
    }

    #[test]
    fn test_max_items_drop_tail() {
        let plan = plan_for(json!({"type": "array", "maxItems": 2}));
        let mut item = json!([1, 2, 3, 4]);
        apply(&plan, &error_at("maxItems", ""), &mut item).unwrap();
        assert_eq!(item, json!([1, 2]));
    }

    #[test]
    fn test_unique_items_dedupe_keeps_first() {
        let plan = plan_for(json!({"type": "array", "uniqueItems": true}));
        let mut item = json!([1, 2, 1, 3, 2]);
        apply(&plan, &error_at("uniqueItems", ""), &mut item).unwrap();
        assert_eq!(item, json!([1, 2, 3]));
    }

    #[test]
    fn test_contains_injects_witness() {
        let plan = plan_for(json!({
            "type": "array",
            "contains": {"const": 9},
            "minContains": 2
        }));
        let mut item = json!([1]);
        apply(&plan, &error_at("contains", ""), &mut item).unwrap();
        assert_eq!(item, json!([1, 9, 9]));
    }

    #[test]
    fn test_nested_path() {
        let plan = plan_for(json!({
            "type": "object",
            "properties": {
                "n": {"type": "integer", "minimum": 100}
            }
        }));
        let mut item = json!({"n": 5});
        apply(&plan, &error_at("minimum", "/n"), &mut item).unwrap();
        assert_eq!(item["n"], json!(100));
    }

    #[test]
    fn test_unknown_keyword_skipped() {
        let plan = plan_for(json!({"type": "string"}));
        let mut item = json!("x");
        assert!(apply(&plan, &error_at("format", ""), &mut item).is_none());
    }
}
