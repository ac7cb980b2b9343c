//! Instance-path → schema-node resolution
//!
//! Repair rules need the constraints of the node an error points at. The
//! walk follows the instance path through the canonical AST: object keys
//! through `properties`/`patternProperties`/`additionalProperties`, array
//! indices through `prefixItems`/`items`, compositions through their base,
//! references through the plan's resolved targets.

use datasynth_compose::Plan;
use datasynth_schema::{AdditionalProperties, SchemaKind, SchemaNode};
use datasynth_utils::pointer::unescape_token;
use serde_json::Value;

/// Resolve the schema node governing `instance_path`, if the walk is
/// unambiguous.
#[must_use]
pub fn node_for_instance_path<'a>(plan: &'a Plan, instance_path: &str) -> Option<&'a SchemaNode> {
    let mut node = resolve(plan, &plan.normalized.root)?;
    if instance_path.is_empty() {
        return Some(node);
    }
    for raw in instance_path.trim_start_matches('/').split('/') {
        let token = unescape_token(raw)?;
        node = step(plan, node, &token)?;
        node = resolve(plan, node)?;
    }
    Some(node)
}

/// Minimal representative of a node's type, used for inserted values.
#[must_use]
pub fn minimal_value(plan: &Plan, node: &SchemaNode) -> Value {
    if let Some(pinned) = node.pinned_values()
        && let Some(first) = pinned.first()
    {
        return first.clone();
    }
    match &node.kind {
        SchemaKind::Object(_) => Value::Object(serde_json::Map::new()),
        SchemaKind::Array(_) => Value::Array(Vec::new()),
        SchemaKind::String(_) => Value::String(String::new()),
        SchemaKind::Number(_) | SchemaKind::Integer(_) => Value::from(0),
        SchemaKind::Boolean => Value::Bool(false),
        SchemaKind::Null | SchemaKind::Never => Value::Null,
        SchemaKind::Reference(target) => plan
            .ref_targets
            .get(target)
            .map_or_else(|| Value::Object(serde_json::Map::new()), |t| minimal_value(plan, t)),
        SchemaKind::Composition(comp) => comp
            .base
            .as_deref()
            .map_or_else(|| Value::Object(serde_json::Map::new()), |b| minimal_value(plan, b)),
        SchemaKind::EnumOnly | SchemaKind::Any => Value::Object(serde_json::Map::new()),
    }
}

fn resolve<'a>(plan: &'a Plan, node: &'a SchemaNode) -> Option<&'a SchemaNode> {
    match &node.kind {
        SchemaKind::Reference(target) => plan.ref_targets.get(target),
        SchemaKind::Composition(comp) => comp.base.as_deref().map_or(Some(node), |base| {
            // Branch-only members stay reachable through the base walk.
            resolve(plan, base)
        }),
        _ => Some(node),
    }
}

fn step<'a>(plan: &'a Plan, node: &'a SchemaNode, token: &str) -> Option<&'a SchemaNode> {
    match &node.kind {
        SchemaKind::Object(keywords) => {
            if let Some(sub) = keywords.property(token) {
                return Some(sub);
            }
            for (pattern, sub) in &keywords.pattern_properties {
                if regex::Regex::new(pattern).is_ok_and(|re| re.is_match(token)) {
                    return Some(sub);
                }
            }
            if let AdditionalProperties::Schema(sub) = &keywords.additional {
                return Some(sub);
            }
            None
        }
        SchemaKind::Array(keywords) => {
            let index: usize = token.parse().ok()?;
            keywords
                .prefix_items
                .get(index)
                .or(keywords.items.as_deref())
        }
        SchemaKind::Composition(comp) => {
            let base = comp.base.as_deref()?;
            step(plan, resolve(plan, base)?, token)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasynth_compose::{ComposeContext, compose};
    use datasynth_schema::{Dialect, normalize};
    use datasynth_validator::{ValidateOptions, Validator, source_validator};
    use serde_json::json;
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

    #[test]
    fn test_walk_through_properties_and_items() {
        let plan = plan_for(json!({
            "type": "object",
            "properties": {
                "list": {
                    "type": "array",
                    "items": {"type": "integer", "minimum": 5}
                }
            }
        }));
        let node = node_for_instance_path(&plan, "/list/3").unwrap();
        let SchemaKind::Integer(n) = &node.kind else { panic!("expected integer") };
        assert_eq!(n.minimum, Some(5.0));
    }

    #[test]
    fn test_walk_through_ref() {
        let plan = plan_for(json!({
            "$defs": {"s": {"type": "string", "minLength": 2}},
            "type": "object",
            "properties": {"n": {"$ref": "#/$defs/s"}}
        }));
        let node = node_for_instance_path(&plan, "/n").unwrap();
        assert!(matches!(node.kind, SchemaKind::String(_)));
    }

    #[test]
    fn test_walk_through_composition_base() {
        let plan = plan_for(json!({
            "type": "object",
            "properties": {"a": {"type": "boolean"}},
            "anyOf": [{"required": ["a"]}]
        }));
        let node = node_for_instance_path(&plan, "/a").unwrap();
        assert!(matches!(node.kind, SchemaKind::Boolean));
    }

    #[test]
    fn test_minimal_values() {
        let plan = plan_for(json!({"type": "object"}));
        let root = &plan.normalized.root.clone();
        assert_eq!(minimal_value(&plan, root), json!({}));

        let plan = plan_for(json!({"type": "integer", "const": 5}));
        let root = &plan.normalized.root.clone();
        assert_eq!(minimal_value(&plan, root), json!(5));
    }
}
