//! The composer walk

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use datasynth_diagnostics::{Diagnostic, DiagnosticBuckets, DiagnosticCode};
use datasynth_regex::{AnalyzeOptions, analyze_regex, literal_alternation};
use datasynth_schema::{
    AdditionalProperties, Composition, Dialect, Normalized, ObjectKeywords, SchemaKind,
    SchemaNode, parse_node,
};
use datasynth_utils::pointer::PointerMap;
use datasynth_validator::ValidatorFlags;

use crate::coverage::{CoverageIndex, NameDecider};
use crate::plan::{ContainsBag, ContainsRequirement, MemoKey, Plan};

/// Inputs the composer needs beyond the normalized schema.
#[derive(Debug, Clone)]
pub struct ComposeContext {
    pub source_flags: ValidatorFlags,
    pub resolver_fingerprint: String,
    /// Resolved external documents from the registry, keyed by URI.
    pub external_targets: BTreeMap<String, serde_json::Value>,
}

impl ComposeContext {
    #[must_use]
    pub fn new(source_flags: ValidatorFlags, resolver_fingerprint: &str) -> Self {
        Self {
            source_flags,
            resolver_fingerprint: resolver_fingerprint.to_string(),
            external_targets: BTreeMap::new(),
        }
    }
}

/// Errors that abort the pipeline at Compose.
#[derive(Error, Debug, Clone)]
pub enum ComposeError {
    #[error("compose produced fatal diagnostics")]
    Fatal { diagnostics: Vec<Diagnostic> },

    #[error("{keyword} is not valid under dialect {dialect} at {pointer}")]
    UnsupportedKeyword {
        pointer: String,
        keyword: String,
        dialect: Dialect,
    },
}

/// Compose the effective plan from a normalized schema.
///
/// # Errors
/// Fails on fatal findings: an internal `$ref` with no target, or
/// `unevaluatedProperties` under a dialect that predates it.
pub fn compose(normalized: Arc<Normalized>, ctx: &ComposeContext) -> Result<Plan, ComposeError> {
    let memo_key = MemoKey::derive(&ctx.source_flags, &ctx.resolver_fingerprint);
    let mut composer = Composer {
        normalized: normalized.as_ref(),
        external_targets: &ctx.external_targets,
        coverage: CoverageIndex::new(),
        contains: ContainsBag::new(),
        ref_targets: BTreeMap::new(),
        branch_targets: BTreeMap::new(),
        buckets: DiagnosticBuckets::new(),
        memo: HashMap::new(),
        memo_prefix: memo_key.as_cache_prefix(),
        visited_refs: HashSet::new(),
        external_refs: Vec::new(),
    };

    let root = normalized.root.clone();
    composer.walk(&root)?;

    let Composer {
        coverage,
        contains,
        ref_targets,
        branch_targets,
        buckets,
        external_refs,
        ..
    } = composer;

    if buckets.has_fatal() {
        return Err(ComposeError::Fatal { diagnostics: buckets.fatal });
    }

    debug!(
        coverage = coverage.len(),
        contains = contains.len(),
        refs = ref_targets.len(),
        "composed effective plan"
    );

    Ok(Plan {
        normalized,
        coverage,
        contains,
        ref_targets,
        branch_targets,
        diagnostics: buckets,
        memo_key,
        external_refs,
    })
}

struct Composer<'a> {
    normalized: &'a Normalized,
    external_targets: &'a BTreeMap<String, serde_json::Value>,
    coverage: CoverageIndex,
    contains: ContainsBag,
    ref_targets: BTreeMap<String, SchemaNode>,
    branch_targets: BTreeMap<String, (String, usize)>,
    buckets: DiagnosticBuckets,
    /// Per-run memo of name deciders, keyed by `(memoKey, canonPath)`.
    memo: HashMap<String, Option<NameDecider>>,
    memo_prefix: String,
    visited_refs: HashSet<String>,
    external_refs: Vec<String>,
}

impl Composer<'_> {
    fn walk(&mut self, node: &SchemaNode) -> Result<(), ComposeError> {
        match &node.kind {
            SchemaKind::Object(keywords) => self.walk_object(node, keywords),
            SchemaKind::Array(keywords) => {
                if let Some(contains) = &keywords.contains {
                    self.contains.insert(
                        node.canon_path.clone(),
                        ContainsRequirement {
                            witness_path: contains.canon_path.clone(),
                            min: keywords.min_contains.unwrap_or(1),
                            max: keywords.max_contains,
                        },
                    );
                }
                for sub in &keywords.prefix_items {
                    self.walk(sub)?;
                }
                if let Some(items) = &keywords.items {
                    self.walk(items)?;
                }
                if let Some(contains) = &keywords.contains {
                    self.walk(contains)?;
                }
                Ok(())
            }
            SchemaKind::Composition(comp) => self.walk_composition(node, comp),
            SchemaKind::Reference(target) => self.walk_reference(node, target),
            _ => Ok(()),
        }
    }

    fn walk_object(
        &mut self,
        node: &SchemaNode,
        keywords: &ObjectKeywords,
    ) -> Result<(), ComposeError> {
        if keywords.unevaluated_properties_false
            && matches!(self.normalized.dialect, Dialect::Draft4 | Dialect::Draft7)
        {
            return Err(ComposeError::UnsupportedKeyword {
                pointer: node.canon_path.clone(),
                keyword: "unevaluatedProperties".to_string(),
                dialect: self.normalized.dialect,
            });
        }

        if let Some(decider) = self.decide_names(node, keywords) {
            self.coverage.insert(&node.canon_path, decider);
        }

        if keywords.additional == AdditionalProperties::Forbidden {
            for (pattern, _) in &keywords.pattern_properties {
                let analysis = analyze_regex(pattern, &node.canon_path, &AnalyzeOptions {
                    context: "patternProperties".to_string(),
                    ..Default::default()
                });
                if !analysis.is_anchored_safe {
                    self.buckets.warn.push(Diagnostic::with_details(
                        DiagnosticCode::ApFalseUnsafePattern,
                        &node.canon_path,
                        serde_json::json!({"pattern": pattern}),
                    ));
                }
            }
        }

        for (_, sub) in &keywords.properties {
            self.walk(sub)?;
        }
        for (_, sub) in &keywords.pattern_properties {
            self.walk(sub)?;
        }
        if let AdditionalProperties::Schema(sub) = &keywords.additional {
            self.walk(sub)?;
        }
        if let Some(sub) = &keywords.property_names {
            self.walk(sub)?;
        }
        for (_, sub) in &keywords.dependent_schemas {
            self.walk(sub)?;
        }
        Ok(())
    }

    fn walk_composition(
        &mut self,
        node: &SchemaNode,
        comp: &Composition,
    ) -> Result<(), ComposeError> {
        if let Some((keyword, branches)) = comp.branches() {
            self.branch_targets
                .insert(node.canon_path.clone(), (keyword.to_string(), branches.len()));
        }
        if let Some(base) = &comp.base {
            self.walk(base)?;
        }
        for sub in comp
            .all_of
            .iter()
            .chain(comp.any_of.iter())
            .chain(comp.one_of.iter())
        {
            self.walk(sub)?;
        }
        if let Some(not) = &comp.not {
            self.walk(not)?;
        }
        if let Some(ite) = &comp.if_then_else {
            self.walk(&ite.r#if)?;
            if let Some(then) = &ite.then {
                self.walk(then)?;
            }
            if let Some(r#else) = &ite.r#else {
                self.walk(r#else)?;
            }
        }
        Ok(())
    }

    fn walk_reference(&mut self, node: &SchemaNode, target: &str) -> Result<(), ComposeError> {
        if !target.starts_with('#') {
            self.external_refs.push(target.to_string());
            if self.visited_refs.insert(target.to_string()) {
                self.resolve_external(node, target)?;
            }
            return Ok(());
        }
        if !self.visited_refs.insert(target.to_string()) {
            return Ok(());
        }
        let Some(value) = self.normalized.resolve_internal_ref(target) else {
            self.buckets.fatal.push(Diagnostic::with_details(
                DiagnosticCode::SchemaInternalRefMissing,
                &node.canon_path,
                serde_json::json!({"ref": target}),
            ));
            return Ok(());
        };
        // The target gets its own pointer scope; the scratch map is only for
        // parse bookkeeping, the run map was sealed at normalize.
        let target_path = target.trim_start_matches('#');
        let mut scratch = PointerMap::new();
        let mut notes = Vec::new();
        match parse_node(
            &value.clone(),
            target_path,
            target_path,
            self.normalized.dialect,
            &mut scratch,
            &mut notes,
        ) {
            Ok(parsed) => {
                self.ref_targets.insert(target.to_string(), parsed.clone());
                self.walk(&parsed)?;
            }
            Err(error) => {
                self.buckets.fatal.push(Diagnostic::with_details(
                    DiagnosticCode::SchemaInternalRefMissing,
                    &node.canon_path,
                    serde_json::json!({"ref": target, "error": error.to_string()}),
                ));
            }
        }
        Ok(())
    }

    /// Parse a registry-resolved external target into the plan so
    /// generation can use the real schema instead of a stub.
    fn resolve_external(&mut self, node: &SchemaNode, target: &str) -> Result<(), ComposeError> {
        let (uri, fragment) = match target.split_once('#') {
            Some((uri, fragment)) => (uri, fragment),
            None => (target, ""),
        };
        let Some(document) = self.external_targets.get(uri) else {
            return Ok(());
        };
        let Some(value) = (if fragment.is_empty() {
            Some(document)
        } else {
            document.pointer(fragment)
        }) else {
            self.buckets.fatal.push(Diagnostic::with_details(
                DiagnosticCode::SchemaInternalRefMissing,
                &node.canon_path,
                serde_json::json!({"ref": target}),
            ));
            return Ok(());
        };
        let scope = format!("/external/{}", self.ref_targets.len());
        let mut scratch = PointerMap::new();
        let mut notes = Vec::new();
        if let Ok(parsed) = parse_node(
            &value.clone(),
            &scope,
            &scope,
            self.normalized.dialect,
            &mut scratch,
            &mut notes,
        ) {
            self.ref_targets.insert(target.to_string(), parsed.clone());
            self.walk(&parsed)?;
        }
        Ok(())
    }

    /// Build a name decider when provably decidable, memoized per
    /// `(memoKey, canonPath)` within the run.
    fn decide_names(&mut self, node: &SchemaNode, keywords: &ObjectKeywords) -> Option<NameDecider> {
        let cache_key = format!("{}|{}", self.memo_prefix, node.canon_path);
        if let Some(cached) = self.memo.get(&cache_key) {
            return cached.clone();
        }

        let decider = self.decide_names_uncached(keywords);
        self.memo.insert(cache_key, decider.clone());
        decider
    }

    fn decide_names_uncached(&mut self, keywords: &ObjectKeywords) -> Option<NameDecider> {
        if let Some(property_names) = &keywords.property_names {
            if let Some(values) = &property_names.enum_values {
                let names: Vec<String> = values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if !names.is_empty() {
                    return Some(NameDecider::Enum(names));
                }
            }
            if let SchemaKind::String(s) = &property_names.kind
                && let Some(pattern) = &s.pattern
            {
                let analysis = analyze_regex(pattern, &property_names.canon_path, &AnalyzeOptions {
                    context: "propertyNames".to_string(),
                    ..Default::default()
                });
                if analysis.is_anchored_safe
                    && let Some(branches) = literal_alternation(pattern)
                {
                    return Some(NameDecider::PseudoEnum(branches));
                }
            }
            return None;
        }

        if keywords.additional == AdditionalProperties::Forbidden
            && !keywords.properties.is_empty()
            && keywords.pattern_properties.is_empty()
        {
            let names: Vec<String> =
                keywords.properties.iter().map(|(n, _)| n.clone()).collect();
            return Some(NameDecider::Closed(names));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasynth_schema::normalize;
    use datasynth_validator::{ValidateOptions, Validator, source_validator};
    use serde_json::json;

    fn ctx() -> ComposeContext {
        ComposeContext::new(
            source_validator(Dialect::Draft2020, &ValidateOptions::default())
                .options()
                .clone(),
            "empty",
        )
    }

    fn plan_for(schema: serde_json::Value) -> Result<Plan, ComposeError> {
        let normalized = Arc::new(normalize(&schema).unwrap());
        compose(normalized, &ctx())
    }

    #[test]
    fn test_property_names_enum_coverage() {
        let plan = plan_for(json!({
            "type": "object",
            "propertyNames": {"enum": ["alpha", "beta"]}
        }))
        .unwrap();
        let decider = plan.coverage.get("").unwrap();
        assert!(decider.has("alpha"));
        assert!(!decider.has("gamma"));
        assert!(decider.supports_rename());
    }

    #[test]
    fn test_property_names_pseudo_enum_coverage() {
        let plan = plan_for(json!({
            "type": "object",
            "propertyNames": {"type": "string", "pattern": "^(red|green|blue)$"}
        }))
        .unwrap();
        let decider = plan.coverage.get("").unwrap();
        assert_eq!(decider.allowed_names(), ["red", "green", "blue"]);
        assert!(decider.supports_rename());
    }

    #[test]
    fn test_unsafe_property_names_pattern_has_no_coverage() {
        let plan = plan_for(json!({
            "type": "object",
            "propertyNames": {"type": "string", "pattern": "col-.*"}
        }))
        .unwrap();
        assert!(plan.coverage.get("").is_none());
    }

    #[test]
    fn test_closed_properties_coverage() {
        let plan = plan_for(json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "integer"}},
            "additionalProperties": false
        }))
        .unwrap();
        let decider = plan.coverage.get("").unwrap();
        assert_eq!(decider.allowed_names(), ["a", "b"]);
        assert!(!decider.supports_rename());
    }

    #[test]
    fn test_contains_bag() {
        let plan = plan_for(json!({
            "type": "array",
            "contains": {"type": "integer"},
            "minContains": 2,
            "maxContains": 4
        }))
        .unwrap();
        let req = plan.contains.get("").unwrap();
        assert_eq!(req.min, 2);
        assert_eq!(req.max, Some(4));
        assert_eq!(req.witness_path, "/contains");
    }

    #[test]
    fn test_contains_defaults_min_one() {
        let plan = plan_for(json!({
            "type": "array",
            "contains": {"type": "string"}
        }))
        .unwrap();
        assert_eq!(plan.contains.get("").unwrap().min, 1);
    }

    #[test]
    fn test_internal_ref_resolved() {
        let plan = plan_for(json!({
            "$defs": {"name": {"type": "string", "minLength": 1}},
            "type": "object",
            "properties": {"n": {"$ref": "#/$defs/name"}}
        }))
        .unwrap();
        let target = plan.ref_targets.get("#/$defs/name").unwrap();
        assert!(matches!(target.kind, SchemaKind::String(_)));
    }

    #[test]
    fn test_internal_ref_missing_is_fatal() {
        let err = plan_for(json!({
            "type": "object",
            "properties": {"n": {"$ref": "#/$defs/missing"}}
        }))
        .unwrap_err();
        let ComposeError::Fatal { diagnostics } = err else { panic!("expected fatal") };
        assert_eq!(diagnostics[0].code, DiagnosticCode::SchemaInternalRefMissing);
        assert_eq!(diagnostics[0].details.as_ref().unwrap()["ref"], "#/$defs/missing");
    }

    #[test]
    fn test_external_refs_collected() {
        let plan = plan_for(json!({
            "type": "object",
            "properties": {"s": {"$ref": "https://example.com/s.json"}}
        }))
        .unwrap();
        assert_eq!(plan.external_refs, ["https://example.com/s.json"]);
    }

    #[test]
    fn test_unevaluated_properties_misuse_under_draft7() {
        let err = plan_for(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "unevaluatedProperties": false
        }))
        .unwrap_err();
        assert!(matches!(err, ComposeError::UnsupportedKeyword { .. }));
    }

    #[test]
    fn test_ap_false_unsafe_pattern_warns() {
        let plan = plan_for(json!({
            "type": "object",
            "patternProperties": {"x-.*": {"type": "string"}},
            "additionalProperties": false
        }))
        .unwrap();
        assert_eq!(plan.diagnostics.warn[0].code, DiagnosticCode::ApFalseUnsafePattern);
    }

    #[test]
    fn test_branch_targets_recorded() {
        let plan = plan_for(json!({
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "string"}},
            "anyOf": [{"required": ["x"]}, {"required": ["y"]}]
        }))
        .unwrap();
        let (keyword, count) = plan.branch_targets.get("").unwrap();
        assert_eq!(keyword, "anyOf");
        assert_eq!(*count, 2);
    }

    #[test]
    fn test_recursive_ref_terminates() {
        let plan = plan_for(json!({
            "$defs": {
                "node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/$defs/node"}}
                }
            },
            "$ref": "#/$defs/node"
        }))
        .unwrap();
        assert!(plan.ref_targets.contains_key("#/$defs/node"));
    }
}
