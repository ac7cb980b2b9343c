//! Recursive instance synthesis over the effective plan

use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

use datasynth_compose::Plan;
use datasynth_diagnostics::{Diagnostic, DiagnosticCode, envelope};
use datasynth_metrics::{MetricsCollector, names};
use datasynth_regex::literal_alternation;
use datasynth_schema::{
    AdditionalProperties, ArrayKeywords, Composition, ObjectKeywords, SchemaKind, SchemaNode,
};
use datasynth_utils::rng::XorShift32;
use datasynth_validator::FormatRegistry;

use crate::number::{self, NumberOutcome};
use crate::text;

/// Hop limit for reference chains before bounding kicks in.
const REF_HOP_LIMIT: usize = 2;

/// Re-roll budget for uniqueItems conflicts.
const UNIQUE_RETRIES: u32 = 16;

/// Sampling scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    #[default]
    Uniform,
    /// Bias samples toward interval edges and zero.
    Edge,
}

/// Options for the Generate stage.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub count: usize,
    pub seed: u32,
    pub prefer_examples: bool,
    pub scenario: Scenario,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            count: 1,
            seed: 1,
            prefer_examples: false,
            scenario: Scenario::Uniform,
        }
    }
}

/// Output of the Generate stage. Echoes the effective seed so a run can be
/// reproduced from the artifact alone.
#[derive(Debug, Clone)]
pub struct GenerateOutput {
    pub items: Vec<Value>,
    pub diagnostics: Vec<Diagnostic>,
    pub seed: u32,
}

/// Errors that fail the Generate stage.
#[derive(Error, Debug, Clone)]
pub enum GenerateError {
    #[error("no feasible value at {canon_path}")]
    NoFeasibleValue {
        canon_path: String,
        diagnostic: Diagnostic,
    },

    #[error("unsatisfiable constraint at {canon_path}: {reason}")]
    Unsatisfiable { canon_path: String, reason: String },
}

impl GenerateError {
    fn infeasible(canon_path: &str, details: Value) -> Self {
        Self::NoFeasibleValue {
            canon_path: canon_path.to_string(),
            diagnostic: Diagnostic::with_details(
                DiagnosticCode::NoFeasibleValue,
                canon_path,
                details,
            ),
        }
    }
}

/// Generate `opts.count` instances from the plan.
///
/// # Errors
/// Fails when a constraint set admits no value (`NO_FEASIBLE_VALUE`) or a
/// sampling requirement cannot be met (uniqueItems exhaustion, `false`
/// schemas).
pub fn generate(
    plan: &Plan,
    opts: &GenerateOptions,
    formats: Option<&FormatRegistry>,
    metrics: &mut MetricsCollector,
) -> Result<GenerateOutput, GenerateError> {
    let mut items = Vec::with_capacity(opts.count);
    let mut diagnostics = Vec::new();
    let mut branch_usage: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut enum_usage: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();

    for index in 0..opts.count {
        let item_seed = opts.seed ^ (index as u32).wrapping_mul(0x9e37_79b9);
        let mut generator = Generator {
            plan,
            formats,
            metrics,
            diagnostics: &mut diagnostics,
            branch_usage: &mut branch_usage,
            enum_usage: &mut enum_usage,
            item_seed,
            salt: 0,
            edge: opts.scenario == Scenario::Edge,
            prefer_examples: opts.prefer_examples,
            ref_hops: HashMap::new(),
        };
        let item = generator.value_for(&plan.normalized.root)?;
        items.push(item);
    }

    if !branch_usage.is_empty() {
        metrics.set_payload(names::BRANCH_COVERAGE_ONE_OF, json!(branch_usage));
    }
    if !enum_usage.is_empty() {
        metrics.set_payload(names::ENUM_USAGE, json!(enum_usage));
    }

    debug!(count = items.len(), seed = opts.seed, "generated items");

    Ok(GenerateOutput {
        items,
        diagnostics: envelope::dedup(&diagnostics),
        seed: opts.seed,
    })
}

struct Generator<'a> {
    plan: &'a Plan,
    formats: Option<&'a FormatRegistry>,
    metrics: &'a mut MetricsCollector,
    diagnostics: &'a mut Vec<Diagnostic>,
    branch_usage: &'a mut BTreeMap<String, Vec<usize>>,
    enum_usage: &'a mut BTreeMap<String, BTreeMap<String, u64>>,
    item_seed: u32,
    /// Per-position stream salt; distinguishes siblings that share a schema
    /// node (array elements, pattern-property values).
    salt: u32,
    edge: bool,
    prefer_examples: bool,
    ref_hops: HashMap<String, usize>,
}

impl Generator<'_> {
    fn rng_at(&self, canon_path: &str) -> XorShift32 {
        XorShift32::new(self.item_seed ^ self.salt, canon_path)
    }

    fn with_salt<T>(&mut self, salt: u32, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.salt;
        self.salt ^= salt;
        let result = f(self);
        self.salt = previous;
        result
    }

    fn value_for(&mut self, node: &SchemaNode) -> Result<Value, GenerateError> {
        let mut rng = self.rng_at(&node.canon_path);

        if self.prefer_examples {
            if let Some(example) = node.examples.iter().find(|e| fits(e, node)) {
                return Ok(example.clone());
            }
            if let Some(default) = node.default.as_ref().filter(|d| fits(d, node)) {
                return Ok(default.clone());
            }
        }

        if let Some(pinned) = node.pinned_values() {
            return self.pick_pinned(node, &pinned, &mut rng);
        }

        match &node.kind {
            SchemaKind::Null => Ok(Value::Null),
            SchemaKind::Boolean => Ok(Value::Bool(if self.edge { false } else { rng.next() & 1 == 1 })),
            SchemaKind::Number(keywords) => self.number_for(node, keywords, false, &mut rng),
            SchemaKind::Integer(keywords) => self.number_for(node, keywords, true, &mut rng),
            SchemaKind::String(keywords) => Ok(Value::String(text::sample_string(
                keywords,
                self.formats,
                &node.canon_path,
                self.edge,
                &mut rng,
                self.diagnostics,
                self.metrics,
            ))),
            SchemaKind::Object(keywords) => self.object_for(node, keywords),
            SchemaKind::Array(keywords) => self.array_for(node, keywords),
            SchemaKind::Composition(comp) => self.composition_for(node, comp),
            SchemaKind::Reference(target) => self.reference_for(node, target),
            SchemaKind::EnumOnly => Err(GenerateError::infeasible(
                &node.canon_path,
                json!({"reason": "empty enum"}),
            )),
            SchemaKind::Any => Ok(json!({})),
            SchemaKind::Never => Err(GenerateError::Unsatisfiable {
                canon_path: node.canon_path.clone(),
                reason: "false schema accepts nothing".to_string(),
            }),
        }
    }

    fn pick_pinned(
        &mut self,
        node: &SchemaNode,
        pinned: &[Value],
        rng: &mut XorShift32,
    ) -> Result<Value, GenerateError> {
        // Feasibility here is the bounds only; a pinned value that misses a
        // multipleOf is still emitted and left for repair to reconcile.
        let feasible: Vec<&Value> = pinned
            .iter()
            .filter(|candidate| match &node.kind {
                SchemaKind::Number(keywords) | SchemaKind::Integer(keywords) => {
                    let bounds_only = datasynth_schema::NumberKeywords {
                        multiple_of: None,
                        ..*keywords
                    };
                    candidate
                        .as_f64()
                        .is_some_and(|v| number::in_bounds(v, &bounds_only))
                }
                _ => true,
            })
            .collect();
        if feasible.is_empty() {
            return Err(GenerateError::infeasible(
                &node.canon_path,
                json!({"reason": "enum has no member satisfying the constraints"}),
            ));
        }
        let choice = if self.edge { feasible[0] } else { feasible[rng.next_index(feasible.len())] };
        let usage = self.enum_usage.entry(node.canon_path.clone()).or_default();
        *usage.entry(choice.to_string()).or_default() += 1;
        Ok(normalize_zero(choice.clone()))
    }

    fn number_for(
        &mut self,
        node: &SchemaNode,
        keywords: &datasynth_schema::NumberKeywords,
        integer: bool,
        rng: &mut XorShift32,
    ) -> Result<Value, GenerateError> {
        match number::sample(keywords, integer, self.edge, rng) {
            NumberOutcome::Value(v) => Ok(v),
            NumberOutcome::Infeasible(details) => {
                Err(GenerateError::infeasible(&node.canon_path, details))
            }
        }
    }

    fn object_for(
        &mut self,
        node: &SchemaNode,
        keywords: &ObjectKeywords,
    ) -> Result<Value, GenerateError> {
        let mut out = Map::new();
        self.fill_object(node, keywords, &mut out)?;
        Ok(Value::Object(out))
    }

    /// Populate `out` with required properties, dependent requirements, and
    /// minProperties filler, honoring `additionalProperties: false` and any
    /// name coverage at this node.
    fn fill_object(
        &mut self,
        node: &SchemaNode,
        keywords: &ObjectKeywords,
        out: &mut Map<String, Value>,
    ) -> Result<(), GenerateError> {
        let mut required: Vec<String> = keywords.required.clone();
        required.sort();

        for name in &required {
            if !out.contains_key(name) {
                let value = self.property_value(keywords, name)?;
                out.insert(name.clone(), value);
            }
        }

        // dependentRequired closure, bounded by the declared set size.
        for _ in 0..keywords.dependent_required.len() {
            let mut added = false;
            for (trigger, needed) in &keywords.dependent_required {
                if out.contains_key(trigger) {
                    for name in needed {
                        if !out.contains_key(name) {
                            let value = self.property_value(keywords, name)?;
                            out.insert(name.clone(), value);
                            added = true;
                        }
                    }
                }
            }
            if !added {
                break;
            }
        }

        let min_properties = keywords.min_properties.unwrap_or(0) as usize;
        if out.len() < min_properties {
            let optional: Vec<(String, SchemaNode)> = keywords
                .properties
                .iter()
                .filter(|(name, _)| !out.contains_key(name))
                .cloned()
                .collect();
            for (name, sub) in optional {
                if out.len() >= min_properties {
                    break;
                }
                if self.name_allowed(node, &name) {
                    let value = self.with_salt(name_salt(&name), |g| g.value_for(&sub))?;
                    out.insert(name, value);
                }
            }
        }
        if out.len() < min_properties && !keywords.pattern_properties.is_empty() {
            self.fill_from_pattern_properties(node, keywords, min_properties, out)?;
        }

        Ok(())
    }

    /// Value for a required property: its declared schema, a matching
    /// pattern property, the additionalProperties schema, or the minimal
    /// object.
    fn property_value(
        &mut self,
        keywords: &ObjectKeywords,
        name: &str,
    ) -> Result<Value, GenerateError> {
        if let Some(sub) = keywords.property(name) {
            let sub = sub.clone();
            return self.value_for(&sub);
        }
        for (pattern, sub) in &keywords.pattern_properties {
            if let Ok(re) = regex::Regex::new(pattern)
                && re.is_match(name)
            {
                let sub = sub.clone();
                return self.with_salt(name_salt(name), |g| g.value_for(&sub));
            }
        }
        if let AdditionalProperties::Schema(sub) = &keywords.additional {
            let sub = (**sub).clone();
            return self.with_salt(name_salt(name), |g| g.value_for(&sub));
        }
        Ok(json!({}))
    }

    /// Mint names from pattern-property pseudo-enums, round-robin, until
    /// `minProperties` is met or the name pool runs dry.
    fn fill_from_pattern_properties(
        &mut self,
        node: &SchemaNode,
        keywords: &ObjectKeywords,
        min_properties: usize,
        out: &mut Map<String, Value>,
    ) -> Result<(), GenerateError> {
        let pools: Vec<(Vec<String>, SchemaNode)> = keywords
            .pattern_properties
            .iter()
            .filter_map(|(pattern, sub)| {
                literal_alternation(pattern).map(|names| (names, sub.clone()))
            })
            .collect();
        if pools.is_empty() {
            return Ok(());
        }

        self.diagnostics.push(Diagnostic::with_details(
            DiagnosticCode::TargetEnumRoundrobinPatternprops,
            &node.canon_path,
            json!({"pools": pools.len()}),
        ));

        let mut cursor = 0usize;
        let flattened: Vec<(String, SchemaNode)> = pools
            .iter()
            .flat_map(|(names, sub)| names.iter().map(move |n| (n.clone(), sub.clone())))
            .collect();
        while out.len() < min_properties && cursor < flattened.len() {
            let (name, sub) = &flattened[cursor];
            cursor += 1;
            if out.contains_key(name) || !self.name_allowed(node, name) {
                continue;
            }
            let value = self.with_salt(name_salt(name), |g| g.value_for(sub))?;
            out.insert(name.clone(), value);
        }
        Ok(())
    }

    /// Is `name` admissible at this node under its coverage decider?
    fn name_allowed(&self, node: &SchemaNode, name: &str) -> bool {
        self.plan
            .coverage
            .get(&node.canon_path)
            .is_none_or(|decider| decider.has(name))
    }

    fn composition_for(
        &mut self,
        node: &SchemaNode,
        comp: &Composition,
    ) -> Result<Value, GenerateError> {
        let mut result: Option<Value> = None;
        if let Some(base) = &comp.base {
            result = Some(self.value_for(base)?);
        }
        for member in &comp.all_of {
            let value = self.value_for(member)?;
            result = Some(merge(result, value));
        }

        if let Some((_, branches)) = comp.branches() {
            let base_keywords = comp.base.as_ref().and_then(|b| object_keywords(&b.kind));
            let mut chosen = None;
            for (index, branch) in branches.iter().enumerate() {
                self.metrics.incr(names::BRANCH_TRIALS_TRIED, 1);
                if self.branch_satisfiable(branch, base_keywords) {
                    chosen = Some(index);
                    break;
                }
            }
            let Some(index) = chosen else {
                return Err(GenerateError::Unsatisfiable {
                    canon_path: node.canon_path.clone(),
                    reason: "no composition branch is satisfiable".to_string(),
                });
            };
            self.branch_usage
                .entry(node.canon_path.clone())
                .or_default()
                .push(index);
            let value = self.value_for(&branches[index])?;
            result = Some(merge(result, value));
        }

        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// A branch is satisfiable when none of its required names collide with
    /// a closed base and the branch itself is not a `false` schema.
    fn branch_satisfiable(&self, branch: &SchemaNode, base: Option<&ObjectKeywords>) -> bool {
        if matches!(branch.kind, SchemaKind::Never) {
            return false;
        }
        let Some(base) = base else { return true };
        if base.additional != AdditionalProperties::Forbidden {
            return true;
        }
        required_of(branch)
            .iter()
            .all(|name| base.property(name).is_some())
    }

    fn array_for(
        &mut self,
        node: &SchemaNode,
        keywords: &ArrayKeywords,
    ) -> Result<Value, GenerateError> {
        let min_items = keywords.min_items.unwrap_or(0) as usize;
        if let Some(max_items) = keywords.max_items
            && (max_items as usize) < min_items
        {
            return Err(GenerateError::infeasible(
                &node.canon_path,
                json!({"minItems": min_items, "maxItems": max_items}),
            ));
        }

        let mut out: Vec<Value> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for (index, prefix) in keywords.prefix_items.iter().enumerate() {
            let value = self.with_salt(index as u32, |g| g.value_for(prefix))?;
            self.push_item(node, keywords, value, Some(prefix), &mut out, &mut seen)?;
        }

        let witness_count = self
            .plan
            .contains
            .get(&node.canon_path)
            .map_or(0, |req| req.min as usize);
        let target = min_items.max(out.len() + witness_count);

        if let Some(contains) = &keywords.contains {
            for index in 0..witness_count {
                let value =
                    self.with_salt(0x5EED ^ (index as u32), |g| g.value_for(contains))?;
                self.push_item(node, keywords, value, Some(contains), &mut out, &mut seen)?;
            }
        }

        let filler_schema = keywords.items.as_deref();
        let mut index = out.len() as u32;
        while out.len() < target.max(min_items) {
            let value = match filler_schema {
                Some(items) => self.with_salt(index, |g| g.value_for(items))?,
                None => json!({}),
            };
            self.push_item(node, keywords, value, filler_schema, &mut out, &mut seen)?;
            index += 1;
        }

        if let Some(max_items) = keywords.max_items {
            out.truncate(max_items as usize);
        }
        Ok(Value::Array(out))
    }

    /// Append one element, re-rolling under uniqueItems.
    fn push_item(
        &mut self,
        node: &SchemaNode,
        keywords: &ArrayKeywords,
        value: Value,
        schema: Option<&SchemaNode>,
        out: &mut Vec<Value>,
        seen: &mut Vec<String>,
    ) -> Result<(), GenerateError> {
        if !keywords.unique_items {
            out.push(value);
            return Ok(());
        }
        let mut value = value;
        for attempt in 0..=UNIQUE_RETRIES {
            let key = canonical_key(&value);
            if !seen.contains(&key) {
                seen.push(key);
                out.push(value);
                return Ok(());
            }
            let Some(schema) = schema else { break };
            if attempt == UNIQUE_RETRIES {
                break;
            }
            if value.is_string() {
                let mut rng = self.rng_at(&schema.canon_path);
                let exclusivity_rand = rng.next_float01();
                self.diagnostics.push(Diagnostic::with_details(
                    DiagnosticCode::ExclusivityTweakString,
                    &schema.canon_path,
                    json!({"exclusivityRand": exclusivity_rand}),
                ));
            }
            value = self.with_salt(0xA11C_E5 ^ (attempt + 1), |g| g.value_for(schema))?;
        }
        Err(GenerateError::Unsatisfiable {
            canon_path: node.canon_path.clone(),
            reason: "uniqueItems exhausted the feasible value space".to_string(),
        })
    }

    fn reference_for(&mut self, node: &SchemaNode, target: &str) -> Result<Value, GenerateError> {
        if !target.starts_with('#') && !self.plan.ref_targets.contains_key(target) {
            // Unresolved external refs are stubbed with the empty schema in
            // runs that allowed generation to proceed.
            self.diagnostics.push(Diagnostic::with_details(
                DiagnosticCode::ExternalRefStubbed,
                &node.canon_path,
                json!({"ref": target}),
            ));
            return Ok(json!({}));
        }

        let hops = self.ref_hops.entry(target.to_string()).or_insert(0);
        if *hops >= REF_HOP_LIMIT {
            self.diagnostics.push(Diagnostic::with_details(
                DiagnosticCode::DynamicScopeBounded,
                &node.canon_path,
                json!({"ref": target, "hopLimit": REF_HOP_LIMIT}),
            ));
            return Ok(json!({}));
        }
        *hops += 1;

        let result = match self.plan.ref_targets.get(target) {
            Some(resolved) => {
                let resolved = resolved.clone();
                self.value_for(&resolved)
            }
            None => Ok(json!({})),
        };

        if let Some(hops) = self.ref_hops.get_mut(target) {
            *hops -= 1;
        }
        result
    }
}

/// Required property names of a node, looking through compositions and refs
/// one level deep.
fn required_of(node: &SchemaNode) -> Vec<String> {
    match &node.kind {
        SchemaKind::Object(keywords) => keywords.required.clone(),
        SchemaKind::Composition(comp) => {
            let mut out = Vec::new();
            if let Some(base) = &comp.base {
                out.extend(required_of(base));
            }
            for member in &comp.all_of {
                out.extend(required_of(member));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn object_keywords(kind: &SchemaKind) -> Option<&ObjectKeywords> {
    match kind {
        SchemaKind::Object(keywords) => Some(keywords),
        SchemaKind::Composition(comp) => comp.base.as_deref().and_then(|b| object_keywords(&b.kind)),
        _ => None,
    }
}

/// Merge a branch value over the accumulated result. Object keys from the
/// accumulator win; branch-only keys append after, preserving insertion
/// order.
fn merge(current: Option<Value>, incoming: Value) -> Value {
    match (current, incoming) {
        (None, incoming) => incoming,
        (Some(Value::Object(mut base)), Value::Object(branch)) => {
            for (key, value) in branch {
                base.entry(key).or_insert(value);
            }
            Value::Object(base)
        }
        (Some(existing), _) => existing,
    }
}

// Uniqueness key with sorted object keys; serde_json's own serialization is
// insertion-ordered and would treat key order as significant.
fn canonical_key(value: &Value) -> String {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .iter()
                .map(|k| format!("{}:{}", k, canonical_key(&obj[*k])))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_key).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

fn normalize_zero(value: Value) -> Value {
    if let Some(v) = value.as_f64()
        && v == 0.0
    {
        return Value::from(0);
    }
    value
}

/// Shallow conformance check for examples and defaults.
fn fits(value: &Value, node: &SchemaNode) -> bool {
    if let Some(enum_values) = &node.enum_values {
        return enum_values.contains(value);
    }
    match &node.kind {
        SchemaKind::Object(_) => value.is_object(),
        SchemaKind::Array(_) => value.is_array(),
        SchemaKind::String(_) => value.is_string(),
        SchemaKind::Number(keywords) => {
            value.as_f64().is_some_and(|v| number::in_bounds(v, keywords))
        }
        SchemaKind::Integer(keywords) => {
            value.is_i64() && value.as_f64().is_some_and(|v| number::in_bounds(v, keywords))
        }
        SchemaKind::Boolean => value.is_boolean(),
        SchemaKind::Null => value.is_null(),
        SchemaKind::Never => false,
        _ => true,
    }
}

fn name_salt(name: &str) -> u32 {
    datasynth_utils::rng::fnv1a32(name)
}
