//! The repair loop

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use datasynth_compose::Plan;
use datasynth_diagnostics::{Diagnostic, DiagnosticCode};
use datasynth_metrics::{MetricsCollector, names};
use datasynth_validator::CompiledSchema;

use crate::score::Scorer;
use crate::{tier1, tier2};

/// Bounds for the per-item attempt budget.
const MIN_ATTEMPTS: u32 = 1;
const MAX_ATTEMPTS: u32 = 3;

/// Options for the Repair stage.
#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// Attempts per item, clamped to `[1, 3]`.
    pub attempts: u32,
    /// Test seam: replace the score function with a fixed observation
    /// sequence (the last value repeats when exhausted).
    pub score_script: Option<Vec<f64>>,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self { attempts: 2, score_script: None }
    }
}

/// One applied repair action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairAction {
    #[serde(rename = "itemIndex")]
    pub item_index: usize,
    pub tier: u8,
    pub keyword: String,
    #[serde(rename = "instancePath")]
    pub instance_path: String,
    pub detail: Value,
}

/// Output of the Repair stage.
#[derive(Debug, Clone, Default)]
pub struct RepairOutput {
    pub items: Vec<Value>,
    pub diagnostics: Vec<Diagnostic>,
    pub actions: Vec<RepairAction>,
}

/// Repair every item against the compiled Source schema.
///
/// Per item: validate, apply Tier-1 then Tier-2 rules over the errors in
/// `(instancePath, keyword)` order, re-validate. A pass whose score fails
/// to strictly decrease is reverted wholesale
/// (`REPAIR_REVERTED_NO_PROGRESS`) and the item keeps its pre-pass value.
pub fn repair(
    plan: &Plan,
    compiled: &dyn CompiledSchema,
    items: &[Value],
    opts: &RepairOptions,
    metrics: &mut MetricsCollector,
) -> RepairOutput {
    let attempts = opts.attempts.clamp(MIN_ATTEMPTS, MAX_ATTEMPTS);
    let mut output = RepairOutput::default();

    for (item_index, item) in items.iter().enumerate() {
        let mut current = item.clone();
        let mut scorer = Scorer::new(opts.score_script.clone());
        let mut validations = 0u64;
        let mut passes = 0u64;
        let mut actions_this_row = 0u64;

        for _ in 0..attempts {
            let outcome = compiled.validate(&current);
            validations += 1;
            if outcome.ok {
                break;
            }
            passes += 1;

            let snapshot = current.clone();
            let score_before = scorer.observe(&outcome.errors);

            let mut errors = outcome.errors;
            errors.sort_by(|a, b| {
                a.instance_path
                    .cmp(&b.instance_path)
                    .then_with(|| a.keyword.cmp(&b.keyword))
            });
            let first_keyword = errors.first().map(|e| e.keyword.clone()).unwrap_or_default();

            let mut pass_actions: Vec<RepairAction> = Vec::new();
            let mut pass_diagnostics: Vec<Diagnostic> = Vec::new();

            for error in &errors {
                if let Some(detail) = tier1::apply(plan, error, &mut current) {
                    metrics.incr(names::REPAIR_TIER1_ACTIONS, 1);
                    pass_actions.push(RepairAction {
                        item_index,
                        tier: 1,
                        keyword: error.keyword.clone(),
                        instance_path: error.instance_path.clone(),
                        detail,
                    });
                } else if let Some(outcome) = tier2::apply(plan, error, &mut current, compiled) {
                    metrics.incr(names::REPAIR_TIER2_ACTIONS, 1);
                    pass_diagnostics.extend(outcome.diagnostics);
                    pass_actions.push(RepairAction {
                        item_index,
                        tier: 2,
                        keyword: error.keyword.clone(),
                        instance_path: error.instance_path.clone(),
                        detail: outcome.detail,
                    });
                } else {
                    metrics.incr(names::REPAIR_TIER_DISABLED, 1);
                    continue;
                }
                // Mid-pass observation after each action.
                let mid = compiled.validate(&current);
                validations += 1;
                let _ = scorer.observe(&mid.errors);
            }

            let final_outcome = compiled.validate(&current);
            validations += 1;
            let score_after = scorer.observe(&final_outcome.errors);

            if score_after >= score_before {
                current = snapshot;
                output.diagnostics.push(Diagnostic::with_details(
                    DiagnosticCode::RepairRevertedNoProgress,
                    "",
                    json!({
                        "keyword": first_keyword,
                        "scoreBefore": score_before,
                        "scoreAfter": score_after,
                    }),
                ));
                debug!(item_index, score_before, score_after, "repair pass reverted");
                break;
            }

            actions_this_row += pass_actions.len() as u64;
            output.actions.extend(pass_actions);
            output.diagnostics.extend(pass_diagnostics);
        }

        metrics.record(names::VALIDATIONS_PER_ROW, validations as f64);
        metrics.record(names::REPAIR_PASSES_PER_ROW, passes as f64);
        metrics.record(names::REPAIR_ACTIONS_PER_ROW, actions_this_row as f64);
        output.items.push(current);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasynth_compose::{ComposeContext, compose};
    use datasynth_schema::{Dialect, normalize};
    use datasynth_validator::{ValidateOptions, Validator, source_validator};
    use std::sync::Arc;

    fn setup(schema: Value) -> (Plan, std::sync::Arc<dyn CompiledSchema>) {
        let validator = source_validator(Dialect::Draft2020, &ValidateOptions::default());
        let compiled = validator.compile(&schema).unwrap();
        let normalized = Arc::new(normalize(&schema).unwrap());
        let ctx = ComposeContext::new(validator.options().clone(), "test");
        (compose(normalized, &ctx).unwrap(), compiled)
    }

    fn run(schema: Value, items: Vec<Value>, opts: RepairOptions) -> RepairOutput {
        let (plan, compiled) = setup(schema);
        let mut metrics = MetricsCollector::new();
        repair(&plan, compiled.as_ref(), &items, &opts, &mut metrics)
    }

    #[test]
    fn test_valid_item_untouched() {
        let out = run(
            json!({"type": "integer", "minimum": 0}),
            vec![json!(5)],
            RepairOptions::default(),
        );
        assert_eq!(out.items, vec![json!(5)]);
        assert!(out.actions.is_empty());
    }

    #[test]
    fn test_minimum_violation_repaired() {
        let out = run(
            json!({"type": "integer", "minimum": 10}),
            vec![json!(3)],
            RepairOptions::default(),
        );
        assert_eq!(out.items, vec![json!(10)]);
        assert_eq!(out.actions[0].tier, 1);
        assert_eq!(out.actions[0].keyword, "minimum");
    }

    #[test]
    fn test_missing_required_inserted() {
        let out = run(
            json!({
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string", "minLength": 1}}
            }),
            vec![json!({})],
            RepairOptions::default(),
        );
        let repaired = &out.items[0];
        assert!(repaired.get("name").is_some());
        assert!(out.actions.iter().any(|a| a.tier == 2 && a.keyword == "required"));
    }

    #[test]
    fn test_multi_error_fixed_in_path_order() {
        let out = run(
            json!({
                "type": "object",
                "required": ["a", "b"],
                "properties": {
                    "a": {"type": "integer", "minimum": 1},
                    "b": {"type": "string", "minLength": 2}
                }
            }),
            vec![json!({"a": 0, "b": "x"})],
            RepairOptions { attempts: 3, score_script: None },
        );
        assert_eq!(out.items[0], json!({"a": 1, "b": "xx"}));
        let paths: Vec<&str> = out.actions.iter().map(|a| a.instance_path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted, "actions must follow instancePath order");
    }

    #[test]
    fn test_scripted_non_progress_reverts() {
        // Score script [3, 1, 3]: before=3, one mid observation, after=3
        // (exhausted → last). The pass must revert and the item must be
        // byte-identical to the input.
        let input = json!(5);
        let out = run(
            json!({"type": "integer", "const": 5, "multipleOf": 3}),
            vec![input.clone()],
            RepairOptions { attempts: 3, score_script: Some(vec![3.0, 1.0, 3.0]) },
        );
        assert_eq!(out.items[0], input);
        let revert = out
            .diagnostics
            .iter()
            .find(|d| d.code == DiagnosticCode::RepairRevertedNoProgress)
            .expect("revert diagnostic");
        let details = revert.details.as_ref().unwrap();
        assert_eq!(details["scoreBefore"], 3.0);
        assert_eq!(details["scoreAfter"], 3.0);
    }

    #[test]
    fn test_attempts_clamped() {
        // attempts: 0 is clamped up to 1 and still repairs simple items.
        let out = run(
            json!({"type": "integer", "minimum": 2}),
            vec![json!(0)],
            RepairOptions { attempts: 0, score_script: None },
        );
        assert_eq!(out.items, vec![json!(2)]);
    }

    #[test]
    fn test_metrics_recorded() {
        let (plan, compiled) = setup(json!({"type": "integer", "minimum": 2}));
        let mut metrics = MetricsCollector::new();
        repair(
            &plan,
            compiled.as_ref(),
            &[json!(0), json!(7)],
            &RepairOptions::default(),
            &mut metrics,
        );
        let report = metrics.snapshot(datasynth_metrics::Verbosity::Ci);
        assert_eq!(report.distributions[names::VALIDATIONS_PER_ROW].count, 2);
        assert!(report.counters.get(names::REPAIR_TIER1_ACTIONS).copied().unwrap_or(0) >= 1);
    }

    #[test]
    fn test_type_error_coerced() {
        let out = run(
            json!({"type": "object", "properties": {"n": {"type": "integer"}}}),
            vec![json!({"n": "oops"})],
            RepairOptions::default(),
        );
        assert_eq!(out.items[0]["n"], json!(0));
    }
}
