//! Property-based tests for the pipeline invariants
//!
//! Covered properties:
//! - Determinism: identical `(schema, seed)` runs yield identical items.
//! - Generator ⇒ oracle: emitted instances pass Source validation.
//! - multipleOf tolerance and strict exclusive bounds on emitted numbers.
//! - Repair monotonicity: kept passes strictly decrease the score.
//! - Phase admissibility of every surfaced diagnostic.
//! - Parity: the gate's diff list is empty iff no mismatch exists.
//! - The external-ref policy matrix.
//!
//! ## Configuration
//!
//! Property test case counts can be configured via environment variables:
//!
//! - `PROPTEST_CASES`: Number of test cases per property (default: 32)
//! - `PROPTEST_MAX_SHRINK_ITERS`: Max shrinking iterations on failure

use proptest::prelude::*;
use serde_json::{Value, json};
use std::env;

use datasynth::{
    DiagnosticCode, ExternalRefPolicy, PipelineOptions, PipelineResult, RunMode, RunStatus,
    StageOverrides, execute_pipeline,
};

/// Default number of test cases per property; pipeline runs are not cheap.
const DEFAULT_PROPTEST_CASES: u32 = 32;

fn proptest_config(max_cases: Option<u32>) -> ProptestConfig {
    let env_cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES);
    let cases = max_cases.map_or(env_cases, |cap| env_cases.min(cap));
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

fn run_pipeline(schema: &Value, seed: u32, count: usize) -> PipelineResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    let mut options = PipelineOptions::default();
    options.generate.seed = seed;
    options.generate.count = count;
    runtime.block_on(execute_pipeline(schema, options, StageOverrides::default()))
}

/// A pool of small, satisfiable schemas exercising every type strategy.
fn schema_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        // integers with bounds
        (-50i64..50, 1i64..100).prop_map(|(lo, span)| json!({
            "type": "integer", "minimum": lo, "maximum": lo + span
        })),
        // numbers with a decimal grid
        (1u32..5, 0i64..20).prop_map(|(digits, lo)| {
            let mo = 10f64.powi(-(digits as i32));
            json!({
                "type": "number",
                "multipleOf": mo,
                "minimum": lo as f64,
                "maximum": lo as f64 + 1.0
            })
        }),
        // bounded strings
        (0u64..5, 0u64..10).prop_map(|(lo, extra)| json!({
            "type": "string", "minLength": lo, "maxLength": lo + extra
        })),
        // arrays of integers
        (0u64..4, 1i64..50).prop_map(|(min_items, hi)| json!({
            "type": "array",
            "items": {"type": "integer", "minimum": 0, "maximum": hi},
            "minItems": min_items
        })),
        // objects with required properties
        proptest::collection::vec("[a-z]{1,6}", 1..4).prop_map(|names| {
            let mut properties = serde_json::Map::new();
            for name in &names {
                properties.insert(name.clone(), json!({"type": "integer", "minimum": 0}));
            }
            json!({
                "type": "object",
                "required": names,
                "properties": properties
            })
        }),
        // enums
        proptest::collection::vec(-100i64..100, 1..6).prop_map(|values| json!({
            "enum": values
        })),
    ]
}

proptest! {
    #![proptest_config(proptest_config(Some(32)))]

    #[test]
    fn prop_determinism(schema in schema_strategy(), seed in 0u32..1000) {
        let a = run_pipeline(&schema, seed, 3);
        let b = run_pipeline(&schema, seed, 3);
        let items_a = &a.artifacts.generated.as_ref().unwrap().items;
        let items_b = &b.artifacts.generated.as_ref().unwrap().items;
        prop_assert_eq!(items_a, items_b);
    }

    #[test]
    fn prop_generator_satisfies_oracle(schema in schema_strategy(), seed in 0u32..1000) {
        let result = run_pipeline(&schema, seed, 2);
        prop_assert_eq!(result.status, RunStatus::Completed);
        let validation = result.artifacts.validation.as_ref().unwrap();
        if !validation.skipped_validation {
            prop_assert!(validation.valid, "rows: {:?}", validation.rows);
        }
    }

    #[test]
    fn prop_multiple_of_tolerance(digits in 1u32..5, lo in 0i64..20, seed in 0u32..1000) {
        let mo = 10f64.powi(-(digits as i32));
        let schema = json!({
            "type": "number",
            "multipleOf": mo,
            "minimum": lo as f64,
            "maximum": lo as f64 + 1.0
        });
        let result = run_pipeline(&schema, seed, 3);
        for item in &result.artifacts.generated.as_ref().unwrap().items {
            let v = item.as_f64().unwrap();
            prop_assert!(
                datasynth_utils::rat::is_multiple_ulp(v, mo),
                "value {} is not a ULP-tolerant multiple of {}",
                v,
                mo
            );
        }
    }

    #[test]
    fn prop_exclusive_bounds_strict(a in -100i64..100, span in 2i64..50, seed in 0u32..1000) {
        let schema = json!({
            "type": "number",
            "exclusiveMinimum": a as f64,
            "exclusiveMaximum": (a + span) as f64
        });
        let result = run_pipeline(&schema, seed, 3);
        for item in &result.artifacts.generated.as_ref().unwrap().items {
            let v = item.as_f64().unwrap();
            prop_assert!(v > a as f64, "violated exclusiveMinimum: {}", v);
            prop_assert!(v < (a + span) as f64, "violated exclusiveMaximum: {}", v);
        }
    }

    #[test]
    fn prop_phase_admissibility(schema in schema_strategy(), seed in 0u32..1000) {
        let result = run_pipeline(&schema, seed, 2);
        for diag in result
            .artifacts
            .validation_diagnostics
            .iter()
            .chain(result.artifacts.repair_diagnostics.iter())
        {
            prop_assert_eq!(diag.phase, diag.code.phase());
        }
        if let Some(generated) = &result.artifacts.generated {
            for diag in &generated.diagnostics {
                prop_assert_eq!(diag.phase, diag.code.phase());
            }
        }
    }
}

proptest! {
    #![proptest_config(proptest_config(Some(16)))]

    #[test]
    fn prop_repair_monotonicity(values in proptest::collection::vec(-20i64..20, 1..5)) {
        // Items below the bound must be lifted to validity; kept passes
        // strictly decrease the score, so the final report is clean.
        let schema = json!({"type": "integer", "minimum": 0});
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut options = PipelineOptions::default();
        options.repair.attempts = 3;
        let mut overrides = StageOverrides::default();
        let items: Vec<Value> = values.iter().map(|v| json!(v)).collect();
        let override_items = items.clone();
        overrides.generate = Some(Box::new(move |_plan| {
            let items = override_items.clone();
            Box::pin(async move {
                Ok(datasynth::GenerateOutput { items, diagnostics: Vec::new(), seed: 1 })
            })
        }));
        let result = runtime.block_on(execute_pipeline(&schema, options, overrides));
        let validation = result.artifacts.validation.as_ref().unwrap();
        prop_assert!(validation.valid, "repair failed to converge: {:?}", validation.rows);
        for item in &result.artifacts.repaired.as_ref().unwrap().items {
            prop_assert!(item.as_i64().unwrap() >= 0);
        }
    }

    #[test]
    fn prop_parity_diffs_empty_iff_match(
        unicode in any::<bool>(),
        formats_differ in any::<bool>(),
    ) {
        use datasynth::ValidateOptions;
        use datasynth_validator::{ParityExpectations, check_parity, source_validator, planning_validator, Validator};
        use datasynth::Dialect;

        let opts = ValidateOptions::default();
        let source = source_validator(Dialect::Draft7, &opts);
        let planning = planning_validator(&opts);
        let mut source_flags = source.options().clone();
        let planning_flags = planning.options().clone();
        source_flags.unicode_regexp = unicode;
        if formats_differ {
            source_flags.validate_formats = !planning_flags.validate_formats;
        }

        let expectations = ParityExpectations {
            validate_formats: false,
            discriminator: false,
            source_class: "Ajv".to_string(),
            planning_class: "Ajv2020".to_string(),
            multiple_of_precision: None,
            compiling_union_views: true,
        };
        let outcome = check_parity(&source_flags, &planning_flags, &expectations);
        let expect_clean = unicode && !formats_differ;
        prop_assert_eq!(outcome.is_ok(), expect_clean);
    }
}

#[test]
fn test_external_ref_policy_matrix() {
    let schema = json!({
        "type": "object",
        "properties": {"x": {"$ref": "https://example.com/far.schema.json"}}
    });
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let run = |mode: RunMode, policy: ExternalRefPolicy| {
        let mut options = PipelineOptions::default();
        options.mode = mode;
        options.external_ref_policy = policy;
        runtime.block_on(execute_pipeline(&schema, options, StageOverrides::default()))
    };

    // strict + error → failed.
    let result = run(RunMode::Strict, ExternalRefPolicy::Error);
    assert_eq!(result.status, RunStatus::Failed);

    // strict + warn → completed, skipped, diagnostic present.
    let result = run(RunMode::Strict, ExternalRefPolicy::Warn);
    assert_eq!(result.status, RunStatus::Completed, "errors: {:?}", result.errors);
    let validation = result.artifacts.validation.as_ref().unwrap();
    assert!(validation.skipped_validation);
    assert!(
        result
            .artifacts
            .validation_diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::ExternalRefUnresolved)
    );

    // strict + ignore → completed, skipped, diagnostic suppressed.
    let result = run(RunMode::Strict, ExternalRefPolicy::Ignore);
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.artifacts.validation.as_ref().unwrap().skipped_validation);
    assert!(
        !result
            .artifacts
            .validation_diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::ExternalRefUnresolved)
    );

    // lax → completed, diagnostic present, items generated with stubs.
    let result = run(RunMode::Lax, ExternalRefPolicy::Error);
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.artifacts.validation.as_ref().unwrap().skipped_validation);
    assert!(
        result
            .artifacts
            .validation_diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::ExternalRefUnresolved)
    );
    assert!(!result.artifacts.generated.as_ref().unwrap().items.is_empty());
}
