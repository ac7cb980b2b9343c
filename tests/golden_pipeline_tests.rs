//! Golden end-to-end pipeline scenarios
//!
//! Each test pins one observable contract of the pipeline surface: value
//! selection on narrow numeric grids, composition key ordering, skip/fail
//! propagation, the external-ref policy, repair revert, and the parity
//! gate.

use serde_json::json;

use datasynth::{
    DiagnosticCode, PipelineOptions, RunStatus, StageId, StageOverrides, StageStatus,
    execute_pipeline,
};
use datasynth_validator::Validator;

#[tokio::test]
async fn test_number_multiple_of_narrow_decimal_range() {
    let schema = json!({
        "type": "number",
        "multipleOf": 0.01,
        "minimum": 0.97,
        "maximum": 0.99
    });
    let mut options = PipelineOptions::default();
    options.generate.seed = 42;
    options.generate.count = 1;

    let result = execute_pipeline(&schema, options, StageOverrides::default()).await;

    assert_eq!(result.status, RunStatus::Completed, "errors: {:?}", result.errors);
    let generated = result.artifacts.generated.as_ref().unwrap();
    let v = generated.items[0].as_f64().unwrap();
    assert!(
        (v - 0.97).abs() < 1e-12 || (v - 0.98).abs() < 1e-12 || (v - 0.99).abs() < 1e-12,
        "value off the grid: {v}"
    );
    let validation = result.artifacts.validation.as_ref().unwrap();
    assert!(validation.valid);
    assert!(!validation.skipped_validation);
}

#[tokio::test]
async fn test_openapi_style_root_any_of() {
    let schema = json!({
        "type": "object",
        "required": ["openapi", "info"],
        "properties": {
            "openapi": {"const": "3.1.0"},
            "info": {"type": "object"},
            "paths": {"type": "object"},
            "components": {"type": "object"},
            "webhooks": {"type": "object"}
        },
        "anyOf": [
            {"required": ["paths"]},
            {"required": ["components"]},
            {"required": ["webhooks"]}
        ],
        "unevaluatedProperties": false
    });
    let mut options = PipelineOptions::default();
    options.generate.seed = 7;

    let result = execute_pipeline(&schema, options, StageOverrides::default()).await;
    assert_eq!(result.status, RunStatus::Completed, "errors: {:?}", result.errors);

    let item = &result.artifacts.generated.as_ref().unwrap().items[0];
    let keys: Vec<&String> = item.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 3, "expected exactly three keys, got {keys:?}");
    assert_eq!(keys[0], "info");
    assert_eq!(keys[1], "openapi");
    assert!(
        ["paths", "components", "webhooks"].contains(&keys[2].as_str()),
        "unexpected branch key {:?}",
        keys[2]
    );
    assert_eq!(item[keys[2].as_str()], json!({}), "branch key must map to the empty object");
}

#[tokio::test]
async fn test_generate_failure_skips_downstream_stages() {
    let schema = json!({"type": "string"});
    let overrides = StageOverrides::failing_generate("fail-generate");

    let result = execute_pipeline(&schema, PipelineOptions::default(), overrides).await;

    assert_eq!(result.status, RunStatus::Failed);
    let timeline: Vec<StageId> = result.timeline.iter().map(|r| r.stage).collect();
    assert_eq!(timeline, [StageId::Normalize, StageId::Compose, StageId::Generate]);
    assert_eq!(result.stages.generate, StageStatus::Failed);
    assert_eq!(result.stages.repair, StageStatus::Skipped);
    assert_eq!(result.stages.validate, StageStatus::Skipped);
    assert!(result.errors.iter().any(|e| {
        e.stage == StageId::Generate && e.cause.as_deref() == Some("fail-generate")
    }));
}

#[tokio::test]
async fn test_external_ref_strict_error_fails_at_compose() {
    let schema = json!({
        "type": "object",
        "properties": {
            "supplier": {"$ref": "https://example.com/external.schema.json#/Supplier"}
        }
    });

    let result =
        execute_pipeline(&schema, PipelineOptions::default(), StageOverrides::default()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.stages.compose, StageStatus::Failed);
    let diag = &result.artifacts.validation_diagnostics[0];
    assert_eq!(diag.code, DiagnosticCode::ExternalRefUnresolved);
    let details = diag.details.as_ref().unwrap();
    assert_eq!(details["mode"], "strict");
    assert!(
        details.get("skippedValidation").is_none(),
        "hard failure must not claim a skipped validation"
    );
}

#[tokio::test]
async fn test_repair_revert_on_non_progress() {
    let schema = json!({"type": "integer", "const": 5, "multipleOf": 3});
    let mut options = PipelineOptions::default();
    options.generate.seed = 1;
    options.repair.attempts = 3;
    options.repair.score_script = Some(vec![3.0, 1.0, 3.0]);

    let result = execute_pipeline(&schema, options, StageOverrides::default()).await;

    let revert = result
        .artifacts
        .repair_diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::RepairRevertedNoProgress)
        .expect("revert diagnostic expected");
    let details = revert.details.as_ref().unwrap();
    assert_eq!(details["scoreBefore"], 3.0);
    assert_eq!(details["scoreAfter"], 3.0);

    // The reverted item is byte-identical to its generated input.
    let generated = &result.artifacts.generated.as_ref().unwrap().items[0];
    let repaired = &result.artifacts.repaired.as_ref().unwrap().items[0];
    assert_eq!(generated, repaired);
}

#[tokio::test]
async fn test_parity_mismatch_fails_the_run() {
    let schema = json!({"type": "string"});
    let mut overrides = StageOverrides::default();
    overrides.source_validator = Some(Box::new(|dialect, validate_options| {
        let validator = datasynth_validator::source_validator(dialect, validate_options);
        let mut flags = validator.options().clone();
        flags.unicode_regexp = false;
        datasynth_validator::DialectValidator::new(dialect, flags)
    }));

    let result = execute_pipeline(&schema, PipelineOptions::default(), overrides).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.stages.validate, StageStatus::Failed);
    let diag = result
        .artifacts
        .validation_diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::AjvFlagsMismatch)
        .expect("parity diagnostic expected");
    let diffs = diag.details.as_ref().unwrap()["diffs"].as_array().unwrap().clone();
    assert!(diffs.contains(&json!("unicodeRegExp")));
}

#[tokio::test]
async fn test_metrics_and_timeline_on_success() {
    let schema = json!({"type": "integer", "minimum": 0, "maximum": 10});
    let result =
        execute_pipeline(&schema, PipelineOptions::default(), StageOverrides::default()).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.timeline.len(), 5);
    assert!(result.timeline.iter().all(|r| r.status == StageStatus::Completed));
    for stage in ["normalize", "compose", "generate", "repair", "validate"] {
        assert!(result.metrics.phases.contains_key(stage), "missing phase timer for {stage}");
    }
}

#[tokio::test]
async fn test_seed_echoed_in_artifacts() {
    let schema = json!({"type": "boolean"});
    let mut options = PipelineOptions::default();
    options.generate.seed = 123;
    options.generate.count = 4;

    let result = execute_pipeline(&schema, options, StageOverrides::default()).await;
    let generated = result.artifacts.generated.as_ref().unwrap();
    assert_eq!(generated.seed, 123);
    assert_eq!(generated.items.len(), 4);
}
