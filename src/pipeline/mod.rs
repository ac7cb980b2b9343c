//! The pipeline orchestrator
//!
//! Runs the five stages strictly in order. A failed stage marks every
//! subsequent pending stage as skipped and fixes the run status to failed.
//! Stage outputs become immutable artifacts; diagnostics are checked
//! against the phase partition after every stage, and a violation is fatal
//! for the run.

pub mod artifacts;
pub mod options;
pub mod overrides;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use datasynth_compose::{ComposeContext, ComposeError, compose};
use datasynth_diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticPhase, assert_diagnostics_for_phase,
};
use datasynth_generate::{GenerateError, generate};
use datasynth_metrics::MetricsCollector;
use datasynth_repair::{RepairOutput, repair};
use datasynth_resolver::{
    RefDecision, ResolverOptions, classify_external_ref_failure, collect_external_refs,
    create_external_ref_diagnostic, decide, hydrate,
};
use datasynth_schema::normalize;
use datasynth_validator::{
    ParityExpectations, Validator, check_parity, flags::class_label_for, planning_validator,
    source_validator,
};

use self::artifacts::{Artifacts, RowValidation, ValidationFlagsSnapshot, ValidationReport};
use self::options::{CoverageMode, PipelineOptions};
use self::overrides::StageOverrides;

/// The five pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Normalize,
    Compose,
    Generate,
    Repair,
    Validate,
}

impl StageId {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Compose => "compose",
            Self::Generate => "generate",
            Self::Repair => "repair",
            Self::Validate => "validate",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Skipped,
}

/// Status of every stage, pending until its turn comes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStates {
    pub normalize: StageStatus,
    pub compose: StageStatus,
    pub generate: StageStatus,
    pub repair: StageStatus,
    pub validate: StageStatus,
}

impl StageStates {
    fn set(&mut self, stage: StageId, status: StageStatus) {
        match stage {
            StageId::Normalize => self.normalize = status,
            StageId::Compose => self.compose = status,
            StageId::Generate => self.generate = status,
            StageId::Repair => self.repair = status,
            StageId::Validate => self.validate = status,
        }
    }

    #[must_use]
    pub fn get(&self, stage: StageId) -> StageStatus {
        match stage {
            StageId::Normalize => self.normalize,
            StageId::Compose => self.compose,
            StageId::Generate => self.generate,
            StageId::Repair => self.repair,
            StageId::Validate => self.validate,
        }
    }

    /// After a failure, every stage still pending becomes skipped.
    fn skip_pending(&mut self) {
        for stage in [
            StageId::Normalize,
            StageId::Compose,
            StageId::Generate,
            StageId::Repair,
            StageId::Validate,
        ] {
            if self.get(stage) == StageStatus::Pending {
                self.set(stage, StageStatus::Skipped);
            }
        }
    }

    fn any_failed(&self) -> bool {
        [self.normalize, self.compose, self.generate, self.repair, self.validate]
            .contains(&StageStatus::Failed)
    }
}

/// One executed stage in the run timeline.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: StageId,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A captured stage failure with its cause chain.
#[derive(Error, Debug, Clone)]
#[error("stage {stage} failed: {message}")]
pub struct StageError {
    pub stage: StageId,
    pub message: String,
    pub cause: Option<String>,
}

impl StageError {
    fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self { stage, message: message.into(), cause: None }
    }

    fn with_cause(stage: StageId, message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// The result of one pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub status: RunStatus,
    pub schema: Value,
    pub stages: StageStates,
    pub metrics: datasynth_metrics::MetricsReport,
    /// Executed stages in order; stages that never ran do not appear.
    pub timeline: Vec<StageRecord>,
    pub errors: Vec<StageError>,
    pub artifacts: Artifacts,
}

struct StageScope {
    stage: StageId,
    started_at: DateTime<Utc>,
    t0: Instant,
}

fn open_stage(metrics: &mut MetricsCollector, stage: StageId) -> StageScope {
    metrics.begin_phase(stage.as_str()).ok();
    info!(stage = stage.as_str(), "stage started");
    StageScope { stage, started_at: Utc::now(), t0: Instant::now() }
}

fn close_stage(
    metrics: &mut MetricsCollector,
    timeline: &mut Vec<StageRecord>,
    states: &mut StageStates,
    scope: StageScope,
    status: StageStatus,
) {
    metrics.end_phase(scope.stage.as_str()).ok();
    states.set(scope.stage, status);
    timeline.push(StageRecord {
        stage: scope.stage,
        status,
        started_at: scope.started_at,
        finished_at: Utc::now(),
        duration_ms: scope.t0.elapsed().as_millis() as u64,
    });
}

/// Strip a fragment from a reference to get its document URI.
fn document_uri(reference: &str) -> &str {
    reference.split('#').next().unwrap_or(reference)
}

/// Execute the full pipeline on `schema`.
///
/// Never panics and never returns `Err`: all failures are captured into
/// `result.errors` and the stage states.
pub async fn execute_pipeline(
    schema: &Value,
    options: PipelineOptions,
    overrides: StageOverrides,
) -> PipelineResult {
    let mut metrics = MetricsCollector::new();
    let mut states = StageStates::default();
    let mut timeline = Vec::new();
    let mut errors: Vec<StageError> = Vec::new();
    let mut artifacts = Artifacts::default();
    let mut skip_validation = false;
    let mut final_validation_failed = false;

    'run: {
        // ---- normalize ------------------------------------------------
        let scope = open_stage(&mut metrics, StageId::Normalize);
        let normalized = match &overrides.normalize {
            Some(f) => f(schema.clone()).await.map_err(|message| {
                StageError::with_cause(StageId::Normalize, "normalize override failed", message)
            }),
            None => normalize(schema)
                .map_err(|e| StageError::with_cause(StageId::Normalize, "normalization failed", e.to_string())),
        };
        let normalized = match normalized {
            Ok(normalized) => {
                if let Err(violation) =
                    assert_diagnostics_for_phase(DiagnosticPhase::Normalize, &normalized.notes)
                {
                    errors.push(StageError::with_cause(
                        StageId::Normalize,
                        "inadmissible diagnostic phase",
                        violation.to_string(),
                    ));
                    close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                    break 'run;
                }
                Arc::new(normalized)
            }
            Err(error) => {
                errors.push(error);
                close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                break 'run;
            }
        };
        close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Completed);
        artifacts.canonical = Some(normalized.clone());

        // ---- resolver pre-phase --------------------------------------
        let dialect = normalized.dialect;
        let mut source = match &overrides.source_validator {
            Some(factory) => factory(dialect, &options.validate),
            None => source_validator(dialect, &options.validate),
        };
        let planning = planning_validator(&options.validate);

        let external_refs = collect_external_refs(&normalized.schema);
        let mut unresolved = external_refs.clone();
        let mut resolver_fingerprint = "none".to_string();
        let mut prephase_diagnostics: Vec<Diagnostic> = Vec::new();
        let mut external_targets: std::collections::BTreeMap<String, Value> =
            std::collections::BTreeMap::new();

        if !external_refs.is_empty()
            && let Some(resolver) = &overrides.resolver
        {
            match resolver.prefetch(&external_refs, &ResolverOptions::default()).await {
                Ok(entries) => {
                    let (registry, diags) = hydrate(entries, dialect, &normalized.schema);
                    resolver_fingerprint = registry.fingerprint();
                    prephase_diagnostics = diags;
                    for entry in registry.entries() {
                        source.add_schema(entry.schema.clone(), Some(entry.uri.clone())).ok();
                        external_targets.insert(entry.uri.clone(), entry.schema.clone());
                        if let Some(id) = entry.schema.get("$id").and_then(Value::as_str) {
                            external_targets.insert(id.to_string(), entry.schema.clone());
                        }
                    }
                    unresolved.retain(|reference| {
                        !external_targets.contains_key(document_uri(reference))
                    });
                }
                Err(error) => {
                    warn!(error = %error, "resolver prefetch failed; refs stay unresolved");
                }
            }
        }

        let mut external_failure = false;
        if !unresolved.is_empty() {
            let policy = options.external_ref_policy;
            match decide(options.mode, policy) {
                RefDecision::Fail => {
                    for reference in &unresolved {
                        artifacts.validation_diagnostics.push(create_external_ref_diagnostic(
                            reference,
                            options.mode,
                            None,
                            Some(policy.as_str()),
                        ));
                    }
                    external_failure = true;
                }
                RefDecision::SkipWithDiagnostic => {
                    skip_validation = true;
                    for reference in &unresolved {
                        artifacts.validation_diagnostics.push(create_external_ref_diagnostic(
                            reference,
                            options.mode,
                            Some(true),
                            Some(policy.as_str()),
                        ));
                    }
                }
                RefDecision::SkipSilent => {
                    skip_validation = true;
                }
            }
        }

        // ---- compose --------------------------------------------------
        let scope = open_stage(&mut metrics, StageId::Compose);
        if external_failure {
            errors.push(StageError::new(
                StageId::Compose,
                "unresolved external $ref under strict policy",
            ));
            close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
            break 'run;
        }
        let ctx = ComposeContext {
            source_flags: source.options().clone(),
            resolver_fingerprint,
            external_targets,
        };
        let plan = match &overrides.compose {
            Some(f) => f(normalized.clone()).await.map_err(|message| {
                StageError::with_cause(StageId::Compose, "compose override failed", message)
            }),
            None => compose(normalized.clone(), &ctx).map_err(|error| match error {
                ComposeError::Fatal { ref diagnostics } => {
                    artifacts.validation_diagnostics.extend(diagnostics.clone());
                    StageError::with_cause(StageId::Compose, "fatal compose diagnostics", error.to_string())
                }
                other => StageError::with_cause(StageId::Compose, "compose failed", other.to_string()),
            }),
        };
        let plan = match plan {
            Ok(plan) => {
                let mut emitted = plan.diagnostics.all();
                emitted.extend(prephase_diagnostics.iter().cloned());
                if let Err(violation) =
                    assert_diagnostics_for_phase(DiagnosticPhase::Compose, &emitted)
                {
                    errors.push(StageError::with_cause(
                        StageId::Compose,
                        "inadmissible diagnostic phase",
                        violation.to_string(),
                    ));
                    close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                    break 'run;
                }
                Arc::new(plan)
            }
            Err(error) => {
                errors.push(error);
                close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                break 'run;
            }
        };
        close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Completed);
        artifacts.validation_diagnostics.extend(prephase_diagnostics);
        if options.coverage.mode == CoverageMode::Measure {
            artifacts.coverage_graph = Some(plan.coverage_graph());
            artifacts.coverage_targets = Some(plan.coverage_targets());
        }
        artifacts.effective = Some(plan.clone());

        // ---- generate -------------------------------------------------
        let scope = open_stage(&mut metrics, StageId::Generate);
        let generated = match &overrides.generate {
            Some(f) => f(plan.clone()).await.map_err(|message| {
                StageError::with_cause(StageId::Generate, "generate override failed", message)
            }),
            None => generate(
                &plan,
                &options.generate,
                overrides.format_registry.as_ref(),
                &mut metrics,
            )
            .map_err(|error| {
                if let GenerateError::NoFeasibleValue { ref diagnostic, .. } = error {
                    artifacts.validation_diagnostics.push(diagnostic.clone());
                }
                StageError::with_cause(StageId::Generate, "generation failed", error.to_string())
            }),
        };
        let generated = match generated {
            Ok(output) => {
                if let Err(violation) =
                    assert_diagnostics_for_phase(DiagnosticPhase::Generate, &output.diagnostics)
                {
                    errors.push(StageError::with_cause(
                        StageId::Generate,
                        "inadmissible diagnostic phase",
                        violation.to_string(),
                    ));
                    close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                    break 'run;
                }
                Arc::new(output)
            }
            Err(error) => {
                errors.push(error);
                close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                break 'run;
            }
        };
        close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Completed);
        artifacts.generated = Some(generated.clone());

        // ---- repair ---------------------------------------------------
        let scope = open_stage(&mut metrics, StageId::Repair);
        let passthrough = |items: &[Value]| RepairOutput {
            items: items.to_vec(),
            diagnostics: Vec::new(),
            actions: Vec::new(),
        };
        let repaired = match &overrides.repair {
            Some(f) => {
                f(plan.clone(), generated.items.clone()).await.map_err(|message| {
                    StageError::with_cause(StageId::Repair, "repair override failed", message)
                })
            }
            None if skip_validation => {
                // No oracle: the repair loop would be flying blind.
                Ok(passthrough(&generated.items))
            }
            None => match source.compile(&normalized.schema) {
                Ok(compiled) => Ok(repair(
                    &plan,
                    compiled.as_ref(),
                    &generated.items,
                    &options.repair,
                    &mut metrics,
                )),
                Err(error) => {
                    // A compile failure whose sole cause is unresolved
                    // external refs defers validation instead of failing,
                    // subject to the same policy matrix.
                    let classified = classify_external_ref_failure(&source, &normalized.schema);
                    match classified {
                        Some(failure)
                            if failure.skip_eligible
                                && decide(options.mode, options.external_ref_policy)
                                    != RefDecision::Fail =>
                        {
                            skip_validation = true;
                            if decide(options.mode, options.external_ref_policy)
                                == RefDecision::SkipWithDiagnostic
                            {
                                for reference in &failure.refs {
                                    artifacts.validation_diagnostics.push(
                                        create_external_ref_diagnostic(
                                            reference,
                                            options.mode,
                                            Some(true),
                                            Some(options.external_ref_policy.as_str()),
                                        ),
                                    );
                                }
                            }
                            Ok(passthrough(&generated.items))
                        }
                        _ => Err(StageError::with_cause(
                            StageId::Repair,
                            "source schema failed to compile",
                            error.to_string(),
                        )),
                    }
                }
            },
        };
        let repaired = match repaired {
            Ok(output) => {
                if let Err(violation) =
                    assert_diagnostics_for_phase(DiagnosticPhase::Repair, &output.diagnostics)
                {
                    errors.push(StageError::with_cause(
                        StageId::Repair,
                        "inadmissible diagnostic phase",
                        violation.to_string(),
                    ));
                    close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                    break 'run;
                }
                Arc::new(output)
            }
            Err(error) => {
                errors.push(error);
                close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                break 'run;
            }
        };
        close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Completed);
        artifacts.repair_diagnostics = repaired.diagnostics.clone();
        artifacts.repair_actions = repaired.actions.clone();
        artifacts.repaired = Some(repaired.clone());

        // ---- validate -------------------------------------------------
        let scope = open_stage(&mut metrics, StageId::Validate);
        let expectations = ParityExpectations {
            validate_formats: options.validate.validate_formats,
            discriminator: options.validate.discriminator,
            source_class: class_label_for(dialect).to_string(),
            planning_class: class_label_for(datasynth_schema::Dialect::NEWEST).to_string(),
            multiple_of_precision: options.validate.multiple_of_precision,
            compiling_union_views: true,
        };
        artifacts.validation_flags = Some(ValidationFlagsSnapshot {
            source: source.options().clone(),
            planning: planning.options().clone(),
        });
        if let Err(mismatch) = check_parity(source.options(), planning.options(), &expectations) {
            artifacts.validation_diagnostics.push(mismatch.to_diagnostic());
            errors.push(StageError::with_cause(
                StageId::Validate,
                "validator flags mismatch",
                format!("{:?}", mismatch.diffs),
            ));
            close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
            break 'run;
        }

        if skip_validation {
            artifacts.validation = Some(ValidationReport {
                valid: true,
                skipped_validation: true,
                rows: Vec::new(),
            });
            close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Completed);
            break 'run;
        }

        let report = match &overrides.validate {
            Some(f) => match f(plan.clone(), repaired.items.clone()).await {
                Ok(report) => report,
                Err(message) => {
                    errors.push(StageError::with_cause(
                        StageId::Validate,
                        "validate override failed",
                        message,
                    ));
                    close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                    break 'run;
                }
            },
            None => match source.compile(&normalized.schema) {
                Ok(compiled) => {
                    let mut rows = Vec::with_capacity(repaired.items.len());
                    for (index, item) in repaired.items.iter().enumerate() {
                        let outcome = compiled.validate(item);
                        if !outcome.ok {
                            artifacts.validation_diagnostics.push(Diagnostic::with_details(
                                DiagnosticCode::ValidationKeywordFailed,
                                "",
                                json!({
                                    "index": index,
                                    "keywords": outcome
                                        .errors
                                        .iter()
                                        .map(|e| e.keyword.clone())
                                        .collect::<Vec<_>>(),
                                }),
                            ));
                        }
                        rows.push(RowValidation { index, valid: outcome.ok, errors: outcome.errors });
                    }
                    let valid = rows.iter().all(|r| r.valid);
                    ValidationReport { valid, skipped_validation: false, rows }
                }
                Err(error) => {
                    artifacts.validation_diagnostics.push(Diagnostic::with_details(
                        DiagnosticCode::ValidationCompileError,
                        "",
                        json!({"message": error.message.clone()}),
                    ));
                    errors.push(StageError::with_cause(
                        StageId::Validate,
                        "schema failed to compile for final validation",
                        error.to_string(),
                    ));
                    close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Failed);
                    break 'run;
                }
            },
        };

        if !report.valid {
            final_validation_failed = true;
            artifacts.validation_diagnostics.push(Diagnostic::with_details(
                DiagnosticCode::FinalValidationFailed,
                "",
                json!({"invalidRows": report.rows.iter().filter(|r| !r.valid).count()}),
            ));
        }
        artifacts.validation = Some(report);
        close_stage(&mut metrics, &mut timeline, &mut states, scope, StageStatus::Completed);
    }

    states.skip_pending();
    let status = if states.any_failed() || final_validation_failed {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };

    info!(status = ?status, stages = timeline.len(), "pipeline finished");

    PipelineResult {
        status,
        schema: schema.clone(),
        stages: states,
        metrics: metrics.snapshot(options.effective_verbosity()),
        timeline,
        errors,
        artifacts,
    }
}
