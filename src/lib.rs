//! datasynth — deterministic JSON Schema data synthesis
//!
//! Given a schema (draft-04 / draft-07 / 2019-09 / 2020-12), produce a
//! deterministic, bounded sequence of instances that satisfy it, checked by
//! an independent validator. The core is a five-stage pipeline —
//! normalize, compose, generate, repair, validate — with dual-validator
//! parity, structured diagnostics, and strict determinism under a seed.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use datasynth::{PipelineOptions, StageOverrides, execute_pipeline};
//!
//! # async fn demo() {
//! let schema = json!({"type": "number", "multipleOf": 0.01, "minimum": 0.97, "maximum": 0.99});
//! let mut options = PipelineOptions::default();
//! options.generate.seed = 42;
//! let result = execute_pipeline(&schema, options, StageOverrides::default()).await;
//! assert_eq!(result.status, datasynth::RunStatus::Completed);
//! # }
//! ```

pub mod pipeline;

pub use pipeline::artifacts::{
    Artifacts, RowValidation, ValidationFlagsSnapshot, ValidationReport,
};
pub use pipeline::options::{CoverageMode, CoverageOptions, PipelineOptions};
pub use pipeline::overrides::StageOverrides;
pub use pipeline::{
    PipelineResult, RunStatus, StageError, StageId, StageRecord, StageStates, StageStatus,
    execute_pipeline,
};

pub use datasynth_compose::Plan;
pub use datasynth_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticPhase};
pub use datasynth_generate::{GenerateOptions, GenerateOutput, Scenario};
pub use datasynth_metrics::{MetricsReport, Verbosity};
pub use datasynth_repair::{RepairAction, RepairOptions, RepairOutput};
pub use datasynth_resolver::{ExternalRefPolicy, RunMode, SchemaResolver};
pub use datasynth_schema::{Dialect, Normalized};
pub use datasynth_validator::{FormatPlugin, FormatRegistry, ValidateOptions, ValidatorFlags};
