//! Run artifacts
//!
//! Stage outputs are immutable once recorded; later stages read prior
//! artifacts but never mutate them. The orchestrator owns the collection.

use serde_json::Value;
use std::sync::Arc;

use datasynth_compose::Plan;
use datasynth_diagnostics::Diagnostic;
use datasynth_generate::GenerateOutput;
use datasynth_repair::{RepairAction, RepairOutput};
use datasynth_schema::Normalized;
use datasynth_validator::{ErrorObject, ValidatorFlags};

/// Validation result for one row.
#[derive(Debug, Clone)]
pub struct RowValidation {
    pub index: usize,
    pub valid: bool,
    pub errors: Vec<ErrorObject>,
}

/// The final validation report.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    /// Set when validation was skipped under the external-ref policy;
    /// skipped runs contribute zero rows to metrics.
    pub skipped_validation: bool,
    pub rows: Vec<RowValidation>,
}

/// Flags of both validator instances, snapshotted at the parity gate.
#[derive(Debug, Clone)]
pub struct ValidationFlagsSnapshot {
    pub source: ValidatorFlags,
    pub planning: ValidatorFlags,
}

/// Everything a run exposes to callers and tooling.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub canonical: Option<Arc<Normalized>>,
    pub effective: Option<Arc<Plan>>,
    pub generated: Option<Arc<GenerateOutput>>,
    pub repaired: Option<Arc<RepairOutput>>,
    pub validation: Option<ValidationReport>,
    pub validation_flags: Option<ValidationFlagsSnapshot>,
    /// Policy and validation diagnostics (external refs, parity, final
    /// validation), for machine consumption.
    pub validation_diagnostics: Vec<Diagnostic>,
    pub repair_diagnostics: Vec<Diagnostic>,
    pub repair_actions: Vec<RepairAction>,
    pub coverage_graph: Option<Value>,
    pub coverage_targets: Option<Value>,
}
