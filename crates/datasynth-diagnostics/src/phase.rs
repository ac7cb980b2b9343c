//! Phase partition and admissibility checks

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::Diagnostic;

/// The five pipeline phases a diagnostic can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiagnosticPhase {
    Normalize,
    Compose,
    Generate,
    Repair,
    Validate,
}

impl DiagnosticPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "NORMALIZE",
            Self::Compose => "COMPOSE",
            Self::Generate => "GENERATE",
            Self::Repair => "REPAIR",
            Self::Validate => "VALIDATE",
        }
    }
}

impl std::fmt::Display for DiagnosticPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage emitted a diagnostic whose code belongs to another phase.
///
/// The orchestrator treats this as a fatal defect in the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("phase {phase} emitted inadmissible diagnostic {code} at {canon_path}")]
pub struct PhaseViolation {
    pub phase: DiagnosticPhase,
    pub code: String,
    pub canon_path: String,
}

/// Assert that every diagnostic in `list` is admissible for `phase`.
///
/// # Errors
/// Returns the first violation in source order.
pub fn assert_diagnostics_for_phase(
    phase: DiagnosticPhase,
    list: &[Diagnostic],
) -> Result<(), PhaseViolation> {
    for diag in list {
        if diag.code.phase() != phase {
            return Err(PhaseViolation {
                phase,
                code: diag.code.as_str().to_string(),
                canon_path: diag.canon_path.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::DiagnosticCode;

    #[test]
    fn test_admissible_list_passes() {
        let list = vec![
            Diagnostic::new(DiagnosticCode::NoFeasibleValue, ""),
            Diagnostic::new(DiagnosticCode::ExclusivityTweakString, "/items"),
        ];
        assert!(assert_diagnostics_for_phase(DiagnosticPhase::Generate, &list).is_ok());
    }

    #[test]
    fn test_violation_reports_first_offender() {
        let list = vec![
            Diagnostic::new(DiagnosticCode::NoFeasibleValue, "/a"),
            Diagnostic::new(DiagnosticCode::RepairRevertedNoProgress, "/b"),
        ];
        let err = assert_diagnostics_for_phase(DiagnosticPhase::Generate, &list).unwrap_err();
        assert_eq!(err.code, "REPAIR_REVERTED_NO_PROGRESS");
        assert_eq!(err.canon_path, "/b");
    }
}
