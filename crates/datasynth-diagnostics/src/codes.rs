//! The diagnostic code catalog
//!
//! Identifier stability is required externally: downstream tooling matches
//! on the serialized strings. The `AJV_*` names and validator class labels
//! are kept for compatibility with consumers of the historical catalog.

use serde::{Deserialize, Serialize};

use crate::phase::DiagnosticPhase;

/// All diagnostic codes the pipeline can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Normalize
    #[serde(rename = "DRAFT06_PATTERN_TOLERATED")]
    Draft06PatternTolerated,
    #[serde(rename = "EMBEDDED_META_SCHEMA_STRIPPED")]
    EmbeddedMetaSchemaStripped,

    // Compose
    #[serde(rename = "EXTERNAL_REF_UNRESOLVED")]
    ExternalRefUnresolved,
    #[serde(rename = "EXTERNAL_REF_STUBBED")]
    ExternalRefStubbed,
    #[serde(rename = "RESOLVER_STRATEGIES_APPLIED")]
    ResolverStrategiesApplied,
    #[serde(rename = "RESOLVER_ADD_SCHEMA_SKIPPED_DUPLICATE_ID")]
    ResolverAddSchemaSkippedDuplicateId,
    #[serde(rename = "SCHEMA_INTERNAL_REF_MISSING")]
    SchemaInternalRefMissing,
    #[serde(rename = "AP_FALSE_UNSAFE_PATTERN")]
    ApFalseUnsafePattern,

    // Generate
    #[serde(rename = "EXCLUSIVITY_TWEAK_STRING")]
    ExclusivityTweakString,
    #[serde(rename = "TARGET_ENUM_ROUNDROBIN_PATTERNPROPS")]
    TargetEnumRoundrobinPatternprops,
    #[serde(rename = "NO_FEASIBLE_VALUE")]
    NoFeasibleValue,
    #[serde(rename = "REGEX_COMPLEXITY_CAPPED")]
    RegexComplexityCapped,
    #[serde(rename = "REGEX_COMPILE_ERROR")]
    RegexCompileError,
    #[serde(rename = "DYNAMIC_SCOPE_BOUNDED")]
    DynamicScopeBounded,

    // Repair
    #[serde(rename = "REPAIR_REVERTED_NO_PROGRESS")]
    RepairRevertedNoProgress,
    #[serde(rename = "REPAIR_PNAMES_PATTERN_ENUM")]
    RepairPnamesPatternEnum,
    #[serde(rename = "REPAIR_RENAME_PREFLIGHT_FAIL")]
    RepairRenamePreflightFail,
    #[serde(rename = "MUSTCOVER_INDEX_MISSING")]
    MustcoverIndexMissing,

    // Validate
    #[serde(rename = "AJV_FLAGS_MISMATCH")]
    AjvFlagsMismatch,
    #[serde(rename = "VALIDATION_COMPILE_ERROR")]
    ValidationCompileError,
    #[serde(rename = "VALIDATION_KEYWORD_FAILED")]
    ValidationKeywordFailed,
    #[serde(rename = "FINAL_VALIDATION_FAILED")]
    FinalValidationFailed,
}

impl DiagnosticCode {
    /// The canonical external identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft06PatternTolerated => "DRAFT06_PATTERN_TOLERATED",
            Self::EmbeddedMetaSchemaStripped => "EMBEDDED_META_SCHEMA_STRIPPED",
            Self::ExternalRefUnresolved => "EXTERNAL_REF_UNRESOLVED",
            Self::ExternalRefStubbed => "EXTERNAL_REF_STUBBED",
            Self::ResolverStrategiesApplied => "RESOLVER_STRATEGIES_APPLIED",
            Self::ResolverAddSchemaSkippedDuplicateId => {
                "RESOLVER_ADD_SCHEMA_SKIPPED_DUPLICATE_ID"
            }
            Self::SchemaInternalRefMissing => "SCHEMA_INTERNAL_REF_MISSING",
            Self::ApFalseUnsafePattern => "AP_FALSE_UNSAFE_PATTERN",
            Self::ExclusivityTweakString => "EXCLUSIVITY_TWEAK_STRING",
            Self::TargetEnumRoundrobinPatternprops => "TARGET_ENUM_ROUNDROBIN_PATTERNPROPS",
            Self::NoFeasibleValue => "NO_FEASIBLE_VALUE",
            Self::RegexComplexityCapped => "REGEX_COMPLEXITY_CAPPED",
            Self::RegexCompileError => "REGEX_COMPILE_ERROR",
            Self::DynamicScopeBounded => "DYNAMIC_SCOPE_BOUNDED",
            Self::RepairRevertedNoProgress => "REPAIR_REVERTED_NO_PROGRESS",
            Self::RepairPnamesPatternEnum => "REPAIR_PNAMES_PATTERN_ENUM",
            Self::RepairRenamePreflightFail => "REPAIR_RENAME_PREFLIGHT_FAIL",
            Self::MustcoverIndexMissing => "MUSTCOVER_INDEX_MISSING",
            Self::AjvFlagsMismatch => "AJV_FLAGS_MISMATCH",
            Self::ValidationCompileError => "VALIDATION_COMPILE_ERROR",
            Self::ValidationKeywordFailed => "VALIDATION_KEYWORD_FAILED",
            Self::FinalValidationFailed => "FINAL_VALIDATION_FAILED",
        }
    }

    /// The phase this code belongs to. Part of the public contract.
    #[must_use]
    pub const fn phase(&self) -> DiagnosticPhase {
        match self {
            Self::Draft06PatternTolerated | Self::EmbeddedMetaSchemaStripped => {
                DiagnosticPhase::Normalize
            }
            Self::ExternalRefUnresolved
            | Self::ResolverStrategiesApplied
            | Self::ResolverAddSchemaSkippedDuplicateId
            | Self::SchemaInternalRefMissing
            | Self::ApFalseUnsafePattern => DiagnosticPhase::Compose,
            Self::ExternalRefStubbed
            | Self::ExclusivityTweakString
            | Self::TargetEnumRoundrobinPatternprops
            | Self::NoFeasibleValue
            | Self::RegexComplexityCapped
            | Self::RegexCompileError
            | Self::DynamicScopeBounded => DiagnosticPhase::Generate,
            Self::RepairRevertedNoProgress
            | Self::RepairPnamesPatternEnum
            | Self::RepairRenamePreflightFail
            | Self::MustcoverIndexMissing => DiagnosticPhase::Repair,
            Self::AjvFlagsMismatch
            | Self::ValidationCompileError
            | Self::ValidationKeywordFailed
            | Self::FinalValidationFailed => DiagnosticPhase::Validate,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
