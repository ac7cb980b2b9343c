//! The dual-validator parity gate
//!
//! Before final validation the gate checks that Source and Planning agree
//! on the declared flag set. A mismatch is fatal for the run and carries
//! the full list of differing flags for post-mortem.

use serde_json::json;
use thiserror::Error;

use datasynth_diagnostics::{Diagnostic, DiagnosticCode};

use crate::flags::ValidatorFlags;

/// Declared expectations for the gate.
#[derive(Debug, Clone)]
pub struct ParityExpectations {
    pub validate_formats: bool,
    pub discriminator: bool,
    pub source_class: String,
    pub planning_class: String,
    /// Set when the rational-fallback precision is pinned.
    pub multiple_of_precision: Option<u32>,
    /// True when the run compiles union views and Planning must accept them.
    pub compiling_union_views: bool,
}

/// The flags that differ, in check order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validator flags mismatch: {diffs:?}")]
pub struct ParityMismatch {
    pub diffs: Vec<String>,
}

impl ParityMismatch {
    /// The gate's diagnostic, with `diffs` in the details payload.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::with_details(
            DiagnosticCode::AjvFlagsMismatch,
            "",
            json!({"diffs": self.diffs}),
        )
    }
}

/// Check the parity contract between the Source and Planning flags.
///
/// # Errors
/// Returns every differing flag; `diffs` is empty iff no mismatch exists.
pub fn check_parity(
    source: &ValidatorFlags,
    planning: &ValidatorFlags,
    expected: &ParityExpectations,
) -> Result<(), ParityMismatch> {
    let mut diffs = Vec::new();

    if !(source.unicode_regexp && planning.unicode_regexp) {
        diffs.push("unicodeRegExp".to_string());
    }
    if source.validate_formats != planning.validate_formats
        || source.validate_formats != expected.validate_formats
    {
        diffs.push("validateFormats".to_string());
    }
    if expected.compiling_union_views && !planning.allow_union_types {
        diffs.push("allowUnionTypes".to_string());
    }
    if source.discriminator != planning.discriminator
        || source.discriminator != expected.discriminator
    {
        diffs.push("discriminator".to_string());
    }
    if expected.multiple_of_precision.is_some()
        && source.multiple_of_precision != planning.multiple_of_precision
    {
        diffs.push("multipleOfPrecision".to_string());
    }
    if expected.validate_formats
        && !(source.formats_plugin_installed && planning.formats_plugin_installed)
    {
        diffs.push("formatsPlugin".to_string());
    }
    if source.class_label != expected.source_class || planning.class_label != expected.planning_class
    {
        diffs.push("classLabel".to_string());
    }

    if diffs.is_empty() {
        Ok(())
    } else {
        Err(ParityMismatch { diffs })
    }
}
