//! The diagnostic envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codes::DiagnosticCode;
use crate::phase::DiagnosticPhase;

/// A single structured observation about a run.
///
/// `canon_path` is the canonical pointer of the node the observation is
/// about; `details` and `metrics` are free-form JSON payloads whose shape is
/// fixed per code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    #[serde(rename = "canonPath")]
    pub canon_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    pub phase: DiagnosticPhase,
}

impl Diagnostic {
    /// Envelope with no payload. Phase is inferred from the code.
    #[must_use]
    pub fn new(code: DiagnosticCode, canon_path: &str) -> Self {
        Self {
            code,
            canon_path: canon_path.to_string(),
            details: None,
            metrics: None,
            phase: code.phase(),
        }
    }

    /// Envelope with a details payload.
    #[must_use]
    pub fn with_details(code: DiagnosticCode, canon_path: &str, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, canon_path)
        }
    }

    /// Attach a metrics payload.
    #[must_use]
    pub fn metrics(mut self, metrics: Value) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stable hash of the details payload over its JCS form.
    ///
    /// Byte-stable across runs and platforms; empty details hash to the hash
    /// of JSON `null`.
    #[must_use]
    pub fn detail_hash(&self) -> String {
        let details = self.details.clone().unwrap_or(Value::Null);
        let canonical =
            serde_json_canonicalizer::to_string(&details).unwrap_or_else(|_| "null".to_string());
        let hash = blake3::hash(canonical.as_bytes());
        hash.to_hex().as_str()[..16].to_string()
    }

    /// Deduplication key for corpus reports: `(code, phase, canonPath, detailHash)`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.code.as_str(),
            self.phase.as_str(),
            self.canon_path,
            self.detail_hash()
        )
    }
}

/// Stable, order-preserving deduplication by [`Diagnostic::dedup_key`].
#[must_use]
pub fn dedup(diagnostics: &[Diagnostic]) -> Vec<Diagnostic> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(diagnostics.len());
    for diag in diagnostics {
        if seen.insert(diag.dedup_key()) {
            out.push(diag.clone());
        }
    }
    out
}
