//! Severity buckets for stage output

use serde::{Deserialize, Serialize};

use crate::envelope::Diagnostic;

/// Diagnostics split by severity.
///
/// `fatal` aborts the pipeline at the emitting stage, `warn` is surfaced to
/// the caller, `run` is informational bookkeeping kept with the artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticBuckets {
    pub fatal: Vec<Diagnostic>,
    pub warn: Vec<Diagnostic>,
    pub run: Vec<Diagnostic>,
}

impl DiagnosticBuckets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_fatal(&self) -> bool {
        !self.fatal.is_empty()
    }

    /// All diagnostics in emission order: fatal, then warn, then run.
    #[must_use]
    pub fn all(&self) -> Vec<Diagnostic> {
        let mut out = Vec::with_capacity(self.fatal.len() + self.warn.len() + self.run.len());
        out.extend(self.fatal.iter().cloned());
        out.extend(self.warn.iter().cloned());
        out.extend(self.run.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::DiagnosticCode;

    #[test]
    fn test_fatal_detection() {
        let mut buckets = DiagnosticBuckets::new();
        assert!(!buckets.has_fatal());
        buckets
            .fatal
            .push(Diagnostic::new(DiagnosticCode::SchemaInternalRefMissing, "/$ref"));
        assert!(buckets.has_fatal());
        assert_eq!(buckets.all().len(), 1);
    }
}
