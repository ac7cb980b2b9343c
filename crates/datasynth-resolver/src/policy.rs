//! The strict/lax external-ref policy matrix

use serde::{Deserialize, Serialize};

/// Pipeline run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Strict,
    Lax,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lax => "lax",
        }
    }
}

/// What to do about unresolved external refs under strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalRefPolicy {
    #[default]
    Error,
    Warn,
    Ignore,
}

impl ExternalRefPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Ignore => "ignore",
        }
    }
}

/// The decision for a skip-eligible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefDecision {
    /// Hard failure: the run fails at compose.
    Fail,
    /// Validation is skipped; a diagnostic is recorded.
    SkipWithDiagnostic,
    /// Validation is skipped silently.
    SkipSilent,
}

/// Apply the policy matrix.
///
/// Strict+error fails hard; strict+warn skips with a diagnostic;
/// strict+ignore skips silently; lax always skips with a diagnostic.
#[must_use]
pub fn decide(mode: RunMode, policy: ExternalRefPolicy) -> RefDecision {
    match (mode, policy) {
        (RunMode::Strict, ExternalRefPolicy::Error) => RefDecision::Fail,
        (RunMode::Strict, ExternalRefPolicy::Warn) => RefDecision::SkipWithDiagnostic,
        (RunMode::Strict, ExternalRefPolicy::Ignore) => RefDecision::SkipSilent,
        (RunMode::Lax, _) => RefDecision::SkipWithDiagnostic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_matrix() {
        assert_eq!(decide(RunMode::Strict, ExternalRefPolicy::Error), RefDecision::Fail);
        assert_eq!(
            decide(RunMode::Strict, ExternalRefPolicy::Warn),
            RefDecision::SkipWithDiagnostic
        );
        assert_eq!(
            decide(RunMode::Strict, ExternalRefPolicy::Ignore),
            RefDecision::SkipSilent
        );
        for policy in [ExternalRefPolicy::Error, ExternalRefPolicy::Warn, ExternalRefPolicy::Ignore]
        {
            assert_eq!(decide(RunMode::Lax, policy), RefDecision::SkipWithDiagnostic);
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RunMode::default(), RunMode::Strict);
        assert_eq!(ExternalRefPolicy::default(), ExternalRefPolicy::Error);
    }
}
