//! Pipeline options

use datasynth_generate::GenerateOptions;
use datasynth_metrics::Verbosity;
use datasynth_repair::RepairOptions;
use datasynth_resolver::{ExternalRefPolicy, RunMode};
use datasynth_validator::ValidateOptions;

/// Coverage measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverageMode {
    #[default]
    Off,
    Measure,
}

/// Coverage options.
#[derive(Debug, Clone, Default)]
pub struct CoverageOptions {
    pub mode: CoverageMode,
    pub dimensions_enabled: Option<Vec<String>>,
    pub exclude_unreachable: bool,
}

/// Options for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Strict (default) or lax handling of unresolvable externals.
    pub mode: RunMode,
    /// Strict-mode policy for unresolved external refs.
    pub external_ref_policy: ExternalRefPolicy,
    pub coverage: CoverageOptions,
    pub generate: GenerateOptions,
    pub repair: RepairOptions,
    pub validate: ValidateOptions,
    /// Metrics verbosity for the final snapshot.
    pub verbosity: Option<Verbosity>,
}

impl PipelineOptions {
    #[must_use]
    pub fn effective_verbosity(&self) -> Verbosity {
        self.verbosity.unwrap_or(Verbosity::Runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PipelineOptions::default();
        assert_eq!(options.mode, RunMode::Strict);
        assert_eq!(options.external_ref_policy, ExternalRefPolicy::Error);
        assert_eq!(options.coverage.mode, CoverageMode::Off);
        assert_eq!(options.effective_verbosity(), Verbosity::Runtime);
    }
}
