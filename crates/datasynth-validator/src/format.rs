//! Format plugin registry
//!
//! Format generators (`uuid`, `email`, `date-time`, ...) are external
//! collaborators; only the registry interface lives here. String generation
//! consults the registry when a node carries a `format` the caller
//! registered a plugin for.

use thiserror::Error;

use datasynth_utils::rng::XorShift32;

/// Plugin-side generation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("format plugin failed for {format}: {reason}")]
pub struct FormatError {
    pub format: String,
    pub reason: String,
}

/// One format generator.
pub trait FormatPlugin: Send + Sync {
    fn supports(&self, name: &str) -> bool;

    /// Generate a value for a supported format.
    ///
    /// # Errors
    /// Plugin-specific; a failing plugin falls back to placeholder text.
    fn generate(&self, name: &str, rng: &mut XorShift32) -> Result<String, FormatError>;

    fn validate(&self, name: &str, value: &str) -> bool;

    fn examples(&self, name: &str) -> Vec<String>;
}

/// Registry of format plugins; first supporting plugin wins.
#[derive(Default)]
pub struct FormatRegistry {
    plugins: Vec<Box<dyn FormatPlugin>>,
}

impl FormatRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn FormatPlugin>) {
        self.plugins.push(plugin);
    }

    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.supports(name))
    }

    #[must_use]
    pub fn plugin_for(&self, name: &str) -> Option<&dyn FormatPlugin> {
        self.plugins.iter().find(|p| p.supports(name)).map(Box::as_ref)
    }
}
