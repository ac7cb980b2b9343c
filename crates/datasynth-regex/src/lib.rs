//! Regex policy: anchored-safe analysis and bounded synthesis
//!
//! Schema `pattern` keywords drive both name coverage (pseudo-enums) and
//! string synthesis. Only a restricted class of patterns is admitted:
//! anchored, no lookaround, no backreferences, complexity under a cap, and
//! compilable. Everything else degrades to length-based generation plus
//! repair.

pub mod analyze;
pub mod synth;

pub use analyze::{AnalyzeOptions, RegexAnalysis, analyze_regex, literal_alternation};
pub use synth::synthesize;
