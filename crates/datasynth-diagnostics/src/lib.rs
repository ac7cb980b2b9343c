//! Diagnostic code catalog, envelopes, and phase admissibility
//!
//! Every observation the pipeline makes about a run travels as a
//! [`Diagnostic`] envelope. Codes are partitioned into the five pipeline
//! phases; the orchestrator rejects a stage that emits a code outside its
//! own phase. Code identifiers are an external stability contract and must
//! never be renamed.

pub mod buckets;
pub mod codes;
pub mod envelope;
pub mod phase;

pub use buckets::DiagnosticBuckets;
pub use codes::DiagnosticCode;
pub use envelope::Diagnostic;
pub use phase::{DiagnosticPhase, PhaseViolation, assert_diagnostics_for_phase};
