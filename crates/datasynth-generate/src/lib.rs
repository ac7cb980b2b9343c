//! The Generate stage: plan → instances
//!
//! Each root instance is synthesized recursively. Every node entry creates a
//! fresh RNG stream from `(itemSeed, canonPath)`, so a local schema edit
//! never perturbs the values generated for unrelated subtrees, and the same
//! `(seed, schema)` pair always reproduces the same items.

pub mod r#gen;
pub mod number;
pub mod text;

pub use r#gen::{GenerateError, GenerateOptions, GenerateOutput, Scenario, generate};
