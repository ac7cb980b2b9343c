//! Stage overrides
//!
//! Each of the five stages can be replaced by a caller-supplied async
//! closure receiving the prior artifact. Used by tests to force failures at
//! specific stages and by embedders to interpose custom behavior. Override
//! futures are the only suspension points inside a stage.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use datasynth_compose::Plan;
use datasynth_generate::GenerateOutput;
use datasynth_repair::RepairOutput;
use datasynth_resolver::SchemaResolver;
use datasynth_schema::{Dialect, Normalized};
use datasynth_validator::{DialectValidator, FormatRegistry, ValidateOptions};

use crate::pipeline::artifacts::ValidationReport;

/// A boxed stage future; the `String` error is wrapped into a `StageError`
/// at the stage boundary.
pub type StageFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type NormalizeFn = dyn Fn(Value) -> StageFuture<Normalized> + Send + Sync;
type ComposeFn = dyn Fn(Arc<Normalized>) -> StageFuture<Plan> + Send + Sync;
type GenerateFn = dyn Fn(Arc<Plan>) -> StageFuture<GenerateOutput> + Send + Sync;
type RepairFn = dyn Fn(Arc<Plan>, Vec<Value>) -> StageFuture<RepairOutput> + Send + Sync;
type ValidateFn = dyn Fn(Arc<Plan>, Vec<Value>) -> StageFuture<ValidationReport> + Send + Sync;
type SourceValidatorFn = dyn Fn(Dialect, &ValidateOptions) -> DialectValidator + Send + Sync;

/// Caller-supplied replacements for stages and collaborators.
#[derive(Default)]
pub struct StageOverrides {
    pub normalize: Option<Box<NormalizeFn>>,
    pub compose: Option<Box<ComposeFn>>,
    pub generate: Option<Box<GenerateFn>>,
    pub repair: Option<Box<RepairFn>>,
    pub validate: Option<Box<ValidateFn>>,
    /// Replace the Source validator factory (parity-gate testing).
    pub source_validator: Option<Box<SourceValidatorFn>>,
    /// External-ref resolver for the pre-phase.
    pub resolver: Option<Box<dyn SchemaResolver>>,
    /// Format plugins consulted by string generation.
    pub format_registry: Option<FormatRegistry>,
}

impl StageOverrides {
    /// Override the generate stage with a failing closure; test scaffolding
    /// for skip/fail propagation.
    #[must_use]
    pub fn failing_generate(message: &str) -> Self {
        let message = message.to_string();
        Self {
            generate: Some(Box::new(move |_plan| {
                let message = message.clone();
                Box::pin(async move { Err(message) })
            })),
            ..Default::default()
        }
    }
}
