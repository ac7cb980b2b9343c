//! Per-phase timers, counters, and verbosity-gated observability
//!
//! The collector is the only mutable shared resource in a run. It is
//! confined to that run: two concurrent runs must use distinct instances,
//! and the implementation is deliberately not thread-safe.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Well-known counter and distribution names.
pub mod names {
    pub const VALIDATIONS_PER_ROW: &str = "validationsPerRow";
    pub const REPAIR_PASSES_PER_ROW: &str = "repairPassesPerRow";
    pub const REPAIR_ACTIONS_PER_ROW: &str = "repairActionsPerRow";
    pub const BRANCH_TRIALS_TRIED: &str = "branchTrialsTried";
    pub const PATTERN_WITNESS_TRIED: &str = "patternWitnessTried";
    pub const REPAIR_TIER1_ACTIONS: &str = "repair_tier1_actions";
    pub const REPAIR_TIER2_ACTIONS: &str = "repair_tier2_actions";
    pub const REPAIR_TIER_DISABLED: &str = "repair_tierDisabled";
    pub const BRANCH_COVERAGE_ONE_OF: &str = "branchCoverageOneOf";
    pub const ENUM_USAGE: &str = "enumUsage";
}

/// Timer discipline violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("phase timer already running: {phase}")]
    DoubleBegin { phase: String },

    #[error("phase timer not running: {phase}")]
    UnbalancedEnd { phase: String },
}

/// Observability verbosity.
///
/// `Runtime` strips the heavyweight coverage payloads; `Ci` retains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Runtime,
    Ci,
}

/// Percentile summary of a recorded distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub count: usize,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

/// Serializable snapshot of a collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    pub phases: BTreeMap<String, u64>,
    pub counters: BTreeMap<String, u64>,
    pub distributions: BTreeMap<String, Percentiles>,
    pub payloads: BTreeMap<String, Value>,
}

/// Run-scoped metrics collector with balanced phase timers.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    running: BTreeMap<String, Instant>,
    elapsed: BTreeMap<String, Duration>,
    counters: BTreeMap<String, u64>,
    samples: BTreeMap<String, Vec<f64>>,
    payloads: BTreeMap<String, Value>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the timer for `phase`.
    ///
    /// # Errors
    /// Fails if the timer is already running.
    pub fn begin_phase(&mut self, phase: &str) -> Result<(), MetricsError> {
        if self.running.contains_key(phase) {
            return Err(MetricsError::DoubleBegin { phase: phase.to_string() });
        }
        self.running.insert(phase.to_string(), Instant::now());
        Ok(())
    }

    /// Stop the timer for `phase`, accumulating elapsed time.
    ///
    /// # Errors
    /// Fails if the timer was not running.
    pub fn end_phase(&mut self, phase: &str) -> Result<(), MetricsError> {
        let Some(started) = self.running.remove(phase) else {
            return Err(MetricsError::UnbalancedEnd { phase: phase.to_string() });
        };
        *self.elapsed.entry(phase.to_string()).or_default() += started.elapsed();
        Ok(())
    }

    pub fn incr(&mut self, counter: &str, by: u64) {
        *self.counters.entry(counter.to_string()).or_default() += by;
    }

    #[must_use]
    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn record(&mut self, distribution: &str, value: f64) {
        self.samples.entry(distribution.to_string()).or_default().push(value);
    }

    /// Attach a free-form payload (e.g. branch coverage tables).
    pub fn set_payload(&mut self, name: &str, payload: Value) {
        self.payloads.insert(name.to_string(), payload);
    }

    /// Snapshot the collector into a serializable report.
    ///
    /// Runtime verbosity strips `branchCoverageOneOf` and `enumUsage`
    /// payloads; CI retains everything.
    #[must_use]
    pub fn snapshot(&self, verbosity: Verbosity) -> MetricsReport {
        let phases = self
            .elapsed
            .iter()
            .map(|(name, d)| (name.clone(), d.as_millis() as u64))
            .collect();
        let distributions = self
            .samples
            .iter()
            .map(|(name, values)| (name.clone(), percentiles(values)))
            .collect();
        let payloads = self
            .payloads
            .iter()
            .filter(|(name, _)| {
                verbosity == Verbosity::Ci
                    || (name.as_str() != names::BRANCH_COVERAGE_ONE_OF
                        && name.as_str() != names::ENUM_USAGE)
            })
            .map(|(name, payload)| (name.clone(), payload.clone()))
            .collect();
        MetricsReport {
            phases,
            counters: self.counters.clone(),
            distributions,
            payloads,
        }
    }
}

fn percentiles(values: &[f64]) -> Percentiles {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let at = |q: f64| -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
        sorted[idx]
    };
    Percentiles {
        count: sorted.len(),
        p50: at(0.50),
        p90: at(0.90),
        p99: at(0.99),
    }
}
