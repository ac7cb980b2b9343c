//! The effective plan

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use datasynth_diagnostics::DiagnosticBuckets;
use datasynth_schema::{Normalized, SchemaNode};
use datasynth_validator::ValidatorFlags;

use crate::coverage::CoverageIndex;

/// Witness requirements for one array node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsRequirement {
    /// Canonical pointer of the witness schema.
    pub witness_path: String,
    pub min: u64,
    pub max: Option<u64>,
}

/// `canonPath → required witnesses` for `contains`/`minContains`/`maxContains`.
pub type ContainsBag = BTreeMap<String, ContainsRequirement>;

/// Memoizer key: two plans are only equivalent under identical keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoKey {
    pub validator_class: String,
    pub flags_fingerprint: String,
    pub resolver_fingerprint: String,
}

impl MemoKey {
    /// Derive the key from the Source validator flags and the resolver
    /// registry fingerprint.
    #[must_use]
    pub fn derive(flags: &ValidatorFlags, resolver_fingerprint: &str) -> Self {
        let canonical = serde_json_canonicalizer::to_string(flags).unwrap_or_default();
        let flags_fingerprint = blake3::hash(canonical.as_bytes()).to_hex().as_str()[..16].to_string();
        Self {
            validator_class: flags.class_label.clone(),
            flags_fingerprint,
            resolver_fingerprint: resolver_fingerprint.to_string(),
        }
    }

    /// The key as one string, usable as a cache-key prefix.
    #[must_use]
    pub fn as_cache_prefix(&self) -> String {
        format!(
            "{}|{}|{}",
            self.validator_class, self.flags_fingerprint, self.resolver_fingerprint
        )
    }
}

/// Output of the Compose stage. Write-once per run.
#[derive(Debug, Clone)]
pub struct Plan {
    /// The canonical AST, unchanged.
    pub normalized: Arc<Normalized>,
    pub coverage: CoverageIndex,
    pub contains: ContainsBag,
    /// Resolved internal reference targets, keyed by the `$ref` string.
    pub ref_targets: BTreeMap<String, SchemaNode>,
    /// Alternation branch counts per composition node, for coverage metrics.
    pub branch_targets: BTreeMap<String, (String, usize)>,
    pub diagnostics: DiagnosticBuckets,
    pub memo_key: MemoKey,
    /// External refs found in the schema; policy is the orchestrator's call.
    pub external_refs: Vec<String>,
}

impl Plan {
    /// Coverage-graph artifact: one row per decidable node.
    #[must_use]
    pub fn coverage_graph(&self) -> Value {
        let rows: Vec<Value> = self
            .coverage
            .iter()
            .map(|(path, decider)| {
                serde_json::json!({
                    "canonPath": path,
                    "kind": match decider {
                        crate::coverage::NameDecider::Enum(_) => "enum",
                        crate::coverage::NameDecider::PseudoEnum(_) => "pseudoEnum",
                        crate::coverage::NameDecider::Closed(_) => "closed",
                    },
                    "names": decider.allowed_names(),
                })
            })
            .collect();
        Value::Array(rows)
    }

    /// Coverage-targets artifact: alternation branches to cover.
    #[must_use]
    pub fn coverage_targets(&self) -> Value {
        let rows: Vec<Value> = self
            .branch_targets
            .iter()
            .map(|(path, (keyword, count))| {
                serde_json::json!({
                    "canonPath": path,
                    "keyword": keyword,
                    "branches": count,
                })
            })
            .collect();
        Value::Array(rows)
    }
}
