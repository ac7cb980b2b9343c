//! Registry hydration with duplicate-id containment

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

use datasynth_diagnostics::{Diagnostic, DiagnosticCode};
use datasynth_schema::Dialect;

/// Resolver failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("timed out fetching {uri}")]
    Timeout { uri: String },
}

/// Options passed to the resolver pre-phase.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    pub timeout_ms: Option<u64>,
}

/// One fetched schema document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverEntry {
    pub uri: String,
    pub schema: Value,
}

/// The resolver collaborator: fetches external references ahead of compose.
///
/// This is the only suspension point before the pipeline stages; fetchers
/// own their cancellation.
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn prefetch(
        &self,
        refs: &[String],
        options: &ResolverOptions,
    ) -> Result<Vec<ResolverEntry>, ResolveError>;
}

/// A run-scoped registry of resolved schema documents.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<ResolverEntry>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn entries(&self) -> &[ResolverEntry] {
        &self.entries
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Byte-stable fingerprint over the canonical JSON of all entries.
    ///
    /// Part of the compose memoization key: two plans are only equivalent
    /// under identical resolver content.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut sorted: Vec<&ResolverEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.uri.cmp(&b.uri));
        let doc: Vec<Value> = sorted
            .iter()
            .map(|e| json!({"uri": e.uri, "schema": e.schema}))
            .collect();
        let canonical = serde_json_canonicalizer::to_string(&Value::Array(doc))
            .unwrap_or_else(|_| String::new());
        blake3::hash(canonical.as_bytes()).to_hex().as_str()[..16].to_string()
    }
}

/// Collect every `$id` declared anywhere in a schema document.
fn collect_ids(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(obj) => {
            for key in ["$id", "id"] {
                if let Some(Value::String(id)) = obj.get(key) {
                    out.insert(id.clone());
                }
            }
            for sub in obj.values() {
                collect_ids(sub, out);
            }
        }
        Value::Array(items) => {
            for sub in items {
                collect_ids(sub, out);
            }
        }
        _ => {}
    }
}

/// Hydrate a registry from resolver entries.
///
/// Entries whose declared `$schema` conflicts with the target dialect are
/// skipped, as are entries whose URI or any `$id` was already seen
/// (`RESOLVER_ADD_SCHEMA_SKIPPED_DUPLICATE_ID`). `seen_schema_ids` is
/// seeded with the root schema's own ids before hydration so an entry can
/// never shadow the document under synthesis.
#[must_use]
pub fn hydrate(
    entries: Vec<ResolverEntry>,
    target_dialect: Dialect,
    root_schema: &Value,
) -> (SchemaRegistry, Vec<Diagnostic>) {
    let mut seen_schema_ids = BTreeSet::new();
    collect_ids(root_schema, &mut seen_schema_ids);

    let mut registry = SchemaRegistry::default();
    let mut diagnostics = Vec::new();
    let mut skipped_duplicate = 0usize;
    let mut skipped_dialect = 0usize;

    for entry in entries {
        if entry.schema.get("$schema").is_some()
            && Dialect::detect(&entry.schema) != target_dialect
        {
            debug!(uri = %entry.uri, "skipping resolver entry with conflicting dialect");
            skipped_dialect += 1;
            continue;
        }

        let mut entry_ids = BTreeSet::new();
        entry_ids.insert(entry.uri.clone());
        collect_ids(&entry.schema, &mut entry_ids);

        if let Some(duplicate) = entry_ids.iter().find(|id| seen_schema_ids.contains(*id)) {
            diagnostics.push(Diagnostic::with_details(
                DiagnosticCode::ResolverAddSchemaSkippedDuplicateId,
                "",
                json!({"uri": entry.uri, "duplicateId": duplicate}),
            ));
            skipped_duplicate += 1;
            continue;
        }

        seen_schema_ids.extend(entry_ids);
        registry.entries.push(entry);
    }

    diagnostics.push(Diagnostic::with_details(
        DiagnosticCode::ResolverStrategiesApplied,
        "",
        json!({
            "added": registry.size(),
            "skippedDuplicate": skipped_duplicate,
            "skippedDialect": skipped_dialect,
        }),
    ));

    (registry, diagnostics)
}
