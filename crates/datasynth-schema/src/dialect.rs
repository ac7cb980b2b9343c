//! Dialect detection

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four supported JSON Schema dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Draft4,
    Draft7,
    Draft2019,
    Draft2020,
}

impl Dialect {
    /// Newest supported dialect; the Planning validator always uses it.
    pub const NEWEST: Self = Self::Draft2020;

    /// Detect the dialect from a schema's `$schema`, defaulting to the
    /// newest dialect when absent. Draft-06 declarations are folded into
    /// draft-07, which is a superset for everything this engine consumes.
    #[must_use]
    pub fn detect(schema: &Value) -> Self {
        let Some(uri) = schema.get("$schema").and_then(Value::as_str) else {
            return Self::NEWEST;
        };
        if uri.contains("draft-04") {
            Self::Draft4
        } else if uri.contains("draft-06") || uri.contains("draft-07") {
            Self::Draft7
        } else if uri.contains("2019-09") {
            Self::Draft2019
        } else if uri.contains("2020-12") {
            Self::Draft2020
        } else {
            Self::NEWEST
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft4 => "draft-04",
            Self::Draft7 => "draft-07",
            Self::Draft2019 => "2019-09",
            Self::Draft2020 => "2020-12",
        }
    }

    /// Canonical meta-schema URI.
    #[must_use]
    pub const fn meta_schema_uri(&self) -> &'static str {
        match self {
            Self::Draft4 => "http://json-schema.org/draft-04/schema#",
            Self::Draft7 => "http://json-schema.org/draft-07/schema#",
            Self::Draft2019 => "https://json-schema.org/draft/2019-09/schema",
            Self::Draft2020 => "https://json-schema.org/draft/2020-12/schema",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
