//! The coverage index: deciding legal property names per object node

use std::collections::BTreeMap;

/// How legal names are decided at one object node.
///
/// Built only when provably decidable; an absent entry means "undecidable
/// here", which downstream consumers must treat as "hands off".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameDecider {
    /// `propertyNames.enum`: the exact legal name set.
    Enum(Vec<String>),
    /// Anchored literal alternation in `propertyNames.pattern`.
    PseudoEnum(Vec<String>),
    /// `properties` + `additionalProperties: false`: only listed names.
    Closed(Vec<String>),
}

impl NameDecider {
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.allowed_names().iter().any(|n| n == name)
    }

    /// Legal names in declaration order.
    #[must_use]
    pub fn allowed_names(&self) -> &[String] {
        match self {
            Self::Enum(names) | Self::PseudoEnum(names) | Self::Closed(names) => names,
        }
    }

    /// Whether repair may rename offending keys onto this name set.
    ///
    /// Renaming is reserved for `propertyNames`-derived sets; a closed
    /// `properties` list only constrains, it does not invite renames.
    #[must_use]
    pub fn supports_rename(&self) -> bool {
        matches!(self, Self::Enum(_) | Self::PseudoEnum(_))
    }
}

/// `canonPath → NameDecider` for object nodes with decidable name sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageIndex {
    entries: BTreeMap<String, NameDecider>,
}

impl CoverageIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, canon_path: &str, decider: NameDecider) {
        self.entries.insert(canon_path.to_string(), decider);
    }

    #[must_use]
    pub fn get(&self, canon_path: &str) -> Option<&NameDecider> {
        self.entries.get(canon_path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NameDecider)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decider_membership() {
        let decider = NameDecider::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(decider.has("a"));
        assert!(!decider.has("c"));
        assert!(decider.supports_rename());
    }

    #[test]
    fn test_closed_does_not_support_rename() {
        let decider = NameDecider::Closed(vec!["x".to_string()]);
        assert!(!decider.supports_rename());
        assert!(decider.has("x"));
    }

    #[test]
    fn test_index_lookup() {
        let mut index = CoverageIndex::new();
        index.insert("/properties/tags", NameDecider::PseudoEnum(vec!["red".to_string()]));
        assert!(index.get("/properties/tags").unwrap().has("red"));
        assert!(index.get("/other").is_none());
    }
}
