//! RFC-6901 JSON Pointer utilities and the canonical↔original map
//!
//! Normalization rewrites the source schema into a canonical tree; every
//! canonical node remembers which original pointer(s) produced it. The
//! forward direction (canonical → original) is a function, the reverse
//! direction keeps a lexicographically sorted list because several canonical
//! nodes may alias one original.

use std::collections::HashMap;
use thiserror::Error;

/// Pointer-map errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointerError {
    #[error("malformed JSON pointer: {pointer}")]
    Malformed { pointer: String },

    #[error("pointer not mapped: {pointer}")]
    NotMapped { pointer: String },
}

/// Escape a single reference token (`~` → `~0`, `/` → `~1`).
#[must_use]
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Unescape a single reference token. `None` for invalid escapes.
#[must_use]
pub fn unescape_token(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Check RFC-6901 well-formedness. The empty string names the root.
#[must_use]
pub fn is_well_formed(pointer: &str) -> bool {
    if pointer.is_empty() {
        return true;
    }
    if !pointer.starts_with('/') {
        return false;
    }
    pointer[1..].split('/').all(|t| unescape_token(t).is_some())
}

/// Append an escaped token to a pointer.
#[must_use]
pub fn join(pointer: &str, token: &str) -> String {
    let base = if pointer == "/" { "" } else { pointer };
    format!("{base}/{}", escape_token(token))
}

/// Drop the trailing token. `None` at the root.
#[must_use]
pub fn parent(pointer: &str) -> Option<&str> {
    if pointer.is_empty() || pointer == "/" {
        return None;
    }
    pointer.rfind('/').map(|idx| &pointer[..idx])
}

/// Bidirectional canonical↔original pointer map.
#[derive(Debug, Clone, Default)]
pub struct PointerMap {
    canon_to_orig: HashMap<String, String>,
    orig_to_canon: HashMap<String, Vec<String>>,
}

impl PointerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map canonical pointer `canon` to original pointer `orig`.
    ///
    /// Overwriting an existing mapping removes the stale back-link from the
    /// reverse index. The reverse list stays sorted via binary insert.
    pub fn map_canon_to_orig(&mut self, canon: &str, orig: &str) -> Result<(), PointerError> {
        for p in [canon, orig] {
            if !is_well_formed(p) && p != "/" {
                return Err(PointerError::Malformed { pointer: p.to_string() });
            }
        }
        if let Some(previous) = self.canon_to_orig.insert(canon.to_string(), orig.to_string())
            && previous != orig
            && let Some(list) = self.orig_to_canon.get_mut(&previous)
        {
            if let Ok(idx) = list.binary_search_by(|c| c.as_str().cmp(canon)) {
                list.remove(idx);
            }
            if list.is_empty() {
                self.orig_to_canon.remove(&previous);
            }
        }
        let list = self.orig_to_canon.entry(orig.to_string()).or_default();
        if let Err(idx) = list.binary_search_by(|c| c.as_str().cmp(canon)) {
            list.insert(idx, canon.to_string());
        }
        Ok(())
    }

    /// Original pointer for an exactly mapped canonical pointer.
    #[must_use]
    pub fn original_for(&self, canon: &str) -> Option<&str> {
        self.canon_to_orig.get(canon).map(String::as_str)
    }

    /// Sorted canonical pointers for an original pointer.
    #[must_use]
    pub fn canons_for(&self, orig: &str) -> &[String] {
        self.orig_to_canon.get(orig).map_or(&[], Vec::as_slice)
    }

    /// Resolve `canon` to an original pointer, trimming trailing segments
    /// until a mapping is found.
    pub fn to_original_by_walk(&self, canon: &str) -> Result<String, PointerError> {
        let mut cursor = canon;
        loop {
            if let Some(orig) = self.original_for(cursor) {
                return Ok(orig.to_string());
            }
            match parent(cursor) {
                Some(p) if !p.is_empty() => cursor = p,
                _ => {
                    // Root included: an unmapped "" or "/" has nowhere left to walk.
                    if cursor.is_empty() || cursor == "/" {
                        return Err(PointerError::NotMapped { pointer: canon.to_string() });
                    }
                    cursor = "";
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.canon_to_orig.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canon_to_orig.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_round_trip() {
        assert_eq!(escape_token("a/b~c"), "a~1b~0c");
        assert_eq!(unescape_token("a~1b~0c").unwrap(), "a/b~c");
        assert_eq!(unescape_token("bad~2"), None);
        assert_eq!(unescape_token("trailing~"), None);
    }

    #[test]
    fn test_well_formedness() {
        assert!(is_well_formed(""));
        assert!(is_well_formed("/properties/a"));
        assert!(is_well_formed("/a~0b/c~1d"));
        assert!(!is_well_formed("properties/a"));
        assert!(!is_well_formed("/a~2"));
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("", "properties"), "/properties");
        assert_eq!(join("/properties", "a/b"), "/properties/a~1b");
        assert_eq!(parent("/properties/a"), Some("/properties"));
        assert_eq!(parent("/properties"), Some(""));
        assert_eq!(parent(""), None);
    }

    #[test]
    fn test_reverse_index_sorted() {
        let mut map = PointerMap::new();
        map.map_canon_to_orig("/b", "/orig").unwrap();
        map.map_canon_to_orig("/a", "/orig").unwrap();
        map.map_canon_to_orig("/c", "/orig").unwrap();
        assert_eq!(map.canons_for("/orig"), ["/a", "/b", "/c"]);
    }

    #[test]
    fn test_overwrite_removes_stale_backlink() {
        let mut map = PointerMap::new();
        map.map_canon_to_orig("/a", "/old").unwrap();
        map.map_canon_to_orig("/a", "/new").unwrap();
        assert!(map.canons_for("/old").is_empty());
        assert_eq!(map.canons_for("/new"), ["/a"]);
        assert_eq!(map.original_for("/a"), Some("/new"));
    }

    #[test]
    fn test_walk_trims_segments() {
        let mut map = PointerMap::new();
        map.map_canon_to_orig("/properties/a", "/defs/a").unwrap();
        let orig = map.to_original_by_walk("/properties/a/items/0").unwrap();
        assert_eq!(orig, "/defs/a");
    }

    #[test]
    fn test_walk_fails_at_unmapped_root() {
        let map = PointerMap::new();
        let err = map.to_original_by_walk("/").unwrap_err();
        assert!(matches!(err, PointerError::NotMapped { .. }));
    }

    #[test]
    fn test_malformed_pointer_rejected() {
        let mut map = PointerMap::new();
        let err = map.map_canon_to_orig("no-slash", "/ok").unwrap_err();
        assert!(matches!(err, PointerError::Malformed { .. }));
    }
}
