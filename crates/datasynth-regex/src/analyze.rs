//! Pattern admissibility analysis

use regex::Regex;
use serde_json::json;

use datasynth_diagnostics::{Diagnostic, DiagnosticCode};

/// Default complexity cap.
pub const DEFAULT_MAX_COMPLEXITY: usize = 100;

/// Options for [`analyze_regex`].
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Where the pattern came from, recorded in diagnostics
    /// (e.g. `"propertyNames"`, `"pattern"`).
    pub context: String,
    pub max_complexity: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            context: "pattern".to_string(),
            max_complexity: DEFAULT_MAX_COMPLEXITY,
        }
    }
}

/// Result of analyzing a schema pattern.
#[derive(Debug, Clone)]
pub struct RegexAnalysis {
    pub anchored: bool,
    pub has_lookaround: bool,
    pub has_backreference: bool,
    pub capped: bool,
    pub compile_error: Option<String>,
    pub complexity: usize,
    pub is_anchored_safe: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Analyze `pattern` against the admissibility policy.
///
/// Complexity is the pattern length plus the number of quantifiers. Unsafe
/// patterns carry `REGEX_COMPLEXITY_CAPPED` or `REGEX_COMPILE_ERROR`
/// diagnostics for the caller to forward.
#[must_use]
pub fn analyze_regex(pattern: &str, canon_path: &str, opts: &AnalyzeOptions) -> RegexAnalysis {
    let anchored = is_anchored(pattern);
    let has_lookaround = ["(?=", "(?!", "(?<=", "(?<!"]
        .iter()
        .any(|needle| pattern.contains(needle));
    let has_backreference = detect_backreference(pattern);
    let complexity = pattern.len() + count_quantifiers(pattern);
    let capped = complexity > opts.max_complexity;

    // The regex crate rejects lookaround and backreferences at compile time,
    // so a compile attempt stays meaningful even when detection above missed
    // an exotic spelling.
    let compile_error = Regex::new(pattern).err().map(|e| e.to_string());

    let mut diagnostics = Vec::new();
    if capped {
        diagnostics.push(Diagnostic::with_details(
            DiagnosticCode::RegexComplexityCapped,
            canon_path,
            json!({
                "pattern": pattern,
                "context": opts.context,
                "complexity": complexity,
                "maxComplexity": opts.max_complexity,
            }),
        ));
    }
    if let Some(error) = &compile_error {
        diagnostics.push(Diagnostic::with_details(
            DiagnosticCode::RegexCompileError,
            canon_path,
            json!({
                "pattern": pattern,
                "context": opts.context,
                "error": error,
            }),
        ));
    }

    let is_anchored_safe =
        anchored && !has_lookaround && !has_backreference && !capped && compile_error.is_none();

    RegexAnalysis {
        anchored,
        has_lookaround,
        has_backreference,
        capped,
        compile_error,
        complexity,
        is_anchored_safe,
        diagnostics,
    }
}

/// Extract the literal alternation of an anchored pattern.
///
/// `^(red|green|blue)$` (with or without the group, capturing or not) is a
/// pseudo-enum: a finite name set equivalent to an `enum` for coverage
/// purposes. Returns `None` when any branch contains metacharacters.
#[must_use]
pub fn literal_alternation(pattern: &str) -> Option<Vec<String>> {
    let body = pattern.strip_prefix('^')?.strip_suffix('$')?;
    let body = body
        .strip_prefix("(?:")
        .or_else(|| body.strip_prefix('('))
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(body);
    if body.is_empty() {
        return None;
    }
    let mut branches = Vec::new();
    for branch in body.split('|') {
        branches.push(unescape_literal(branch)?);
    }
    Some(branches)
}

fn is_anchored(pattern: &str) -> bool {
    if !pattern.starts_with('^') || !pattern.ends_with('$') {
        return false;
    }
    // A trailing escaped dollar is a literal, not an anchor.
    let backslashes = pattern[..pattern.len() - 1]
        .chars()
        .rev()
        .take_while(|c| *c == '\\')
        .count();
    backslashes % 2 == 0
}

fn detect_backreference(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            let next = bytes[i + 1];
            if next.is_ascii_digit() && next != b'0' {
                return true;
            }
            if next == b'k' && i + 2 < bytes.len() && bytes[i + 2] == b'<' {
                return true;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    false
}

fn count_quantifiers(pattern: &str) -> usize {
    let mut count = 0;
    let mut in_class = false;
    let mut prev: Option<char> = None;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
                prev = Some('\\');
                continue;
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '*' | '+' if !in_class => count += 1,
            '?' if !in_class => {
                // "(?" introduces a group modifier, not a quantifier.
                if prev != Some('(') {
                    count += 1;
                }
            }
            '{' if !in_class => {
                if looks_like_bound(&mut chars.clone()) {
                    count += 1;
                }
            }
            _ => {}
        }
        prev = Some(c);
    }
    count
}

fn looks_like_bound(rest: &mut std::iter::Peekable<std::str::Chars<'_>>) -> bool {
    let mut saw_digit = false;
    for c in rest {
        match c {
            '0'..='9' => saw_digit = true,
            ',' if saw_digit => {}
            '}' => return saw_digit,
            _ => return false,
        }
    }
    false
}

fn unescape_literal(branch: &str) -> Option<String> {
    let mut out = String::with_capacity(branch.len());
    let mut chars = branch.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('.' | '-' | '_' | '/' | '\\' | '+' | '*' | '$' | '^')) => {
                    out.push(escaped);
                }
                _ => return None,
            },
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' => return None,
            _ => out.push(c),
        }
    }
    if out.is_empty() { None } else { Some(out) }
}
