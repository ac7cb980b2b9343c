//! Bounded synthesis of strings from admitted patterns
//!
//! Handles the shapes repair and generation rely on: literal alternations,
//! `\d{m,n}` / `\w{m,n}` class runs, simple character classes, and literal
//! text. Anything richer returns `None` and the caller falls back to
//! length-based generation.

use datasynth_utils::rng::XorShift32;

use crate::analyze::literal_alternation;

/// Hard cap on synthesized repetition counts.
const MAX_REPEAT: usize = 64;

/// Synthesize a string matching `pattern`, or `None` when the pattern is
/// outside the supported subset.
#[must_use]
pub fn synthesize(pattern: &str, rng: &mut XorShift32) -> Option<String> {
    if let Some(branches) = literal_alternation(pattern) {
        let idx = rng.next_index(branches.len());
        return Some(branches[idx].clone());
    }

    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let body = body.strip_suffix('$').unwrap_or(body);
    synthesize_sequence(body, rng)
}

fn synthesize_sequence(body: &str, rng: &mut XorShift32) -> Option<String> {
    let mut out = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        let atom: Atom = match c {
            '\\' => match chars.next()? {
                'd' => Atom::Digit,
                'w' => Atom::Word,
                escaped @ ('.' | '-' | '_' | '/' | '\\' | '+' | '*' | '$' | '^' | '{' | '}') => {
                    Atom::Literal(escaped)
                }
                _ => return None,
            },
            '[' => Atom::First(first_of_class(&mut chars)?),
            '.' => Atom::Word,
            '(' | ')' | '|' | '*' | '+' | '?' | '{' | '}' | ']' => return None,
            literal => Atom::Literal(literal),
        };

        let count = match chars.peek() {
            Some('{') => {
                chars.next();
                let (lo, hi) = parse_bound(&mut chars)?;
                if lo == hi { lo } else { lo + rng.next_index(hi - lo + 1) }
            }
            Some('+') => {
                chars.next();
                1 + rng.next_index(2)
            }
            Some('*') => {
                chars.next();
                rng.next_index(2)
            }
            Some('?') => {
                chars.next();
                rng.next_index(2)
            }
            _ => 1,
        };

        for _ in 0..count.min(MAX_REPEAT) {
            out.push(atom.emit(rng));
        }
    }
    Some(out)
}

enum Atom {
    Literal(char),
    Digit,
    Word,
    First(char),
}

impl Atom {
    fn emit(&self, rng: &mut XorShift32) -> char {
        match self {
            Self::Literal(c) | Self::First(c) => *c,
            Self::Digit => char::from(b'0' + rng.next_index(10) as u8),
            Self::Word => char::from(b'a' + rng.next_index(26) as u8),
        }
    }
}

/// First concrete character of a simple class like `[a-z0-9_]`.
fn first_of_class(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let mut first = None;
    let mut prev = None;
    while let Some(c) = chars.next() {
        match c {
            ']' => return first,
            '^' if prev.is_none() => return None,
            '\\' => {
                let escaped = chars.next()?;
                first.get_or_insert(escaped);
            }
            '-' => {}
            other => {
                first.get_or_insert(other);
            }
        }
        prev = Some(c);
    }
    None
}

fn parse_bound(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<(usize, usize)> {
    let mut lo = String::new();
    let mut hi = String::new();
    let mut in_hi = false;
    for c in chars.by_ref() {
        match c {
            '0'..='9' => {
                if in_hi {
                    hi.push(c);
                } else {
                    lo.push(c);
                }
            }
            ',' if !in_hi => in_hi = true,
            '}' => {
                let lo: usize = lo.parse().ok()?;
                let hi = if !in_hi {
                    lo
                } else if hi.is_empty() {
                    // Open-ended {m,}: emit the minimum (at least one).
                    lo.max(1)
                } else {
                    hi.parse().ok()?
                };
                return if hi >= lo { Some((lo, hi)) } else { None };
            }
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> XorShift32 {
        XorShift32::new(42, "/pattern")
    }

    fn check(pattern: &str) -> String {
        let value = synthesize(pattern, &mut rng()).expect("pattern should synthesize");
        let re = regex::Regex::new(pattern).unwrap();
        assert!(re.is_match(&value), "{value:?} does not match {pattern}");
        value
    }

    #[test]
    fn test_alternation_member() {
        let value = check("^(red|green|blue)$");
        assert!(["red", "green", "blue"].contains(&value.as_str()));
    }

    #[test]
    fn test_digit_run() {
        let value = check(r"^\d{3,5}$");
        assert!((3..=5).contains(&value.len()));
    }

    #[test]
    fn test_word_run() {
        check(r"^\w{2}$");
    }

    #[test]
    fn test_literal_with_classes() {
        check(r"^id-\d{4}$");
        check("^[a-z][a-z0-9]{2}$");
    }

    #[test]
    fn test_deterministic_under_same_stream() {
        let a = synthesize(r"^\d{3,5}$", &mut rng()).unwrap();
        let b = synthesize(r"^\d{3,5}$", &mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsupported_returns_none() {
        assert!(synthesize("^(a|b)+$", &mut rng()).is_none());
        assert!(synthesize("^(?=x)a$", &mut rng()).is_none());
    }

    #[test]
    fn test_negated_class_unsupported() {
        assert!(synthesize("^[^a]$", &mut rng()).is_none());
    }
}
