//! String synthesis

use datasynth_diagnostics::Diagnostic;
use datasynth_metrics::{MetricsCollector, names};
use datasynth_regex::{AnalyzeOptions, analyze_regex, synthesize};
use datasynth_schema::StringKeywords;
use datasynth_utils::rng::XorShift32;
use datasynth_validator::FormatRegistry;

/// Default length for strings with no length constraints.
const DEFAULT_LENGTH: u64 = 8;

/// Synthesize a string for `keywords`.
///
/// Admitted anchored-safe patterns drive the bounded enumerator; a
/// registered format plugin is consulted next; otherwise the string is
/// length-bounded filler. Pattern-policy diagnostics are appended for the
/// caller.
pub fn sample_string(
    keywords: &StringKeywords,
    formats: Option<&FormatRegistry>,
    canon_path: &str,
    edge: bool,
    rng: &mut XorShift32,
    diagnostics: &mut Vec<Diagnostic>,
    metrics: &mut MetricsCollector,
) -> String {
    if let Some(pattern) = &keywords.pattern {
        let analysis = analyze_regex(pattern, canon_path, &AnalyzeOptions::default());
        diagnostics.extend(analysis.diagnostics.clone());
        if analysis.is_anchored_safe {
            metrics.incr(names::PATTERN_WITNESS_TRIED, 1);
            if let Some(witness) = synthesize(pattern, rng) {
                return witness;
            }
        }
    }

    if let Some(format) = &keywords.format
        && let Some(registry) = formats
        && let Some(plugin) = registry.plugin_for(format)
    {
        match plugin.generate(format, rng) {
            Ok(value) => return value,
            Err(_) => {
                if let Some(example) = plugin.examples(format).into_iter().next() {
                    return example;
                }
            }
        }
    }

    filler(keywords, edge, rng)
}

/// Length-bounded filler text.
fn filler(keywords: &StringKeywords, edge: bool, rng: &mut XorShift32) -> String {
    let lo = keywords.min_length.unwrap_or(0);
    let hi = keywords.max_length.unwrap_or(lo.max(DEFAULT_LENGTH));
    let hi = hi.max(lo);
    let len = if edge || lo == hi {
        lo
    } else {
        lo + (rng.next_index((hi - lo + 1) as usize) as u64)
    };
    (0..len)
        .map(|_| char::from(b'a' + rng.next_index(26) as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasynth_validator::{FormatError, FormatPlugin};

    fn rng() -> XorShift32 {
        XorShift32::new(42, "/s")
    }

    fn sample(keywords: &StringKeywords) -> String {
        let mut diagnostics = Vec::new();
        let mut metrics = MetricsCollector::new();
        sample_string(keywords, None, "", false, &mut rng(), &mut diagnostics, &mut metrics)
    }

    #[test]
    fn test_length_bounds_respected() {
        let keywords = StringKeywords {
            min_length: Some(3),
            max_length: Some(5),
            ..Default::default()
        };
        for seed in 0..30u32 {
            let mut diagnostics = Vec::new();
            let mut metrics = MetricsCollector::new();
            let mut rng = XorShift32::new(seed, "/s");
            let s = sample_string(
                &keywords, None, "", false, &mut rng, &mut diagnostics, &mut metrics,
            );
            assert!((3..=5).contains(&(s.len() as u64)), "bad length: {s:?}");
        }
    }

    #[test]
    fn test_pattern_drives_witness() {
        let keywords = StringKeywords {
            pattern: Some("^(red|green|blue)$".to_string()),
            ..Default::default()
        };
        let s = sample(&keywords);
        assert!(["red", "green", "blue"].contains(&s.as_str()));
    }

    #[test]
    fn test_unsafe_pattern_emits_diagnostic_and_falls_back() {
        let keywords = StringKeywords {
            pattern: Some("^([a-z]$".to_string()),
            min_length: Some(2),
            max_length: Some(2),
            ..Default::default()
        };
        let mut diagnostics = Vec::new();
        let mut metrics = MetricsCollector::new();
        let s = sample_string(
            &keywords, None, "", false, &mut rng(), &mut diagnostics, &mut metrics,
        );
        assert_eq!(s.len(), 2);
        assert!(!diagnostics.is_empty());
    }

    struct Upper;

    impl FormatPlugin for Upper {
        fn supports(&self, name: &str) -> bool {
            name == "upper"
        }
        fn generate(&self, _n: &str, _rng: &mut XorShift32) -> Result<String, FormatError> {
            Ok("ABC".to_string())
        }
        fn validate(&self, _n: &str, v: &str) -> bool {
            v.chars().all(char::is_uppercase)
        }
        fn examples(&self, _n: &str) -> Vec<String> {
            vec!["XYZ".to_string()]
        }
    }

    #[test]
    fn test_format_plugin_consulted() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(Upper));
        let keywords = StringKeywords {
            format: Some("upper".to_string()),
            ..Default::default()
        };
        let mut diagnostics = Vec::new();
        let mut metrics = MetricsCollector::new();
        let s = sample_string(
            &keywords,
            Some(&registry),
            "",
            false,
            &mut rng(),
            &mut diagnostics,
            &mut metrics,
        );
        assert_eq!(s, "ABC");
    }

    #[test]
    fn test_edge_prefers_min_length() {
        let keywords = StringKeywords {
            min_length: Some(2),
            max_length: Some(9),
            ..Default::default()
        };
        let mut diagnostics = Vec::new();
        let mut metrics = MetricsCollector::new();
        let s = sample_string(
            &keywords, None, "", true, &mut rng(), &mut diagnostics, &mut metrics,
        );
        assert_eq!(s.len(), 2);
    }
}
