//! Numeric sampling: ULP-safe open intervals and integer-grid multipleOf
//!
//! The tightened interval is `[max(min, xmin+step), min(max, xmax-step)]`
//! with `step = multipleOf` (or `10^-p` for plain numbers, `1` for
//! integers). With a `multipleOf`, sampling happens on the exact integer
//! grid `[ceil(lo/mo), floor(hi/mo)]` over rationals; the reconstructed
//! `k*mo` is quantized to the step's decimal width so binary noise never
//! leaks into emitted values.

use serde_json::{Value, json};

use datasynth_schema::NumberKeywords;
use datasynth_utils::rat::{Rat, decimals_of, quantize_decimal};
use datasynth_utils::rng::XorShift32;

/// Default decimal precision for plain numbers; `step = 10^-6`.
pub const DEFAULT_PRECISION: u32 = 6;

/// Fallback sampling range when a side is unbounded.
const DEFAULT_RANGE: f64 = 1_000_000.0;

/// Outcome of numeric feasibility analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberOutcome {
    Value(Value),
    /// The feasible set is empty; the payload describes the interval.
    Infeasible(Value),
}

/// The effective closed interval after exclusive-bound tightening.
fn tighten(keywords: &NumberKeywords, step: f64) -> (f64, f64) {
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    if let Some(min) = keywords.minimum {
        lo = lo.max(min);
    }
    if let Some(xmin) = keywords.exclusive_minimum {
        lo = lo.max(xmin + step);
    }
    if let Some(max) = keywords.maximum {
        hi = hi.min(max);
    }
    if let Some(xmax) = keywords.exclusive_maximum {
        hi = hi.min(xmax - step);
    }
    if lo == f64::NEG_INFINITY {
        lo = (-DEFAULT_RANGE).min(hi);
    }
    if hi == f64::INFINITY {
        hi = DEFAULT_RANGE.max(lo);
    }
    (lo, hi)
}

/// Sample a number (or integer) satisfying `keywords`.
pub fn sample(
    keywords: &NumberKeywords,
    integer: bool,
    edge: bool,
    rng: &mut XorShift32,
) -> NumberOutcome {
    let step = keywords
        .multiple_of
        .unwrap_or(if integer { 1.0 } else { 10f64.powi(-(DEFAULT_PRECISION as i32)) });

    let (lo, hi) = tighten(keywords, step);
    if lo > hi {
        return NumberOutcome::Infeasible(json!({"lo": lo, "hi": hi, "step": step}));
    }

    if keywords.multiple_of.is_some() || integer {
        return sample_grid(keywords, step, lo, hi, integer, edge, rng);
    }

    if edge {
        let candidates = [lo, lo + step, hi - step, hi, 0.0, step, -step];
        let feasible: Vec<f64> = candidates
            .iter()
            .copied()
            .filter(|v| in_bounds(*v, keywords))
            .collect();
        if !feasible.is_empty() {
            return NumberOutcome::Value(number_value(feasible[rng.next_index(feasible.len())]));
        }
    }

    // Plain double in [lo, hi]; exact endpoints are rejected when the bound
    // is exclusive (tightening leaves them reachable only via rounding).
    let mut v = rng.next_f64_in(lo, hi);
    for _ in 0..8 {
        if in_bounds(v, keywords) {
            break;
        }
        v = rng.next_f64_in(lo, hi);
    }
    if !in_bounds(v, keywords) {
        v = (lo + hi) / 2.0;
    }
    NumberOutcome::Value(number_value(v))
}

fn sample_grid(
    keywords: &NumberKeywords,
    step: f64,
    lo: f64,
    hi: f64,
    integer: bool,
    edge: bool,
    rng: &mut XorShift32,
) -> NumberOutcome {
    let mo = keywords.multiple_of.unwrap_or(1.0);
    let (Ok(lo_rat), Ok(hi_rat), Ok(mo_rat)) =
        (Rat::from_f64(lo), Rat::from_f64(hi), Rat::from_f64(mo))
    else {
        return NumberOutcome::Infeasible(json!({"reason": "bounds exceed rational precision"}));
    };
    let (Ok(k_lo_rat), Ok(k_hi_rat)) = (lo_rat.div(&mo_rat), hi_rat.div(&mo_rat)) else {
        return NumberOutcome::Infeasible(json!({"reason": "grid exceeds rational precision"}));
    };
    let mut k_lo = k_lo_rat.ceil();
    let mut k_hi = k_hi_rat.floor();

    // Integer nodes additionally require the value itself to be integral:
    // with mo = p/q reduced, k*mo is integral iff q divides k.
    let stride = if integer { mo_rat.denominator() } else { 1 };
    if stride > 1 {
        let floored = k_lo.div_euclid(stride) * stride;
        k_lo = if floored < k_lo { floored + stride } else { floored };
        k_hi = k_hi.div_euclid(stride) * stride;
    }

    if k_lo > k_hi {
        return NumberOutcome::Infeasible(json!({
            "lo": lo, "hi": hi, "multipleOf": mo, "gridLo": k_lo, "gridHi": k_hi
        }));
    }

    let k = if edge {
        if rng.next_float01() < 0.5 { k_lo } else { k_hi }
    } else {
        let slots = (k_hi - k_lo) / stride;
        k_lo + stride * rng.next_i128(0, slots)
    };

    let digits = decimals_of(step);
    let raw = Rat::new(k, 1)
        .and_then(|k_rat| mo_rat.mul(&k_rat))
        .map(|exact| exact.to_f64())
        .unwrap_or(k as f64 * mo);
    let v = quantize_decimal(raw, digits);
    if integer || v.fract() == 0.0 {
        NumberOutcome::Value(Value::from(v as i64))
    } else {
        NumberOutcome::Value(number_value(v))
    }
}

/// Strict-inequality and multiple check against the raw keywords.
pub fn in_bounds(v: f64, keywords: &NumberKeywords) -> bool {
    if let Some(min) = keywords.minimum
        && v < min
    {
        return false;
    }
    if let Some(max) = keywords.maximum
        && v > max
    {
        return false;
    }
    if let Some(xmin) = keywords.exclusive_minimum
        && v <= xmin
    {
        return false;
    }
    if let Some(xmax) = keywords.exclusive_maximum
        && v >= xmax
    {
        return false;
    }
    if let Some(mo) = keywords.multiple_of
        && !datasynth_utils::rat::is_multiple_ulp(v, mo)
    {
        return false;
    }
    true
}

/// Emit a JSON number, normalizing `-0` to `0` and folding integral doubles
/// into integers.
#[must_use]
pub fn number_value(v: f64) -> Value {
    let v = if v == 0.0 { 0.0 } else { v };
    if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        Value::from(v as i64)
    } else {
        serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> XorShift32 {
        XorShift32::new(42, "/n")
    }

    fn value_of(outcome: NumberOutcome) -> f64 {
        match outcome {
            NumberOutcome::Value(v) => v.as_f64().unwrap(),
            NumberOutcome::Infeasible(d) => panic!("unexpectedly infeasible: {d}"),
        }
    }

    #[test]
    fn test_narrow_decimal_grid() {
        // multipleOf 0.01 in [0.97, 0.99] must land exactly on the grid.
        let keywords = NumberKeywords {
            minimum: Some(0.97),
            maximum: Some(0.99),
            multiple_of: Some(0.01),
            ..Default::default()
        };
        for seed in 0..50u32 {
            let mut rng = XorShift32::new(seed, "/n");
            let v = value_of(sample(&keywords, false, false, &mut rng));
            assert!(
                (v - 0.97).abs() < 1e-12 || (v - 0.98).abs() < 1e-12 || (v - 0.99).abs() < 1e-12,
                "unexpected value {v}"
            );
            assert!(in_bounds(v, &keywords));
        }
    }

    #[test]
    fn test_empty_grid_is_infeasible() {
        let keywords = NumberKeywords {
            minimum: Some(0.971),
            maximum: Some(0.979),
            multiple_of: Some(0.01),
            ..Default::default()
        };
        assert!(matches!(
            sample(&keywords, false, false, &mut rng()),
            NumberOutcome::Infeasible(_)
        ));
    }

    #[test]
    fn test_exclusive_bounds_strict() {
        let keywords = NumberKeywords {
            exclusive_minimum: Some(0.0),
            exclusive_maximum: Some(1.0),
            ..Default::default()
        };
        for seed in 0..100u32 {
            let mut rng = XorShift32::new(seed, "/x");
            let v = value_of(sample(&keywords, false, false, &mut rng));
            assert!(v > 0.0 && v < 1.0, "violated exclusivity: {v}");
        }
    }

    #[test]
    fn test_integer_grid() {
        let keywords = NumberKeywords {
            minimum: Some(2.5),
            maximum: Some(7.5),
            ..Default::default()
        };
        for seed in 0..30u32 {
            let mut rng = XorShift32::new(seed, "/i");
            let outcome = sample(&keywords, true, false, &mut rng);
            let NumberOutcome::Value(v) = outcome else { panic!("infeasible") };
            let i = v.as_i64().unwrap();
            assert!((3..=7).contains(&i));
        }
    }

    #[test]
    fn test_integer_exclusive_nudges_by_one() {
        let keywords = NumberKeywords {
            exclusive_minimum: Some(4.0),
            exclusive_maximum: Some(6.0),
            ..Default::default()
        };
        let outcome = sample(&keywords, true, false, &mut rng());
        let NumberOutcome::Value(v) = outcome else { panic!("infeasible") };
        assert_eq!(v.as_i64().unwrap(), 5);
    }

    #[test]
    fn test_integer_multiple_of_fractional() {
        // multipleOf 0.5 on an integer node only admits whole multiples.
        let keywords = NumberKeywords {
            minimum: Some(1.0),
            maximum: Some(3.0),
            multiple_of: Some(0.5),
            ..Default::default()
        };
        for seed in 0..30u32 {
            let mut rng = XorShift32::new(seed, "/im");
            let NumberOutcome::Value(v) = sample(&keywords, true, false, &mut rng) else {
                panic!("infeasible")
            };
            let i = v.as_i64().unwrap();
            assert!((1..=3).contains(&i));
        }
    }

    #[test]
    fn test_edge_scenario_hits_bounds() {
        let keywords = NumberKeywords {
            minimum: Some(10.0),
            maximum: Some(20.0),
            ..Default::default()
        };
        let v = value_of(sample(&keywords, false, true, &mut rng()));
        assert!((10.0..=20.0).contains(&v));
    }

    #[test]
    fn test_negative_zero_normalized() {
        assert_eq!(number_value(-0.0), Value::from(0));
    }

    #[test]
    fn test_unbounded_samples_in_default_range() {
        let keywords = NumberKeywords::default();
        let v = value_of(sample(&keywords, false, false, &mut rng()));
        assert!(v.abs() <= DEFAULT_RANGE);
    }
}
