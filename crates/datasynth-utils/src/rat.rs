//! Exact rational arithmetic for constraint solving
//!
//! Binary floating point cannot represent most decimal `multipleOf` steps
//! exactly, so grid computations (`ceil(lo/mo)`, `floor(hi/mo)`) run over
//! exact `p/q` rationals converted losslessly from the input doubles. The
//! bit-width of numerator and denominator is bounded; conversions that would
//! exceed the bound fail instead of silently losing precision.

use thiserror::Error;

/// Maximum bit-width for numerator or denominator of a [`Rat`].
pub const MAX_RAT_BITS: u32 = 96;

/// Decimal tie-break tolerance used by banker's rounding to mask binary noise.
const TIE_TOLERANCE: f64 = 1e-12;

/// Errors from rational construction and arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatError {
    #[error("rational exceeds {MAX_RAT_BITS} bits after reduction")]
    Overflow,

    #[error("denominator must be positive")]
    ZeroDenominator,

    #[error("value is not finite")]
    NonFinite,
}

/// Reduced rational `p/q` with `q > 0` and the sign carried on `p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rat {
    p: i128,
    q: i128,
}

/// Greatest common divisor (Euclid).
#[must_use]
pub fn gcd(a: u128, b: u128) -> u128 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple. Returns `None` on overflow.
#[must_use]
pub fn lcm(a: u128, b: u128) -> Option<u128> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    (a / gcd(a, b)).checked_mul(b)
}

fn bits(v: i128) -> u32 {
    128 - v.unsigned_abs().leading_zeros()
}

impl Rat {
    /// Construct and reduce `p/q`.
    pub fn new(p: i128, q: i128) -> Result<Self, RatError> {
        if q == 0 {
            return Err(RatError::ZeroDenominator);
        }
        let sign = if (p < 0) != (q < 0) { -1 } else { 1 };
        let (pa, qa) = (p.unsigned_abs(), q.unsigned_abs());
        let g = gcd(pa, qa).max(1);
        let (pr, qr) = ((pa / g) as i128, (qa / g) as i128);
        if bits(pr) > MAX_RAT_BITS || bits(qr) > MAX_RAT_BITS {
            return Err(RatError::Overflow);
        }
        Ok(Self { p: sign * pr, q: qr })
    }

    /// Exact conversion from a finite double.
    ///
    /// Every finite `f64` is `m * 2^e` for integer `m`, so the conversion is
    /// lossless; it fails only when the exact form exceeds the bit bound.
    pub fn from_f64(v: f64) -> Result<Self, RatError> {
        if !v.is_finite() {
            return Err(RatError::NonFinite);
        }
        if v == 0.0 {
            return Self::new(0, 1);
        }
        let bits_repr = v.to_bits();
        let sign = if bits_repr >> 63 == 1 { -1i128 } else { 1i128 };
        let exponent = ((bits_repr >> 52) & 0x7ff) as i64;
        let fraction = bits_repr & 0x000f_ffff_ffff_ffff;
        // Subnormals have an implicit leading 0, normals a leading 1.
        let (mantissa, exp) = if exponent == 0 {
            (fraction as i128, -1074i64)
        } else {
            ((fraction | 0x0010_0000_0000_0000) as i128, exponent - 1075)
        };
        if exp >= 0 {
            let shift = exp as u32;
            if shift + bits(mantissa) > MAX_RAT_BITS {
                return Err(RatError::Overflow);
            }
            Self::new(sign * (mantissa << shift), 1)
        } else {
            let neg = (-exp) as u32;
            if neg >= 127 {
                return Err(RatError::Overflow);
            }
            Self::new(sign * mantissa, 1i128 << neg)
        }
    }

    #[must_use]
    pub fn numerator(&self) -> i128 {
        self.p
    }

    #[must_use]
    pub fn denominator(&self) -> i128 {
        self.q
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.p == 0
    }

    pub fn add(&self, other: &Self) -> Result<Self, RatError> {
        let p = self
            .p
            .checked_mul(other.q)
            .and_then(|l| other.p.checked_mul(self.q).and_then(|r| l.checked_add(r)))
            .ok_or(RatError::Overflow)?;
        let q = self.q.checked_mul(other.q).ok_or(RatError::Overflow)?;
        Self::new(p, q)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, RatError> {
        self.add(&Self { p: -other.p, q: other.q })
    }

    pub fn mul(&self, other: &Self) -> Result<Self, RatError> {
        let p = self.p.checked_mul(other.p).ok_or(RatError::Overflow)?;
        let q = self.q.checked_mul(other.q).ok_or(RatError::Overflow)?;
        Self::new(p, q)
    }

    pub fn div(&self, other: &Self) -> Result<Self, RatError> {
        if other.p == 0 {
            return Err(RatError::ZeroDenominator);
        }
        let p = self.p.checked_mul(other.q).ok_or(RatError::Overflow)?;
        let q = self.q.checked_mul(other.p).ok_or(RatError::Overflow)?;
        Self::new(p, q)
    }

    /// Largest integer `<= p/q`.
    #[must_use]
    pub fn floor(&self) -> i128 {
        if self.p >= 0 {
            self.p / self.q
        } else {
            -((-self.p + self.q - 1) / self.q)
        }
    }

    /// Smallest integer `>= p/q`.
    #[must_use]
    pub fn ceil(&self) -> i128 {
        if self.p >= 0 {
            (self.p + self.q - 1) / self.q
        } else {
            -(-self.p / self.q)
        }
    }

    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.p as f64 / self.q as f64
    }

}

impl PartialOrd for Rat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // q values are positive, so cross-multiplication preserves order.
        match (self.p.checked_mul(other.q), other.p.checked_mul(self.q)) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => self.to_f64().partial_cmp(&other.to_f64()).unwrap_or(std::cmp::Ordering::Equal),
        }
    }
}

/// Unit in the last place of `v`.
#[must_use]
pub fn ulp(v: f64) -> f64 {
    if !v.is_finite() {
        return f64::NAN;
    }
    let a = v.abs();
    if a == f64::MAX {
        return a - f64::from_bits(a.to_bits() - 1);
    }
    f64::from_bits(a.to_bits() + 1) - a
}

/// Quantize `v` to `digits` decimal digits using banker's rounding.
///
/// Ties are detected with a `1e-12` tolerance so binary noise around the
/// half-way point still rounds to even.
#[must_use]
pub fn quantize_decimal(v: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    let scaled = v * scale;
    let floor = scaled.floor();
    let frac = scaled - floor;
    let rounded = if (frac - 0.5).abs() < TIE_TOLERANCE {
        // Half-way: round to even.
        if (floor as i64) % 2 == 0 { floor } else { floor + 1.0 }
    } else {
        scaled.round()
    };
    rounded / scale
}

/// `|v/m - round(v/m)| < 10^-p`.
#[must_use]
pub fn is_multiple_with_epsilon(v: f64, m: f64, p: u32) -> bool {
    if m == 0.0 || !v.is_finite() || !m.is_finite() {
        return false;
    }
    let ratio = v / m;
    (ratio - ratio.round()).abs() < 10f64.powi(-(p as i32))
}

/// ULP-aware `multipleOf` compliance test.
///
/// Accepts `v` as a multiple of `m` when
/// `|v - k*m| <= ulp(v) + |k|*ulp(m) + |v|*1e-15` for `k = round(v/m)`.
#[must_use]
pub fn is_multiple_ulp(v: f64, m: f64) -> bool {
    if m == 0.0 || !v.is_finite() || !m.is_finite() {
        return false;
    }
    let k = (v / m).round();
    let residue = (v - k * m).abs();
    residue <= ulp(v) + k.abs() * ulp(m) + v.abs() * 1e-15
}

/// Number of decimal digits needed to print `step` exactly, capped at 15.
///
/// Used to decide the quantization width for reconstructed grid values.
#[must_use]
pub fn decimals_of(step: f64) -> u32 {
    for digits in 0..=15u32 {
        let scale = 10f64.powi(digits as i32);
        let scaled = step * scale;
        if (scaled - scaled.round()).abs() < TIE_TOLERANCE * scale.max(1.0) {
            return digits;
        }
    }
    15
}
