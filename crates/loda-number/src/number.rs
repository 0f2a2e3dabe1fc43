use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use loda_common::{LodaError, LodaResult};
use num_bigint::BigInt;
use num_integer::Integer as _;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// The text token an absorbing infinity is printed and parsed as.
pub const INFINITY_TOKEN: &str = "inf";

/// A value is either a signed integer of arbitrary precision or the
/// absorbing element ∞ (see spec §3/§4.A).
///
/// Every arithmetic operation saturates: if either operand is `Infinity`
/// the result is `Infinity`, full stop. There is no overflow-to-infinity
/// path because `Finite` already holds arbitrary-precision integers — the
/// only sources of `Infinity` are an infinite operand, division/modulus
/// by zero, or an out-of-domain power.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Number {
    Finite(BigInt),
    Infinity,
}

impl Number {
    pub fn zero() -> Self {
        Number::Finite(BigInt::zero())
    }

    pub fn one() -> Self {
        Number::Finite(BigInt::one())
    }

    pub fn from_i64(v: i64) -> Self {
        Number::Finite(BigInt::from(v))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Number::Infinity)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Number::Finite(n) if n.is_zero())
    }

    /// Is this value syntactically known to be nonnegative? (Infinity
    /// counts as nonnegative — it is the saturating ceiling, never below
    /// zero.)
    pub fn is_nonnegative(&self) -> bool {
        match self {
            Number::Infinity => true,
            Number::Finite(n) => !n.is_negative(),
        }
    }

    /// Convert to a machine integer, failing with `OutOfRange` if this
    /// value is `Infinity` or does not fit in an `i64`.
    pub fn as_int(&self) -> LodaResult<i64> {
        match self {
            Number::Infinity => Err(LodaError::OutOfRange(
                "cannot convert infinity to a machine integer".to_string(),
            )),
            Number::Finite(n) => n.to_i64().ok_or_else(|| {
                LodaError::OutOfRange(format!("{} does not fit in a machine word", n))
            }),
        }
    }

    fn binary<F>(&self, other: &Number, f: F) -> Number
    where
        F: FnOnce(&BigInt, &BigInt) -> BigInt,
    {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => Number::Finite(f(a, b)),
            _ => Number::Infinity,
        }
    }

    pub fn neg(&self) -> Number {
        match self {
            Number::Finite(a) => Number::Finite(-a),
            Number::Infinity => Number::Infinity,
        }
    }

    pub fn add(&self, other: &Number) -> Number {
        self.binary(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Number) -> Number {
        self.binary(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Number) -> Number {
        self.binary(other, |a, b| a * b)
    }

    /// Truncating integer division; division by zero saturates to ∞.
    pub fn div(&self, other: &Number) -> Number {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => {
                if b.is_zero() {
                    Number::Infinity
                } else {
                    Number::Finite(a / b)
                }
            }
            _ => Number::Infinity,
        }
    }

    /// Truncating remainder (sign follows the dividend, matching the
    /// register machine's host-language `%`); modulus by zero saturates
    /// to ∞, symmetric with `div`.
    pub fn rem(&self, other: &Number) -> Number {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => {
                if b.is_zero() {
                    Number::Infinity
                } else {
                    Number::Finite(a % b)
                }
            }
            _ => Number::Infinity,
        }
    }

    /// Integer power. Negative exponents follow the convention that an
    /// integer base raised to a negative power truncates to zero, except
    /// for the units -1/1 (which alternate/stay fixed) and 0 (which
    /// saturates to ∞, mirroring a division by zero).
    pub fn pow(&self, other: &Number) -> Number {
        let (base, exp) = match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => (a.clone(), b.clone()),
            _ => return Number::Infinity,
        };
        if exp.is_negative() {
            if base.is_zero() {
                return Number::Infinity;
            }
            if base == BigInt::one() {
                return Number::Finite(BigInt::one());
            }
            if base == -BigInt::one() {
                let odd = exp.is_odd();
                return Number::Finite(if odd { -BigInt::one() } else { BigInt::one() });
            }
            return Number::Finite(BigInt::zero());
        }
        match exp.to_u64() {
            Some(e) => Number::Finite(pow_bigint(&base, e)),
            None => Number::Infinity, // exponent absurdly large: no finite representation is useful
        }
    }

    pub fn gcd(&self, other: &Number) -> Number {
        self.binary(other, |a, b| {
            if a.is_zero() && b.is_zero() {
                BigInt::zero()
            } else {
                a.gcd(b)
            }
        })
    }

    pub fn min(&self, other: &Number) -> Number {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => {
                Number::Finite(if a <= b { a.clone() } else { b.clone() })
            }
            _ => Number::Infinity,
        }
    }

    pub fn max(&self, other: &Number) -> Number {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => {
                Number::Finite(if a >= b { a.clone() } else { b.clone() })
            }
            _ => Number::Infinity,
        }
    }

    /// Truncated subtraction: `max(x - y, 0)`.
    pub fn trn(&self, other: &Number) -> Number {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => {
                let d = a - b;
                Number::Finite(if d.is_negative() { BigInt::zero() } else { d })
            }
            _ => Number::Infinity,
        }
    }

    /// Factorial, `t!`. Negative arguments have no finite factorial and
    /// saturate to ∞, same treatment as any other out-of-domain result.
    pub fn factorial(&self) -> Number {
        let n = match self {
            Number::Finite(n) => n.clone(),
            Number::Infinity => return Number::Infinity,
        };
        if n.is_negative() {
            return Number::Infinity;
        }
        let bound = match n.to_u64() {
            Some(v) => v,
            None => return Number::Infinity,
        };
        let mut result = BigInt::one();
        for i in 2..=bound {
            result *= BigInt::from(i);
        }
        Number::Finite(result)
    }

    /// Binomial coefficient `bin(n, k)`. Returns 0 for `k < 0` and for
    /// `k > n` when `n >= 0`. For `n < 0` follows the generalized
    /// binomial identity `C(n,k) = (-1)^k * C(k-n-1, k)`.
    pub fn binomial(&self, other: &Number) -> Number {
        let (n, k) = match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => (a.clone(), b.clone()),
            _ => return Number::Infinity,
        };
        if k.is_negative() {
            return Number::Finite(BigInt::zero());
        }
        let k_u = match k.to_u64() {
            Some(v) => v,
            None => return Number::Infinity,
        };
        if n.is_negative() {
            let translated_n = &k - &n - BigInt::one();
            let mag = binomial_nonneg(&translated_n, k_u);
            let sign_flip = k_u % 2 == 1;
            return Number::Finite(if sign_flip { -mag } else { mag });
        }
        if BigInt::from(k_u) > n {
            return Number::Finite(BigInt::zero());
        }
        Number::Finite(binomial_nonneg(&n, k_u))
    }

    /// A strict total order, failing loudly (never silently) when either
    /// side is ∞ — ordering against the absorbing element is undefined
    /// per spec §3.
    pub fn try_cmp(&self, other: &Number) -> LodaResult<Ordering> {
        match (self, other) {
            (Number::Finite(a), Number::Finite(b)) => Ok(a.cmp(b)),
            _ => Err(LodaError::Internal(
                "ordering comparison with infinity is undefined".to_string(),
            )),
        }
    }
}

fn pow_bigint(base: &BigInt, exp: u64) -> BigInt {
    let mut result = BigInt::one();
    let mut b = base.clone();
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result *= &b;
        }
        b = &b * &b;
        e >>= 1;
    }
    result
}

/// Binomial coefficient for `n >= 0`, `k >= 0` (may have `k > n`, yielding 0).
fn binomial_nonneg(n: &BigInt, k: u64) -> BigInt {
    if BigInt::from(k) > *n {
        return BigInt::zero();
    }
    let mut result = BigInt::one();
    for i in 0..k {
        result *= n - BigInt::from(i);
        result /= BigInt::from(i + 1);
    }
    result
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Infinity, Number::Infinity) => true,
            (Number::Finite(a), Number::Finite(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Number {}

impl Default for Number {
    fn default() -> Self {
        Number::zero()
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Infinity => write!(f, "{}", INFINITY_TOKEN),
            Number::Finite(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Number {
    type Err = LodaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(INFINITY_TOKEN) {
            return Ok(Number::Infinity);
        }
        BigInt::from_str(trimmed)
            .map(Number::Finite)
            .map_err(|e| LodaError::OutOfRange(format!("invalid number literal '{}': {}", s, e)))
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::from_i64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation() {
        assert_eq!(Number::Infinity.add(&Number::from_i64(3)), Number::Infinity);
        assert_eq!(Number::from_i64(3).add(&Number::Infinity), Number::Infinity);
    }

    #[test]
    fn test_div_by_zero_saturates() {
        assert_eq!(Number::from_i64(5).div(&Number::zero()), Number::Infinity);
    }

    #[test]
    fn test_gcd_zero_zero() {
        assert_eq!(Number::zero().gcd(&Number::zero()), Number::zero());
    }

    #[test]
    fn test_trn() {
        assert_eq!(Number::from_i64(3).trn(&Number::from_i64(5)), Number::zero());
        assert_eq!(
            Number::from_i64(5).trn(&Number::from_i64(3)),
            Number::from_i64(2)
        );
    }

    #[test]
    fn test_binomial_basic() {
        assert_eq!(
            Number::from_i64(5).binomial(&Number::from_i64(2)),
            Number::from_i64(10)
        );
        assert_eq!(
            Number::from_i64(5).binomial(&Number::from_i64(6)),
            Number::zero()
        );
        assert_eq!(
            Number::from_i64(5).binomial(&Number::from_i64(-1)),
            Number::zero()
        );
    }

    #[test]
    fn test_binomial_negative_n() {
        // C(-1, k) = (-1)^k
        assert_eq!(
            Number::from_i64(-1).binomial(&Number::from_i64(0)),
            Number::one()
        );
        assert_eq!(
            Number::from_i64(-1).binomial(&Number::from_i64(1)),
            Number::from_i64(-1)
        );
        assert_eq!(
            Number::from_i64(-1).binomial(&Number::from_i64(2)),
            Number::one()
        );
    }

    #[test]
    fn test_try_cmp_fails_on_infinity() {
        assert!(Number::Infinity.try_cmp(&Number::zero()).is_err());
        assert!(Number::zero().try_cmp(&Number::Infinity).is_err());
        assert!(Number::zero().try_cmp(&Number::one()).is_ok());
    }

    #[test]
    fn test_parse_display_roundtrip() {
        let n: Number = "42".parse().unwrap();
        assert_eq!(n.to_string(), "42");
        let inf: Number = "inf".parse().unwrap();
        assert_eq!(inf, Number::Infinity);
        assert_eq!(inf.to_string(), "inf");
    }

    #[test]
    fn test_as_int_out_of_range_on_infinity() {
        assert!(Number::Infinity.as_int().is_err());
        assert_eq!(Number::from_i64(7).as_int().unwrap(), 7);
    }

    #[test]
    fn test_factorial() {
        assert_eq!(Number::from_i64(0).factorial(), Number::one());
        assert_eq!(Number::from_i64(5).factorial(), Number::from_i64(120));
        assert_eq!(Number::from_i64(-1).factorial(), Number::Infinity);
    }

    #[test]
    fn test_pow_negative_exponent() {
        assert_eq!(Number::from_i64(2).pow(&Number::from_i64(-1)), Number::zero());
        assert_eq!(Number::from_i64(1).pow(&Number::from_i64(-5)), Number::one());
        assert_eq!(
            Number::from_i64(-1).pow(&Number::from_i64(-3)),
            Number::from_i64(-1)
        );
        assert_eq!(
            Number::from_i64(0).pow(&Number::from_i64(-1)),
            Number::Infinity
        );
    }
}
