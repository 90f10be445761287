//! Exact native-coin amount arithmetic.
//!
//! Chains report amounts as integers in their smallest unit (wei, lamports,
//! MIST, octas). Summing many of those after converting to a float drifts;
//! everything here stays in [`BigDecimal`] so the cumulative totals written
//! to storage are exact to the last digit.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use thiserror::Error;

/// An amount string that is not a valid integer or decimal number.
#[derive(Debug, Error)]
#[error("invalid amount {text:?}")]
pub struct UnitsError {
    /// The offending input.
    pub text: String,
}

/// Parse integer base-unit digits (optionally signed) as `digits × 10^-scale`.
///
/// # Errors
///
/// Returns [`UnitsError`] when `digits` is not a plain integer.
pub fn from_base_units(digits: &str, scale: i64) -> Result<BigDecimal, UnitsError> {
    let value = BigInt::from_str(digits).map_err(|_| UnitsError {
        text: digits.to_owned(),
    })?;
    Ok(BigDecimal::new(value, scale))
}

/// Convert a native integer amount to `value × 10^-scale`, exactly.
#[must_use]
pub fn scaled(value: impl Into<BigInt>, scale: i64) -> BigDecimal {
    BigDecimal::new(value.into(), scale)
}

/// Re-parse a stored decimal string (the aggregation path).
///
/// # Errors
///
/// Returns [`UnitsError`] when `text` is not a decimal number.
pub fn parse_decimal(text: &str) -> Result<BigDecimal, UnitsError> {
    BigDecimal::from_str(text).map_err(|_| UnitsError {
        text: text.to_owned(),
    })
}

/// Render an amount as a plain decimal string without trailing zeros.
///
/// Always plain notation, never exponent form, whatever the magnitude.
#[must_use]
pub fn to_plain_string(amount: &BigDecimal) -> String {
    let (int, exponent) = amount.normalized().into_bigint_and_exponent();
    let negative = int.sign() == Sign::Minus;
    let digits = int.magnitude().to_string();

    let mut rendered = if exponent <= 0 {
        // An integer, possibly with trailing zeros restored.
        let zeros = usize::try_from(-exponent).unwrap_or(0);
        format!("{digits}{}", "0".repeat(zeros))
    } else {
        let point = usize::try_from(exponent).unwrap_or(0);
        if digits.len() > point {
            let split = digits.len() - point;
            format!("{}.{}", &digits[..split], &digits[split..])
        } else {
            format!("0.{}{digits}", "0".repeat(point - digits.len()))
        }
    };

    if negative && rendered != "0" {
        rendered.insert(0, '-');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use bigdecimal::Zero;

    use super::*;

    #[test]
    fn one_wei_scales_exactly() {
        let amount = from_base_units("1", 18).unwrap();
        assert_eq!(to_plain_string(&amount), "0.000000000000000001");
    }

    #[test]
    fn summing_ten_thousand_wei_has_no_drift() {
        let mut total = BigDecimal::zero();
        let wei = from_base_units("1", 18).unwrap();
        for _ in 0..10_000 {
            total += wei.clone();
        }
        assert_eq!(
            to_plain_string(&total),
            "0.00000000000001",
            "10000 × 1e-18 must be exact, not a float approximation"
        );
    }

    #[test]
    fn negative_amounts_keep_their_sign() {
        let amount = from_base_units("-500", 9).unwrap();
        assert_eq!(to_plain_string(&amount), "-0.0000005");
    }

    #[test]
    fn scaled_matches_string_parse() {
        assert_eq!(scaled(121_615_809_895_338_528_u128, 18), from_base_units("121615809895338528", 18).unwrap());
    }

    #[test]
    fn zero_renders_bare() {
        assert_eq!(to_plain_string(&BigDecimal::zero()), "0");
        assert_eq!(to_plain_string(&from_base_units("0", 18).unwrap()), "0");
    }

    #[test]
    fn round_integers_render_plain() {
        assert_eq!(
            to_plain_string(&from_base_units("100000000000000000000", 18).unwrap()),
            "100",
            "trailing-zero normalization must not fall into exponent notation"
        );
        assert_eq!(to_plain_string(&scaled(2_000_000_000_u64, 9)), "2");
    }

    #[test]
    fn stored_strings_parse_back() {
        let stored = "118.589464196681790992";
        let amount = parse_decimal(stored).unwrap();
        assert_eq!(to_plain_string(&amount), stored);
        assert!(parse_decimal("not-a-number").is_err());
    }

    #[test]
    fn rejects_non_integer_base_units() {
        assert!(from_base_units("1.5", 18).is_err());
        assert!(from_base_units("0x10", 18).is_err());
    }
}
