//! Conversions between ledger integers and ratio floats.

use ethers_core::types::U256;

use crate::RATIO_BPS_SCALE;

/// Lossy conversion used for ratio arithmetic only.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0_f64, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Rounds to the nearest integer unit. Negative, NaN and infinite inputs map to
/// zero; values beyond `U256::MAX` saturate.
pub fn f64_to_u256(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::zero();
    }
    let rounded = value.round();
    if rounded < u128::MAX as f64 {
        return U256::from(rounded as u128);
    }
    U256::from_dec_str(&format!("{rounded:.0}")).unwrap_or(U256::MAX)
}

/// `a / b` as a float; an empty denominator yields `0.0`.
pub fn ratio_of(a: U256, b: U256) -> f64 {
    if b.is_zero() {
        return 0.0;
    }
    u256_to_f64(a) / u256_to_f64(b)
}

pub fn ratio_to_bps(ratio: f64) -> U256 {
    f64_to_u256(ratio * RATIO_BPS_SCALE as f64)
}

pub fn ratio_from_bps(bps: U256) -> f64 {
    u256_to_f64(bps) / RATIO_BPS_SCALE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_f64_crosses_limbs() {
        let value = U256::from(u64::MAX) + U256::one();
        assert_eq!(u256_to_f64(value), 18_446_744_073_709_551_616.0);
        assert_eq!(u256_to_f64(U256::from(1_500u64)), 1_500.0);
    }

    #[test]
    fn test_f64_to_u256_rounds_and_clamps() {
        assert_eq!(f64_to_u256(11.999_999_999_999_998), U256::from(12u64));
        assert_eq!(f64_to_u256(-3.0), U256::zero());
        assert_eq!(f64_to_u256(f64::NAN), U256::zero());
        assert_eq!(f64_to_u256(1e30), U256::from_dec_str("1000000000000000019884624838656").unwrap());
    }

    #[test]
    fn test_ratio_of_zero_denominator() {
        assert_eq!(ratio_of(U256::from(5u64), U256::zero()), 0.0);
        assert_eq!(ratio_of(U256::from(120u64), U256::from(100u64)), 1.2);
    }

    #[test]
    fn test_bps_conversions() {
        assert_eq!(ratio_to_bps(1.25), U256::from(12_500u64));
        assert_eq!(ratio_from_bps(U256::from(9_000u64)), 0.9);
    }
}
