//! Tolerant equality for real numbers.
//!
//! Scripts live in a musical context, so `=` and `#` on real numbers
//! deliberately treat values within a few representable steps of each other
//! as equal. `<=` and `>=` do NOT use this tolerance, preserving their
//! transitivity.

use crate::vmfloat;

/// Maximum distance, in representable steps (ULPs), at which two reals
/// still compare equal.
const MAX_ULPS: i64 = 4;

/// Tolerant equality check for [`vmfloat`] values.
///
/// Compares the bit patterns of both operands and accepts a distance of up
/// to a few ULPs. NaN never compares equal; values of different sign only
/// compare equal if both are zero.
pub fn fequal(a: vmfloat, b: vmfloat) -> bool {
    if a == b {
        return true; // also covers +0.0 == -0.0
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    if a.is_sign_negative() != b.is_sign_negative() {
        return false;
    }
    let ai = a.to_bits() as i64;
    let bi = b.to_bits() as i64;
    (ai - bi).abs() <= MAX_ULPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_values_are_equal() {
        assert!(fequal(0.0, 0.0));
        assert!(fequal(0.0, -0.0));
        assert!(fequal(1.25, 1.25));
    }

    #[test]
    fn test_accumulated_rounding_is_tolerated() {
        assert!(fequal(0.165 + 0.185, 0.35));
        assert!(fequal(0.1 + 0.2, 0.3));
    }

    #[test]
    fn test_distinct_values_are_unequal() {
        assert!(!fequal(0.35, 0.350001));
        assert!(!fequal(1.0, -1.0));
        assert!(!fequal(vmfloat::NAN, vmfloat::NAN));
        assert!(!fequal(vmfloat::INFINITY, 1.0));
    }
}
