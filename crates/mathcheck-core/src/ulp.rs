//! ULP distance and subnormal-result classification
//!
//! The error metric measures `test - reference` in units of the last place of
//! the *reference* value, as an `f32`. Below powers of two the unit is taken
//! from the binade underneath; below the smallest normal it clamps to the
//! subnormal spacing.

use crate::float::FloatFormat;

const F64_MANT_MASK: u64 = 0x000f_ffff_ffff_ffff;

/// `ilogb` with saturation at zero so callers can subtract safely.
fn exponent_of(value: f64) -> i32 {
    if value == 0.0 {
        i32::MIN
    } else {
        libm::ilogb(value)
    }
}

/// Signed error of `test` against `reference` in ULPs of `T`.
///
/// * an infinite reference yields `0` on an exact match and `±inf` otherwise
/// * a NaN reference accepts any NaN (`0`); a non-NaN result yields NaN
/// * an infinite `test` against a finite reference is measured as if it were
///   [`FloatFormat::OVERFLOW_STAND_IN`], when the format defines one
/// * `double` errors are inflated by half an ulp, since the `f64` reference can
///   itself be off by that much
pub fn ulp_error<T: FloatFormat>(test: T, reference: f64) -> f32 {
    let mut test_value = test.to_f64();

    if reference.is_infinite() {
        if test_value == reference {
            return 0.0;
        }
        return (test_value - reference) as f32;
    }

    if test_value.is_infinite() {
        if let Some(stand_in) = T::OVERFLOW_STAND_IN {
            test_value = stand_in.copysign(test_value);
        }
    }

    let ulp_exponent = if reference.to_bits() & F64_MANT_MASK != 0 {
        // not a power of two, or NaN
        if reference.is_nan() {
            return if test_value.is_nan() { 0.0 } else { f32::NAN };
        }
        T::MANT_DIG - 1 - exponent_of(reference).max(T::MIN_EXP - 1)
    } else {
        T::MANT_DIG - 1 - exponent_of(reference).saturating_sub(1).max(T::MIN_EXP - 1)
    };

    let error = libm::scalbn(test_value - reference, ulp_exponent) as f32;
    if T::OVERFLOW_STAND_IN.is_none() && error != 0.0 {
        error + 0.5f32.copysign(error)
    } else {
        error
    }
}

/// Absolute error `|test - reference|`, computed in `f64` and narrowed.
pub fn abs_error<T: FloatFormat>(test: T, reference: f64) -> f32 {
    (test.to_f64() - reference).abs() as f32
}

/// Whether a correct result near `reference` may legally be flushed to zero.
///
/// True when `|reference|` is less than `ulps` subnormal steps above the
/// smallest normal, i.e. the allowed error band reaches the subnormal range.
pub fn is_result_subnormal<T: FloatFormat>(reference: f64, ulps: f32) -> bool {
    reference.abs() - T::MIN_SUBNORMAL * f64::from(ulps) < T::MIN_NORMAL
}

/// [`is_result_subnormal`] for absolute-error tolerances.
pub fn is_result_subnormal_abs<T: FloatFormat>(reference: f64, abs_err: f32) -> bool {
    reference.abs() - f64::from(abs_err) < T::MIN_NORMAL
}

/// Boundary at which [`is_result_subnormal`] flips from true to false.
pub fn subnormal_threshold<T: FloatFormat>(ulps: f32) -> f64 {
    T::MIN_NORMAL + T::MIN_SUBNORMAL * f64::from(ulps)
}
