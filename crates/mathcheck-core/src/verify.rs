//! Tolerance verifier
//!
//! Decides whether one device result is acceptable for one element. The
//! cascade is: bit-exact match, finite-math-only skips, the error bound, and
//! then (flush-to-zero or relaxed only) the subnormal-result rule and the
//! retries that recompute the reference with subnormal inputs flushed to
//! signed zeros.

use crate::float::FloatFormat;
use crate::ulp::{abs_error, is_result_subnormal, is_result_subnormal_abs, ulp_error};

/// Inputs above this magnitude are outside the range-limited `half_*` domain.
const RANGE_LIMITED_DOMAIN: f64 = 65536.0;

/// Error metric applied to one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Error in ulps of the reference.
    Ulp,
    /// Absolute error `|test - reference|`.
    Absolute,
    /// Measured in ulps for reporting, never fails.
    Unchecked,
}

/// Acceptance rule for one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Maximum accepted error, in the unit of `metric`.
    pub bound: f32,
    pub metric: Metric,
    /// Flush-to-zero retries enabled.
    pub ftz: bool,
    /// Relaxed math: retries enabled, subnormal results judged by absolute error.
    pub relaxed: bool,
    /// Non-finite inputs or references are not checked.
    pub finite_only: bool,
    /// References that overflow the tested format are not checked.
    pub skip_overflow: bool,
    /// `nextafter` may return the smallest normal when `x` is zero or subnormal.
    pub nextafter: bool,
    /// Results for inputs beyond 2^16 only need to stay within this magnitude.
    pub range_limit: Option<f32>,
}

impl Tolerance {
    /// Plain ulp bound with every fallback disabled.
    pub const fn ulps(bound: f32) -> Self {
        Self {
            bound,
            metric: Metric::Ulp,
            ftz: false,
            relaxed: false,
            finite_only: false,
            skip_overflow: false,
            nextafter: false,
            range_limit: None,
        }
    }

    /// Absolute-error bound.
    pub const fn absolute(bound: f32) -> Self {
        Self {
            metric: Metric::Absolute,
            ..Self::ulps(bound)
        }
    }

    /// A tolerance that measures but never rejects.
    pub const fn unchecked() -> Self {
        Self {
            metric: Metric::Unchecked,
            ..Self::ulps(f32::INFINITY)
        }
    }

    pub const fn with_ftz(mut self, ftz: bool) -> Self {
        self.ftz = ftz;
        self
    }

    pub const fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    pub const fn with_finite_only(mut self, finite_only: bool) -> Self {
        self.finite_only = finite_only;
        self
    }

    pub const fn with_skip_overflow(mut self, skip_overflow: bool) -> Self {
        self.skip_overflow = skip_overflow;
        self
    }

    pub const fn with_nextafter(mut self, nextafter: bool) -> Self {
        self.nextafter = nextafter;
        self
    }

    pub const fn with_range_limit(mut self, limit: Option<f32>) -> Self {
        self.range_limit = limit;
        self
    }

    /// Error of `test` against `reference` under this metric.
    pub fn measure<T: FloatFormat>(&self, test: T, reference: f64) -> f32 {
        match self.metric {
            Metric::Ulp | Metric::Unchecked => ulp_error(test, reference),
            Metric::Absolute => abs_error(test, reference),
        }
    }

    /// Whether `error` is within the bound. NaN errors are rejected.
    pub fn accepts(&self, error: f32) -> bool {
        match self.metric {
            Metric::Unchecked => true,
            Metric::Ulp | Metric::Absolute => error.abs() <= self.bound,
        }
    }

    fn result_subnormal<T: FloatFormat>(&self, reference: f64) -> bool {
        if self.relaxed {
            is_result_subnormal_abs::<T>(reference, self.bound)
        } else {
            is_result_subnormal::<T>(reference, self.bound)
        }
    }
}

/// Verdict for one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Signed error reported for this element (smallest across retries).
    pub error: f32,
    pub passed: bool,
}

impl Outcome {
    pub const fn pass(error: f32) -> Self {
        Self { error, passed: true }
    }

    pub const fn fail(error: f32) -> Self {
        Self { error, passed: false }
    }
}

/// Rule for integer side results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntRule {
    /// Values must be equal.
    Exact,
    /// Any value is accepted.
    Unchecked,
    /// `frexp` exponent; unspecified for non-finite `x`.
    Frexp,
    /// `remquo` quotient: sign and the low seven bits of the magnitude;
    /// unspecified for infinite `x`, zero `y` or NaN operands.
    Remquo,
    /// `ilogb`: either encoding of `FP_ILOGB0` and `FP_ILOGBNAN` is accepted.
    Ilogb,
}

impl IntRule {
    /// Whether the integer result is unspecified for these arguments.
    pub fn masks(self, args: &[f64]) -> bool {
        match self {
            IntRule::Exact | IntRule::Ilogb => false,
            IntRule::Unchecked => true,
            IntRule::Frexp => args.first().is_some_and(|x| !x.is_finite()),
            IntRule::Remquo => match args {
                [x, y, ..] => x.is_infinite() || *y == 0.0 || x.is_nan() || y.is_nan(),
                _ => false,
            },
        }
    }

    /// Whether `test` is an acceptable device value when the host produced
    /// `expected` for `args`.
    pub fn matches(self, expected: i32, test: i32, args: &[f64]) -> bool {
        if self.masks(args) {
            return true;
        }
        match self {
            IntRule::Remquo => {
                let low = |q: i32| q.unsigned_abs() & 0x7f;
                low(expected) == low(test) && (low(expected) == 0 || (expected < 0) == (test < 0))
            }
            IntRule::Ilogb => match args.first() {
                Some(x) if *x == 0.0 => test == i32::MIN || test == -i32::MAX,
                Some(x) if x.is_nan() => test == i32::MIN || test == i32::MAX,
                _ => test == expected,
            },
            _ => test == expected,
        }
    }
}

/// Verify a floating result against `reference`.
///
/// `oracle` recomputes the reference for substituted arguments during the
/// flush-to-zero retries.
///
/// # Example
///
/// ```rust
/// use mathcheck_core::{lookup, reference, verify, Precision, ToleranceMode};
///
/// let exp = lookup("exp").unwrap();
/// let tolerance = exp.tolerance(Precision::Float, &ToleranceMode::default(), 0.5);
/// let expected = reference::exp(0.5);
///
/// // two ulps above the correctly rounded value, inside the 3 ulp bound
/// let device = f32::from_bits((expected as f32).to_bits() + 2);
/// let outcome = verify(device, &[0.5f32], expected, &tolerance, |a| reference::exp(a[0]));
/// assert!(outcome.passed);
/// assert!(outcome.error > 1.0 && outcome.error <= 3.0);
///
/// let device = f32::from_bits((expected as f32).to_bits() + 5);
/// assert!(!verify(device, &[0.5f32], expected, &tolerance, |a| reference::exp(a[0])).passed);
/// ```
pub fn verify<T, F>(test: T, inputs: &[T], reference: f64, tolerance: &Tolerance, oracle: F) -> Outcome
where
    T: FloatFormat,
    F: Fn(&[f64]) -> f64,
{
    cascade(test, inputs, reference, true, tolerance, |args| (oracle(args), true))
}

/// Verify a floating result together with an integer side result.
///
/// The side result is checked with `rule`; retries accept only when both parts
/// of the substituted reference match.
pub fn verify_with_int<T, F>(
    test: (T, i32),
    inputs: &[T],
    reference: (f64, i32),
    tolerance: &Tolerance,
    rule: IntRule,
    oracle: F,
) -> Outcome
where
    T: FloatFormat,
    F: Fn(&[f64]) -> (f64, i32),
{
    let args: Vec<f64> = inputs.iter().map(|x| x.to_f64()).collect();
    let (test_value, test_int) = test;
    let side_ok = rule.matches(reference.1, test_int, &args);
    cascade(test_value, inputs, reference.0, side_ok, tolerance, |substituted| {
        let (value, int) = oracle(substituted);
        (value, rule.matches(int, test_int, substituted))
    })
}

/// Verify an integer-valued builtin (`ilogb`).
///
/// Under flush-to-zero a subnormal input may be treated as either signed zero.
pub fn verify_int<T, F>(test: i32, input: T, expected: i32, rule: IntRule, ftz: bool, oracle: F) -> bool
where
    T: FloatFormat,
    F: Fn(f64) -> i32,
{
    let x = input.to_f64();
    if rule.matches(expected, test, &[x]) {
        return true;
    }
    ftz && input.is_subnormal() && [0.0, -0.0].into_iter().any(|zero| rule.matches(oracle(zero), test, &[zero]))
}

/// Integer a relational builtin returns for `value`: scalar true is 1,
/// vector true is -1.
pub const fn macro_result(value: bool, vector: bool) -> i64 {
    match (value, vector) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => -1,
    }
}

/// Verify a relational result. With `ftz`, every flush of the subnormal
/// inputs to signed zeros is also accepted.
pub fn verify_macro<T, F>(test: i64, inputs: &[T], expected: bool, vector: bool, ftz: bool, oracle: F) -> bool
where
    T: FloatFormat,
    F: Fn(&[f64]) -> bool,
{
    if test == macro_result(expected, vector) {
        return true;
    }
    if !ftz {
        return false;
    }
    let args: Vec<f64> = inputs.iter().map(|x| x.to_f64()).collect();
    let accepted = flushed_variants(inputs, &args).any(|substituted| test == macro_result(oracle(&substituted), vector));
    accepted
}

fn cascade<T, F>(test: T, inputs: &[T], reference: f64, side_ok: bool, tolerance: &Tolerance, retry: F) -> Outcome
where
    T: FloatFormat,
    F: Fn(&[f64]) -> (f64, bool),
{
    if side_ok && T::from_f64(reference).to_bits() == test.to_bits() {
        return Outcome::pass(0.0);
    }

    let args: Vec<f64> = inputs.iter().map(|x| x.to_f64()).collect();

    if tolerance.finite_only {
        let overflows = tolerance.skip_overflow && reference.is_finite() && T::from_f64(reference).is_infinite();
        if overflows || !reference.is_finite() || args.iter().any(|x| !x.is_finite()) {
            return Outcome::pass(0.0);
        }
    }

    if let (Some(limit), Some(&x)) = (tolerance.range_limit, args.first()) {
        if x.is_finite() && x.abs() > RANGE_LIMITED_DOMAIN && test.to_f64().abs() <= f64::from(limit) {
            return Outcome::pass(0.0);
        }
    }

    let error = tolerance.measure(test, reference);
    if side_ok && tolerance.ftz && test.is_zero() && tolerance.result_subnormal::<T>(reference) {
        return Outcome::pass(0.0);
    }
    if side_ok && tolerance.accepts(error) {
        return Outcome::pass(error);
    }
    if !(tolerance.ftz || tolerance.relaxed) {
        return Outcome::fail(error);
    }

    if side_ok && test.is_zero() && tolerance.result_subnormal::<T>(reference) {
        return Outcome::pass(0.0);
    }

    if tolerance.nextafter {
        if let (Some(x), Some(&y)) = (inputs.first(), args.get(1)) {
            if (x.is_subnormal() || x.is_zero()) && test.to_f64() == T::MIN_NORMAL.copysign(y) {
                return Outcome::pass(0.0);
            }
        }
    }

    let mut best = error;
    for substituted in flushed_variants(inputs, &args) {
        let (candidate, candidate_side_ok) = retry(&substituted);
        if tolerance.finite_only && !candidate.is_finite() {
            return Outcome::pass(0.0);
        }
        let candidate_error = tolerance.measure(test, candidate);
        if best.is_nan() || candidate_error.abs() < best.abs() {
            best = candidate_error;
        }
        if !candidate_side_ok {
            continue;
        }
        if tolerance.accepts(candidate_error) {
            return Outcome::pass(best);
        }
        if test.is_zero() && tolerance.result_subnormal::<T>(candidate) {
            return Outcome::pass(0.0);
        }
    }
    Outcome::fail(best)
}

/// Every argument vector obtained by replacing a non-empty subset of the
/// subnormal inputs with zeros, in every sign assignment.
fn flushed_variants<'a, T: FloatFormat>(inputs: &[T], args: &'a [f64]) -> impl Iterator<Item = Vec<f64>> + 'a {
    let slots: Vec<usize> = inputs
        .iter()
        .enumerate()
        .filter(|(_, x)| x.is_subnormal())
        .map(|(slot, _)| slot)
        .collect();
    let subsets = if slots.is_empty() { 0u32 } else { (1u32 << slots.len()) - 1 };

    (1..=subsets).flat_map(move |subset| {
        let chosen: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(bit, _)| subset & (1 << bit) != 0)
            .map(|(_, &slot)| slot)
            .collect();
        (0..(1u32 << chosen.len())).map(move |signs| {
            let mut substituted = args.to_vec();
            for (bit, &slot) in chosen.iter().enumerate() {
                substituted[slot] = if signs & (1 << bit) != 0 { -0.0 } else { 0.0 };
            }
            substituted
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference;

    const TINY: f32 = 1.0e-45; // 2^-149

    #[test]
    fn exact_match_passes_with_zero_error() {
        let outcome = verify(1.0f32, &[0.0f32], 1.0, &Tolerance::ulps(0.0), |_| 1.0);
        assert_eq!(outcome, Outcome::pass(0.0));
    }

    #[test]
    fn error_beyond_bound_fails_with_distance() {
        let test = f32::from_bits(1.5f32.to_bits() + 3);
        let outcome = verify(test, &[1.5f32], 1.5, &Tolerance::ulps(2.0), |_| 1.5);
        assert_eq!(outcome, Outcome::fail(3.0));

        let outcome = verify(test, &[1.5f32], 1.5, &Tolerance::ulps(3.0), |_| 1.5);
        assert_eq!(outcome, Outcome::pass(3.0));
    }

    #[test]
    fn flushed_subnormal_result_is_accepted() {
        let subnormal = f64::from(f32::from_bits(8));
        let tolerance = Tolerance::ulps(2.0).with_ftz(true);
        let outcome = verify(0.0f32, &[1.0f32], subnormal, &tolerance, |_| subnormal);
        assert_eq!(outcome, Outcome::pass(0.0));

        // not without flush-to-zero
        let outcome = verify(0.0f32, &[1.0f32], subnormal, &Tolerance::ulps(2.0), |_| subnormal);
        assert_eq!(outcome, Outcome::fail(-8.0));
    }

    #[test]
    fn subnormal_input_retry_uses_flushed_reference() {
        let tolerance = Tolerance::ulps(0.0).with_ftz(true);
        let y = f32::from_bits(0x7180_0000); // 2^100
        let oracle = |args: &[f64]| reference::multiply(args[0], args[1]);
        let flushed = oracle(&[0.0, f64::from(y)]) as f32;
        let reference_value = oracle(&[f64::from(TINY), f64::from(y)]);

        let outcome = verify(flushed, &[TINY, y], reference_value, &tolerance, oracle);
        assert!(outcome.passed);
    }

    #[test]
    fn both_signs_of_zero_are_tried() {
        let tolerance = Tolerance::ulps(0.0).with_ftz(true);
        let oracle = |args: &[f64]| reference::copysign(1.0, args[0]);
        // device flushed +tiny to -0
        let outcome = verify(-1.0f32, &[TINY], 1.0, &tolerance, oracle);
        assert!(outcome.passed);
    }

    #[test]
    fn every_subset_of_two_subnormal_inputs_is_tried() {
        let tolerance = Tolerance::ulps(1.0).with_ftz(true);
        let oracle = |args: &[f64]| reference::atan2(args[0], args[1]);
        let x = -TINY;
        let y = -TINY;
        // flushing only x gives atan2(-0, -tiny) = -pi
        let expected = oracle(&[-0.0, f64::from(y)]) as f32;
        let outcome = verify(expected, &[x, y], oracle(&[f64::from(x), f64::from(y)]), &tolerance, oracle);
        assert!(outcome.passed);
    }

    #[test]
    fn failing_retries_report_smallest_error() {
        let tolerance = Tolerance::ulps(0.0).with_ftz(true);
        let oracle = |args: &[f64]| reference::add(args[0], args[1]);
        let test = f32::from_bits(3.0f32.to_bits() + 2);
        let outcome = verify(test, &[TINY, 3.0f32], oracle(&[f64::from(TINY), 3.0]), &tolerance, oracle);
        assert!(!outcome.passed);
        assert_eq!(outcome.error, 2.0);
    }

    #[test]
    fn verification_is_idempotent() {
        let tolerance = Tolerance::ulps(1.0).with_ftz(true);
        let oracle = |args: &[f64]| reference::multiply(args[0], args[1]);
        let inputs = [TINY, 0.5f32];
        let reference_value = oracle(&[f64::from(TINY), 0.5]);
        let first = verify(0.0f32, &inputs, reference_value, &tolerance, oracle);
        let second = verify(0.0f32, &inputs, reference_value, &tolerance, oracle);
        assert_eq!(first, second);
    }

    #[test]
    fn finite_only_skips_non_finite_cases() {
        let tolerance = Tolerance::ulps(0.0).with_finite_only(true);
        assert!(verify(5.0f32, &[f32::INFINITY], f64::INFINITY, &tolerance, |_| f64::INFINITY).passed);
        assert!(verify(5.0f32, &[1.0f32], f64::NAN, &tolerance, |_| f64::NAN).passed);
        assert!(!verify(5.0f32, &[1.0f32], 4.0, &tolerance, |_| 4.0).passed);

        let overflowing = f64::from(f32::MAX) * 2.0;
        let skip = tolerance.with_skip_overflow(true);
        assert!(verify(1.0f32, &[1.0f32], overflowing, &skip, |_| overflowing).passed);
    }

    #[test]
    fn nan_results_pass_in_any_encoding() {
        let outcome = verify(-f32::NAN, &[f32::NAN], f64::NAN, &Tolerance::ulps(0.0), |_| f64::NAN);
        assert!(outcome.passed);
        assert!(!verify(1.0f32, &[0.0f32], f64::NAN, &Tolerance::ulps(4.0), |_| f64::NAN).passed);
    }

    #[test]
    fn absolute_metric_and_unchecked() {
        let tolerance = Tolerance::absolute(0.001);
        assert!(verify(0.5f32, &[0.0f32], 0.5005, &tolerance, |_| 0.5005).passed);
        assert!(!verify(0.5f32, &[0.0f32], 0.502, &tolerance, |_| 0.502).passed);
        assert!(verify(100.0f32, &[0.0f32], 1.0, &Tolerance::unchecked(), |_| 1.0).passed);
    }

    #[test]
    fn nextafter_accepts_smallest_normal() {
        let tolerance = Tolerance::ulps(0.0).with_ftz(true).with_nextafter(true);
        let test = -f32::MIN_POSITIVE;
        let oracle = |args: &[f64]| reference::nextafter::<f32>(args[0], args[1]);
        let outcome = verify(test, &[TINY, -1.0f32], oracle(&[f64::from(TINY), -1.0]), &tolerance, oracle);
        assert!(outcome.passed);
    }

    #[test]
    fn range_limited_results_outside_domain() {
        let tolerance = Tolerance::ulps(8192.0).with_range_limit(Some(1.0));
        assert!(verify(0.25f32, &[1.0e6f32], 0.75, &tolerance, |_| 0.75).passed);
        assert!(!verify(2.0f32, &[1.0e6f32], 0.75, &tolerance, |_| 0.75).passed);
    }

    #[test]
    fn remquo_compares_low_quotient_bits() {
        let args = [5.0, 3.0];
        assert!(IntRule::Remquo.matches(2, 2 + 128, &args));
        assert!(!IntRule::Remquo.matches(2, 3, &args));
        assert!(!IntRule::Remquo.matches(2, -2, &args));
        assert!(IntRule::Remquo.matches(-5, -133, &args));
        assert!(IntRule::Remquo.matches(2, 99, &[f64::INFINITY, 3.0]));
        assert!(IntRule::Remquo.matches(2, 99, &[1.0, 0.0]));
        assert!(IntRule::Remquo.matches(2, 99, &[1.0, f64::NAN]));
    }

    #[test]
    fn side_result_must_match_too() {
        let tolerance = Tolerance::ulps(0.0);
        let oracle = |args: &[f64]| reference::frexp(args[0]);
        let expected = oracle(&[12.0]);
        let good = verify_with_int((0.75f32, 4), &[12.0f32], expected, &tolerance, IntRule::Frexp, oracle);
        assert!(good.passed);
        let bad = verify_with_int((0.75f32, 3), &[12.0f32], expected, &tolerance, IntRule::Frexp, oracle);
        assert!(!bad.passed);
        let masked = verify_with_int(
            (f32::INFINITY, 77),
            &[f32::INFINITY],
            oracle(&[f64::INFINITY]),
            &tolerance,
            IntRule::Frexp,
            oracle,
        );
        assert!(masked.passed);
    }

    #[test]
    fn ilogb_accepts_both_encodings() {
        assert!(verify_int(i32::MIN, 0.0f32, reference::ilogb(0.0), IntRule::Ilogb, false, reference::ilogb));
        assert!(verify_int(-i32::MAX, 0.0f32, reference::ilogb(0.0), IntRule::Ilogb, false, reference::ilogb));
        assert!(verify_int(i32::MAX, f32::NAN, reference::ilogb(f64::NAN), IntRule::Ilogb, false, reference::ilogb));
        assert!(!verify_int(-i32::MAX, f32::NAN, reference::ilogb(f64::NAN), IntRule::Ilogb, false, reference::ilogb));

        let expected = reference::ilogb(f64::from(TINY));
        assert!(!verify_int(i32::MIN, TINY, expected, IntRule::Ilogb, false, reference::ilogb));
        assert!(verify_int(i32::MIN, TINY, expected, IntRule::Ilogb, true, reference::ilogb));
    }

    #[test]
    fn macros_use_vector_truth_values() {
        assert_eq!(macro_result(true, false), 1);
        assert_eq!(macro_result(true, true), -1);
        assert_eq!(macro_result(false, true), 0);

        assert!(verify_macro(-1, &[1.0f32, 1.0], true, true, false, |a| reference::isequal(a[0], a[1])));
        assert!(!verify_macro(1, &[1.0f32, 1.0], true, true, false, |a| reference::isequal(a[0], a[1])));
        // tiny == -tiny only once both are flushed
        let oracle = |a: &[f64]| reference::isequal(a[0], a[1]);
        assert!(verify_macro(1, &[TINY, -TINY], false, false, true, oracle));
        assert!(!verify_macro(1, &[TINY, -TINY], false, false, false, oracle));
    }
}
