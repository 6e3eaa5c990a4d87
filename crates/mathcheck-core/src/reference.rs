//! Reference oracle
//!
//! Host implementations of every builtin, evaluated in `f64`. Each builtin is
//! described by a [`Reference`] variant whose shape mirrors the kernel
//! signature, so callers dispatch by pattern match rather than through a
//! type-erased callback.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::float::FloatFormat;

/// Kernel signature shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    /// `T f(T)`
    Unary,
    /// `T f(uintN)`, the unsigned type having the width of `T`
    UnsignedUnary,
    /// `int f(T)`
    IntUnary,
    /// `T f(T, T)`
    Binary,
    /// `T f(T, int)`
    BinaryInt,
    /// `T f(T, T, T)`
    Ternary,
    /// `T f(T, T *)`
    UnaryTwoResults,
    /// `T f(T, int *)`
    UnaryIntResult,
    /// `T f(T, T, int *)`
    BinaryIntResult,
    /// `intN f(T)` relational
    MacroUnary,
    /// `intN f(T, T)` relational
    MacroBinary,
}

impl Signature {
    /// Number of floating-point arguments.
    pub const fn float_arity(self) -> usize {
        match self {
            Signature::UnsignedUnary => 0,
            Signature::Unary
            | Signature::IntUnary
            | Signature::BinaryInt
            | Signature::UnaryTwoResults
            | Signature::UnaryIntResult
            | Signature::MacroUnary => 1,
            Signature::Binary | Signature::BinaryIntResult | Signature::MacroBinary => 2,
            Signature::Ternary => 3,
        }
    }

    /// Whether the signature takes a trailing `int` argument.
    pub const fn has_int_argument(self) -> bool {
        matches!(self, Signature::BinaryInt)
    }

    /// Whether the kernel writes a second output buffer.
    pub const fn has_second_output(self) -> bool {
        matches!(
            self,
            Signature::UnaryTwoResults | Signature::UnaryIntResult | Signature::BinaryIntResult
        )
    }

    /// Whether the primary result is an integer rather than `T`.
    pub const fn returns_integer(self) -> bool {
        matches!(self, Signature::IntUnary | Signature::MacroUnary | Signature::MacroBinary)
    }

    /// Sweep domain in bits for a type of `type_bits` bits.
    ///
    /// Single-argument 16-bit sweeps cover all 2^16 patterns; everything else
    /// is a 2^32 domain (64-bit types map their sweep into it).
    pub const fn domain_bits(self, type_bits: u32) -> u32 {
        if type_bits == 16 && self.float_arity() <= 1 && !self.has_int_argument() {
            16
        } else {
            32
        }
    }
}

/// Host implementation of a builtin.
#[derive(Debug, Clone, Copy)]
pub enum Reference {
    Unary(fn(f64) -> f64),
    UnsignedUnary(fn(u64) -> f64),
    IntUnary(fn(f64) -> i32),
    Binary(fn(f64, f64) -> f64),
    BinaryInt(fn(f64, i32) -> f64),
    Ternary(fn(f64, f64, f64) -> f64),
    UnaryTwoResults(fn(f64) -> (f64, f64)),
    UnaryIntResult(fn(f64) -> (f64, i32)),
    BinaryIntResult(fn(f64, f64) -> (f64, i32)),
    MacroUnary(fn(f64) -> bool),
    MacroBinary(fn(f64, f64) -> bool),
}

impl Reference {
    /// Kernel signature this reference implements.
    pub const fn signature(&self) -> Signature {
        match self {
            Reference::Unary(_) => Signature::Unary,
            Reference::UnsignedUnary(_) => Signature::UnsignedUnary,
            Reference::IntUnary(_) => Signature::IntUnary,
            Reference::Binary(_) => Signature::Binary,
            Reference::BinaryInt(_) => Signature::BinaryInt,
            Reference::Ternary(_) => Signature::Ternary,
            Reference::UnaryTwoResults(_) => Signature::UnaryTwoResults,
            Reference::UnaryIntResult(_) => Signature::UnaryIntResult,
            Reference::BinaryIntResult(_) => Signature::BinaryIntResult,
            Reference::MacroUnary(_) => Signature::MacroUnary,
            Reference::MacroBinary(_) => Signature::MacroBinary,
        }
    }
}

// ============================================================================
// Trigonometry
// ============================================================================

pub fn sin(x: f64) -> f64 {
    libm::sin(x)
}

pub fn cos(x: f64) -> f64 {
    libm::cos(x)
}

pub fn tan(x: f64) -> f64 {
    libm::tan(x)
}

pub fn sincos(x: f64) -> (f64, f64) {
    libm::sincos(x)
}

/// `sin(pi * x)` with exact argument reduction.
pub fn sinpi(x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    let ax = x.abs();
    // every double this large is an even integer
    if ax >= 9007199254740992.0 {
        return 0.0f64.copysign(x);
    }
    // fmod is exact, so is the reflection on [0.5, 1)
    let mut r = libm::fmod(ax, 2.0);
    let mut negate = false;
    if r >= 1.0 {
        r -= 1.0;
        negate = true;
    }
    if r > 0.5 {
        r = 1.0 - r;
    }
    let magnitude = if r == 0.0 {
        0.0
    } else if r == 0.25 {
        FRAC_1_SQRT_2
    } else {
        libm::sin(PI * r)
    };
    let value = if negate { -magnitude } else { magnitude };
    if value == 0.0 {
        0.0f64.copysign(x)
    } else if x.is_sign_negative() {
        -value
    } else {
        value
    }
}

/// `cos(pi * x)` with exact argument reduction. Zeros are always `+0`.
pub fn cospi(x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    let ax = x.abs();
    if ax >= 9007199254740992.0 {
        return 1.0;
    }
    let mut r = libm::fmod(ax, 2.0);
    if r > 1.0 {
        r = 2.0 - r;
    }
    if r == 0.5 {
        return 0.0;
    }
    if r == 0.25 || r == 0.75 {
        return FRAC_1_SQRT_2.copysign(0.5 - r);
    }
    if r < 0.25 {
        libm::cos(PI * r)
    } else if r <= 0.5 {
        libm::sin(PI * (0.5 - r))
    } else if r <= 0.75 {
        -libm::sin(PI * (r - 0.5))
    } else {
        -libm::cos(PI * (1.0 - r))
    }
}

/// `tan(pi * x)`; odd multiples of one half give infinities.
pub fn tanpi(x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    let ax = x.abs();
    let odd = if ax >= 9007199254740992.0 {
        false
    } else {
        libm::fmod(ax, 2.0) >= 1.0
    };
    let r = if ax >= 9007199254740992.0 { 0.0 } else { libm::fmod(ax, 1.0) };
    let sign = if x.is_sign_negative() { -1.0 } else { 1.0 };

    if r == 0.0 {
        let negative = x.is_sign_negative() != odd;
        return if negative { -0.0 } else { 0.0 };
    }
    if r == 0.5 {
        return if odd { f64::NEG_INFINITY } else { f64::INFINITY } * sign;
    }
    let magnitude = if r < 0.5 {
        sinpi(r) / cospi(r)
    } else {
        -sinpi(1.0 - r) / cospi(1.0 - r)
    };
    magnitude * sign
}

pub fn acos(x: f64) -> f64 {
    libm::acos(x)
}

pub fn asin(x: f64) -> f64 {
    libm::asin(x)
}

pub fn atan(x: f64) -> f64 {
    libm::atan(x)
}

pub fn atan2(y: f64, x: f64) -> f64 {
    libm::atan2(y, x)
}

pub fn acospi(x: f64) -> f64 {
    libm::acos(x) / PI
}

pub fn asinpi(x: f64) -> f64 {
    libm::asin(x) / PI
}

pub fn atanpi(x: f64) -> f64 {
    libm::atan(x) / PI
}

pub fn atan2pi(y: f64, x: f64) -> f64 {
    libm::atan2(y, x) / PI
}

pub fn sinh(x: f64) -> f64 {
    libm::sinh(x)
}

pub fn cosh(x: f64) -> f64 {
    libm::cosh(x)
}

pub fn tanh(x: f64) -> f64 {
    libm::tanh(x)
}

pub fn asinh(x: f64) -> f64 {
    libm::asinh(x)
}

pub fn acosh(x: f64) -> f64 {
    libm::acosh(x)
}

pub fn atanh(x: f64) -> f64 {
    libm::atanh(x)
}

// ============================================================================
// Exponentials and logarithms
// ============================================================================

pub fn exp(x: f64) -> f64 {
    libm::exp(x)
}

pub fn exp2(x: f64) -> f64 {
    libm::exp2(x)
}

pub fn exp10(x: f64) -> f64 {
    libm::exp10(x)
}

pub fn expm1(x: f64) -> f64 {
    libm::expm1(x)
}

pub fn log(x: f64) -> f64 {
    libm::log(x)
}

pub fn log2(x: f64) -> f64 {
    libm::log2(x)
}

pub fn log10(x: f64) -> f64 {
    libm::log10(x)
}

pub fn log1p(x: f64) -> f64 {
    libm::log1p(x)
}

/// Exponent of `x` as a floating value; `-inf` at zero.
pub fn logb(x: f64) -> f64 {
    if x.is_nan() {
        x
    } else if x.is_infinite() {
        f64::INFINITY
    } else if x == 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::from(libm::ilogb(x))
    }
}

pub fn ilogb(x: f64) -> i32 {
    libm::ilogb(x)
}

pub fn frexp(x: f64) -> (f64, i32) {
    libm::frexp(x)
}

pub fn ldexp(x: f64, n: i32) -> f64 {
    libm::ldexp(x, n)
}

pub fn lgamma(x: f64) -> f64 {
    libm::lgamma(x)
}

pub fn lgamma_r(x: f64) -> (f64, i32) {
    libm::lgamma_r(x)
}

pub fn pow(x: f64, y: f64) -> f64 {
    libm::pow(x, y)
}

pub fn pown(x: f64, n: i32) -> f64 {
    libm::pow(x, f64::from(n))
}

/// `pow` restricted to non-negative bases.
pub fn powr(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return if y == 0.0 {
            f64::NAN
        } else if y < 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
    }
    if x.is_infinite() {
        return if y == 0.0 {
            f64::NAN
        } else if y < 0.0 {
            0.0
        } else {
            f64::INFINITY
        };
    }
    if x == 1.0 {
        return if y.is_infinite() { f64::NAN } else { 1.0 };
    }
    libm::pow(x, y)
}

/// `n`-th root; odd roots keep the sign of `x`.
pub fn rootn(x: f64, n: i32) -> f64 {
    if n == 0 {
        return f64::NAN;
    }
    let odd = n & 1 != 0;
    if x.is_sign_negative() && !x.is_nan() {
        if odd {
            return -libm::pow(-x, 1.0 / f64::from(n));
        }
        if x != 0.0 {
            return f64::NAN;
        }
    }
    libm::pow(x, 1.0 / f64::from(n))
}

pub fn sqrt(x: f64) -> f64 {
    libm::sqrt(x)
}

pub fn rsqrt(x: f64) -> f64 {
    1.0 / libm::sqrt(x)
}

pub fn cbrt(x: f64) -> f64 {
    libm::cbrt(x)
}

pub fn recip(x: f64) -> f64 {
    1.0 / x
}

pub fn hypot(x: f64, y: f64) -> f64 {
    libm::hypot(x, y)
}

// ============================================================================
// Rounding, classification and arithmetic
// ============================================================================

pub fn ceil(x: f64) -> f64 {
    libm::ceil(x)
}

pub fn floor(x: f64) -> f64 {
    libm::floor(x)
}

pub fn trunc(x: f64) -> f64 {
    libm::trunc(x)
}

pub fn round(x: f64) -> f64 {
    libm::round(x)
}

pub fn rint(x: f64) -> f64 {
    libm::rint(x)
}

pub fn fabs(x: f64) -> f64 {
    x.abs()
}

pub fn copysign(x: f64, y: f64) -> f64 {
    libm::copysign(x, y)
}

pub fn fdim(x: f64, y: f64) -> f64 {
    libm::fdim(x, y)
}

pub fn fmax(x: f64, y: f64) -> f64 {
    libm::fmax(x, y)
}

pub fn fmin(x: f64, y: f64) -> f64 {
    libm::fmin(x, y)
}

pub fn fmod(x: f64, y: f64) -> f64 {
    libm::fmod(x, y)
}

pub fn remainder(x: f64, y: f64) -> f64 {
    libm::remainder(x, y)
}

pub fn remquo(x: f64, y: f64) -> (f64, i32) {
    libm::remquo(x, y)
}

pub fn fma(a: f64, b: f64, c: f64) -> f64 {
    libm::fma(a, b, c)
}

pub fn mad(a: f64, b: f64, c: f64) -> f64 {
    a * b + c
}

/// Operand with the larger magnitude, `fmax` on ties.
pub fn maxmag(x: f64, y: f64) -> f64 {
    let (ax, ay) = (x.abs(), y.abs());
    if ax > ay {
        x
    } else if ay > ax {
        y
    } else {
        libm::fmax(x, y)
    }
}

/// Operand with the smaller magnitude, `fmin` on ties.
pub fn minmag(x: f64, y: f64) -> f64 {
    let (ax, ay) = (x.abs(), y.abs());
    if ax < ay {
        x
    } else if ay < ax {
        y
    } else {
        libm::fmin(x, y)
    }
}

pub fn modf(x: f64) -> (f64, f64) {
    libm::modf(x)
}

/// `fract` for format `T`: the fraction is clamped below one in `T`.
pub fn fract<T: FloatFormat>(x: f64) -> (f64, f64) {
    if x.is_nan() {
        return (x, x);
    }
    let whole = libm::floor(x);
    if x.is_infinite() {
        return (0.0f64.copysign(x), whole);
    }
    let below_one = T::from_raw_bits(T::from_f64(1.0).raw_bits() - 1).to_f64();
    ((x - whole).min(below_one), whole)
}

/// Next representable `T` after `x` in the direction of `y`.
pub fn nextafter<T: FloatFormat>(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        return f64::NAN;
    }
    if x == y {
        return y;
    }
    if x == 0.0 {
        return T::MIN_SUBNORMAL.copysign(y);
    }
    let raw = T::from_f64(x).raw_bits();
    let away_from_zero = (x < y) == (x > 0.0);
    let next = if away_from_zero { raw + 1 } else { raw - 1 };
    T::from_raw_bits(next).to_f64()
}

/// Any quiet NaN; the payload is implementation defined.
pub fn nan(_code: u64) -> f64 {
    f64::NAN
}

pub fn add(x: f64, y: f64) -> f64 {
    x + y
}

pub fn subtract(x: f64, y: f64) -> f64 {
    x - y
}

pub fn multiply(x: f64, y: f64) -> f64 {
    x * y
}

pub fn divide(x: f64, y: f64) -> f64 {
    x / y
}

pub fn assignment(x: f64) -> f64 {
    x
}

// ============================================================================
// Round-toward-zero references (single precision)
// ============================================================================

/// The exact value `value + residual` rounded toward zero to a `float`.
///
/// `residual` only has to carry the sign of the part lost when `value` was
/// rounded to `f64`. Overflow saturates at `FLT_MAX`.
pub fn float_toward_zero(value: f64, residual: f64) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }
    let nearest = value as f32;
    if nearest.is_infinite() {
        return f64::from(f32::MAX.copysign(nearest));
    }
    let wide = f64::from(nearest);
    let overshoot = wide.abs() > value.abs()
        || (wide == value && residual != 0.0 && residual.is_sign_negative() != value.is_sign_negative());
    if overshoot && nearest != 0.0 {
        f64::from(f32::from_bits(nearest.to_bits() - 1))
    } else {
        wide
    }
}

/// Sum and its rounding error, exactly.
fn two_sum(x: f64, y: f64) -> (f64, f64) {
    let sum = x + y;
    if !sum.is_finite() {
        return (sum, 0.0);
    }
    let y_part = sum - x;
    let x_part = sum - y_part;
    (sum, (x - x_part) + (y - y_part))
}

pub fn add_toward_zero(x: f64, y: f64) -> f64 {
    let (sum, error) = two_sum(x, y);
    float_toward_zero(sum, error)
}

pub fn subtract_toward_zero(x: f64, y: f64) -> f64 {
    add_toward_zero(x, -y)
}

/// Products of two `float`s are exact in `f64`.
pub fn multiply_toward_zero(x: f64, y: f64) -> f64 {
    float_toward_zero(x * y, 0.0)
}

pub fn divide_toward_zero(x: f64, y: f64) -> f64 {
    let quotient = x / y;
    if !quotient.is_finite() || quotient == 0.0 {
        return quotient;
    }
    // x - q*y is exact for a correctly rounded q
    let remainder = libm::fma(-quotient, y, x);
    float_toward_zero(quotient, remainder / y)
}

pub fn fdim_toward_zero(x: f64, y: f64) -> f64 {
    if x > y {
        subtract_toward_zero(x, y)
    } else {
        fdim(x, y)
    }
}

pub fn fract_toward_zero(x: f64) -> (f64, f64) {
    if !x.is_finite() {
        return fract::<f32>(x);
    }
    let whole = libm::floor(x);
    let (fraction, error) = two_sum(x, -whole);
    let below_one = f64::from(f32::from_bits(0x3f7f_ffff));
    (float_toward_zero(fraction, error).min(below_one), whole)
}

// ============================================================================
// Relaxed-math references (evaluated in single precision)
// ============================================================================

pub fn relaxed_sin(x: f64) -> f64 {
    f64::from(libm::sinf(x as f32))
}

pub fn relaxed_cos(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    f64::from(libm::cosf(x as f32))
}

pub fn relaxed_sincos(x: f64) -> (f64, f64) {
    (relaxed_sin(x), relaxed_cos(x))
}

pub fn relaxed_tan(x: f64) -> f64 {
    f64::from((relaxed_sin(x) as f32) / (relaxed_cos(x) as f32))
}

pub fn relaxed_log(x: f64) -> f64 {
    f64::from(libm::log(f64::from(x as f32)) as f32)
}

pub fn relaxed_pow(x: f64, y: f64) -> f64 {
    let log2x = libm::log2(f64::from(x as f32)) as f32;
    f64::from(libm::exp2(f64::from((y as f32) * log2x)) as f32)
}

pub fn relaxed_divide(x: f64, y: f64) -> f64 {
    f64::from((x as f32) / (y as f32))
}

pub fn relaxed_mad(a: f64, b: f64, c: f64) -> f64 {
    f64::from((a as f32) * (b as f32) + (c as f32))
}

// ============================================================================
// Relational macros
// ============================================================================

pub fn isequal(x: f64, y: f64) -> bool {
    x == y
}

pub fn isnotequal(x: f64, y: f64) -> bool {
    x != y
}

pub fn isgreater(x: f64, y: f64) -> bool {
    x > y
}

pub fn isgreaterequal(x: f64, y: f64) -> bool {
    x >= y
}

pub fn isless(x: f64, y: f64) -> bool {
    x < y
}

pub fn islessequal(x: f64, y: f64) -> bool {
    x <= y
}

pub fn islessgreater(x: f64, y: f64) -> bool {
    x < y || x > y
}

pub fn isordered(x: f64, y: f64) -> bool {
    !x.is_nan() && !y.is_nan()
}

pub fn isunordered(x: f64, y: f64) -> bool {
    x.is_nan() || y.is_nan()
}

pub fn isfinite(x: f64) -> bool {
    x.is_finite()
}

pub fn isinf(x: f64) -> bool {
    x.is_infinite()
}

pub fn isnan(x: f64) -> bool {
    x.is_nan()
}

/// Normal in the format under test, not in `f64`.
pub fn isnormal<T: FloatFormat>(x: f64) -> bool {
    x.is_finite() && x.abs() >= T::MIN_NORMAL
}

pub fn signbit(x: f64) -> bool {
    x.is_sign_negative()
}

pub fn not(x: f64) -> bool {
    x == 0.0
}
