//! Floating-point formats under test
//!
//! Every format the engine verifies (`half`, `float`, `double`) is described by
//! a [`FloatFormat`] implementation. The partitioner, oracle and verifier are
//! written once against this trait and monomorphised per format.

use half::f16;
use std::fmt;

/// Precision of the values being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Precision {
    /// IEEE binary16 (`half`)
    Half,
    /// IEEE binary32 (`float`)
    Float,
    /// IEEE binary64 (`double`)
    Double,
}

impl Precision {
    /// All precisions, narrowest first.
    pub const ALL: [Precision; 3] = [Precision::Half, Precision::Float, Precision::Double];

    /// Size of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Precision::Half => 2,
            Precision::Float => 4,
            Precision::Double => 8,
        }
    }

    /// Scalar type name as spelled in kernel source.
    pub const fn type_name(self) -> &'static str {
        match self {
            Precision::Half => "half",
            Precision::Float => "float",
            Precision::Double => "double",
        }
    }

    /// Parse a type name (`half`, `float`, `double`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "half" | "f16" => Some(Precision::Half),
            "float" | "f32" => Some(Precision::Float),
            "double" | "f64" => Some(Precision::Double),
            _ => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Description of an IEEE binary floating-point format.
///
/// Reference values are always carried as `f64`; conversions in and out of the
/// format go through [`FloatFormat::to_f64`] and [`FloatFormat::from_f64`]
/// (round to nearest even).
pub trait FloatFormat: Copy + PartialEq + Send + Sync + fmt::Debug + 'static {
    /// Raw storage type of one element.
    type Bits: Copy + Eq + fmt::LowerHex + fmt::Debug + bytemuck::Pod + Send + Sync;

    /// Precision tag for this format.
    const PRECISION: Precision;
    /// Number of significand bits including the implicit bit.
    const MANT_DIG: i32;
    /// C-style minimum exponent (`FLT_MIN_EXP`).
    const MIN_EXP: i32;
    /// Smallest positive subnormal.
    const MIN_SUBNORMAL: f64;
    /// Smallest positive normal.
    const MIN_NORMAL: f64;
    /// Largest finite value.
    const MAX: f64;
    /// Stand-in for an infinite device result when the reference is finite.
    ///
    /// This is the next power of two past the format's range (`2^(emax+1)`).
    /// Formats without an entry report an infinite error instead.
    const OVERFLOW_STAND_IN: Option<f64>;
    /// Exponent field mask in the raw bit pattern.
    const EXP_MASK: u64;
    /// Trailing significand field mask in the raw bit pattern.
    const MANT_MASK: u64;
    /// Sign bit in the raw bit pattern.
    const SIGN_MASK: u64;

    fn to_bits(self) -> Self::Bits;
    fn from_bits(bits: Self::Bits) -> Self;
    fn bits_to_u64(bits: Self::Bits) -> u64;
    /// Truncating conversion from a raw 64-bit pattern.
    fn bits_from_u64(raw: u64) -> Self::Bits;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    fn raw_bits(self) -> u64 {
        Self::bits_to_u64(self.to_bits())
    }

    fn from_raw_bits(raw: u64) -> Self {
        Self::from_bits(Self::bits_from_u64(raw))
    }

    fn is_nan(self) -> bool {
        let raw = self.raw_bits();
        raw & Self::EXP_MASK == Self::EXP_MASK && raw & Self::MANT_MASK != 0
    }

    fn is_infinite(self) -> bool {
        let raw = self.raw_bits();
        raw & Self::EXP_MASK == Self::EXP_MASK && raw & Self::MANT_MASK == 0
    }

    fn is_finite(self) -> bool {
        self.raw_bits() & Self::EXP_MASK != Self::EXP_MASK
    }

    /// True for `+0` and `-0`.
    fn is_zero(self) -> bool {
        self.raw_bits() & !Self::SIGN_MASK == 0
    }

    /// Nonzero with a zero exponent field.
    fn is_subnormal(self) -> bool {
        let raw = self.raw_bits();
        raw & Self::EXP_MASK == 0 && raw & Self::MANT_MASK != 0
    }

    fn is_sign_negative(self) -> bool {
        self.raw_bits() & Self::SIGN_MASK != 0
    }

    /// Replace a subnormal by a zero of the same sign.
    fn flush_to_zero(self) -> Self {
        if self.is_subnormal() {
            Self::from_raw_bits(self.raw_bits() & Self::SIGN_MASK)
        } else {
            self
        }
    }

    /// Whether `reference` is exactly representable in this format.
    fn represents(reference: f64) -> bool {
        let rounded = Self::from_f64(reference).to_f64();
        rounded == reference || (rounded.is_nan() && reference.is_nan())
    }
}

impl FloatFormat for f16 {
    type Bits = u16;

    const PRECISION: Precision = Precision::Half;
    const MANT_DIG: i32 = 11;
    const MIN_EXP: i32 = -13;
    const MIN_SUBNORMAL: f64 = 5.960464477539063e-8; // 2^-24
    const MIN_NORMAL: f64 = 6.103515625e-5; // 2^-14
    const MAX: f64 = 65504.0;
    const OVERFLOW_STAND_IN: Option<f64> = Some(65536.0);
    const EXP_MASK: u64 = 0x7c00;
    const MANT_MASK: u64 = 0x03ff;
    const SIGN_MASK: u64 = 0x8000;

    fn to_bits(self) -> u16 {
        f16::to_bits(self)
    }

    fn from_bits(bits: u16) -> Self {
        f16::from_bits(bits)
    }

    fn bits_to_u64(bits: u16) -> u64 {
        u64::from(bits)
    }

    fn bits_from_u64(raw: u64) -> u16 {
        raw as u16
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }
}

impl FloatFormat for f32 {
    type Bits = u32;

    const PRECISION: Precision = Precision::Float;
    const MANT_DIG: i32 = 24;
    const MIN_EXP: i32 = -125;
    const MIN_SUBNORMAL: f64 = 1.401298464324817e-45; // 2^-149
    const MIN_NORMAL: f64 = 1.1754943508222875e-38; // 2^-126
    const MAX: f64 = f32::MAX as f64;
    const OVERFLOW_STAND_IN: Option<f64> = Some(3.402823669209385e38); // 2^128
    const EXP_MASK: u64 = 0x7f80_0000;
    const MANT_MASK: u64 = 0x007f_ffff;
    const SIGN_MASK: u64 = 0x8000_0000;

    fn to_bits(self) -> u32 {
        f32::to_bits(self)
    }

    fn from_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }

    fn bits_to_u64(bits: u32) -> u64 {
        u64::from(bits)
    }

    fn bits_from_u64(raw: u64) -> u32 {
        raw as u32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl FloatFormat for f64 {
    type Bits = u64;

    const PRECISION: Precision = Precision::Double;
    const MANT_DIG: i32 = 53;
    const MIN_EXP: i32 = -1021;
    const MIN_SUBNORMAL: f64 = 4.9406564584124654e-324; // 2^-1074
    const MIN_NORMAL: f64 = f64::MIN_POSITIVE; // 2^-1022
    const MAX: f64 = f64::MAX;
    const OVERFLOW_STAND_IN: Option<f64> = None;
    const EXP_MASK: u64 = 0x7ff0_0000_0000_0000;
    const MANT_MASK: u64 = 0x000f_ffff_ffff_ffff;
    const SIGN_MASK: u64 = 0x8000_0000_0000_0000;

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }

    fn bits_to_u64(bits: u64) -> u64 {
        bits
    }

    fn bits_from_u64(raw: u64) -> u64 {
        raw
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Map a 32-bit sweep index onto the 64-bit pattern space.
///
/// The top 20 bits of the index land in the top 20 bits of the double (sign,
/// exponent and leading significand bits), the low 12 bits stay in place, so
/// a sweep of the full 32-bit range touches every binade.
pub const fn double_from_u32(bits: u32) -> u64 {
    let bits = bits as u64;
    (bits & 0xfff) | ((bits & !0xfff) << 32)
}

/// Render a value as a C99 hex-float literal (`0x1.8p+1`).
///
/// Used in failure diagnostics so inputs can be pasted back into kernel code.
pub fn hex_float(value: f64) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() { "-nan".into() } else { "nan".into() };
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf".into() } else { "inf".into() };
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value == 0.0 {
        return format!("{sign}0x0p+0");
    }
    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let mantissa = bits & 0x000f_ffff_ffff_ffff;
    let (lead, exp) = if exponent == 0 { (0, -1022) } else { (1, exponent - 1023) };
    let mut digits = format!("{mantissa:013x}");
    while digits.ends_with('0') {
        digits.pop();
    }
    if digits.is_empty() {
        format!("{sign}0x{lead}p{exp:+}")
    } else {
        format!("{sign}0x{lead}.{digits}p{exp:+}")
    }
}
