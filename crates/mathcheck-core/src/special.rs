//! Special-value tables
//!
//! Ordered bit patterns that exercise rounding boundaries, overflow, the
//! subnormal range and signed zeros. Multi-argument sweeps enumerate the cross
//! product of these tables before falling back to pseudorandom inputs.

use crate::float::{FloatFormat, Precision};

/// Magnitudes of the float table (sign added by [`float_specials`]).
const FLOAT_MAGNITUDES: [u32; 49] = [
    0x7fc0_0000, // nan
    0x7f80_0000, // inf
    0x7f7f_ffff, // FLT_MAX
    0x5f80_0001, 0x5f80_0000, 0x5f7f_ffff, // around 2^64
    0x5f00_0001, 0x5f00_0000, 0x5eff_ffff, // around 2^63
    0x4f80_0001, 0x4f80_0000, 0x4f7f_ffff, // around 2^32
    0x4f00_0001, 0x4f00_0000, 0x4eff_ffff, // around 2^31
    0x447a_0000, // 1000
    0x42c8_0000, // 100
    0x4080_0000, // 4
    0x4060_0000, // 3.5
    0x4040_0000, // 3
    0x4040_0001,
    0x4020_0000, // 2.5
    0x403f_ffff,
    0x4000_0000, // 2
    0x3fc0_0001,
    0x3fc0_0000, // 1.5
    0x3fbf_ffff,
    0x3f80_0001,
    0x3f80_0000, // 1
    0x3f7f_ffff,
    0x3f00_0001,
    0x3f00_0000, // 0.5
    0x3eff_ffff,
    0x3e80_0001,
    0x3e80_0000, // 0.25
    0x3e7f_ffff,
    0x0080_0001,
    0x0080_0000, // FLT_MIN
    0x007f_ffff, // largest subnormal
    0x0000_07ff,
    0x0000_007f,
    0x0000_0007,
    0x0000_0006,
    0x0000_0005,
    0x0000_0004,
    0x0000_0003,
    0x0000_0002,
    0x0000_0001, // smallest subnormal
    0x0000_0000,
];

/// Magnitudes of the double table.
const DOUBLE_MAGNITUDES: [u64; 53] = [
    0x7ff8_0000_0000_0000, // nan
    0x7ff0_0000_0000_0000, // inf
    0x7fef_ffff_ffff_ffff, // DBL_MAX
    0x43f0_0000_0000_0001, 0x43f0_0000_0000_0000, 0x43ef_ffff_ffff_ffff, // around 2^64
    0x43e0_0000_0000_0001, 0x43e0_0000_0000_0000, 0x43df_ffff_ffff_ffff, // around 2^63
    0x41f0_0000_2000_0000, 0x41f0_0000_0000_0000, 0x41ef_ffff_ffff_ffff, // around 2^32
    0x41e0_0000_0000_0001, 0x41e0_0000_0000_0000, 0x41df_ffff_ffff_ffff, // around 2^31
    0x408f_4000_0000_0000, // 1000
    0x4059_0000_0000_0000, // 100
    0x4010_0000_0000_0000, // 4
    0x400c_0000_0000_0000, // 3.5
    0x4008_0000_0000_0000, // 3
    0x4008_0000_0000_0001,
    0x4004_0000_0000_0000, // 2.5
    0x4007_ffff_ffff_ffff,
    0x4000_0000_0000_0000, // 2
    0x3ff8_0000_0000_0001,
    0x3ff8_0000_0000_0000, // 1.5
    0x3ff7_ffff_ffff_ffff,
    0x3ff0_0000_0000_0001,
    0x3ff0_0000_0000_0000, // 1
    0x3fef_ffff_ffff_ffff,
    0x3fe0_0000_0000_0001,
    0x3fe0_0000_0000_0000, // 0.5
    0x3fdf_ffff_ffff_ffff,
    0x3fd0_0000_0000_0001,
    0x3fd0_0000_0000_0000, // 0.25
    0x3fcf_ffff_ffff_ffff,
    0x0010_0000_0000_0001,
    0x0010_0000_0000_0000, // DBL_MIN
    0x000f_ffff_ffff_ffff, // largest subnormal
    0x0000_0000_0000_0fff,
    0x0000_0000_0000_00fe,
    0x0000_0000_0000_000e,
    0x0000_0000_0000_000c,
    0x0000_0000_0000_000a,
    0x0000_0000_0000_0008,
    0x0000_0000_0000_0007,
    0x0000_0000_0000_0006,
    0x0000_0000_0000_0005,
    0x0000_0000_0000_0004,
    0x0000_0000_0000_0003,
    0x0000_0000_0000_0002,
    0x0000_0000_0000_0001, // smallest subnormal
    0x0000_0000_0000_0000,
];

/// The half table is used whole: nan, zeros, smallest subnormal, infinities,
/// HALF_MAX and HALF_MIN.
const HALF_SPECIALS: [u16; 8] = [0xffff, 0x0000, 0x0001, 0x7c00, 0xfc00, 0x8000, 0x7bff, 0x0400];

/// Integer arguments for `ldexp`/`pown`/`rootn` style signatures.
pub const INT_SPECIALS: [i32; 21] = [
    0,
    1,
    2,
    3,
    126,
    127,
    128,
    0x0200_0001,
    0x0400_0001,
    1_465_264_071,
    1_488_522_147,
    -1,
    -2,
    -3,
    -126,
    -127,
    -128,
    -0x0200_0001,
    -0x0400_0001,
    -1_465_264_071,
    -1_488_522_147,
];

fn mirrored<const N: usize>(magnitudes: &[u64; N], sign: u64) -> Vec<u64> {
    magnitudes
        .iter()
        .map(|&m| m | sign)
        .chain(magnitudes.iter().copied())
        .collect()
}

/// Float special values as raw bit patterns: the negative half, then the
/// positive half, each ordered from NaN down to zero.
pub fn float_specials() -> Vec<u64> {
    mirrored(&FLOAT_MAGNITUDES.map(u64::from), 0x8000_0000)
}

/// Double special values as raw bit patterns.
pub fn double_specials() -> Vec<u64> {
    mirrored(&DOUBLE_MAGNITUDES, 0x8000_0000_0000_0000)
}

/// Half special values as raw bit patterns.
pub fn half_specials() -> Vec<u64> {
    HALF_SPECIALS.iter().map(|&bits| u64::from(bits)).collect()
}

/// Special-value table for `precision`, as raw bit patterns.
pub fn specials_for(precision: Precision) -> Vec<u64> {
    match precision {
        Precision::Half => half_specials(),
        Precision::Float => float_specials(),
        Precision::Double => double_specials(),
    }
}

/// Special-value table decoded into `T`.
pub fn specials<T: FloatFormat>() -> Vec<T> {
    specials_for(T::PRECISION).into_iter().map(T::from_raw_bits).collect()
}
