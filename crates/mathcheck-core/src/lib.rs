//! # mathcheck-core - Numeric Verification Primitives
//!
//! Everything needed to decide whether a math builtin is accurate enough,
//! independent of the device that computed it.
//!
//! ## Architecture
//!
//! - **Float formats**: [`FloatFormat`] describes `f16`, `f32` and `f64` once,
//!   so the partitioner and verifier are written a single time.
//! - **Domain partitioning**: [`DomainPartition`] splits the 2^32 (or 2^16)
//!   bit-pattern domain into [`Job`]s; [`SpecialCursor`] places the special-value
//!   cross product in the leading jobs.
//! - **Reference oracle**: [`Reference`] variants evaluate each builtin in `f64`.
//! - **Tolerance verifier**: [`verify`] and friends apply the ulp bound with the
//!   flush-to-zero and subnormal retry fallbacks.
//! - **Aggregation**: [`MaxError`] keeps the worst case and its arguments.
//!
//! ## Example
//!
//! ```text
//! use mathcheck_core::{lookup, verify, Precision, ToleranceMode};
//!
//! let sin = lookup("sin")?;
//! let tolerance = sin.tolerance(Precision::Float, &ToleranceMode::default(), 0.5);
//! let outcome = verify(device_value, &[0.5f32], reference, &tolerance, |a| libm::sin(a[0]));
//! assert!(outcome.passed);
//! ```

pub mod aggregate;
pub mod error;
pub mod float;
pub mod functions;
pub mod partition;
pub mod reference;
pub mod special;
pub mod ulp;
pub mod verify;

// Re-export primary types
pub use aggregate::MaxError;
pub use error::{Error, Result};
pub use float::{double_from_u32, hex_float, FloatFormat, Precision};
pub use functions::{function_list, lookup, FunctionDescriptor, Quirk, RelaxedRule, Spelling, ToleranceMode, UlpTiers};
pub use partition::{test_scale, DomainPartition, Job, SpecialCursor, BUFFER_SIZE};
pub use reference::{Reference, Signature};
pub use special::{specials, specials_for, INT_SPECIALS};
pub use ulp::{abs_error, is_result_subnormal, is_result_subnormal_abs, subnormal_threshold, ulp_error};
pub use verify::{macro_result, verify, verify_int, verify_macro, verify_with_int, IntRule, Metric, Outcome, Tolerance};

// Re-export the 16-bit float type used in public signatures
pub use half::f16;
