//! Function descriptors
//!
//! The static list of builtins under test, with their host references, the
//! allowed error per profile and the special rules some builtins carry.

use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::float::Precision;
use crate::reference::{self as r, Reference, Signature};
use crate::verify::{IntRule, Tolerance};

const INF: f32 = f32::INFINITY;

/// Absolute error allowed for relaxed `sin`/`cos`/`sinpi`/`cospi` (2^-11).
pub const RELAXED_TRIG_ABS_ERROR: f32 = 0.000_488_281_25;

/// Absolute error allowed for the relaxed log family on [0.5, 2] (2^-21).
pub const RELAXED_LOG_ABS_ERROR: f32 = 4.768_371_582_031_25e-7;

/// Allowed error per profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UlpTiers {
    pub float: f32,
    pub double: f32,
    pub half: f32,
    pub embedded: f32,
    pub relaxed: f32,
    pub relaxed_embedded: f32,
}

impl UlpTiers {
    /// Correctly rounded in every profile; relaxed math has no requirement.
    pub const EXACT: UlpTiers = UlpTiers::new(0.0, 0.0, 0.0);

    /// `float`/`double`/embedded tiers; `half` follows `float`.
    pub const fn new(float: f32, double: f32, embedded: f32) -> Self {
        Self {
            float,
            double,
            half: float,
            embedded,
            relaxed: INF,
            relaxed_embedded: INF,
        }
    }

    pub const fn uniform(ulps: f32) -> Self {
        Self::new(ulps, ulps, ulps)
    }

    const fn with_relaxed(mut self, relaxed: f32, relaxed_embedded: f32) -> Self {
        self.relaxed = relaxed;
        self.relaxed_embedded = relaxed_embedded;
        self
    }
}

/// How a relaxed-math (`-cl-fast-relaxed-math`) result is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxedRule {
    /// Ulp compare against the relaxed tier.
    Ulps,
    /// Absolute error within the relaxed tier.
    Absolute,
    /// Absolute error for inputs in [-1, 1], unchecked elsewhere.
    AbsoluteInUnitInterval,
    /// `3 + floor(|2x|)` ulps in the full profile.
    ExpScaled,
    /// Absolute error for inputs in [0.5, 2], the regular tier elsewhere.
    LogFamily,
    /// Relaxed tier, unchecked when the implementation is derived.
    Derived,
}

/// Builtin-specific acceptance quirks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quirk {
    None,
    /// Smallest normal accepted from `nextafter` with zero or subnormal `x`.
    NextAfter,
    /// Results only bounded in magnitude for inputs beyond 2^16.
    RangeLimited { limit: f32 },
    /// NaN/infinity cases skipped on devices without inf/nan support.
    SkipNanInf,
    /// Only tested when correctly rounded divide/sqrt is requested.
    CorrectlyRounded,
}

/// How the builtin is spelled in kernel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spelling {
    /// `name(args)`
    Call,
    /// `x op y`
    Infix,
    /// `op x`
    Prefix,
    /// plain copy of the argument
    Assignment,
}

/// Profile toggles that shape a tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToleranceMode {
    /// Relaxed math enabled for the run.
    pub relaxed: bool,
    /// Relaxed builtins are derived from other builtins.
    pub fast_relaxed_derived: bool,
    /// Embedded profile.
    pub embedded: bool,
    /// Flush-to-zero in effect (descriptor, forced or device without denormals).
    pub ftz: bool,
    /// The device does not support infinities and NaNs.
    pub no_inf_nan: bool,
    /// Single precision arithmetic rounds toward zero (embedded devices
    /// without round-to-nearest).
    pub rtz: bool,
}

/// One builtin under test.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDescriptor {
    pub name: &'static str,
    /// Name or operator used in kernel source.
    pub code_name: &'static str,
    float_reference: Option<Reference>,
    double_reference: Option<Reference>,
    half_reference: Option<Reference>,
    relaxed_reference: Option<Reference>,
    /// `float` reference on devices that round toward zero.
    toward_zero_reference: Option<Reference>,
    pub ulps: UlpTiers,
    /// Always flushes denormals.
    pub ftz: bool,
    /// Relaxed-math rule; `None` when relaxed math does not apply.
    pub relaxed: Option<RelaxedRule>,
    pub quirk: Quirk,
    /// Rule for the integer side result, if the signature has one.
    pub int_rule: IntRule,
}

impl FunctionDescriptor {
    const fn new(name: &'static str, reference: Reference) -> Self {
        Self {
            name,
            code_name: name,
            float_reference: Some(reference),
            double_reference: Some(reference),
            half_reference: Some(reference),
            relaxed_reference: None,
            toward_zero_reference: None,
            ulps: UlpTiers::EXACT,
            ftz: false,
            relaxed: None,
            quirk: Quirk::None,
            int_rule: IntRule::Exact,
        }
    }

    const fn code(mut self, code_name: &'static str) -> Self {
        self.code_name = code_name;
        self
    }

    const fn ulps(mut self, ulps: UlpTiers) -> Self {
        self.ulps = ulps;
        self
    }

    const fn relaxed(mut self, rule: RelaxedRule, reference: Reference) -> Self {
        self.relaxed = Some(rule);
        self.relaxed_reference = Some(reference);
        self
    }

    const fn toward_zero(mut self, reference: Reference) -> Self {
        self.toward_zero_reference = Some(reference);
        self
    }

    const fn per_format(mut self, half: Reference, double: Reference) -> Self {
        self.half_reference = Some(half);
        self.double_reference = Some(double);
        self
    }

    /// Only available on `float` (native `half_*` builtins, correctly rounded
    /// variants).
    const fn float_only(mut self) -> Self {
        self.half_reference = None;
        self.double_reference = None;
        self
    }

    const fn always_ftz(mut self) -> Self {
        self.ftz = true;
        self
    }

    const fn quirk(mut self, quirk: Quirk) -> Self {
        self.quirk = quirk;
        self
    }

    const fn int_rule(mut self, rule: IntRule) -> Self {
        self.int_rule = rule;
        self
    }

    /// Kernel signature.
    pub fn signature(&self) -> Signature {
        self.float_reference
            .or(self.double_reference)
            .map_or(Signature::Unary, |reference| reference.signature())
    }

    /// How the builtin is written in kernel source.
    pub fn spelling(&self) -> Spelling {
        match self.code_name {
            "" => Spelling::Assignment,
            name if name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') => Spelling::Call,
            _ if self.signature().float_arity() == 1 => Spelling::Prefix,
            _ => Spelling::Infix,
        }
    }

    /// Whether the builtin exists for `precision`.
    pub fn supports(&self, precision: Precision) -> bool {
        self.reference_for(precision).is_some()
    }

    fn reference_for(&self, precision: Precision) -> Option<Reference> {
        match precision {
            Precision::Half => self.half_reference,
            Precision::Float => self.float_reference,
            Precision::Double => self.double_reference,
        }
    }

    /// Host reference for `precision`; relaxed math uses the relaxed variant
    /// where one exists.
    pub fn reference(&self, precision: Precision, relaxed: bool) -> Result<Reference> {
        let regular = self.reference_for(precision).ok_or_else(|| Error::MissingReference {
            function: self.name.to_string(),
            precision: precision.to_string(),
        })?;
        if self.relaxed_applies(precision, relaxed) {
            Ok(self.relaxed_reference.unwrap_or(regular))
        } else {
            Ok(regular)
        }
    }

    /// Host reference for a run under `mode`. Round-toward-zero devices get
    /// the truncating `float` reference where the builtin has one.
    pub fn reference_in(&self, precision: Precision, mode: &ToleranceMode) -> Result<Reference> {
        let relaxed = self.relaxed_applies(precision, mode.relaxed);
        match self.toward_zero_reference {
            Some(reference) if mode.rtz && precision == Precision::Float && !relaxed => Ok(reference),
            _ => self.reference(precision, relaxed),
        }
    }

    /// Whether relaxed-math rules apply to this builtin.
    pub fn relaxed_applies(&self, precision: Precision, relaxed: bool) -> bool {
        relaxed && precision == Precision::Float && self.relaxed.is_some()
    }

    /// Flush-to-zero in effect for this builtin.
    pub fn effective_ftz(&self, forced: bool, device_denormals: bool) -> bool {
        self.ftz || forced || !device_denormals
    }

    /// Allowed error for `precision` under the given profile.
    pub fn allowed_ulps(&self, precision: Precision, relaxed: bool, embedded: bool) -> f32 {
        match precision {
            Precision::Double => self.ulps.double,
            Precision::Half => self.ulps.half,
            Precision::Float if self.relaxed_applies(precision, relaxed) => {
                if embedded {
                    self.ulps.relaxed_embedded
                } else {
                    self.ulps.relaxed
                }
            }
            Precision::Float => {
                if embedded {
                    self.ulps.embedded
                } else {
                    self.ulps.float
                }
            }
        }
    }

    /// Tolerance for one element whose first argument is `x`.
    pub fn tolerance(&self, precision: Precision, mode: &ToleranceMode, x: f64) -> Tolerance {
        let relaxed = self.relaxed_applies(precision, mode.relaxed);
        let ulps = self.allowed_ulps(precision, relaxed, mode.embedded);
        let skip_nan_inf = mode.no_inf_nan && self.quirk == Quirk::SkipNanInf;

        let base = match self.relaxed.filter(|_| relaxed) {
            None | Some(RelaxedRule::Ulps) => Tolerance::ulps(ulps),
            Some(RelaxedRule::Absolute) => Tolerance::absolute(ulps),
            Some(RelaxedRule::AbsoluteInUnitInterval) => {
                if (-1.0..=1.0).contains(&x) {
                    Tolerance::absolute(ulps)
                } else {
                    Tolerance::unchecked()
                }
            }
            Some(RelaxedRule::ExpScaled) => {
                if mode.embedded {
                    Tolerance::ulps(ulps)
                } else {
                    Tolerance::ulps(3.0 + libm::floor((2.0 * x).abs()) as f32)
                }
            }
            Some(RelaxedRule::LogFamily) => {
                if (0.5..=2.0).contains(&x) {
                    Tolerance::absolute(ulps)
                } else {
                    Tolerance::ulps(self.allowed_ulps(precision, false, mode.embedded))
                }
            }
            Some(RelaxedRule::Derived) => {
                if mode.fast_relaxed_derived {
                    Tolerance::unchecked()
                } else {
                    Tolerance::ulps(ulps)
                }
            }
        };

        let range_limit = match self.quirk {
            Quirk::RangeLimited { limit } => Some(limit),
            _ => None,
        };

        base.with_ftz(mode.ftz)
            .with_relaxed(relaxed)
            .with_finite_only(relaxed || skip_nan_inf)
            .with_skip_overflow(skip_nan_inf)
            .with_nextafter(self.quirk == Quirk::NextAfter)
            .with_range_limit(range_limit)
    }
}

/// `half_sin`/`half_cos` results beyond 2^16 must stay within
/// `1 + 8192 * FLT_EPSILON / 2`.
const HALF_SIN_COS_LIMIT: f32 = 1.0 + 8192.0 * f32::EPSILON / 2.0;

fn build_list() -> Vec<FunctionDescriptor> {
    use Reference::*;
    use RelaxedRule as Rx;
    type F = FunctionDescriptor;

    let native = UlpTiers::uniform(8192.0);
    let trig = UlpTiers::uniform(4.0).with_relaxed(RELAXED_TRIG_ABS_ERROR, RELAXED_TRIG_ABS_ERROR);
    let logs = UlpTiers::new(3.0, 3.0, 4.0).with_relaxed(RELAXED_LOG_ABS_ERROR, RELAXED_LOG_ABS_ERROR);

    vec![
        F::new("acos", Unary(r::acos))
            .ulps(UlpTiers::uniform(4.0).with_relaxed(4096.0, 4096.0))
            .relaxed(Rx::Ulps, Unary(r::acos)),
        F::new("acosh", Unary(r::acosh)).ulps(UlpTiers::uniform(4.0)),
        F::new("acospi", Unary(r::acospi)).ulps(UlpTiers::uniform(5.0)),
        F::new("asin", Unary(r::asin))
            .ulps(UlpTiers::uniform(4.0).with_relaxed(4096.0, 4096.0))
            .relaxed(Rx::Ulps, Unary(r::asin)),
        F::new("asinh", Unary(r::asinh)).ulps(UlpTiers::uniform(4.0)),
        F::new("asinpi", Unary(r::asinpi)).ulps(UlpTiers::uniform(5.0)),
        F::new("atan", Unary(r::atan))
            .ulps(UlpTiers::uniform(5.0).with_relaxed(4096.0, 4096.0))
            .relaxed(Rx::Ulps, Unary(r::atan)),
        F::new("atanh", Unary(r::atanh)).ulps(UlpTiers::uniform(5.0)),
        F::new("atanpi", Unary(r::atanpi)).ulps(UlpTiers::uniform(5.0)),
        F::new("atan2", Binary(r::atan2)).ulps(UlpTiers::uniform(6.0)),
        F::new("atan2pi", Binary(r::atan2pi)).ulps(UlpTiers::uniform(6.0)),
        F::new("cbrt", Unary(r::cbrt)).ulps(UlpTiers::new(2.0, 2.0, 4.0)),
        F::new("ceil", Unary(r::ceil)),
        F::new("copysign", Binary(r::copysign)),
        F::new("cos", Unary(r::cos)).ulps(trig).relaxed(Rx::Absolute, Unary(r::relaxed_cos)),
        F::new("cosh", Unary(r::cosh)).ulps(UlpTiers::uniform(4.0)),
        F::new("cospi", Unary(r::cospi))
            .ulps(trig)
            .relaxed(Rx::AbsoluteInUnitInterval, Unary(r::cospi)),
        F::new("exp", Unary(r::exp))
            .ulps(UlpTiers::new(3.0, 3.0, 4.0).with_relaxed(3.0, 4.0))
            .relaxed(Rx::ExpScaled, Unary(r::exp)),
        F::new("exp2", Unary(r::exp2))
            .ulps(UlpTiers::new(3.0, 3.0, 4.0).with_relaxed(3.0, 4.0))
            .relaxed(Rx::ExpScaled, Unary(r::exp2)),
        F::new("exp10", Unary(r::exp10))
            .ulps(UlpTiers::new(3.0, 3.0, 4.0).with_relaxed(8192.0, 8192.0))
            .relaxed(Rx::Derived, Unary(r::exp10)),
        F::new("expm1", Unary(r::expm1)).ulps(UlpTiers::new(3.0, 3.0, 4.0)),
        F::new("fabs", Unary(r::fabs)),
        F::new("fdim", Binary(r::fdim))
            .toward_zero(Binary(r::fdim_toward_zero))
            .quirk(Quirk::SkipNanInf),
        F::new("floor", Unary(r::floor)),
        F::new("fma", Ternary(r::fma)),
        F::new("fmax", Binary(r::fmax)),
        F::new("fmin", Binary(r::fmin)),
        F::new("fmod", Binary(r::fmod)),
        F::new("fract", UnaryTwoResults(r::fract::<f32>))
            .per_format(UnaryTwoResults(r::fract::<half::f16>), UnaryTwoResults(r::fract::<f64>))
            .toward_zero(UnaryTwoResults(r::fract_toward_zero)),
        F::new("frexp", UnaryIntResult(r::frexp)).int_rule(IntRule::Frexp),
        F::new("hypot", Binary(r::hypot)).ulps(UlpTiers::uniform(4.0)),
        F::new("ilogb", IntUnary(r::ilogb)).int_rule(IntRule::Ilogb),
        F::new("isequal", MacroBinary(r::isequal)),
        F::new("isfinite", MacroUnary(r::isfinite)),
        F::new("isgreater", MacroBinary(r::isgreater)),
        F::new("isgreaterequal", MacroBinary(r::isgreaterequal)),
        F::new("isinf", MacroUnary(r::isinf)),
        F::new("isless", MacroBinary(r::isless)),
        F::new("islessequal", MacroBinary(r::islessequal)),
        F::new("islessgreater", MacroBinary(r::islessgreater)),
        F::new("isnan", MacroUnary(r::isnan)),
        F::new("isnormal", MacroUnary(r::isnormal::<f32>))
            .per_format(MacroUnary(r::isnormal::<half::f16>), MacroUnary(r::isnormal::<f64>)),
        F::new("isnotequal", MacroBinary(r::isnotequal)),
        F::new("isordered", MacroBinary(r::isordered)),
        F::new("isunordered", MacroBinary(r::isunordered)),
        F::new("ldexp", BinaryInt(r::ldexp)),
        F::new("lgamma", Unary(r::lgamma)).ulps(UlpTiers::uniform(INF)),
        F::new("lgamma_r", UnaryIntResult(r::lgamma_r))
            .ulps(UlpTiers::uniform(INF))
            .int_rule(IntRule::Unchecked),
        F::new("log", Unary(r::log)).ulps(logs).relaxed(Rx::LogFamily, Unary(r::relaxed_log)),
        F::new("log2", Unary(r::log2)).ulps(logs).relaxed(Rx::LogFamily, Unary(r::log2)),
        F::new("log10", Unary(r::log10)).ulps(logs).relaxed(Rx::LogFamily, Unary(r::log10)),
        F::new("log1p", Unary(r::log1p)).ulps(UlpTiers::new(2.0, 2.0, 4.0)),
        F::new("logb", Unary(r::logb)),
        F::new("mad", Ternary(r::mad))
            .ulps(UlpTiers::uniform(INF).with_relaxed(INF, INF))
            .relaxed(Rx::Ulps, Ternary(r::relaxed_mad)),
        F::new("maxmag", Binary(r::maxmag)),
        F::new("minmag", Binary(r::minmag)),
        F::new("modf", UnaryTwoResults(r::modf)),
        F::new("nan", UnsignedUnary(r::nan)),
        F::new("nextafter", Binary(r::nextafter::<f32>))
            .per_format(Binary(r::nextafter::<half::f16>), Binary(r::nextafter::<f64>))
            .quirk(Quirk::NextAfter),
        F::new("pow", Binary(r::pow))
            .ulps(UlpTiers::uniform(16.0).with_relaxed(8192.0, 8192.0))
            .relaxed(Rx::Derived, Binary(r::relaxed_pow)),
        F::new("pown", BinaryInt(r::pown)).ulps(UlpTiers::uniform(16.0)),
        F::new("powr", Binary(r::powr)).ulps(UlpTiers::uniform(16.0)),
        F::new("remainder", Binary(r::remainder)),
        F::new("remquo", BinaryIntResult(r::remquo)).int_rule(IntRule::Remquo),
        F::new("rint", Unary(r::rint)),
        F::new("rootn", BinaryInt(r::rootn)).ulps(UlpTiers::uniform(16.0)),
        F::new("round", Unary(r::round)),
        F::new("rsqrt", Unary(r::rsqrt)).ulps(UlpTiers::new(2.0, 2.0, 4.0)),
        F::new("signbit", MacroUnary(r::signbit)),
        F::new("sin", Unary(r::sin)).ulps(trig).relaxed(Rx::Absolute, Unary(r::relaxed_sin)),
        F::new("sincos", UnaryTwoResults(r::sincos))
            .ulps(trig)
            .relaxed(Rx::Absolute, UnaryTwoResults(r::relaxed_sincos)),
        F::new("sinh", Unary(r::sinh)).ulps(UlpTiers::uniform(4.0)),
        F::new("sinpi", Unary(r::sinpi))
            .ulps(trig)
            .relaxed(Rx::AbsoluteInUnitInterval, Unary(r::sinpi)),
        F::new("sqrt", Unary(r::sqrt)).ulps(UlpTiers::new(3.0, 0.0, 4.0)),
        F::new("sqrt_cr", Unary(r::sqrt))
            .code("sqrt")
            .float_only()
            .quirk(Quirk::CorrectlyRounded),
        F::new("tan", Unary(r::tan))
            .ulps(UlpTiers::uniform(5.0).with_relaxed(8192.0, 8192.0))
            .relaxed(Rx::Derived, Unary(r::relaxed_tan)),
        F::new("tanh", Unary(r::tanh)).ulps(UlpTiers::uniform(5.0)),
        F::new("tanpi", Unary(r::tanpi)).ulps(UlpTiers::uniform(6.0)),
        F::new("trunc", Unary(r::trunc)),
        F::new("half_cos", Unary(r::cos))
            .ulps(native)
            .float_only()
            .always_ftz()
            .quirk(Quirk::RangeLimited { limit: HALF_SIN_COS_LIMIT }),
        F::new("half_divide", Binary(r::divide)).ulps(native).float_only().always_ftz(),
        F::new("half_exp", Unary(r::exp)).ulps(native).float_only().always_ftz(),
        F::new("half_exp2", Unary(r::exp2)).ulps(native).float_only().always_ftz(),
        F::new("half_exp10", Unary(r::exp10)).ulps(native).float_only().always_ftz(),
        F::new("half_log", Unary(r::log)).ulps(native).float_only().always_ftz(),
        F::new("half_log2", Unary(r::log2)).ulps(native).float_only().always_ftz(),
        F::new("half_log10", Unary(r::log10)).ulps(native).float_only().always_ftz(),
        F::new("half_powr", Binary(r::powr)).ulps(native).float_only().always_ftz(),
        F::new("half_recip", Unary(r::recip)).ulps(native).float_only().always_ftz(),
        F::new("half_rsqrt", Unary(r::rsqrt)).ulps(native).float_only().always_ftz(),
        F::new("half_sin", Unary(r::sin))
            .ulps(native)
            .float_only()
            .always_ftz()
            .quirk(Quirk::RangeLimited { limit: HALF_SIN_COS_LIMIT }),
        F::new("half_sqrt", Unary(r::sqrt)).ulps(native).float_only().always_ftz(),
        F::new("half_tan", Unary(r::tan))
            .ulps(native)
            .float_only()
            .always_ftz()
            .quirk(Quirk::RangeLimited { limit: INF }),
        F::new("add", Binary(r::add))
            .code("+")
            .toward_zero(Binary(r::add_toward_zero)),
        F::new("subtract", Binary(r::subtract))
            .code("-")
            .toward_zero(Binary(r::subtract_toward_zero)),
        F::new("divide", Binary(r::divide))
            .code("/")
            .ulps(UlpTiers::new(2.5, 0.0, 3.0).with_relaxed(2.5, INF))
            .relaxed(Rx::Ulps, Binary(r::relaxed_divide))
            .toward_zero(Binary(r::divide_toward_zero)),
        F::new("divide_cr", Binary(r::divide))
            .code("/")
            .float_only()
            .quirk(Quirk::CorrectlyRounded),
        F::new("multiply", Binary(r::multiply))
            .code("*")
            .toward_zero(Binary(r::multiply_toward_zero)),
        F::new("assignment", Unary(r::assignment)).code(""),
        F::new("not", MacroUnary(r::not)).code("!"),
    ]
}

/// Every builtin known to the engine.
pub fn function_list() -> &'static [FunctionDescriptor] {
    static LIST: OnceLock<Vec<FunctionDescriptor>> = OnceLock::new();
    LIST.get_or_init(build_list)
}

/// Descriptor for `name`.
pub fn lookup(name: &str) -> Result<&'static FunctionDescriptor> {
    function_list()
        .iter()
        .find(|descriptor| descriptor.name == name)
        .ok_or_else(|| Error::UnknownFunction(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = function_list().iter().map(|f| f.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn lookup_reports_unknown_names() {
        assert_eq!(lookup("sin").map(|f| f.name).ok(), Some("sin"));
        assert!(matches!(lookup("sine"), Err(Error::UnknownFunction(_))));
    }

    #[test]
    fn ulp_tiers_follow_profile() {
        let sqrt = lookup("sqrt").unwrap();
        assert_eq!(sqrt.allowed_ulps(Precision::Float, false, false), 3.0);
        assert_eq!(sqrt.allowed_ulps(Precision::Float, false, true), 4.0);
        assert_eq!(sqrt.allowed_ulps(Precision::Double, false, false), 0.0);

        let sin = lookup("sin").unwrap();
        assert_eq!(sin.allowed_ulps(Precision::Float, true, false), RELAXED_TRIG_ABS_ERROR);
        assert_eq!(sin.allowed_ulps(Precision::Double, true, false), 4.0);

        // relaxed math does not apply to builtins without a relaxed rule
        let cbrt = lookup("cbrt").unwrap();
        assert_eq!(cbrt.allowed_ulps(Precision::Float, true, false), 2.0);
    }

    #[test]
    fn spelling_from_code_name() {
        assert_eq!(lookup("add").unwrap().spelling(), Spelling::Infix);
        assert_eq!(lookup("not").unwrap().spelling(), Spelling::Prefix);
        assert_eq!(lookup("assignment").unwrap().spelling(), Spelling::Assignment);
        assert_eq!(lookup("half_sin").unwrap().spelling(), Spelling::Call);
        assert_eq!(lookup("sqrt_cr").unwrap().code_name, "sqrt");
    }

    #[test]
    fn native_builtins_are_float_only() {
        let half_exp = lookup("half_exp").unwrap();
        assert!(half_exp.supports(Precision::Float));
        assert!(!half_exp.supports(Precision::Double));
        assert!(half_exp.effective_ftz(false, true));
        assert!(matches!(
            half_exp.reference(Precision::Double, false),
            Err(Error::MissingReference { .. })
        ));
    }

    #[test]
    fn relaxed_rules_shape_the_tolerance() {
        let relaxed = ToleranceMode {
            relaxed: true,
            ..ToleranceMode::default()
        };

        let exp = lookup("exp").unwrap().tolerance(Precision::Float, &relaxed, 2.6);
        assert_eq!(exp.bound, 8.0);
        assert!(exp.finite_only);

        let log = lookup("log").unwrap();
        let inside = log.tolerance(Precision::Float, &relaxed, 1.5);
        assert_eq!(inside.metric, crate::verify::Metric::Absolute);
        let outside = log.tolerance(Precision::Float, &relaxed, 10.0);
        assert_eq!(outside.metric, crate::verify::Metric::Ulp);
        assert_eq!(outside.bound, 3.0);

        let derived = ToleranceMode {
            fast_relaxed_derived: true,
            ..relaxed
        };
        let tan = lookup("tan").unwrap().tolerance(Precision::Float, &derived, 0.5);
        assert_eq!(tan.metric, crate::verify::Metric::Unchecked);

        let sinpi = lookup("sinpi").unwrap();
        assert_eq!(
            sinpi.tolerance(Precision::Float, &relaxed, 4.0).metric,
            crate::verify::Metric::Unchecked
        );

        // double never takes the relaxed rules
        let exp_double = lookup("exp").unwrap().tolerance(Precision::Double, &relaxed, 2.6);
        assert_eq!(exp_double.bound, 3.0);
        assert!(!exp_double.finite_only);
    }

    #[test]
    fn fdim_skips_only_without_inf_nan() {
        let fdim = lookup("fdim").unwrap();
        let plain = fdim.tolerance(Precision::Float, &ToleranceMode::default(), 1.0);
        assert!(!plain.finite_only);
        let mode = ToleranceMode {
            no_inf_nan: true,
            ..ToleranceMode::default()
        };
        let skipping = fdim.tolerance(Precision::Float, &mode, 1.0);
        assert!(skipping.finite_only && skipping.skip_overflow);
    }

    #[test]
    fn embedded_relaxed_divide_is_unbounded() {
        let divide = lookup("divide").unwrap();
        assert_eq!(divide.allowed_ulps(Precision::Float, true, false), 2.5);
        assert_eq!(divide.allowed_ulps(Precision::Float, true, true), INF);
        assert_eq!(divide.allowed_ulps(Precision::Float, false, true), 3.0);
    }

    #[test]
    fn round_toward_zero_swaps_arithmetic_references() {
        let rtz = ToleranceMode {
            rtz: true,
            embedded: true,
            ..ToleranceMode::default()
        };
        let (x, y) = (1.0, -2f64.powi(-100));
        let below_one = f64::from(f32::from_bits(0x3f7f_ffff));
        for (name, x, y, expected) in [
            ("add", x, y, below_one),
            ("subtract", x, -y, below_one),
            ("fdim", x, -y, below_one),
            ("divide", 1.0, 3.0, f64::from(f32::from_bits(0x3eaa_aaaa))),
        ] {
            let function = lookup(name).unwrap();
            let Ok(Reference::Binary(f)) = function.reference_in(Precision::Float, &rtz) else {
                panic!("{name} has no binary reference");
            };
            assert_eq!(f(x, y), expected, "{name}");

            // other precisions and round-to-nearest devices keep the regular reference
            let Ok(Reference::Binary(nearest)) = function.reference_in(Precision::Float, &ToleranceMode::default())
            else {
                panic!("{name} has no binary reference");
            };
            assert_ne!(nearest(x, y) as f32, expected as f32, "{name}");
            let Ok(Reference::Binary(double)) = function.reference_in(Precision::Double, &rtz) else {
                panic!("{name} has no binary reference");
            };
            assert_eq!(double(x, y), nearest(x, y), "{name}");
        }

        let Ok(Reference::UnaryTwoResults(fract)) = lookup("fract").unwrap().reference_in(Precision::Float, &rtz)
        else {
            panic!("fract has no two-result reference");
        };
        assert_eq!(fract(-2f64.powi(-100)), (below_one, -1.0));

        // modf is exact in every rounding mode
        let modf = lookup("modf").unwrap();
        assert!(matches!(
            modf.reference_in(Precision::Float, &rtz),
            Ok(Reference::UnaryTwoResults(f)) if f(2.75) == (0.75, 2.0)
        ));

        // relaxed divide keeps its relaxed reference
        let relaxed = ToleranceMode { relaxed: true, ..rtz };
        let Ok(Reference::Binary(f)) = lookup("divide").unwrap().reference_in(Precision::Float, &relaxed) else {
            panic!("divide has no binary reference");
        };
        assert_eq!(f(1.0, 3.0), r::relaxed_divide(1.0, 3.0));
    }

    #[test]
    fn signatures_cover_every_shape() {
        let shapes: Vec<Signature> = function_list().iter().map(|f| f.signature()).collect();
        for shape in [
            Signature::Unary,
            Signature::UnsignedUnary,
            Signature::IntUnary,
            Signature::Binary,
            Signature::BinaryInt,
            Signature::Ternary,
            Signature::UnaryTwoResults,
            Signature::UnaryIntResult,
            Signature::BinaryIntResult,
            Signature::MacroUnary,
            Signature::MacroBinary,
        ] {
            assert!(shapes.contains(&shape), "{shape:?}");
        }
    }
}
