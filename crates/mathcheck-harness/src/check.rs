//! Element verification
//!
//! Decodes the read-back buffers of a job and judges every element of every
//! vector width against the host reference. The reference is evaluated once
//! per element and shared by all widths.

use std::mem::size_of;

use mathcheck_core::{
    verify, verify_int, verify_macro, verify_with_int, FloatFormat, FunctionDescriptor, Job, MaxError, Outcome,
    Precision, Reference, Tolerance, ToleranceMode,
};
use mathcheck_device::ScalarType;

use crate::context::BufferPlan;
use crate::error::{Error, Failure, Observed, Result};

/// What the verifier needs to know about the function under test.
pub(crate) struct ElementCheck<'a> {
    pub function: &'static FunctionDescriptor,
    pub precision: Precision,
    pub reference: Reference,
    pub mode: &'a ToleranceMode,
    pub plan: &'a BufferPlan,
}

/// One element's arguments.
struct Element<'a, T> {
    job_id: u32,
    index: usize,
    args: &'a [T],
    wide: &'a [f64],
}

impl ElementCheck<'_> {
    /// Verify every element of `job`. `inputs` holds one buffer per kernel
    /// input; `outputs` is indexed `[width][output]`.
    pub fn check_job<T: FloatFormat>(
        &self,
        job: &Job,
        inputs: &[Vec<u8>],
        outputs: &[Vec<Vec<u8>>],
        max_error: &mut MaxError,
    ) -> Result<()> {
        let signature = self.reference.signature();
        let arity = signature.float_arity();
        let mut args: Vec<T> = Vec::with_capacity(arity);
        let mut wide: Vec<f64> = Vec::with_capacity(arity);

        for index in 0..job.element_count {
            args.clear();
            args.extend((0..arity).map(|k| load::<T>(&inputs[k], index)));
            wide.clear();
            wide.extend(args.iter().map(|x| x.to_f64()));

            let x = wide.first().copied().unwrap_or(0.0);
            let tolerance = self.function.tolerance(self.precision, self.mode, x);
            let element = Element {
                job_id: job.job_id,
                index,
                args: &args,
                wide: &wide,
            };

            match self.reference {
                Reference::Unary(f) => {
                    let expected = f(x);
                    self.each_float(&element, outputs, 0, expected, &tolerance, max_error, |a| f(a[0]))?;
                }
                Reference::Binary(f) => {
                    let expected = f(wide[0], wide[1]);
                    self.each_float(&element, outputs, 0, expected, &tolerance, max_error, |a| f(a[0], a[1]))?;
                }
                Reference::Ternary(f) => {
                    let expected = f(wide[0], wide[1], wide[2]);
                    self.each_float(&element, outputs, 0, expected, &tolerance, max_error, |a| {
                        f(a[0], a[1], a[2])
                    })?;
                }
                Reference::BinaryInt(f) => {
                    let n = load_int(ScalarType::Int, &inputs[1], index) as i32;
                    let expected = f(x, n);
                    let mut with_n = wide.clone();
                    with_n.push(f64::from(n));
                    let element = Element {
                        wide: &with_n,
                        ..element
                    };
                    self.each_float(&element, outputs, 0, expected, &tolerance, max_error, |a| f(a[0], n))?;
                }
                Reference::UnsignedUnary(f) => {
                    let bits = load_int(ScalarType::unsigned(self.precision), &inputs[0], index) as u64;
                    let expected = f(bits);
                    let wide = [bits as f64];
                    let element = Element {
                        wide: &wide,
                        ..element
                    };
                    self.each_float(&element, outputs, 0, expected, &tolerance, max_error, |_| expected)?;
                }
                Reference::UnaryTwoResults(f) => {
                    let (first, second) = f(x);
                    self.each_float(&element, outputs, 0, first, &tolerance, max_error, |a| f(a[0]).0)?;
                    self.each_float(&element, outputs, 1, second, &tolerance, max_error, |a| f(a[0]).1)?;
                }
                Reference::UnaryIntResult(f) => {
                    let expected = f(x);
                    self.each_float_int(&element, outputs, expected, &tolerance, max_error, |a| f(a[0]))?;
                }
                Reference::BinaryIntResult(f) => {
                    let expected = f(wide[0], wide[1]);
                    self.each_float_int(&element, outputs, expected, &tolerance, max_error, |a| f(a[0], a[1]))?;
                }
                Reference::IntUnary(f) => {
                    let expected = f(x);
                    for (w, out) in outputs.iter().enumerate() {
                        let test = load_int(self.plan.outputs[w][0], &out[0], index) as i32;
                        if !verify_int(test, args[0], expected, self.function.int_rule, tolerance.ftz, f) {
                            return Err(self.int_failure(&element, w, i64::from(expected), i64::from(test)));
                        }
                    }
                }
                Reference::MacroUnary(f) => {
                    let expected = f(x);
                    self.each_macro(&element, outputs, expected, tolerance.ftz, |a| f(a[0]))?;
                }
                Reference::MacroBinary(f) => {
                    let expected = f(wide[0], wide[1]);
                    self.each_macro(&element, outputs, expected, tolerance.ftz, |a| f(a[0], a[1]))?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn each_float<T, F>(
        &self,
        element: &Element<'_, T>,
        outputs: &[Vec<Vec<u8>>],
        slot: usize,
        expected: f64,
        tolerance: &Tolerance,
        max_error: &mut MaxError,
        oracle: F,
    ) -> Result<()>
    where
        T: FloatFormat,
        F: Fn(&[f64]) -> f64,
    {
        for (w, out) in outputs.iter().enumerate() {
            let test = load::<T>(&out[slot], element.index);
            let outcome = verify(test, element.args, expected, tolerance, &oracle);
            self.settle(element, w, outcome, test, expected, tolerance, max_error)?;
        }
        Ok(())
    }

    fn each_float_int<T, F>(
        &self,
        element: &Element<'_, T>,
        outputs: &[Vec<Vec<u8>>],
        expected: (f64, i32),
        tolerance: &Tolerance,
        max_error: &mut MaxError,
        oracle: F,
    ) -> Result<()>
    where
        T: FloatFormat,
        F: Fn(&[f64]) -> (f64, i32),
    {
        let rule = self.function.int_rule;
        for (w, out) in outputs.iter().enumerate() {
            let test = load::<T>(&out[0], element.index);
            let test_int = load_int(ScalarType::Int, &out[1], element.index) as i32;
            let outcome = verify_with_int((test, test_int), element.args, expected, tolerance, rule, &oracle);
            let side_ok = rule.matches(expected.1, test_int, element.wide);
            if !outcome.passed && !side_ok && tolerance.accepts(outcome.error) {
                return Err(self.int_failure(element, w, i64::from(expected.1), i64::from(test_int)));
            }
            self.settle(element, w, outcome, test, expected.0, tolerance, max_error)?;
            if !side_ok {
                // accepted through a flushed-input retry
                max_error.record_int(i64::from(test_int) - i64::from(expected.1));
            }
        }
        Ok(())
    }

    fn each_macro<T, F>(
        &self,
        element: &Element<'_, T>,
        outputs: &[Vec<Vec<u8>>],
        expected: bool,
        ftz: bool,
        oracle: F,
    ) -> Result<()>
    where
        T: FloatFormat,
        F: Fn(&[f64]) -> bool,
    {
        for (w, out) in outputs.iter().enumerate() {
            let vector = self.plan.widths[w] > 1;
            let test = load_int(self.plan.outputs[w][0], &out[0], element.index);
            if !verify_macro(test, element.args, expected, vector, ftz, &oracle) {
                let expected = mathcheck_core::macro_result(expected, vector);
                return Err(self.int_failure(element, w, expected, test));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn settle<T: FloatFormat>(
        &self,
        element: &Element<'_, T>,
        w: usize,
        outcome: Outcome,
        test: T,
        expected: f64,
        tolerance: &Tolerance,
        max_error: &mut MaxError,
    ) -> Result<()> {
        if outcome.passed {
            max_error.record(outcome.error, element.wide);
            return Ok(());
        }
        let failure = Failure {
            function: self.function.name.to_string(),
            precision: self.precision,
            vector_width: self.plan.widths[w],
            element: element.index,
            job_id: element.job_id,
            inputs: element.wide.to_vec(),
            expected: Observed::Float {
                value: expected,
                bits: T::from_f64(expected).raw_bits(),
            },
            actual: Observed::Float {
                value: test.to_f64(),
                bits: test.raw_bits(),
            },
            error: outcome.error,
            bound: tolerance.bound,
        };
        Err(self.report(failure))
    }

    fn int_failure<T>(&self, element: &Element<'_, T>, w: usize, expected: i64, actual: i64) -> Error {
        self.report(Failure {
            function: self.function.name.to_string(),
            precision: self.precision,
            vector_width: self.plan.widths[w],
            element: element.index,
            job_id: element.job_id,
            inputs: element.wide.to_vec(),
            expected: Observed::Int(expected),
            actual: Observed::Int(actual),
            error: 0.0,
            bound: 0.0,
        })
    }

    fn report(&self, failure: Failure) -> Error {
        tracing::error!(
            function = %failure.function,
            precision = %failure.precision,
            vector_width = failure.vector_width,
            element = failure.element,
            job_id = failure.job_id,
            expected = %failure.expected,
            actual = %failure.actual,
            ulps = failure.error,
            "result outside tolerance"
        );
        failure.into()
    }
}

fn load<T: FloatFormat>(buffer: &[u8], index: usize) -> T {
    let size = size_of::<T::Bits>();
    T::from_bits(bytemuck::pod_read_unaligned(&buffer[index * size..(index + 1) * size]))
}

/// Integer element of `ty`, sign extended (zero extended for unsigned types).
fn load_int(ty: ScalarType, buffer: &[u8], index: usize) -> i64 {
    let size = ty.size_bytes();
    let bytes = &buffer[index * size..(index + 1) * size];
    match ty {
        ScalarType::Short => i64::from(bytemuck::pod_read_unaligned::<i16>(bytes)),
        ScalarType::Int => i64::from(bytemuck::pod_read_unaligned::<i32>(bytes)),
        ScalarType::Long => bytemuck::pod_read_unaligned::<i64>(bytes),
        ScalarType::UShort | ScalarType::Half => i64::from(bytemuck::pod_read_unaligned::<u16>(bytes)),
        ScalarType::UInt | ScalarType::Float => i64::from(bytemuck::pod_read_unaligned::<u32>(bytes)),
        ScalarType::ULong | ScalarType::Double => bytemuck::pod_read_unaligned::<i64>(bytes),
    }
}
