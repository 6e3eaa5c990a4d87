//! Kernel emulation
//!
//! The host device runs a generated kernel by evaluating the builtin's
//! reference in `f64` for every element and rounding to the kernel's type,
//! so a correct run is bit exact. Work item coverage follows the generated
//! source, including the width 3 tail that handles only `2 - (i & 1)`
//! elements.

use std::mem::size_of;

use mathcheck_core::{f16, macro_result, FloatFormat, Precision, Reference, ToleranceMode};

use crate::device::{KernelSpec, ScalarType};
use crate::error::{DeviceError, Result};
use crate::kernel_source::layout;

/// A built program as the host device sees it.
#[derive(Debug, Clone)]
pub(crate) struct HostProgram {
    pub(crate) spec: KernelSpec,
    /// Single precision denormals are flushed on input and output.
    pub(crate) ftz: bool,
    /// Single precision arithmetic rounds toward zero.
    pub(crate) toward_zero: bool,
}

/// Deliberate error injected into one element of every launch of a builtin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub function: String,
    /// Element index within the launch.
    pub element: usize,
    /// Distance added to the first output, in units of its last place (or
    /// plain integer steps for integer results).
    pub ulps: i64,
}

impl Fault {
    pub fn new(function: impl Into<String>, element: usize, ulps: i64) -> Self {
        Self {
            function: function.into(),
            element,
            ulps,
        }
    }

    fn hits(&self, spec: &KernelSpec, element: usize) -> bool {
        self.element == element && self.function == spec.function.name
    }
}

/// Elements covered by `global_size` work items of `width`.
pub(crate) fn element_count(width: u32, global_size: usize) -> usize {
    match (width, global_size) {
        (_, 0) => 0,
        (3, n) => {
            let last = n - 1;
            3 * last + if last & 1 == 0 { 2 } else { 1 }
        }
        (w, n) => n * w as usize,
    }
}

/// Result of one element before it is stored.
enum Lane {
    Float(f64),
    FloatPair(f64, f64),
    FloatInt(f64, i32),
    Int(i64),
}

pub(crate) fn execute(
    program: &HostProgram,
    fault: Option<&Fault>,
    outputs: &mut [Vec<u8>],
    inputs: &[&[u8]],
    global_size: usize,
) -> Result<()> {
    match program.spec.precision {
        Precision::Half => run::<f16>(program, fault, outputs, inputs, global_size),
        Precision::Float => run::<f32>(program, fault, outputs, inputs, global_size),
        Precision::Double => run::<f64>(program, fault, outputs, inputs, global_size),
    }
}

fn run<T: FloatFormat>(
    program: &HostProgram,
    fault: Option<&Fault>,
    outputs: &mut [Vec<u8>],
    inputs: &[&[u8]],
    global_size: usize,
) -> Result<()> {
    let spec = program.spec;
    let mode = ToleranceMode {
        rtz: program.toward_zero,
        ..ToleranceMode::default()
    };
    let reference = spec
        .function
        .reference_in(spec.precision, &mode)
        .map_err(|e| DeviceError::execution_error(e.to_string()))?;
    let layout = layout(spec.function.signature(), spec.precision, spec.vector_width);
    if outputs.len() != layout.outputs.len() || inputs.len() != layout.inputs.len() {
        return Err(DeviceError::invalid_launch(format!(
            "{} expects {} outputs and {} inputs, got {} and {}",
            spec.kernel_name(),
            layout.outputs.len(),
            layout.inputs.len(),
            outputs.len(),
            inputs.len()
        )));
    }

    let count = element_count(spec.vector_width, global_size);
    let buffers = outputs.iter().map(Vec::len).chain(inputs.iter().map(|b| b.len()));
    for (ty, len) in layout.arguments().zip(buffers) {
        let size = count * ty.size_bytes();
        if size > len {
            return Err(DeviceError::BufferOutOfBounds {
                offset: 0,
                size,
                buffer_size: len,
            });
        }
    }

    let flush_denormals = program.ftz && T::PRECISION == Precision::Float;
    let flush = |x: T| if flush_denormals { x.flush_to_zero() } else { x };
    let vector = spec.vector_width > 1;

    for e in 0..count {
        let x = |k: usize| flush(load_float::<T>(inputs[k], e)).to_f64();

        let lane = match reference {
            Reference::Unary(f) => Lane::Float(f(x(0))),
            Reference::UnsignedUnary(f) => Lane::Float(f(load_unsigned(layout.inputs[0], inputs[0], e))),
            Reference::IntUnary(f) => Lane::Int(i64::from(f(x(0)))),
            Reference::Binary(f) => Lane::Float(f(x(0), x(1))),
            Reference::BinaryInt(f) => Lane::Float(f(x(0), load_int(inputs[1], e))),
            Reference::Ternary(f) => Lane::Float(f(x(0), x(1), x(2))),
            Reference::UnaryTwoResults(f) => {
                let (a, b) = f(x(0));
                Lane::FloatPair(a, b)
            }
            Reference::UnaryIntResult(f) => {
                let (a, n) = f(x(0));
                Lane::FloatInt(a, n)
            }
            Reference::BinaryIntResult(f) => {
                let (a, n) = f(x(0), x(1));
                Lane::FloatInt(a, n)
            }
            Reference::MacroUnary(f) => Lane::Int(macro_result(f(x(0)), vector)),
            Reference::MacroBinary(f) => Lane::Int(macro_result(f(x(0), x(1)), vector)),
        };

        let skew = fault.filter(|f| f.hits(&spec, e)).map_or(0, |f| f.ulps);
        let round = |value: f64, skew: i64| {
            let rounded = flush(T::from_f64(value));
            if skew == 0 {
                rounded
            } else {
                T::from_raw_bits(rounded.raw_bits().wrapping_add(skew as u64))
            }
        };

        match lane {
            Lane::Float(value) => store_float(&mut outputs[0], e, round(value, skew)),
            Lane::FloatPair(a, b) => {
                store_float(&mut outputs[0], e, round(a, skew));
                store_float(&mut outputs[1], e, round(b, 0));
            }
            Lane::FloatInt(a, n) => {
                store_float(&mut outputs[0], e, round(a, skew));
                store_int(ScalarType::Int, &mut outputs[1], e, i64::from(n));
            }
            Lane::Int(value) => store_int(layout.outputs[0], &mut outputs[0], e, value + skew),
        }
    }

    tracing::trace!(
        kernel = %spec.kernel_name(),
        function = spec.function.name,
        elements = count,
        ftz = flush_denormals,
        "host launch complete"
    );
    Ok(())
}

fn load_float<T: FloatFormat>(buffer: &[u8], index: usize) -> T {
    let size = size_of::<T::Bits>();
    T::from_bits(bytemuck::pod_read_unaligned(&buffer[index * size..(index + 1) * size]))
}

fn store_float<T: FloatFormat>(buffer: &mut [u8], index: usize, value: T) {
    let size = size_of::<T::Bits>();
    buffer[index * size..(index + 1) * size].copy_from_slice(bytemuck::bytes_of(&value.to_bits()));
}

fn load_int(buffer: &[u8], index: usize) -> i32 {
    bytemuck::pod_read_unaligned(&buffer[index * 4..index * 4 + 4])
}

fn load_unsigned(ty: ScalarType, buffer: &[u8], index: usize) -> u64 {
    let size = ty.size_bytes();
    let bytes = &buffer[index * size..(index + 1) * size];
    match size {
        2 => u64::from(bytemuck::pod_read_unaligned::<u16>(bytes)),
        4 => u64::from(bytemuck::pod_read_unaligned::<u32>(bytes)),
        _ => bytemuck::pod_read_unaligned::<u64>(bytes),
    }
}

fn store_int(ty: ScalarType, buffer: &mut [u8], index: usize, value: i64) {
    let size = ty.size_bytes();
    let slot = &mut buffer[index * size..(index + 1) * size];
    match size {
        2 => slot.copy_from_slice(&(value as i16).to_ne_bytes()),
        4 => slot.copy_from_slice(&(value as i32).to_ne_bytes()),
        _ => slot.copy_from_slice(&value.to_ne_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathcheck_core::lookup;

    fn program(name: &str, precision: Precision, width: u32, ftz: bool) -> HostProgram {
        HostProgram {
            spec: KernelSpec::new(lookup(name).unwrap(), precision, width),
            ftz,
            toward_zero: false,
        }
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn read_floats(bytes: &[u8]) -> Vec<f32> {
        bytes.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect()
    }

    #[test]
    fn width_three_tail_coverage() {
        // 8 elements: items 0 and 1 take 3 each, item 2 (even) takes 2.
        assert_eq!(element_count(3, 3), 8);
        // 4 elements: item 1 (odd) takes 1.
        assert_eq!(element_count(3, 2), 4);
        assert_eq!(element_count(4, 2), 8);
        assert_eq!(element_count(1, 0), 0);
    }

    #[test]
    fn unary_results_are_correctly_rounded() {
        let input = floats(&[0.0, 0.5, 1.0, 2.0]);
        let mut outputs = vec![vec![0u8; 16]];
        execute(&program("exp", Precision::Float, 1, false), None, &mut outputs, &[&input], 4).unwrap();
        let expected: Vec<f32> = [0.0f64, 0.5, 1.0, 2.0]
            .iter()
            .map(|&x| mathcheck_core::reference::exp(x) as f32)
            .collect();
        assert_eq!(read_floats(&outputs[0]), expected);
    }

    #[test]
    fn toward_zero_truncates_arithmetic() {
        let x = floats(&[1.0, 1.0, -1.0]);
        let y = floats(&[3.0, -3.0, 3.0]);
        let truncating = HostProgram {
            toward_zero: true,
            ..program("divide", Precision::Float, 1, false)
        };

        let mut outputs = vec![vec![0u8; 12]];
        execute(&truncating, None, &mut outputs, &[&x, &y], 3).unwrap();
        let bits: Vec<u32> = read_floats(&outputs[0]).iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, [0x3eaa_aaaa, 0xbeaa_aaaa, 0xbeaa_aaaa]);

        let mut outputs = vec![vec![0u8; 12]];
        execute(&program("divide", Precision::Float, 1, false), None, &mut outputs, &[&x, &y], 3).unwrap();
        assert_eq!(read_floats(&outputs[0])[0].to_bits(), 0x3eaa_aaab);

        // builtins without a truncating reference are unchanged
        let input = floats(&[0.5]);
        let mut outputs = vec![vec![0u8; 4]];
        let exp = HostProgram {
            toward_zero: true,
            ..program("exp", Precision::Float, 1, false)
        };
        execute(&exp, None, &mut outputs, &[&input], 1).unwrap();
        assert_eq!(read_floats(&outputs[0])[0], mathcheck_core::reference::exp(0.5) as f32);
    }

    #[test]
    fn ftz_flushes_inputs_and_outputs() {
        let tiny = f32::from_bits(1);
        let input = floats(&[tiny]);
        let mut outputs = vec![vec![0xffu8; 4]];
        execute(&program("assignment", Precision::Float, 1, true), None, &mut outputs, &[&input], 1).unwrap();
        assert_eq!(read_floats(&outputs[0])[0].to_bits(), 0);

        let mut outputs = vec![vec![0xffu8; 4]];
        execute(&program("assignment", Precision::Float, 1, false), None, &mut outputs, &[&input], 1).unwrap();
        assert_eq!(read_floats(&outputs[0])[0].to_bits(), 1);
    }

    #[test]
    fn fault_skews_one_element() {
        let input = floats(&[1.0, 1.0]);
        let mut outputs = vec![vec![0u8; 8]];
        let fault = Fault::new("assignment", 1, 3);
        execute(&program("assignment", Precision::Float, 1, false), Some(&fault), &mut outputs, &[&input], 2).unwrap();
        let values = read_floats(&outputs[0]);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1].to_bits(), 1.0f32.to_bits() + 3);
    }

    #[test]
    fn vector_relational_is_minus_one() {
        let input = floats(&[f32::NAN, 1.0]);
        let mut outputs = vec![vec![0u8; 8]];
        execute(&program("isnan", Precision::Float, 2, false), None, &mut outputs, &[&input], 1).unwrap();
        let values: Vec<i32> = outputs[0].chunks_exact(4).map(bytemuck::pod_read_unaligned).collect();
        assert_eq!(values, vec![-1, 0]);

        let mut outputs = vec![vec![0u8; 8]];
        execute(&program("isnan", Precision::Float, 1, false), None, &mut outputs, &[&input], 2).unwrap();
        let values: Vec<i32> = outputs[0].chunks_exact(4).map(bytemuck::pod_read_unaligned).collect();
        assert_eq!(values, vec![1, 0]);
    }

    #[test]
    fn odd_tail_item_writes_one_element() {
        let input = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut outputs = vec![vec![0u8; 24]];
        outputs[0][16..].fill(0xff);
        // Item 1 is odd and writes only element 3.
        execute(&program("assignment", Precision::Float, 3, false), None, &mut outputs, &[&input], 2).unwrap();
        let values = read_floats(&outputs[0]);
        assert_eq!(&values[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values[4].to_bits(), u32::MAX);
        assert_eq!(values[5].to_bits(), u32::MAX);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let input = floats(&[1.0]);
        let mut outputs = vec![vec![0u8; 16]];
        let result = execute(&program("sin", Precision::Float, 4, false), None, &mut outputs, &[&input], 1);
        assert!(matches!(result, Err(DeviceError::BufferOutOfBounds { buffer_size: 4, .. })));
    }

    #[test]
    fn argument_count_is_checked() {
        let input = floats(&[1.0]);
        let mut outputs = vec![vec![0u8; 4]];
        let result = execute(&program("atan2", Precision::Float, 1, false), None, &mut outputs, &[&input], 1);
        assert!(matches!(result, Err(DeviceError::InvalidLaunchConfig(_))));
    }

    #[test]
    fn frexp_writes_both_outputs() {
        let input = floats(&[8.0]);
        let mut outputs = vec![vec![0u8; 4], vec![0u8; 4]];
        execute(&program("frexp", Precision::Float, 1, false), None, &mut outputs, &[&input], 1).unwrap();
        assert_eq!(read_floats(&outputs[0]), vec![0.5]);
        assert_eq!(bytemuck::pod_read_unaligned::<i32>(&outputs[1]), 4);
    }

    #[test]
    fn half_kernels_round_to_half() {
        let input = f16::from_f32(2.0).to_bits().to_ne_bytes().to_vec();
        let mut outputs = vec![vec![0u8; 2]];
        execute(&program("sqrt", Precision::Half, 1, false), None, &mut outputs, &[&input], 1).unwrap();
        let bits: u16 = bytemuck::pod_read_unaligned(&outputs[0]);
        assert_eq!(bits, f16::from_f64(std::f64::consts::SQRT_2).to_bits());
    }
}
