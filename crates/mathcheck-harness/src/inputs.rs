//! Input generation
//!
//! Single-argument builtins sweep the bit-pattern domain: element `j` of a job
//! is pattern `base + j * scale` (64-bit formats map the 32-bit index through
//! [`double_from_u32`]). Builtins with more arguments start with the cross
//! product of the special-value tables, spread over the leading jobs, and fill
//! the rest with random bit patterns.

use std::f64::consts::PI;
use std::mem::size_of;

use mathcheck_core::{
    double_from_u32, specials_for, FloatFormat, FunctionDescriptor, Job, Precision, Signature, SpecialCursor,
    INT_SPECIALS,
};
use rand::rngs::StdRng;
use rand::Rng;

/// Builtins whose relaxed variants are only defined on `[-pi, pi]`.
const RELAXED_TRIG: [&str; 3] = ["sin", "cos", "sincos"];

/// How inputs for one function at one precision are produced.
#[derive(Debug, Clone)]
pub struct InputGenerator {
    signature: Signature,
    precision: Precision,
    /// Special values as raw bit patterns of the tested format.
    specials: Vec<u64>,
    /// Present for multi-argument signatures.
    cursor: Option<SpecialCursor>,
    /// Replace inputs outside `[-pi, pi]` by NaN.
    clamp_trig: bool,
}

impl InputGenerator {
    pub fn new(function: &FunctionDescriptor, precision: Precision, relaxed: bool) -> Self {
        let signature = function.signature();
        let specials = specials_for(precision);
        let cursor = match signature {
            Signature::BinaryInt => Some(SpecialCursor::new(&[specials.len(), INT_SPECIALS.len()])),
            s if s.float_arity() > 1 => Some(SpecialCursor::uniform(specials.len(), s.float_arity())),
            _ => None,
        };
        Self {
            signature,
            precision,
            specials,
            cursor,
            clamp_trig: relaxed && precision == Precision::Float && RELAXED_TRIG.contains(&function.name),
        }
    }

    /// Whether inputs come from a sweep rather than specials plus random values.
    pub fn is_sweep(&self) -> bool {
        self.cursor.is_none()
    }

    /// Number of leading jobs that carry special values.
    pub fn special_jobs(&self, elements: usize) -> u32 {
        self.cursor.as_ref().map_or(0, |cursor| cursor.special_job_count(elements))
    }

    /// Fill `buffers` (one per kernel input, `job.element_count` elements
    /// each) with the inputs of `job`.
    pub fn fill(&self, job: &Job, rng: &mut StdRng, buffers: &mut [Vec<u8>]) {
        match self.precision {
            Precision::Half => self.fill_typed::<mathcheck_core::f16>(job, rng, buffers),
            Precision::Float => self.fill_typed::<f32>(job, rng, buffers),
            Precision::Double => self.fill_typed::<f64>(job, rng, buffers),
        }
    }

    fn fill_typed<T: FloatFormat>(&self, job: &Job, rng: &mut StdRng, buffers: &mut [Vec<u8>]) {
        let n = job.element_count;
        let Some(cursor) = &self.cursor else {
            // Unsigned arguments share the float's width, so the sweep is
            // stored the same way.
            let x = &mut buffers[0];
            for j in 0..n {
                let mut raw = sweep_pattern::<T>(job.sweep_bits(j));
                if self.clamp_trig && T::from_raw_bits(raw).to_f64().abs() > PI {
                    raw = T::from_f64(f64::NAN).raw_bits();
                }
                store::<T>(x, j, raw);
            }
            return;
        };

        let mut filled = 0;
        for (slot, indices) in cursor.job_entries(job.job_id, n) {
            if self.signature == Signature::BinaryInt {
                store::<T>(&mut buffers[0], slot, self.specials[indices[0]]);
                store_int(&mut buffers[1], slot, INT_SPECIALS[indices[1]]);
            } else {
                for (buffer, &index) in buffers.iter_mut().zip(&indices) {
                    store::<T>(buffer, slot, self.specials[index]);
                }
            }
            filled = slot + 1;
        }

        for slot in filled..n {
            if self.signature == Signature::BinaryInt {
                store::<T>(&mut buffers[0], slot, rng.gen());
                store_int(&mut buffers[1], slot, rng.gen());
            } else {
                for buffer in buffers.iter_mut() {
                    store::<T>(buffer, slot, rng.gen());
                }
            }
        }
    }
}

/// Raw pattern of sweep index `bits` in format `T`.
pub fn sweep_pattern<T: FloatFormat>(bits: u32) -> u64 {
    match T::PRECISION {
        Precision::Double => double_from_u32(bits),
        _ => u64::from(bits),
    }
}

fn store<T: FloatFormat>(buffer: &mut [u8], index: usize, raw: u64) {
    let size = size_of::<T::Bits>();
    let bits = T::bits_from_u64(raw);
    buffer[index * size..(index + 1) * size].copy_from_slice(bytemuck::bytes_of(&bits));
}

fn store_int(buffer: &mut [u8], index: usize, value: i32) {
    buffer[index * 4..index * 4 + 4].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathcheck_core::{lookup, DomainPartition};
    use rand::SeedableRng;

    fn read_u32(buffer: &[u8]) -> Vec<u32> {
        buffer.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect()
    }

    fn job(partition: &DomainPartition, id: u32) -> Job {
        partition.job(id).unwrap()
    }

    #[test]
    fn unary_float_sweeps_with_scale() {
        let generator = InputGenerator::new(lookup("exp").unwrap(), Precision::Float, false);
        assert!(generator.is_sweep());
        let partition = DomainPartition::new(4, 64, 1, 3, 32).unwrap();
        let job = job(&partition, 2);
        let mut buffers = vec![vec![0u8; 64]];
        generator.fill(&job, &mut StdRng::seed_from_u64(0), &mut buffers);

        let values = read_u32(&buffers[0]);
        assert_eq!(values[0], 2 * 16 * 3);
        assert_eq!(values[5], 2 * 16 * 3 + 15);
    }

    #[test]
    fn double_sweep_spreads_bits() {
        assert_eq!(sweep_pattern::<f64>(0xffff_ffff), 0xffff_f000_0000_0fff);
        assert_eq!(sweep_pattern::<f32>(0x1234), 0x1234);
    }

    #[test]
    fn relaxed_sin_masks_large_inputs() {
        let generator = InputGenerator::new(lookup("sin").unwrap(), Precision::Float, true);
        let job = Job {
            job_id: 0,
            base: 4.0f32.to_bits() as u64,
            element_count: 2,
            step: 2,
            scale: 1,
        };
        let mut buffers = vec![vec![0u8; 8]];
        generator.fill(&job, &mut StdRng::seed_from_u64(0), &mut buffers);
        assert!(read_u32(&buffers[0]).iter().all(|&bits| f32::from_bits(bits).is_nan()));

        let strict = InputGenerator::new(lookup("sin").unwrap(), Precision::Float, false);
        strict.fill(&job, &mut StdRng::seed_from_u64(0), &mut buffers);
        assert_eq!(f32::from_bits(read_u32(&buffers[0])[0]), 4.0);
    }

    #[test]
    fn binary_starts_with_special_cross_product() {
        let generator = InputGenerator::new(lookup("pow").unwrap(), Precision::Float, false);
        let specials = specials_for(Precision::Float);
        let elements = 1024;
        let mut seen = 0usize;

        for job_id in 0..generator.special_jobs(elements) {
            let job = Job {
                job_id,
                base: u64::from(job_id) * elements as u64,
                element_count: elements,
                step: elements as u64,
                scale: 1,
            };
            let mut buffers = vec![vec![0u8; elements * 4], vec![0u8; elements * 4]];
            generator.fill(&job, &mut StdRng::seed_from_u64(1), &mut buffers);
            let (x, y) = (read_u32(&buffers[0]), read_u32(&buffers[1]));
            for slot in 0..elements {
                let linear = job_id as usize * elements + slot;
                if linear >= specials.len() * specials.len() {
                    break;
                }
                assert_eq!(u64::from(x[slot]), specials[linear % specials.len()]);
                assert_eq!(u64::from(y[slot]), specials[linear / specials.len()]);
                seen += 1;
            }
        }
        assert_eq!(seen, specials.len() * specials.len());
    }

    #[test]
    fn binary_int_pairs_float_and_int_specials() {
        let generator = InputGenerator::new(lookup("ldexp").unwrap(), Precision::Double, false);
        let job = Job {
            job_id: 0,
            base: 0,
            element_count: 8,
            step: 8,
            scale: 1,
        };
        let mut buffers = vec![vec![0u8; 64], vec![0u8; 32]];
        generator.fill(&job, &mut StdRng::seed_from_u64(2), &mut buffers);

        let x: Vec<u64> = buffers[0].chunks_exact(8).map(bytemuck::pod_read_unaligned).collect();
        let n: Vec<i32> = buffers[1].chunks_exact(4).map(bytemuck::pod_read_unaligned).collect();
        let specials = specials_for(Precision::Double);
        assert_eq!(x[1], specials[1]);
        assert!(n.iter().all(|&v| v == INT_SPECIALS[0]));
    }

    #[test]
    fn random_tail_is_reproducible() {
        let generator = InputGenerator::new(lookup("fma").unwrap(), Precision::Float, false);
        let job = Job {
            job_id: u32::MAX / 2,
            base: 0,
            element_count: 16,
            step: 16,
            scale: 1,
        };
        let fill = |seed| {
            let mut buffers = vec![vec![0u8; 64]; 3];
            generator.fill(&job, &mut StdRng::seed_from_u64(seed), &mut buffers);
            buffers
        };
        assert_eq!(fill(3), fill(3));
        assert_ne!(fill(3), fill(4));
    }

    #[test]
    fn half_sweep_uses_sixteen_bit_patterns() {
        let generator = InputGenerator::new(lookup("exp").unwrap(), Precision::Half, false);
        let job = Job {
            job_id: 0,
            base: 0x3c00,
            element_count: 2,
            step: 2,
            scale: 1,
        };
        let mut buffers = vec![vec![0u8; 4]];
        generator.fill(&job, &mut StdRng::seed_from_u64(0), &mut buffers);
        let values: Vec<u16> = buffers[0].chunks_exact(2).map(bytemuck::pod_read_unaligned).collect();
        assert_eq!(values, vec![0x3c00, 0x3c01]);
    }
}
