//! Domain partitioning
//!
//! The input domain (2^32 bit patterns, or 2^16 for unary half sweeps) is cut
//! into jobs. Each job owns a contiguous slice `[base, base + step)` that it
//! samples every `scale` patterns, so that with `scale == 1` the jobs tile the
//! domain exactly. Multi-argument signatures additionally walk the cross
//! product of the special-value tables through the first few jobs, see
//! [`SpecialCursor`].

use crate::error::{Error, Result};
use std::fmt;

/// Bytes of input per argument shared by all workers.
pub const BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Stride multiplier used for embedded profile devices.
pub const EMBEDDED_REDUCTION_FACTOR: u32 = 64;

/// Default reduction factor in wimpy mode.
pub const DEFAULT_WIMPY_REDUCTION_FACTOR: u32 = 32;

/// Largest reduction factor accepted in wimpy mode.
pub const MAX_WIMPY_REDUCTION_FACTOR: u32 = 512;

/// Stride between consecutive tested patterns.
///
/// Wimpy mode samples `type_size * 2 * reduction` apart, the embedded profile
/// uses [`EMBEDDED_REDUCTION_FACTOR`] and the full run tests every pattern.
pub fn test_scale(type_size: usize, wimpy_reduction: Option<u32>, embedded: bool) -> u32 {
    match wimpy_reduction {
        Some(reduction) => (type_size as u32).saturating_mul(2).saturating_mul(reduction),
        None if embedded => EMBEDDED_REDUCTION_FACTOR,
        None => 1,
    }
}

/// One independently schedulable slice of the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    /// Index of this job in `0..job_count`
    pub job_id: u32,
    /// First bit pattern owned by the job (`job_id * step`)
    pub base: u64,
    /// Number of elements generated for the job
    pub element_count: usize,
    /// Distance between consecutive job bases
    pub step: u64,
    /// Distance between consecutive patterns inside the job
    pub scale: u32,
}

impl Job {
    /// Sweep pattern for element `index`, wrapped to 32 bits.
    pub fn sweep_bits(&self, index: usize) -> u32 {
        self.base.wrapping_add((index as u64).wrapping_mul(u64::from(self.scale))) as u32
    }

    /// Whether progress should be reported after this job.
    pub fn reports_progress(&self) -> bool {
        self.base & 0x0fff_ffff == 0
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} (base {:#x}, step {}, scale {}, {} elements)",
            self.job_id, self.base, self.step, self.scale, self.element_count
        )
    }
}

/// Fixed partition of a domain into jobs.
///
/// # Example
///
/// ```rust
/// use mathcheck_core::{DomainPartition, BUFFER_SIZE};
///
/// // float inputs, four workers, every pattern of a 32-bit domain
/// let partition = DomainPartition::new(4, BUFFER_SIZE, 4, 1, 32).unwrap();
/// assert_eq!(partition.buffer_elements(), 1 << 17);
/// assert_eq!(partition.job_count(), 1 << 15);
///
/// let second = partition.job(1).unwrap();
/// assert_eq!(second.base, 1 << 17);
/// assert!(partition.job(partition.job_count()).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainPartition {
    buffer_elements: usize,
    scale: u32,
    step: u64,
    job_count: u32,
}

impl DomainPartition {
    /// Plan a partition.
    ///
    /// `buffer_elements = buffer_bytes / (element_size * next_pow2(workers))`
    /// and `step = buffer_elements * scale`. A step that does not fit in 32
    /// bits collapses the run into a single job; otherwise the domain of
    /// `2^domain_bits` patterns is divided by the step (at least one job).
    pub fn new(element_size: usize, buffer_bytes: usize, workers: usize, scale: u32, domain_bits: u32) -> Result<Self> {
        if element_size == 0 {
            return Err(Error::invalid_partition("element size must be non-zero"));
        }
        if workers == 0 {
            return Err(Error::invalid_partition("worker count must be non-zero"));
        }
        if scale == 0 {
            return Err(Error::invalid_partition("scale must be non-zero"));
        }
        if domain_bits == 0 || domain_bits > 32 {
            return Err(Error::invalid_partition(format!("domain of 2^{domain_bits} patterns")));
        }

        let divisor = element_size
            .checked_mul(workers.next_power_of_two())
            .ok_or_else(|| Error::invalid_partition("worker count overflows the buffer divisor"))?;
        let buffer_elements = buffer_bytes / divisor;
        if buffer_elements == 0 {
            return Err(Error::invalid_partition(format!(
                "{buffer_bytes} bytes cannot hold one {element_size}-byte element for {workers} workers"
            )));
        }

        let step = (buffer_elements as u64) * u64::from(scale);
        let job_count = if step > u64::from(u32::MAX) {
            1
        } else {
            ((1u64 << domain_bits) / step).max(1) as u32
        };

        tracing::debug!(buffer_elements, scale, step, job_count, domain_bits, "partition_planned");

        Ok(Self {
            buffer_elements,
            scale,
            step,
            job_count,
        })
    }

    /// Elements per job and per worker buffer.
    pub fn buffer_elements(&self) -> usize {
        self.buffer_elements
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn job_count(&self) -> u32 {
        self.job_count
    }

    /// Job descriptor for `job_id`, or `None` past the end.
    pub fn job(&self, job_id: u32) -> Option<Job> {
        (job_id < self.job_count).then(|| Job {
            job_id,
            base: u64::from(job_id) * self.step,
            element_count: self.buffer_elements,
            step: self.step,
            scale: self.scale,
        })
    }

    /// All jobs in order.
    pub fn jobs(&self) -> impl Iterator<Item = Job> + '_ {
        (0..self.job_count).filter_map(move |id| self.job(id))
    }
}

/// Row-major walk over the cross product of per-argument special tables.
///
/// Linear index `L` maps to the mixed-radix digits of `L` with the first
/// argument varying fastest (`x = L % N0`, `y = (L / N0) % N1`,
/// `z = L / (N0 * N1)`). Job `j` starts at `L = j * elements`, so every
/// combination is produced by exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialCursor {
    radices: Vec<usize>,
    combinations: usize,
}

impl SpecialCursor {
    /// Cursor over tables of the given lengths (one per argument).
    pub fn new(radices: &[usize]) -> Self {
        let combinations = if radices.is_empty() {
            0
        } else {
            radices.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n)).unwrap_or(usize::MAX)
        };
        Self {
            radices: radices.to_vec(),
            combinations,
        }
    }

    /// Cursor over the same table used for each of `arity` arguments.
    pub fn uniform(table_len: usize, arity: usize) -> Self {
        Self::new(&vec![table_len; arity])
    }

    /// Total number of combinations.
    pub fn combinations(&self) -> usize {
        self.combinations
    }

    /// Number of leading jobs that carry special values.
    pub fn special_job_count(&self, elements: usize) -> u32 {
        if self.combinations == 0 || elements == 0 {
            0
        } else {
            ((self.combinations - 1) / elements + 1) as u32
        }
    }

    /// Whether `job_id` starts with special values.
    pub fn covers(&self, job_id: u32, elements: usize) -> bool {
        job_id < self.special_job_count(elements)
    }

    /// Per-argument table indices of combination `linear`.
    pub fn indices(&self, linear: usize) -> Option<Vec<usize>> {
        if linear >= self.combinations {
            return None;
        }
        let mut rest = linear;
        let mut digits = Vec::with_capacity(self.radices.len());
        for (position, &radix) in self.radices.iter().enumerate() {
            if position + 1 == self.radices.len() {
                digits.push(rest);
            } else {
                digits.push(rest % radix);
                rest /= radix;
            }
        }
        Some(digits)
    }

    /// Combinations written into job `job_id`: `(slot, indices)` pairs for the
    /// leading slots of the job's buffer.
    pub fn job_entries(&self, job_id: u32, elements: usize) -> impl Iterator<Item = (usize, Vec<usize>)> + '_ {
        let start = (job_id as usize).saturating_mul(elements);
        let end = start.saturating_add(elements).min(self.combinations);
        (start..end.max(start)).filter_map(move |linear| self.indices(linear).map(|idx| (linear - start, idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_float_geometry() {
        let partition = DomainPartition::new(4, BUFFER_SIZE, 8, 1, 32).unwrap();
        assert_eq!(partition.buffer_elements(), 65536);
        assert_eq!(partition.step(), 65536);
        assert_eq!(partition.job_count(), 65536);
    }

    #[test]
    fn worker_count_rounds_up_to_power_of_two() {
        let six = DomainPartition::new(4, BUFFER_SIZE, 6, 1, 32).unwrap();
        let eight = DomainPartition::new(4, BUFFER_SIZE, 8, 1, 32).unwrap();
        assert_eq!(six.buffer_elements(), eight.buffer_elements());
    }

    #[test]
    fn overflowing_step_collapses_to_one_job() {
        let partition = DomainPartition::new(1, BUFFER_SIZE, 1, 1 << 12, 32).unwrap();
        assert!(partition.step() > u64::from(u32::MAX));
        assert_eq!(partition.job_count(), 1);
    }

    #[test]
    fn half_domain_has_at_least_one_job() {
        let scale = test_scale(2, Some(DEFAULT_WIMPY_REDUCTION_FACTOR), false);
        let partition = DomainPartition::new(2, BUFFER_SIZE, 4, scale, 16).unwrap();
        assert_eq!(partition.job_count(), 1);
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(DomainPartition::new(0, BUFFER_SIZE, 1, 1, 32).is_err());
        assert!(DomainPartition::new(4, BUFFER_SIZE, 0, 1, 32).is_err());
        assert!(DomainPartition::new(4, 2, 1, 1, 32).is_err());
        assert!(DomainPartition::new(4, BUFFER_SIZE, 1, 0, 32).is_err());
    }

    #[test]
    fn scales() {
        assert_eq!(test_scale(4, None, false), 1);
        assert_eq!(test_scale(4, None, true), EMBEDDED_REDUCTION_FACTOR);
        assert_eq!(test_scale(4, Some(32), false), 256);
        assert_eq!(test_scale(8, Some(32), true), 512);
    }

    #[test]
    fn unit_scale_jobs_tile_the_domain() {
        let partition = DomainPartition::new(2, 256, 2, 1, 12).unwrap();
        let mut seen = HashSet::new();
        for job in partition.jobs() {
            for index in 0..job.element_count {
                assert!(seen.insert(job.sweep_bits(index)), "pattern tested twice");
            }
        }
        assert_eq!(seen.len(), 1 << 12);
        assert!(seen.iter().all(|&bits| bits < (1 << 12)));
    }

    #[test]
    fn progress_fires_on_2_pow_28_boundaries() {
        let partition = DomainPartition::new(4, BUFFER_SIZE, 1, 1, 32).unwrap();
        let reporting: Vec<u32> = partition
            .jobs()
            .filter(|job| job.reports_progress())
            .map(|job| job.job_id)
            .collect();
        assert_eq!(reporting.len(), 16);
        assert_eq!(reporting[1], (1 << 28) / 524288);
    }

    #[test]
    fn cross_product_is_emitted_exactly_once() {
        let cursor = SpecialCursor::uniform(7, 3);
        let elements = 10;
        let mut seen = HashSet::new();
        for job_id in 0..cursor.special_job_count(elements) {
            for (slot, indices) in cursor.job_entries(job_id, elements) {
                assert!(slot < elements);
                assert!(seen.insert(indices));
            }
        }
        assert_eq!(seen.len(), 343);
        assert!(cursor.job_entries(cursor.special_job_count(elements), elements).next().is_none());
    }

    #[test]
    fn mixed_radix_digits() {
        let cursor = SpecialCursor::new(&[4, 3]);
        assert_eq!(cursor.indices(0), Some(vec![0, 0]));
        assert_eq!(cursor.indices(5), Some(vec![1, 1]));
        assert_eq!(cursor.indices(11), Some(vec![3, 2]));
        assert_eq!(cursor.indices(12), None);
    }

    #[test]
    fn four_special_jobs_for_4080_combinations() {
        let cursor = SpecialCursor::new(&[80, 51]);
        assert_eq!(cursor.combinations(), 4080);
        assert_eq!(cursor.special_job_count(1024), 4);
        assert!(cursor.covers(3, 1024));
        assert!(!cursor.covers(4, 1024));

        for job_id in 0..4u32 {
            let linear = job_id as usize * 1024;
            let (slot, first) = cursor.job_entries(job_id, 1024).next().unwrap();
            assert_eq!(slot, 0);
            assert_eq!(first, vec![linear % 80, linear / 80]);
        }
        assert_eq!(cursor.job_entries(3, 1024).count(), 4080 - 3 * 1024);
    }
}
