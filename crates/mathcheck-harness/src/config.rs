//! Run configuration
//!
//! One explicit [`TestConfig`] value is threaded through every run. It can be
//! built from defaults, from the environment, or by the `mathcheck` binary
//! from its command line.

use std::env;

use mathcheck_core::partition::{DEFAULT_WIMPY_REDUCTION_FACTOR, MAX_WIMPY_REDUCTION_FACTOR};
use mathcheck_core::{Precision, BUFFER_SIZE};
use mathcheck_device::VECTOR_WIDTHS;

use crate::error::{Error, Result};

/// Options for a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    /// Sample the domain instead of sweeping it.
    pub wimpy: bool,
    /// Stride multiplier in wimpy mode, 1..=512.
    pub wimpy_reduction: u32,
    /// Build with `-cl-denorms-are-zero` and accept flushed results.
    pub force_ftz: bool,
    /// Also test the relaxed-math variants.
    pub relaxed: bool,
    /// Relaxed builtins derived from others are left unchecked.
    pub fast_relaxed_derived: bool,
    /// Poison output buffers with a host write rather than a device fill.
    pub host_fill: bool,
    /// Log the job geometry of every function.
    pub verbose: bool,
    pub vector_widths: Vec<u32>,
    /// Worker count; 0 means one per available core.
    pub threads: usize,
    /// Seed for the random inputs of multi-argument builtins.
    pub seed: u64,
    /// Force embedded profile tolerances and stride.
    pub embedded: bool,
    /// Launch kernels without verifying (timing only).
    pub skip_correctness: bool,
    /// Stop the run at the first failing function.
    pub stop_on_error: bool,
    /// Bytes of input per argument shared by all workers.
    pub buffer_size: usize,
    pub precisions: Vec<Precision>,
    /// Builtin names to test; empty means all.
    pub functions: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            wimpy: false,
            wimpy_reduction: DEFAULT_WIMPY_REDUCTION_FACTOR,
            force_ftz: false,
            relaxed: true,
            fast_relaxed_derived: true,
            host_fill: false,
            verbose: false,
            vector_widths: VECTOR_WIDTHS.to_vec(),
            threads: 0,
            seed: 0x5eed_1234,
            embedded: false,
            skip_correctness: false,
            stop_on_error: false,
            buffer_size: BUFFER_SIZE,
            precisions: vec![Precision::Float, Precision::Double, Precision::Half],
            functions: Vec::new(),
        }
    }
}

impl TestConfig {
    /// Defaults suited to quick runs: wimpy sampling on every width.
    pub fn wimpy() -> Self {
        Self {
            wimpy: true,
            ..Self::default()
        }
    }

    /// Defaults overridden from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `MATHCHECK_WIMPY` or `CL_WIMPY_MODE` - enable wimpy mode
    /// - `MATHCHECK_WIMPY_REDUCTION` - wimpy reduction factor
    /// - `MATHCHECK_FORCE_FTZ` - force flush-to-zero
    /// - `MATHCHECK_RELAXED` - test relaxed-math variants
    /// - `MATHCHECK_THREADS` - worker count
    /// - `MATHCHECK_SEED` - random seed
    /// - `MATHCHECK_WIDTHS` - comma separated vector widths
    /// - `MATHCHECK_HOST_FILL` - poison outputs from the host
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if flag("MATHCHECK_WIMPY").or_else(|| env::var("CL_WIMPY_MODE").ok().map(|_| true)) == Some(true) {
            config.wimpy = true;
        }
        if let Some(reduction) = parsed::<u32>("MATHCHECK_WIMPY_REDUCTION")? {
            config.wimpy_reduction = reduction;
        }
        if let Some(force) = flag("MATHCHECK_FORCE_FTZ") {
            config.force_ftz = force;
        }
        if let Some(relaxed) = flag("MATHCHECK_RELAXED") {
            config.relaxed = relaxed;
        }
        if let Some(host_fill) = flag("MATHCHECK_HOST_FILL") {
            config.host_fill = host_fill;
        }
        if let Some(threads) = parsed::<usize>("MATHCHECK_THREADS")? {
            config.threads = threads;
        }
        if let Some(seed) = parsed::<u64>("MATHCHECK_SEED")? {
            config.seed = seed;
        }
        if let Ok(widths) = env::var("MATHCHECK_WIDTHS") {
            config.vector_widths = parse_widths(&widths)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WIMPY_REDUCTION_FACTOR).contains(&self.wimpy_reduction) {
            return Err(Error::config(format!(
                "wimpy reduction factor {} outside 1..={MAX_WIMPY_REDUCTION_FACTOR}",
                self.wimpy_reduction
            )));
        }
        if self.vector_widths.is_empty() {
            return Err(Error::config("no vector widths selected"));
        }
        if let Some(width) = self.vector_widths.iter().find(|w| !VECTOR_WIDTHS.contains(w)) {
            return Err(Error::config(format!("unsupported vector width {width}")));
        }
        // width-3 kernels cover the tail by parity, which needs a power of two
        if !self.buffer_size.is_power_of_two() {
            return Err(Error::config(format!(
                "buffer size {} is not a non-zero power of two",
                self.buffer_size
            )));
        }
        Ok(())
    }

    /// Reduction factor passed to the partitioner, `None` for a full sweep.
    pub fn wimpy_reduction(&self) -> Option<u32> {
        self.wimpy.then_some(self.wimpy_reduction)
    }

    /// Worker count with `0` resolved to the available parallelism.
    pub fn worker_count(&self) -> usize {
        match self.threads {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }

    /// Whether `name` passes the function filter.
    pub fn selects(&self, name: &str) -> bool {
        self.functions.is_empty() || self.functions.iter().any(|f| f == name)
    }
}

/// Parse `"1,4,16"` style vector width lists.
pub fn parse_widths(list: &str) -> Result<Vec<u32>> {
    list.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| {
            w.parse::<u32>()
                .map_err(|_| Error::config(format!("invalid vector width {w:?}")))
        })
        .collect()
}

fn flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        let value = value.trim();
        value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
    })
}

fn parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{key}={value:?} is not a valid value"))),
        Err(_) => Ok(None),
    }
}
