//! Per-function runner
//!
//! For each builtin and precision: check device capabilities, build one
//! program per vector width (in parallel, through the shared cache), plan the
//! partition, run the worker pool and fold the workers' worst errors.

use std::time::{Duration, Instant};

use mathcheck_core::{
    function_list, test_scale, DomainPartition, FunctionDescriptor, MaxError, Precision, Quirk, ToleranceMode,
};
use mathcheck_device::{build_options, kernel_source, BuiltProgram, Device, KernelSpec, ProgramCache, ProgramKey};
use mathcheck_tracing::{perf_span, timed_block};
use mathcheck_tracing::performance::{record_build, record_function_timing};
use rayon::prelude::*;

use crate::config::TestConfig;
use crate::context::BufferPlan;
use crate::dispatch::{DispatchOptions, JobDispatcher, WidthProgram};
use crate::error::{Error, Failure, Result};
use crate::pool::WorkerPool;
use crate::report::RunSummary;

/// Result of testing one builtin at one precision.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutcome {
    Passed {
        max_error: MaxError,
        jobs: u32,
        elapsed: Duration,
    },
    Failed(Box<Failure>),
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReport {
    pub function: &'static str,
    pub precision: Precision,
    /// Whether the relaxed-math variant was tested.
    pub relaxed: bool,
    pub outcome: FunctionOutcome,
}

impl FunctionReport {
    fn skipped(function: &FunctionDescriptor, precision: Precision, relaxed: bool, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(function = function.name, %precision, %reason, "skipping");
        Self {
            function: function.name,
            precision,
            relaxed,
            outcome: FunctionOutcome::Skipped { reason },
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self.outcome, FunctionOutcome::Passed { .. })
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, FunctionOutcome::Failed(_))
    }
}

/// Drives verification of builtins on one device.
///
/// Programs are cached for the lifetime of the runner and released when it
/// is dropped.
///
/// # Architecture
///
/// ```text
/// Runner::run_all
/// └── run_function (per builtin, precision and relaxed pass)
///     ├── capability skips and ToleranceMode from DeviceInfo
///     ├── build_programs  - one per width, in parallel, via ProgramCache
///     ├── DomainPartition - jobs over the input domain
///     └── WorkerPool      - JobDispatcher per job, MaxError folded at the end
/// ```
///
/// # Example
///
/// ```rust
/// use mathcheck_core::Precision;
/// use mathcheck_device::HostDevice;
/// use mathcheck_harness::{Runner, TestConfig};
///
/// let device = HostDevice::new();
/// let config = TestConfig {
///     wimpy: true,
///     wimpy_reduction: 512,
///     vector_widths: vec![1, 4],
///     precisions: vec![Precision::Float],
///     functions: vec!["fabs".to_string()],
///     ..TestConfig::default()
/// };
/// let summary = Runner::new(&device, config)?.run_all()?;
/// assert!(summary.is_success());
/// assert_eq!(summary.passed(), 1);
/// # Ok::<(), mathcheck_harness::Error>(())
/// ```
pub struct Runner<'a, D: Device> {
    device: &'a D,
    config: TestConfig,
    cache: ProgramCache,
}

impl<'a, D: Device> Runner<'a, D> {
    pub fn new(device: &'a D, config: TestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            device,
            config,
            cache: ProgramCache::new(),
        })
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Every selected builtin at every selected precision, plus the relaxed
    /// variants where they apply.
    ///
    /// Tolerance failures are recorded and the run continues unless
    /// `stop_on_error` is set; device errors end the run.
    pub fn run_all(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new();

        'functions: for function in function_list().iter().filter(|f| self.config.selects(f.name)) {
            for &precision in &self.config.precisions {
                let mut variants = vec![false];
                if self.config.relaxed && function.relaxed_applies(precision, true) {
                    variants.push(true);
                }
                for relaxed in variants {
                    let report = match self.run_function(function, precision, relaxed) {
                        Ok(report) => report,
                        Err(Error::Tolerance(failure)) => FunctionReport {
                            function: function.name,
                            precision,
                            relaxed,
                            outcome: FunctionOutcome::Failed(failure),
                        },
                        Err(err) => return Err(err),
                    };
                    let stop = report.failed() && self.config.stop_on_error;
                    summary.push(report);
                    if stop {
                        tracing::info!(function = function.name, "stopping at first failure");
                        break 'functions;
                    }
                }
            }
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Test one builtin at one precision.
    pub fn run_function(
        &self,
        function: &'static FunctionDescriptor,
        precision: Precision,
        relaxed: bool,
    ) -> Result<FunctionReport> {
        let info = self.device.info();
        if !function.supports(precision) {
            return Ok(FunctionReport::skipped(function, precision, relaxed, format!("no {precision} variant")));
        }
        if !info.supports(precision) {
            let extension = match precision {
                Precision::Double => "cl_khr_fp64",
                _ => "cl_khr_fp16",
            };
            return Ok(FunctionReport::skipped(
                function,
                precision,
                relaxed,
                format!("device does not support {extension}"),
            ));
        }
        let correctly_rounded = function.quirk == Quirk::CorrectlyRounded;
        if correctly_rounded && !info.correctly_rounded_divide_sqrt {
            return Ok(FunctionReport::skipped(
                function,
                precision,
                relaxed,
                "device lacks correctly rounded divide and sqrt",
            ));
        }

        let _span = perf_span!("verify_function", function = function.name, precision = precision.type_name());
        let started = Instant::now();

        let relaxed = function.relaxed_applies(precision, relaxed);
        let ftz = match precision {
            Precision::Float => function.effective_ftz(self.config.force_ftz, info.denormals),
            _ => function.ftz || self.config.force_ftz,
        };
        let mode = ToleranceMode {
            relaxed,
            fast_relaxed_derived: self.config.fast_relaxed_derived,
            embedded: self.config.embedded || info.embedded,
            ftz,
            no_inf_nan: !info.inf_nan,
            rtz: precision == Precision::Float && !info.round_to_nearest,
        };
        let options = build_options(self.config.force_ftz, correctly_rounded, relaxed);
        let programs = self.build_programs(function, precision, &options)?;

        let element_size = precision.size_bytes();
        let workers = self.config.worker_count();
        let scale = test_scale(element_size, self.config.wimpy_reduction(), mode.embedded);
        let signature = function.signature();
        let partition = DomainPartition::new(
            element_size,
            self.config.buffer_size,
            workers,
            scale,
            signature.domain_bits(element_size as u32 * 8),
        )?;
        if self.config.verbose {
            tracing::info!(
                function = function.name,
                %precision,
                relaxed,
                ftz,
                rtz = mode.rtz,
                workers,
                elements = partition.buffer_elements(),
                scale = partition.scale(),
                step = partition.step(),
                jobs = partition.job_count(),
                "partition"
            );
        }

        let plan = BufferPlan::new(signature, precision, &self.config.vector_widths, partition.buffer_elements());
        let dispatch_options = DispatchOptions {
            mode,
            host_fill: self.config.host_fill,
            skip_correctness: self.config.skip_correctness,
            verbose: self.config.verbose,
            seed: self.config.seed,
        };
        let dispatcher = JobDispatcher::new(self.device, function, precision, programs, plan, dispatch_options)?;

        let contexts = WorkerPool::new(workers).run(&dispatcher, &partition)?;
        let max_error = MaxError::combine(contexts.iter().map(|ctx| &ctx.max_error));
        let jobs: u32 = contexts.iter().map(|ctx| ctx.jobs_run).sum();
        drop(contexts);

        let elapsed = started.elapsed();
        let elements = u64::from(jobs) * partition.buffer_elements() as u64 * self.config.vector_widths.len() as u64;
        record_function_timing(function.name, precision.type_name(), elements, elapsed.as_micros() as u64);
        tracing::info!(
            function = function.name,
            %precision,
            relaxed,
            jobs,
            max_ulps = max_error.error,
            "passed"
        );

        Ok(FunctionReport {
            function: function.name,
            precision,
            relaxed,
            outcome: FunctionOutcome::Passed {
                max_error,
                jobs,
                elapsed,
            },
        })
    }

    /// One program per configured width, built concurrently.
    fn build_programs(
        &self,
        function: &'static FunctionDescriptor,
        precision: Precision,
        options: &str,
    ) -> Result<Vec<WidthProgram>> {
        let programs = self
            .config
            .vector_widths
            .par_iter()
            .map(|&width| -> Result<WidthProgram> {
                let key = ProgramKey::new(function.name, precision, width, options);
                let program = self.cache.get_or_try_create(
                    &key,
                    || {
                        let source = kernel_source::generate(KernelSpec::new(function, precision, width));
                        let (handle, build_us) =
                            timed_block!("build_program", { self.device.build_program(&source, options) });
                        let handle = handle?;
                        record_build(&source.kernel_name, function.name, build_us);
                        Ok(BuiltProgram {
                            handle,
                            kernel_name: source.kernel_name,
                        })
                    },
                    |handle| self.device.release_program(handle),
                )?;
                Ok(WidthProgram { width, program })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(programs)
    }
}

impl<D: Device> Drop for Runner<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.cache.release_all(self.device) {
            tracing::warn!(error = %err, "failed to release cached programs");
        }
    }
}
