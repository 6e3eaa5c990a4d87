//! Execution dispatcher
//!
//! Runs one job on one worker: write the inputs, poison every output buffer,
//! launch the kernel once per vector width, read the results back and verify
//! them. Reads are non-blocking except the very last one; the queue is in
//! order, so that last read completing means every earlier one has too.

use std::sync::Arc;
use std::time::Instant;

use mathcheck_core::{f16, FunctionDescriptor, Job, Precision, Reference, ToleranceMode};
use mathcheck_device::{BufferHandle, BuiltProgram, CommandQueue, Device, ScalarType};
use mathcheck_tracing::performance::record_job;
use mathcheck_tracing::PROGRESS_TARGET;

use crate::check::ElementCheck;
use crate::context::{BufferPlan, WorkerContext};
use crate::error::Result;
use crate::inputs::InputGenerator;
use crate::pool::Task;

/// Pattern written into output buffers before each launch, so an element the
/// kernel never stores shows up as a failure.
pub const POISON: u32 = 0xffff_dead;

/// Poison pattern for one element of `ty`.
pub fn poison_pattern(ty: ScalarType) -> Vec<u8> {
    match ty.size_bytes() {
        2 => (POISON as u16).to_ne_bytes().to_vec(),
        _ => POISON.to_ne_bytes().to_vec(),
    }
}

/// A program built for one vector width.
#[derive(Debug, Clone)]
pub struct WidthProgram {
    pub width: u32,
    pub program: Arc<BuiltProgram>,
}

/// Per-run switches that shape dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub mode: ToleranceMode,
    /// Poison outputs with a host write instead of a device fill.
    pub host_fill: bool,
    /// Launch only; nothing is read back or verified.
    pub skip_correctness: bool,
    pub verbose: bool,
    pub seed: u64,
}

/// The [`Task`] that tests one function at one precision.
pub struct JobDispatcher<'a, D: Device> {
    device: &'a D,
    function: &'static FunctionDescriptor,
    precision: Precision,
    reference: Reference,
    programs: Vec<WidthProgram>,
    plan: BufferPlan,
    generator: InputGenerator,
    options: DispatchOptions,
}

impl<'a, D: Device> JobDispatcher<'a, D> {
    /// `programs` must be in the order of `plan.widths`.
    pub fn new(
        device: &'a D,
        function: &'static FunctionDescriptor,
        precision: Precision,
        programs: Vec<WidthProgram>,
        plan: BufferPlan,
        options: DispatchOptions,
    ) -> Result<Self> {
        Ok(Self {
            device,
            function,
            precision,
            reference: function.reference_in(precision, &options.mode)?,
            programs,
            plan,
            generator: InputGenerator::new(function, precision, options.mode.relaxed),
            options,
        })
    }

    fn poison(&self, queue: &mut D::Queue, handle: BufferHandle, ty: ScalarType) -> Result<()> {
        let pattern = poison_pattern(ty);
        if self.options.host_fill {
            let data = pattern.repeat(self.plan.elements);
            queue.write_buffer(handle, &data)?;
        } else {
            queue.fill_buffer(handle, &pattern)?;
        }
        Ok(())
    }

    fn launch_all(&self, ctx: &mut WorkerContext<D::Queue>, job: &Job) -> Result<()> {
        for (handle, data) in ctx.inputs.iter().zip(&ctx.host_inputs) {
            ctx.queue.write_buffer(*handle, data)?;
        }

        for (w, entry) in self.programs.iter().enumerate() {
            for (&handle, &ty) in ctx.outputs[w].iter().zip(&self.plan.outputs[w]) {
                self.poison(&mut ctx.queue, handle, ty)?;
            }
            let global_size = job.element_count.div_ceil(entry.width as usize);
            let args: Vec<BufferHandle> = ctx.outputs[w].iter().chain(&ctx.inputs).copied().collect();
            ctx.queue.launch(entry.program.handle, &args, global_size)?;
        }
        Ok(())
    }

    fn read_back(&self, ctx: &mut WorkerContext<D::Queue>) -> Result<()> {
        let last_width = ctx.outputs.len().saturating_sub(1);
        for w in 0..ctx.outputs.len() {
            let last_output = ctx.outputs[w].len().saturating_sub(1);
            for k in 0..ctx.outputs[w].len() {
                let blocking = w == last_width && k == last_output;
                ctx.queue
                    .read_buffer(ctx.outputs[w][k], &mut ctx.host_outputs[w][k], blocking)?;
            }
        }
        Ok(())
    }

    fn check(&self, ctx: &mut WorkerContext<D::Queue>, job: &Job) -> Result<()> {
        let check = ElementCheck {
            function: self.function,
            precision: self.precision,
            reference: self.reference,
            mode: &self.options.mode,
            plan: &self.plan,
        };
        let WorkerContext {
            host_inputs,
            host_outputs,
            max_error,
            ..
        } = ctx;
        match self.precision {
            Precision::Half => check.check_job::<f16>(job, host_inputs, host_outputs, max_error),
            Precision::Float => check.check_job::<f32>(job, host_inputs, host_outputs, max_error),
            Precision::Double => check.check_job::<f64>(job, host_inputs, host_outputs, max_error),
        }
    }
}

impl<D: Device> Task for JobDispatcher<'_, D> {
    type Worker = WorkerContext<D::Queue>;

    fn create_worker(&self, thread_index: usize) -> Result<Self::Worker> {
        let queue = self.device.create_queue()?;
        WorkerContext::new(queue, &self.plan, thread_index, self.options.seed)
    }

    fn run_job(&self, job: Job, ctx: &mut Self::Worker) -> Result<()> {
        let start = Instant::now();
        if self.options.verbose {
            tracing::debug!(function = self.function.name, precision = %self.precision, %job, "running job");
        }

        self.generator.fill(&job, &mut ctx.rng, &mut ctx.host_inputs);
        self.launch_all(ctx, &job)?;

        if self.options.skip_correctness {
            ctx.queue.finish()?;
        } else {
            self.read_back(ctx)?;
            self.check(ctx, &job)?;
        }

        ctx.jobs_run += 1;
        record_job(job.job_id, job.element_count, start.elapsed().as_micros() as u64);
        if job.reports_progress() {
            tracing::info!(
                target: PROGRESS_TARGET,
                function = self.function.name,
                precision = %self.precision,
                base = job.base,
                "."
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathcheck_core::lookup;
    use mathcheck_device::{kernel_source, HostDevice, KernelSpec};

    fn dispatcher<'a>(
        device: &'a HostDevice,
        name: &str,
        widths: &[u32],
        elements: usize,
        options: DispatchOptions,
    ) -> JobDispatcher<'a, HostDevice> {
        let function = lookup(name).unwrap();
        let programs = widths
            .iter()
            .map(|&width| {
                let source = kernel_source::generate(KernelSpec::new(function, Precision::Float, width));
                let handle = device.build_program(&source, "").unwrap();
                WidthProgram {
                    width,
                    program: Arc::new(BuiltProgram {
                        handle,
                        kernel_name: source.kernel_name,
                    }),
                }
            })
            .collect();
        let plan = BufferPlan::new(function.signature(), Precision::Float, widths, elements);
        JobDispatcher::new(device, function, Precision::Float, programs, plan, options).unwrap()
    }

    fn job(job_id: u32, base: u64, elements: usize) -> Job {
        Job {
            job_id,
            base,
            element_count: elements,
            step: elements as u64,
            scale: 1,
        }
    }

    #[test]
    fn poison_matches_element_size() {
        assert_eq!(poison_pattern(ScalarType::Half), 0xdeadu16.to_ne_bytes().to_vec());
        assert_eq!(poison_pattern(ScalarType::Long), 0xffff_deadu32.to_ne_bytes().to_vec());
    }

    #[test]
    fn exact_device_passes_every_width() {
        let device = HostDevice::new();
        let task = dispatcher(&device, "sqrt", &[1, 3, 16], 64, DispatchOptions::default());
        let mut ctx = task.create_worker(0).unwrap();
        task.run_job(job(0, 0x3f80_0000, 64), &mut ctx).unwrap();
        assert_eq!(ctx.jobs_run, 1);
        assert_eq!(ctx.max_error.error, 0.0);
    }

    #[test]
    fn only_the_last_read_blocks() {
        let device = HostDevice::new();
        let task = dispatcher(&device, "sincos", &[1, 2, 4], 16, DispatchOptions::default());
        let mut ctx = task.create_worker(0).unwrap();
        task.run_job(job(0, 0, 16), &mut ctx).unwrap();

        let stats = device.stats();
        assert_eq!(stats.launches, 3);
        assert_eq!(stats.blocking_reads, 1);
        assert_eq!(stats.non_blocking_reads, 5);
    }

    #[test]
    fn skip_correctness_launches_without_reading() {
        let device = HostDevice::new().with_fault(mathcheck_device::Fault::new("exp", 0, 1000));
        let options = DispatchOptions {
            skip_correctness: true,
            ..DispatchOptions::default()
        };
        let task = dispatcher(&device, "exp", &[1, 8], 32, options);
        let mut ctx = task.create_worker(0).unwrap();
        task.run_job(job(0, 0x3f00_0000, 32), &mut ctx).unwrap();

        let stats = device.stats();
        assert_eq!(stats.launches, 2);
        assert_eq!(stats.blocking_reads + stats.non_blocking_reads, 0);
        assert_eq!(stats.finishes, 1);
    }

    #[test]
    fn host_fill_poisons_through_writes() {
        let device = HostDevice::new();
        let options = DispatchOptions {
            host_fill: true,
            ..DispatchOptions::default()
        };
        let task = dispatcher(&device, "fabs", &[4], 8, options);
        let mut ctx = task.create_worker(0).unwrap();
        task.run_job(job(0, 0xbf80_0000, 8), &mut ctx).unwrap();
        assert_eq!(ctx.max_error.error, 0.0);
    }

    #[test]
    fn injected_fault_fails_the_job() {
        let device = HostDevice::new().with_fault(mathcheck_device::Fault::new("exp", 3, 50));
        let task = dispatcher(&device, "exp", &[2], 16, DispatchOptions::default());
        let mut ctx = task.create_worker(0).unwrap();
        let err = task.run_job(job(0, 0x3f00_0000, 16), &mut ctx).unwrap_err();
        let failure = err.failure().unwrap();
        assert_eq!(failure.element, 3);
        assert_eq!(failure.vector_width, 2);
        assert_eq!(ctx.jobs_run, 0);
    }
}
