//! Host reference device
//!
//! Implements [`Device`] on the CPU by evaluating each builtin's reference
//! and rounding to the kernel type, so a launch is bit exact unless told
//! otherwise. It stands in for a real device in tests and in runs without
//! a driver.
//!
//! # Architecture
//!
//! ```text
//! HostDevice
//! ├── DeviceInfo      - advertised capabilities
//! ├── programs        - built kernels, shared by every queue
//! ├── HostBehavior    - forced flushing, injected faults, failing builds
//! └── QueueStats      - launch and read counters across queues
//!
//! HostQueue (one per worker)
//! └── HostMemory      - buffers owned by the queue
//! ```
//!
//! Flush-to-zero is emulated for single precision when the program is built
//! with `-cl-denorms-are-zero`, when the builtin always flushes, or when the
//! device advertises no denormal support. A device built with
//! [`HostDevice::round_toward_zero`] truncates single precision arithmetic.

mod execute;
mod memory;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::device::{BufferHandle, CommandQueue, Device, DeviceInfo, KernelSource, ProgramHandle};
use crate::error::{DeviceError, Result};
pub use execute::Fault;
use execute::HostProgram;
use memory::HostMemory;

/// Counters collected across every queue of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queues: u64,
    pub launches: u64,
    pub blocking_reads: u64,
    pub non_blocking_reads: u64,
    pub finishes: u64,
}

/// Deviations from exact behavior.
#[derive(Debug, Clone, Default)]
struct HostBehavior {
    faults: Vec<Fault>,
    failing_builds: Vec<String>,
}

/// CPU implementation of [`Device`].
#[derive(Debug, Clone)]
pub struct HostDevice {
    info: DeviceInfo,
    behavior: Arc<HostBehavior>,
    programs: Arc<RwLock<HashMap<u64, HostProgram>>>,
    next_program_id: Arc<AtomicU64>,
    stats: Arc<Mutex<QueueStats>>,
}

impl HostDevice {
    /// Full-profile device with fp16, fp64 and denormals.
    pub fn new() -> Self {
        Self::with_info(DeviceInfo::full("host reference device"))
    }

    pub fn with_info(info: DeviceInfo) -> Self {
        Self {
            info,
            behavior: Arc::new(HostBehavior::default()),
            programs: Arc::new(RwLock::new(HashMap::new())),
            next_program_id: Arc::new(AtomicU64::new(1)),
            stats: Arc::new(Mutex::new(QueueStats::default())),
        }
    }

    /// Advertise no single precision denormals; results are flushed.
    pub fn without_denormals(mut self) -> Self {
        self.info.denormals = false;
        self
    }

    pub fn without_fp64(mut self) -> Self {
        self.info.fp64 = false;
        self
    }

    pub fn without_fp16(mut self) -> Self {
        self.info.fp16 = false;
        self
    }

    /// Embedded device whose single precision arithmetic rounds toward zero.
    pub fn round_toward_zero(mut self) -> Self {
        self.info.embedded = true;
        self.info.round_to_nearest = false;
        self
    }

    /// Corrupt one element of every launch of the fault's builtin.
    pub fn with_fault(mut self, fault: Fault) -> Self {
        Arc::make_mut(&mut self.behavior).faults.push(fault);
        self
    }

    /// Make every build of `function` fail.
    pub fn with_build_failure(mut self, function: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.behavior).failing_builds.push(function.into());
        self
    }

    /// Counters across all queues created so far.
    pub fn stats(&self) -> QueueStats {
        *self.stats.lock()
    }

    /// Programs currently built and not released.
    pub fn live_programs(&self) -> usize {
        self.programs.read().len()
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for HostDevice {
    type Queue = HostQueue;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn build_program(&self, source: &KernelSource, options: &str) -> Result<ProgramHandle> {
        let spec = source.spec;
        if self.behavior.failing_builds.iter().any(|name| name == spec.function.name) {
            return Err(DeviceError::build_failed(&source.kernel_name, "injected build failure"));
        }
        if !self.info.supports(spec.precision) {
            return Err(DeviceError::build_failed(
                &source.kernel_name,
                format!("{} is not supported by {}", spec.precision, self.info.name),
            ));
        }
        if !spec.function.supports(spec.precision) {
            return Err(DeviceError::build_failed(
                &source.kernel_name,
                format!("no {} overload of {}", spec.precision, spec.function.name),
            ));
        }

        let ftz = spec.function.ftz || !self.info.denormals || options.contains("-cl-denorms-are-zero");
        let toward_zero = !self.info.round_to_nearest;
        let id = self.next_program_id.fetch_add(1, Ordering::Relaxed);
        self.programs.write().insert(id, HostProgram { spec, ftz, toward_zero });

        tracing::debug!(
            program = id,
            kernel = %source.kernel_name,
            function = spec.function.name,
            precision = %spec.precision,
            options,
            "built host program"
        );
        Ok(ProgramHandle::new(id))
    }

    fn release_program(&self, program: ProgramHandle) -> Result<()> {
        self.programs
            .write()
            .remove(&program.id())
            .map(|_| ())
            .ok_or(DeviceError::InvalidProgramHandle(program))
    }

    fn create_queue(&self) -> Result<HostQueue> {
        self.stats.lock().queues += 1;
        Ok(HostQueue {
            memory: HostMemory::new(),
            programs: Arc::clone(&self.programs),
            behavior: Arc::clone(&self.behavior),
            stats: Arc::clone(&self.stats),
        })
    }
}

/// In-order queue of a [`HostDevice`]. Commands complete when enqueued.
#[derive(Debug)]
pub struct HostQueue {
    memory: HostMemory,
    programs: Arc<RwLock<HashMap<u64, HostProgram>>>,
    behavior: Arc<HostBehavior>,
    stats: Arc<Mutex<QueueStats>>,
}

impl HostQueue {
    /// Buffers currently allocated on this queue.
    pub fn live_buffers(&self) -> usize {
        self.memory.len()
    }
}

impl CommandQueue for HostQueue {
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        Ok(self.memory.allocate(size))
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.free(handle)
    }

    fn write_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.write(handle, data)
    }

    fn fill_buffer(&mut self, handle: BufferHandle, pattern: &[u8]) -> Result<()> {
        self.memory.fill(handle, pattern)
    }

    fn launch(&mut self, program: ProgramHandle, args: &[BufferHandle], global_size: usize) -> Result<()> {
        let host_program = self
            .programs
            .read()
            .get(&program.id())
            .cloned()
            .ok_or(DeviceError::InvalidProgramHandle(program))?;

        let output_count = host_program.spec.function.signature().has_second_output() as usize + 1;
        if args.len() < output_count {
            return Err(DeviceError::invalid_launch(format!(
                "{} arguments bound to {}",
                args.len(),
                host_program.spec.kernel_name()
            )));
        }
        let (output_handles, input_handles) = args.split_at(output_count);

        let mut outputs = Vec::with_capacity(output_count);
        for &handle in output_handles {
            match self.memory.take(handle) {
                Ok(buffer) => outputs.push((handle, buffer)),
                Err(e) => {
                    for (handle, buffer) in outputs {
                        self.memory.restore(handle, buffer);
                    }
                    return Err(e);
                }
            }
        }

        let fault = self
            .behavior
            .faults
            .iter()
            .find(|fault| fault.function == host_program.spec.function.name);
        let result = {
            let inputs: Result<Vec<&[u8]>> = input_handles.iter().map(|&h| self.memory.buffer(h)).collect();
            inputs.and_then(|inputs| {
                let mut buffers: Vec<Vec<u8>> = outputs.iter_mut().map(|(_, b)| std::mem::take(b)).collect();
                let result = execute::execute(&host_program, fault, &mut buffers, &inputs, global_size);
                for ((_, slot), buffer) in outputs.iter_mut().zip(buffers) {
                    *slot = buffer;
                }
                result
            })
        };
        for (handle, buffer) in outputs {
            self.memory.restore(handle, buffer);
        }

        self.stats.lock().launches += 1;
        result
    }

    fn read_buffer(&mut self, handle: BufferHandle, dst: &mut [u8], blocking: bool) -> Result<()> {
        {
            let mut stats = self.stats.lock();
            if blocking {
                stats.blocking_reads += 1;
            } else {
                stats.non_blocking_reads += 1;
            }
        }
        self.memory.read(handle, dst)
    }

    fn finish(&mut self) -> Result<()> {
        self.stats.lock().finishes += 1;
        Ok(())
    }
}
