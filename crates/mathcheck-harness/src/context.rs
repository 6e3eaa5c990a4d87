//! Per-worker state
//!
//! A worker owns one command queue, one input buffer per kernel argument and
//! one set of output buffers per vector width, plus the matching host staging
//! memory. Nothing here is shared between workers, so a job runs without
//! locks. Device buffers are freed when the context is dropped.

use mathcheck_core::{MaxError, Precision, Signature};
use mathcheck_device::kernel_source::layout;
use mathcheck_device::{BufferHandle, CommandQueue, ScalarType};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;

/// Buffer geometry of one function at one precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPlan {
    /// Elements per job.
    pub elements: usize,
    pub inputs: Vec<ScalarType>,
    /// Output types per vector width, in `widths` order.
    pub outputs: Vec<Vec<ScalarType>>,
    pub widths: Vec<u32>,
}

impl BufferPlan {
    pub fn new(signature: Signature, precision: Precision, widths: &[u32], elements: usize) -> Self {
        let inputs = layout(signature, precision, 1).inputs;
        let outputs = widths
            .iter()
            .map(|&width| layout(signature, precision, width).outputs)
            .collect();
        Self {
            elements,
            inputs,
            outputs,
            widths: widths.to_vec(),
        }
    }
}

/// Everything one worker thread needs to run jobs.
pub struct WorkerContext<Q: CommandQueue> {
    pub thread_index: usize,
    pub queue: Q,
    /// Device input buffers, one per kernel input.
    pub inputs: Vec<BufferHandle>,
    /// Device output buffers, `[width][output]`.
    pub outputs: Vec<Vec<BufferHandle>>,
    /// Host copies of the inputs of the current job.
    pub host_inputs: Vec<Vec<u8>>,
    /// Host read-back targets, `[width][output]`.
    pub host_outputs: Vec<Vec<Vec<u8>>>,
    pub rng: StdRng,
    pub max_error: MaxError,
    /// Jobs completed by this worker.
    pub jobs_run: u32,
}

impl<Q: CommandQueue> WorkerContext<Q> {
    /// Allocate the buffers described by `plan` on `queue`.
    ///
    /// The random stream is seeded from `seed` and the thread index, so a run
    /// with a fixed seed and thread count is reproducible.
    pub fn new(queue: Q, plan: &BufferPlan, thread_index: usize, seed: u64) -> Result<Self> {
        let mut context = Self {
            thread_index,
            queue,
            inputs: Vec::with_capacity(plan.inputs.len()),
            outputs: Vec::with_capacity(plan.outputs.len()),
            host_inputs: Vec::with_capacity(plan.inputs.len()),
            host_outputs: Vec::with_capacity(plan.outputs.len()),
            rng: StdRng::seed_from_u64(seed.wrapping_add(thread_index as u64)),
            max_error: MaxError::new(),
            jobs_run: 0,
        };

        // Handles are pushed as they are allocated so a failure part way
        // through still frees everything on drop.
        for ty in &plan.inputs {
            let size = plan.elements * ty.size_bytes();
            let handle = context.queue.allocate_buffer(size)?;
            context.inputs.push(handle);
            context.host_inputs.push(vec![0; size]);
        }
        for types in &plan.outputs {
            let mut handles = Vec::with_capacity(types.len());
            let mut host = Vec::with_capacity(types.len());
            for ty in types {
                let size = plan.elements * ty.size_bytes();
                match context.queue.allocate_buffer(size) {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        context.outputs.push(handles);
                        return Err(err.into());
                    }
                }
                host.push(vec![0; size]);
            }
            context.outputs.push(handles);
            context.host_outputs.push(host);
        }

        tracing::trace!(thread_index, elements = plan.elements, "worker context ready");
        Ok(context)
    }
}

impl<Q: CommandQueue> Drop for WorkerContext<Q> {
    fn drop(&mut self) {
        let handles = self.inputs.drain(..).chain(self.outputs.drain(..).flatten());
        for handle in handles.collect::<Vec<_>>() {
            if let Err(err) = self.queue.free_buffer(handle) {
                tracing::warn!(thread_index = self.thread_index, %handle, error = %err, "failed to free buffer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mathcheck_device::{Device, HostDevice, HostQueue, ProgramHandle};
    use parking_lot::Mutex;
    use rand::Rng;

    #[test]
    fn plan_follows_kernel_layout() {
        let plan = BufferPlan::new(Signature::MacroBinary, Precision::Double, &[1, 4], 64);
        assert_eq!(plan.inputs, vec![ScalarType::Double, ScalarType::Double]);
        assert_eq!(plan.outputs[0], vec![ScalarType::Int]);
        assert_eq!(plan.outputs[1], vec![ScalarType::Long]);
    }

    #[test]
    fn allocates_per_width_outputs() {
        let device = HostDevice::new();
        let plan = BufferPlan::new(Signature::UnaryIntResult, Precision::Float, &[1, 2, 3], 32);
        let context = WorkerContext::new(device.create_queue().unwrap(), &plan, 0, 7).unwrap();
        assert_eq!(context.inputs.len(), 1);
        assert_eq!(context.outputs.len(), 3);
        assert!(context.outputs.iter().all(|set| set.len() == 2));
        assert_eq!(context.host_inputs[0].len(), 128);
        assert_eq!(context.queue.live_buffers(), 7);
    }

    /// Queue that records frees so they can be observed after the drop.
    struct Recording {
        inner: HostQueue,
        freed: Arc<Mutex<Vec<BufferHandle>>>,
    }

    impl CommandQueue for Recording {
        fn allocate_buffer(&mut self, size: usize) -> mathcheck_device::Result<BufferHandle> {
            self.inner.allocate_buffer(size)
        }
        fn free_buffer(&mut self, handle: BufferHandle) -> mathcheck_device::Result<()> {
            self.freed.lock().push(handle);
            self.inner.free_buffer(handle)
        }
        fn write_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> mathcheck_device::Result<()> {
            self.inner.write_buffer(handle, data)
        }
        fn fill_buffer(&mut self, handle: BufferHandle, pattern: &[u8]) -> mathcheck_device::Result<()> {
            self.inner.fill_buffer(handle, pattern)
        }
        fn launch(
            &mut self,
            program: ProgramHandle,
            args: &[BufferHandle],
            global_size: usize,
        ) -> mathcheck_device::Result<()> {
            self.inner.launch(program, args, global_size)
        }
        fn read_buffer(&mut self, handle: BufferHandle, dst: &mut [u8], blocking: bool) -> mathcheck_device::Result<()> {
            self.inner.read_buffer(handle, dst, blocking)
        }
        fn finish(&mut self) -> mathcheck_device::Result<()> {
            self.inner.finish()
        }
    }

    #[test]
    fn drop_frees_every_buffer() {
        let device = HostDevice::new();
        let freed = Arc::new(Mutex::new(Vec::new()));
        let queue = Recording {
            inner: device.create_queue().unwrap(),
            freed: Arc::clone(&freed),
        };
        let plan = BufferPlan::new(Signature::Binary, Precision::Float, &[1, 16], 16);
        let context = WorkerContext::new(queue, &plan, 1, 0).unwrap();
        assert_eq!(context.queue.inner.live_buffers(), 4);
        drop(context);
        assert_eq!(freed.lock().len(), 4);
    }

    #[test]
    fn seeds_differ_per_thread() {
        let device = HostDevice::new();
        let plan = BufferPlan::new(Signature::Unary, Precision::Float, &[1], 4);
        let mut a = WorkerContext::new(device.create_queue().unwrap(), &plan, 0, 9).unwrap();
        let mut b = WorkerContext::new(device.create_queue().unwrap(), &plan, 1, 9).unwrap();
        let mut c = WorkerContext::new(device.create_queue().unwrap(), &plan, 0, 9).unwrap();
        let first: u64 = a.rng.gen();
        assert_ne!(first, b.rng.gen::<u64>());
        assert_eq!(first, c.rng.gen::<u64>());
    }
}
