//! Device and command queue traits
//!
//! The engine drives any compute device through these two traits:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │            Device            │  shared by all workers
//! │  - info()                    │
//! │  - build_program()           │
//! │  - create_queue()            │
//! └──────────────┬───────────────┘
//!                │ one per worker
//!                ▼
//! ┌──────────────────────────────┐
//! │         CommandQueue         │
//! │  - buffers (allocate/fill)   │
//! │  - launch()                  │
//! │  - read_buffer() / finish()  │
//! └──────────────────────────────┘
//! ```
//!
//! Commands on one queue execute in submission order.

use super::types::{BufferHandle, DeviceInfo, KernelSource, ProgramHandle};
use crate::error::Result;

/// A compute device able to build and run generated kernels.
///
/// Programs are shared: a handle returned by [`Device::build_program`] may be
/// launched from any queue created by the same device.
pub trait Device: Send + Sync {
    /// Queue type handed to each worker
    type Queue: CommandQueue;

    /// Capabilities of the device.
    fn info(&self) -> &DeviceInfo;

    // ============================================================================================
    // Programs
    // ============================================================================================

    /// Build `source` with `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::BuildFailed`](crate::DeviceError::BuildFailed)
    /// with the build log when compilation fails.
    fn build_program(&self, source: &KernelSource, options: &str) -> Result<ProgramHandle>;

    /// Release a program built by this device.
    fn release_program(&self, program: ProgramHandle) -> Result<()>;

    // ============================================================================================
    // Queues
    // ============================================================================================

    /// Create an in-order command queue.
    fn create_queue(&self) -> Result<Self::Queue>;
}

/// In-order command queue owned by one worker.
pub trait CommandQueue: Send {
    // ============================================================================================
    // Buffer Management
    // ============================================================================================

    /// Allocate a buffer of `size` bytes.
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle>;

    /// Free a buffer allocated on this queue.
    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()>;

    /// Copy `data` to the start of the buffer.
    fn write_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()>;

    /// Fill the whole buffer with a repeated `pattern`.
    ///
    /// # Errors
    ///
    /// The buffer length must be a multiple of the pattern length.
    fn fill_buffer(&mut self, handle: BufferHandle, pattern: &[u8]) -> Result<()>;

    // ============================================================================================
    // Execution
    // ============================================================================================

    /// Enqueue `program` over `global_size` work items.
    ///
    /// `args` are bound in kernel parameter order: outputs, then inputs.
    fn launch(&mut self, program: ProgramHandle, args: &[BufferHandle], global_size: usize) -> Result<()>;

    /// Read the start of the buffer into `dst`.
    ///
    /// A non-blocking read only guarantees `dst` once a later blocking read or
    /// [`CommandQueue::finish`] has returned.
    fn read_buffer(&mut self, handle: BufferHandle, dst: &mut [u8], blocking: bool) -> Result<()>;

    /// Wait for every enqueued command.
    fn finish(&mut self) -> Result<()>;
}
