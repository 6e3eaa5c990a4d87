//! # mathcheck-device - Compute Device Abstraction
//!
//! Everything between the verification engine and the device that runs the
//! builtins:
//!
//! - **Device traits**: [`Device`] builds programs and hands out in-order
//!   [`CommandQueue`]s, one per worker.
//! - **Kernel source**: [`kernel_source::generate`] writes the OpenCL C kernel
//!   for a builtin at one precision and vector width.
//! - **Program cache**: [`ProgramCache`] builds each kernel once per run.
//! - **Host device**: [`HostDevice`] evaluates kernels on the CPU.
//!
//! # Usage
//!
//! ```rust
//! use mathcheck_core::{lookup, Precision};
//! use mathcheck_device::{kernel_source, CommandQueue, Device, HostDevice, KernelSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = HostDevice::new();
//! let source = kernel_source::generate(KernelSpec::new(lookup("sqrt")?, Precision::Float, 1));
//! let program = device.build_program(&source, "")?;
//!
//! let mut queue = device.create_queue()?;
//! let input = queue.allocate_buffer(16)?;
//! let output = queue.allocate_buffer(16)?;
//! queue.write_buffer(input, bytemuck::cast_slice(&[1.0f32, 4.0, 9.0, 16.0]))?;
//! queue.launch(program, &[output, input], 4)?;
//!
//! let mut results = [0u8; 16];
//! queue.read_buffer(output, &mut results, true)?;
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod devices;
pub mod error;
pub mod kernel_source;
pub mod program_cache;

pub use device::{BufferHandle, CommandQueue, Device, DeviceInfo, KernelSource, KernelSpec, ProgramHandle, ScalarType};
pub use devices::{Fault, HostDevice, HostQueue, QueueStats};
pub use error::{DeviceError, Result};
pub use kernel_source::{build_options, VECTOR_WIDTHS};
pub use program_cache::{BuiltProgram, ProgramCache, ProgramKey};
