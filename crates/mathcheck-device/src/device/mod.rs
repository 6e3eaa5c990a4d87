//! Device traits and shared types

mod traits;
mod types;

pub use traits::{CommandQueue, Device};
pub use types::{BufferHandle, DeviceInfo, KernelSource, KernelSpec, ProgramHandle, ScalarType};
