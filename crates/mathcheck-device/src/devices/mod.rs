//! Device implementations
//!
//! - `host` - reference device evaluated on the CPU

pub mod host;

pub use host::{Fault, HostDevice, HostQueue, QueueStats};
