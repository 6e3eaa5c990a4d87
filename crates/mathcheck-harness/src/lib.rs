//! # mathcheck-harness - Brute-force Verification Runner
//!
//! Drives [`mathcheck_core`] and [`mathcheck_device`] to sweep each math
//! builtin over its input domain and check every result against the host
//! reference.
//!
//! ## Architecture
//!
//! ```text
//! Runner ── per function and precision
//!   ├── ProgramCache     one program per vector width, built in parallel
//!   ├── DomainPartition  jobs over the bit-pattern domain
//!   └── WorkerPool       fixed threads claiming jobs
//!         └── JobDispatcher (Task)
//!               ├── InputGenerator  sweep or specials + random
//!               ├── CommandQueue    write, poison, launch, read back
//!               └── ElementCheck    tolerance cascade, MaxError
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mathcheck_device::HostDevice;
//! use mathcheck_harness::{Runner, TestConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = HostDevice::new();
//! let config = TestConfig {
//!     wimpy_reduction: 512,
//!     vector_widths: vec![1, 4],
//!     functions: vec!["fabs".into()],
//!     ..TestConfig::wimpy()
//! };
//! let summary = Runner::new(&device, config)?.run_all()?;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

mod check;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod inputs;
pub mod pool;
pub mod report;
pub mod runner;

pub use config::TestConfig;
pub use context::{BufferPlan, WorkerContext};
pub use dispatch::{DispatchOptions, JobDispatcher, WidthProgram, POISON};
pub use error::{Error, Failure, Observed, Result};
pub use inputs::InputGenerator;
pub use pool::{Task, WorkerPool};
pub use report::RunSummary;
pub use runner::{FunctionOutcome, FunctionReport, Runner};
