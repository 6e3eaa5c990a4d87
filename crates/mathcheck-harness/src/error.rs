//! Error types for verification runs

use std::fmt;

use mathcheck_core::{hex_float, Precision};
use mathcheck_device::DeviceError;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end the test of a function
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Device or queue operation failed
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Planning error from the verification primitives
    #[error(transparent)]
    Core(#[from] mathcheck_core::Error),

    /// A result was outside its tolerance
    #[error("{0}")]
    Tolerance(Box<Failure>),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Worker thread pool could not be created
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The tolerance failure, if that is what this error is.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Error::Tolerance(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Tolerance(Box::new(failure))
    }
}

/// One side of a mismatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observed {
    /// Floating result with its raw bit pattern in the tested format.
    Float { value: f64, bits: u64 },
    /// Integer result (`ilogb`, relational macros, `frexp` exponent).
    Int(i64),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Float { value, bits } => write!(f, "{} ({bits:#x})", hex_float(*value)),
            Observed::Int(value) => write!(f, "{value}"),
        }
    }
}

/// Diagnostics for the first element that failed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub function: String,
    pub precision: Precision,
    pub vector_width: u32,
    /// Index of the element within its job buffer.
    pub element: usize,
    /// Job that produced the element.
    pub job_id: u32,
    pub inputs: Vec<f64>,
    pub expected: Observed,
    pub actual: Observed,
    /// Measured error; zero for integer mismatches.
    pub error: f32,
    /// Allowed error.
    pub bound: f32,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(|&x| hex_float(x)).collect();
        write!(
            f,
            "{} {} (vector width {}) failed at element {} of job {}: {}({}) expected {}, got {}",
            self.function,
            self.precision,
            self.vector_width,
            self.element,
            self.job_id,
            self.function,
            inputs.join(", "),
            self.expected,
            self.actual
        )?;
        match self.actual {
            Observed::Float { .. } => write!(f, ", error {} ulps (allowed {})", self.error, self.bound),
            Observed::Int(_) => Ok(()),
        }
    }
}
