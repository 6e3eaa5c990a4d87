//! Error types for device operations

use crate::device::{BufferHandle, ProgramHandle};

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors reported by a device or one of its command queues
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(BufferHandle),

    /// Invalid program handle
    #[error("invalid program handle: {0}")]
    InvalidProgramHandle(ProgramHandle),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Program failed to build
    #[error("failed to build {kernel}: {log}")]
    BuildFailed { kernel: String, log: String },

    /// Invalid launch configuration
    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    /// Kernel execution failed
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Fill pattern does not evenly divide the buffer
    #[error("fill pattern of {pattern} bytes does not divide buffer of {size} bytes")]
    InvalidFillPattern { pattern: usize, size: usize },
}

impl DeviceError {
    /// Create a build failure
    pub fn build_failed(kernel: impl Into<String>, log: impl Into<String>) -> Self {
        Self::BuildFailed {
            kernel: kernel.into(),
            log: log.into(),
        }
    }

    /// Create an execution error
    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create an invalid launch configuration error
    pub fn invalid_launch(msg: impl Into<String>) -> Self {
        Self::InvalidLaunchConfig(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }
}
