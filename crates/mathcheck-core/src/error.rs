//! Error types for mathcheck-core

/// Result type for mathcheck-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning a verification run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Partition geometry cannot produce any job
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    /// Function name not present in the function list
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Function has no reference for the requested precision
    #[error("function {function} has no {precision} reference")]
    MissingReference { function: String, precision: String },
}

impl Error {
    /// Create an invalid partition error
    pub fn invalid_partition(msg: impl Into<String>) -> Self {
        Self::InvalidPartition(msg.into())
    }
}
