//! Errors raised by row conversion and batch configuration.

use thiserror::Error;

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An input row (or one of its cells) has a shape that cannot become
    /// spreadsheet cells.
    #[error("unknown data shape: {0}")]
    UnknownDataShape(String),

    /// The batch threshold must be a positive integer.
    #[error("invalid batch size {0}: must be at least 1")]
    InvalidBatchSize(usize),

    /// A field mapping entry could not be parsed.
    #[error("invalid field mapping '{0}': expected name=Header")]
    InvalidFieldMapping(String),
}

impl CoreError {
    /// Creates an unknown data shape error.
    pub fn unknown_shape(message: impl Into<String>) -> Self {
        Self::UnknownDataShape(message.into())
    }
}
