//! Error types for domain model construction.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Invalid input supplied by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
