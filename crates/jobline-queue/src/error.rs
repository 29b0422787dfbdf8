//! Error types for queue backends and client construction.
//!
//! Backend failures are categorised so strategies can report a useful
//! message and operators can tell transient faults from misconfiguration.
//! None of these escape `EnqueueClient::enqueue`; they surface only from
//! constructors and from direct backend use.

use jobline_core::CoreError;
use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised while building or configuring an enqueue client.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Invalid client or backend configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// What was wrong with the configuration
        message: String,
    },

    /// Backend could not be reached or set up.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid domain value.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl QueueError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

/// Failure reported by a [`QueueBackend`](crate::backend::QueueBackend) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Connection-level failure.
    #[error("network error: {message}")]
    Network {
        /// Error message describing the network failure
        message: String,
    },

    /// Request did not complete in time.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Configured timeout in seconds
        timeout_seconds: u64,
    },

    /// Database driver error.
    #[error("database error: {message}")]
    Database {
        /// Database error message
        message: String,
    },

    /// Backend returned something that is not valid JSON.
    #[error("invalid backend response: {message}")]
    InvalidResponse {
        /// Decoder error message
        message: String,
    },
}

impl BackendError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    /// Whether a later attempt could plausibly succeed.
    ///
    /// Network faults, timeouts, 5xx/408/429 responses and database errors
    /// are transient. Other 4xx responses and malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            Self::Network { .. } | Self::Timeout { .. } | Self::Database { .. } => true,
            Self::InvalidResponse { .. } => false,
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::network("connection pool timed out"),
            sqlx::Error::Io(io) => Self::network(io.to_string()),
            other => Self::database(other.to_string()),
        }
    }
}
