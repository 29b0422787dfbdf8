//! Job submissions and the outcome types produced while enqueueing them.
//!
//! A `JobSubmission` is the owned request for one enqueue call. Each
//! submission strategy folds its single attempt into a `SubmissionOutcome`;
//! the orchestrator folds those into exactly one `EnqueueResult` per call.

use std::{fmt, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Arbitrary key-value payload handed to the backend task handler.
pub type Payload = Map<String, Value>;

/// Strategy name reported when no strategy managed to submit the job.
pub const NO_STRATEGY: &str = "none";

/// Name of a backend task handler.
///
/// Guaranteed non-empty and free of surrounding whitespace, so the
/// orchestrator never has to reject a submission at enqueue time.
///
/// # Example
///
/// ```
/// use jobline_core::models::TaskIdentifier;
///
/// let task = TaskIdentifier::new("send_receipt_email").unwrap();
/// assert_eq!(task.as_str(), "send_receipt_email");
/// assert!(TaskIdentifier::new("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskIdentifier(String);

impl TaskIdentifier {
    /// Creates a task identifier, rejecting empty or padded names.
    pub fn new(identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(CoreError::InvalidInput("task identifier must not be empty".to_string()));
        }
        if identifier.trim() != identifier {
            return Err(CoreError::InvalidInput(format!(
                "task identifier '{identifier}' has surrounding whitespace"
            )));
        }
        Ok(Self(identifier))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaskIdentifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TaskIdentifier> for String {
    fn from(task: TaskIdentifier) -> Self {
        task.0
    }
}

/// One job to hand to the backend queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Handler that should process the payload.
    pub task_identifier: TaskIdentifier,
    /// Payload passed to the handler; empty when the caller supplied none.
    pub payload: Payload,
    /// Earliest time the backend should run the job.
    pub run_at: Option<DateTime<Utc>>,
    /// Hint for how many times the backend worker may run the job.
    pub max_attempts: Option<u32>,
}

impl JobSubmission {
    /// Creates a submission with an empty payload and no scheduling hints.
    pub fn new(task_identifier: TaskIdentifier) -> Self {
        Self { task_identifier, payload: Payload::new(), run_at: None, max_attempts: None }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Parses the payload from a JSON value, which must be an object.
    pub fn with_payload_value(self, payload: Value) -> Result<Self> {
        match payload {
            Value::Object(map) => Ok(self.with_payload(map)),
            Value::Null => Ok(self.with_payload(Payload::new())),
            other => Err(CoreError::InvalidInput(format!(
                "payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Schedules the job for a specific time.
    #[must_use]
    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    /// Sets the backend max-attempts hint.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Parameters for the enqueue remote procedure call.
    pub fn rpc_params(&self) -> Value {
        serde_json::json!({
            "task_identifier": self.task_identifier.as_str(),
            "payload": Value::Object(self.payload.clone()),
            "run_at": self.run_at_rfc3339(),
            "max_attempts": self.max_attempts,
        })
    }

    /// Row for a direct insert into the queue table.
    ///
    /// `run_at` is left out when unset so the table default applies.
    pub fn queue_row(&self) -> Value {
        let mut row = Map::new();
        row.insert("task_identifier".to_string(), Value::from(self.task_identifier.as_str()));
        row.insert("payload".to_string(), Value::Object(self.payload.clone()));
        if let Some(run_at) = self.run_at_rfc3339() {
            row.insert("run_at".to_string(), Value::from(run_at));
        }
        Value::Object(row)
    }

    /// `run_at` formatted as ISO-8601 / RFC 3339 with millisecond precision.
    pub fn run_at_rfc3339(&self) -> Option<String> {
        self.run_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Symbolic failure code carried by outcomes and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The enqueue RPC returned an error.
    RpcError,
    /// The enqueue RPC returned no value.
    RpcNullResult,
    /// The direct queue-table insert failed.
    DirectInsertError,
    /// Every attempt failed.
    MaxRetriesExceeded,
    /// A strategy panicked instead of reporting an outcome.
    UnexpectedError,
}

impl ErrorCode {
    /// Returns the wire symbol for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RpcError => "RPC_ERROR",
            Self::RpcNullResult => "RPC_NULL_RESULT",
            Self::DirectInsertError => "DIRECT_INSERT_ERROR",
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    /// Whether the strategy handed the job to the backend.
    pub succeeded: bool,
    /// Failure description, when failed.
    pub error_message: Option<String>,
    /// Failure code, when failed.
    pub error_code: Option<ErrorCode>,
    /// Name of the strategy that produced this outcome.
    pub strategy_name: String,
}

impl SubmissionOutcome {
    /// A successful submission.
    pub fn success(strategy_name: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            error_message: None,
            error_code: None,
            strategy_name: strategy_name.into(),
        }
    }

    /// A failed submission.
    pub fn failure(
        strategy_name: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            succeeded: false,
            error_message: Some(message.into()),
            error_code: Some(code),
            strategy_name: strategy_name.into(),
        }
    }
}

/// Final, externally visible result of one enqueue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueResult {
    /// Whether any strategy submitted the job.
    pub succeeded: bool,
    /// Last failure message, when failed.
    pub error_message: Option<String>,
    /// Failure code, when failed.
    pub error_code: Option<ErrorCode>,
    /// Attempts made, between 1 and the configured retry bound.
    pub attempts_used: u32,
    /// Wall time spent, backoff waits included.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Strategy that succeeded, or [`NO_STRATEGY`].
    pub strategy_used: String,
}

impl EnqueueResult {
    /// A successful result attributed to `strategy_name`.
    pub fn succeeded(
        strategy_name: impl Into<String>,
        attempts_used: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            succeeded: true,
            error_message: None,
            error_code: None,
            attempts_used,
            elapsed,
            strategy_used: strategy_name.into(),
        }
    }

    /// A failed result.
    pub fn failed(
        code: ErrorCode,
        message: Option<String>,
        attempts_used: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            succeeded: false,
            error_message: message,
            error_code: Some(code),
            attempts_used,
            elapsed,
            strategy_used: NO_STRATEGY.to_string(),
        }
    }
}

fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
