//! Backend abstraction over the external job queue.
//!
//! The queue itself lives in the backend's job table; this crate only hands
//! jobs to it. `QueueBackend` exposes the two entry points the submission
//! strategies need, so the orchestrator can be tested against
//! [`mock::MockQueueBackend`] without a database or HTTP gateway.

use std::{future::Future, pin::Pin};

use jobline_core::JobSubmission;
use serde_json::Value;

use crate::error::{BackendError, QueueError};

pub mod postgres;
pub mod postgrest;

pub use postgres::{PgBackend, PgBackendConfig};
pub use postgrest::{PostgrestBackend, PostgrestConfig};

/// Default name of the enqueue remote procedure.
pub const DEFAULT_RPC_FUNCTION: &str = "enqueue_job";

/// Default name of the queue table used by direct inserts.
pub const DEFAULT_QUEUE_TABLE: &str = "job_queue";

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Boxed future returned by backend and strategy methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the enqueue strategies need from the queue backend.
///
/// Implementations must be safe to share across concurrent `enqueue` calls;
/// connection pooling is the implementation's concern.
pub trait QueueBackend: Send + Sync + 'static {
    /// Calls the enqueue remote procedure with the job's RPC parameters.
    ///
    /// Returns `Ok(None)` when the procedure answered with no value.
    fn call_enqueue_rpc<'a>(
        &'a self,
        job: &'a JobSubmission,
    ) -> BoxFuture<'a, BackendResult<Option<Value>>>;

    /// Inserts the job's queue row directly, bypassing the procedure.
    fn insert_queue_row<'a>(&'a self, job: &'a JobSubmission) -> BoxFuture<'a, BackendResult<()>>;
}

/// Checks that `name` is a plain or schema-qualified SQL identifier.
///
/// Names are interpolated into SQL and URL paths, so only
/// `[A-Za-z_][A-Za-z0-9_]*` segments joined by at most one `.` are allowed.
pub fn validate_identifier(name: &str) -> std::result::Result<(), QueueError> {
    let segments: Vec<&str> = name.split('.').collect();
    let well_formed = segments.len() <= 2
        && segments.iter().all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if well_formed {
        Ok(())
    } else {
        Err(QueueError::configuration(format!("'{name}' is not a valid SQL identifier")))
    }
}

pub mod mock {
    //! In-memory backend for tests.
    //!
    //! Responses are scripted per call in FIFO order; once a script runs
    //! out, the default response repeats. Every call is recorded so tests
    //! can verify exactly which submissions reached the backend.

    use std::{collections::VecDeque, sync::Arc};

    use jobline_core::JobSubmission;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use super::{BackendResult, BoxFuture, QueueBackend};
    use crate::error::BackendError;

    /// Scripted response for the RPC entry point.
    #[derive(Debug, Clone)]
    pub enum RpcResponse {
        /// Procedure returned a value.
        Value(Value),
        /// Procedure returned nothing.
        Null,
        /// Call failed.
        Error(BackendError),
    }

    /// Scripted response for the insert entry point.
    #[derive(Debug, Clone)]
    pub enum InsertResponse {
        /// Row inserted.
        Inserted,
        /// Insert failed.
        Error(BackendError),
    }

    /// Which entry point a recorded call used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CallKind {
        /// `call_enqueue_rpc`
        Rpc,
        /// `insert_queue_row`
        Insert,
    }

    /// A call observed by the mock.
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        /// Entry point used.
        pub kind: CallKind,
        /// Submission passed in.
        pub job: JobSubmission,
    }

    #[derive(Debug)]
    struct MockState {
        rpc_script: VecDeque<RpcResponse>,
        rpc_default: RpcResponse,
        insert_script: VecDeque<InsertResponse>,
        insert_default: InsertResponse,
        calls: Vec<RecordedCall>,
    }

    /// Mock queue backend.
    ///
    /// Clones share state.
    #[derive(Debug, Clone)]
    pub struct MockQueueBackend {
        state: Arc<Mutex<MockState>>,
    }

    impl MockQueueBackend {
        /// A backend whose RPC always returns a job row.
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    rpc_script: VecDeque::new(),
                    rpc_default: RpcResponse::Value(serde_json::json!({"id": 1})),
                    insert_script: VecDeque::new(),
                    insert_default: InsertResponse::Inserted,
                    calls: Vec::new(),
                })),
            }
        }

        /// A backend whose RPC and insert paths always fail.
        pub async fn failing() -> Self {
            let backend = Self::new();
            backend
                .set_rpc_default(RpcResponse::Error(BackendError::network("connection refused")))
                .await;
            backend
                .set_insert_default(InsertResponse::Error(BackendError::Http {
                    status: 503,
                    body: "service unavailable".to_string(),
                }))
                .await;
            backend
        }

        /// Replaces the RPC response used once the script is empty.
        pub async fn set_rpc_default(&self, response: RpcResponse) {
            self.state.lock().await.rpc_default = response;
        }

        /// Replaces the insert response used once the script is empty.
        pub async fn set_insert_default(&self, response: InsertResponse) {
            self.state.lock().await.insert_default = response;
        }

        /// Queues a one-shot RPC response.
        pub async fn push_rpc_response(&self, response: RpcResponse) {
            self.state.lock().await.rpc_script.push_back(response);
        }

        /// Queues a one-shot insert response.
        pub async fn push_insert_response(&self, response: InsertResponse) {
            self.state.lock().await.insert_script.push_back(response);
        }

        /// All recorded calls in order.
        pub async fn calls(&self) -> Vec<RecordedCall> {
            self.state.lock().await.calls.clone()
        }

        /// Number of recorded calls of `kind`.
        pub async fn call_count(&self, kind: CallKind) -> usize {
            self.state.lock().await.calls.iter().filter(|call| call.kind == kind).count()
        }
    }

    impl Default for MockQueueBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl QueueBackend for MockQueueBackend {
        fn call_enqueue_rpc<'a>(
            &'a self,
            job: &'a JobSubmission,
        ) -> BoxFuture<'a, BackendResult<Option<Value>>> {
            Box::pin(async move {
                let mut state = self.state.lock().await;
                state.calls.push(RecordedCall { kind: CallKind::Rpc, job: job.clone() });
                let response =
                    state.rpc_script.pop_front().unwrap_or_else(|| state.rpc_default.clone());

                match response {
                    RpcResponse::Value(value) => Ok(Some(value)),
                    RpcResponse::Null => Ok(None),
                    RpcResponse::Error(error) => Err(error),
                }
            })
        }

        fn insert_queue_row<'a>(
            &'a self,
            job: &'a JobSubmission,
        ) -> BoxFuture<'a, BackendResult<()>> {
            Box::pin(async move {
                let mut state = self.state.lock().await;
                state.calls.push(RecordedCall { kind: CallKind::Insert, job: job.clone() });
                let response = state
                    .insert_script
                    .pop_front()
                    .unwrap_or_else(|| state.insert_default.clone());

                match response {
                    InsertResponse::Inserted => Ok(()),
                    InsertResponse::Error(error) => Err(error),
                }
            })
        }
    }
}
