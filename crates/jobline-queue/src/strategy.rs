//! Submission strategies: one way each of handing a job to the backend.
//!
//! The orchestrator walks an ordered list of strategies per attempt. A
//! strategy makes exactly one backend call, never retries, and folds every
//! failure into a [`SubmissionOutcome`] instead of returning an error.

use std::sync::Arc;

use jobline_core::{ErrorCode, JobSubmission, SubmissionOutcome};

use crate::backend::{BoxFuture, QueueBackend};

/// Name reported by [`RpcStrategy`].
pub const RPC_STRATEGY: &str = "rpc";

/// Name reported by [`DirectInsertStrategy`].
pub const DIRECT_INSERT_STRATEGY: &str = "direct_insert";

/// One way of submitting a job.
///
/// Submissions reach an external system and are not idempotent: running a
/// strategy twice may enqueue the job twice.
pub trait SubmissionStrategy: Send + Sync {
    /// Name recorded in outcomes and results.
    fn name(&self) -> &str;

    /// Attempts a single submission.
    fn submit<'a>(&'a self, job: &'a JobSubmission) -> BoxFuture<'a, SubmissionOutcome>;
}

/// Primary path: the backend's enqueue procedure.
///
/// Success means the procedure returned a non-null value.
#[derive(Clone)]
pub struct RpcStrategy {
    backend: Arc<dyn QueueBackend>,
}

impl RpcStrategy {
    /// Creates the strategy over `backend`.
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }
}

impl SubmissionStrategy for RpcStrategy {
    fn name(&self) -> &str {
        RPC_STRATEGY
    }

    fn submit<'a>(&'a self, job: &'a JobSubmission) -> BoxFuture<'a, SubmissionOutcome> {
        Box::pin(async move {
            match self.backend.call_enqueue_rpc(job).await {
                Ok(Some(_)) => SubmissionOutcome::success(RPC_STRATEGY),
                Ok(None) => SubmissionOutcome::failure(
                    RPC_STRATEGY,
                    ErrorCode::RpcNullResult,
                    "enqueue RPC returned no result",
                ),
                Err(e) => {
                    SubmissionOutcome::failure(RPC_STRATEGY, ErrorCode::RpcError, e.to_string())
                },
            }
        })
    }
}

/// Fallback path: a direct insert into the queue table.
///
/// Success means the insert did not fail.
#[derive(Clone)]
pub struct DirectInsertStrategy {
    backend: Arc<dyn QueueBackend>,
}

impl DirectInsertStrategy {
    /// Creates the strategy over `backend`.
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }
}

impl SubmissionStrategy for DirectInsertStrategy {
    fn name(&self) -> &str {
        DIRECT_INSERT_STRATEGY
    }

    fn submit<'a>(&'a self, job: &'a JobSubmission) -> BoxFuture<'a, SubmissionOutcome> {
        Box::pin(async move {
            match self.backend.insert_queue_row(job).await {
                Ok(()) => SubmissionOutcome::success(DIRECT_INSERT_STRATEGY),
                Err(e) => SubmissionOutcome::failure(
                    DIRECT_INSERT_STRATEGY,
                    ErrorCode::DirectInsertError,
                    e.to_string(),
                ),
            }
        })
    }
}

/// The default `[rpc, direct_insert]` chain over one backend.
pub fn default_strategies(backend: Arc<dyn QueueBackend>) -> Vec<Arc<dyn SubmissionStrategy>> {
    vec![
        Arc::new(RpcStrategy::new(Arc::clone(&backend))),
        Arc::new(DirectInsertStrategy::new(backend)),
    ]
}
