//! Retrying enqueue client for Postgres-backed job queues.
//!
//! Hands named tasks to a backend work queue. Each attempt tries an ordered
//! chain of submission strategies, by default the backend's enqueue
//! procedure followed by a direct insert into the queue table. Failed
//! attempts are retried with capped, jittered exponential backoff up to a
//! configured bound.
//!
//! # Architecture
//!
//! 1. **Delay calculation** - [`retry`] computes backoff from the attempt
//!    number, with injectable randomness
//! 2. **Submission strategies** - [`strategy`] wraps one backend call each
//!    and reports a uniform outcome
//! 3. **Orchestration** - [`EnqueueClient`] runs attempts, waits, logs and
//!    reports exactly one [`EnqueueResult`](jobline_core::EnqueueResult)
//!
//! The queue itself is external. Submissions are at-least-once: a timed-out
//! call that actually reached the backend, followed by a retry or fallback,
//! can enqueue the job twice, so task handlers must tolerate duplicates.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jobline_core::{JobSubmission, TaskIdentifier};
//! use jobline_queue::{backend::mock::MockQueueBackend, EnqueueClient, RetryConfig};
//!
//! # async fn example() -> jobline_queue::Result<()> {
//! let client = EnqueueClient::new(Arc::new(MockQueueBackend::new()), RetryConfig::default())?;
//! let result = client.enqueue(JobSubmission::new(TaskIdentifier::new("ping")?)).await;
//! assert!(result.succeeded);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod enqueue;
pub mod error;
pub mod retry;
pub mod strategy;

pub use config::Config;
pub use enqueue::EnqueueClient;
pub use error::{BackendError, QueueError, Result};
pub use retry::{RandomSource, RetryConfig};
pub use strategy::SubmissionStrategy;
