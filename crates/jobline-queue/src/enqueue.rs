//! Enqueue orchestrator: ordered strategies, bounded retries, backoff.
//!
//! Each call runs its own attempt loop:
//!
//! ```text
//! Idle ─▶ Attempting(n) ──any strategy succeeds──▶ Succeeded
//!              │
//!              ├─ all failed, n == max_retries ──▶ Exhausted
//!              │
//!              └─ all failed ─▶ Retrying(delay) ─▶ Attempting(n + 1)
//! ```
//!
//! Within an attempt, strategies run in order and the first success wins.
//! A strategy that panics ends the attempt; the panic is contained and the
//! attempt counts as failed. `enqueue` always returns an [`EnqueueResult`].

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use jobline_core::{
    Clock, EnqueueResult, ErrorCode, JobSubmission, Payload, RealClock, SubmissionOutcome,
    TaskIdentifier, NO_STRATEGY,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    backend::QueueBackend,
    error::{QueueError, Result},
    retry::{backoff_delay, RandomSource, RetryConfig, ThreadRandom},
    strategy::{default_strategies, SubmissionStrategy},
};

/// How one attempt ended.
#[derive(Debug)]
enum AttemptOutcome {
    Submitted { strategy: String, position: usize },
    Failed(SubmissionOutcome),
    Panicked { strategy: String, message: String },
}

/// Retrying job enqueue client.
///
/// Construct one per backend and share it; it holds only immutable
/// configuration and shared handles, so concurrent `enqueue` calls are
/// independent.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use jobline_core::{JobSubmission, TaskIdentifier};
/// use jobline_queue::{
///     backend::{PostgrestBackend, PostgrestConfig},
///     EnqueueClient, RetryConfig,
/// };
///
/// # async fn example() -> jobline_queue::Result<()> {
/// let backend = PostgrestBackend::new(PostgrestConfig::default())?;
/// let client = EnqueueClient::new(Arc::new(backend), RetryConfig::default())?;
///
/// let job = JobSubmission::new(TaskIdentifier::new("send_receipt")?);
/// let result = client.enqueue(job).await;
/// println!("submitted via {}", result.strategy_used);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EnqueueClient {
    config: RetryConfig,
    strategies: Vec<Arc<dyn SubmissionStrategy>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for EnqueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueueClient")
            .field("config", &self.config)
            .field("strategies", &self.strategy_names())
            .field("clock", &self.clock)
            .field("random", &self.random)
            .finish()
    }
}

impl EnqueueClient {
    /// Creates a client using the `[rpc, direct_insert]` chain over `backend`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` if `config` is invalid.
    pub fn new(backend: Arc<dyn QueueBackend>, config: RetryConfig) -> Result<Self> {
        Self::with_strategies(config, default_strategies(backend))
    }

    /// Creates a client with an explicit, ordered strategy chain.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` if `config` is invalid or
    /// `strategies` is empty.
    pub fn with_strategies(
        config: RetryConfig,
        strategies: Vec<Arc<dyn SubmissionStrategy>>,
    ) -> Result<Self> {
        config.validate()?;
        if strategies.is_empty() {
            return Err(QueueError::configuration("at least one submission strategy is required"));
        }

        Ok(Self {
            config,
            strategies,
            clock: Arc::new(RealClock::new()),
            random: Arc::new(ThreadRandom),
        })
    }

    /// Replaces the clock used for backoff waits and elapsed time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the jitter source.
    #[must_use]
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// The retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Strategy names in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Enqueues by parts; see [`EnqueueClient::enqueue`].
    pub async fn enqueue_task(
        &self,
        task_identifier: TaskIdentifier,
        payload: Option<Payload>,
        run_at: Option<DateTime<Utc>>,
        max_attempts: Option<u32>,
    ) -> EnqueueResult {
        let job = JobSubmission {
            task_identifier,
            payload: payload.unwrap_or_default(),
            run_at,
            max_attempts,
        };
        self.enqueue(job).await
    }

    /// Submits `job`, retrying with backoff until a strategy succeeds or
    /// `max_retries` attempts have failed.
    ///
    /// Never panics and never returns an error: every failure, including a
    /// panicking strategy, is reported in the returned result. Identical
    /// calls are not deduplicated.
    ///
    /// A contained panic still runs the process panic hook before it is
    /// caught, and the default hook prints to stderr regardless of
    /// `logging_enabled`. Applications that need quiet output should install
    /// their own hook with [`std::panic::set_hook`].
    pub async fn enqueue(&self, job: JobSubmission) -> EnqueueResult {
        let span = info_span!("enqueue", task = %job.task_identifier);
        self.run(&job).instrument(span).await
    }

    async fn run(&self, job: &JobSubmission) -> EnqueueResult {
        let started = self.clock.now();
        let max_retries = self.config.max_retries;
        let logging = self.config.logging_enabled;
        let mut last_failure: Option<(ErrorCode, Option<String>)> = None;

        for attempt in 1..=max_retries {
            if logging {
                debug!(attempt, max_retries, "Starting enqueue attempt");
            }

            match self.run_attempt(job).await {
                AttemptOutcome::Submitted { strategy, position } => {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    if logging {
                        if position > 0 {
                            warn!(
                                attempt,
                                strategy = %strategy,
                                "Primary submission failed, job enqueued via fallback"
                            );
                        }
                        info!(
                            attempt,
                            strategy = %strategy,
                            elapsed_ms = millis(elapsed),
                            "Job enqueued"
                        );
                    }
                    return EnqueueResult::succeeded(strategy, attempt, elapsed);
                },
                AttemptOutcome::Failed(outcome) => {
                    if logging {
                        debug!(
                            attempt,
                            strategy = %outcome.strategy_name,
                            error_code = ?outcome.error_code,
                            error = outcome.error_message.as_deref().unwrap_or_default(),
                            "All strategies failed for attempt"
                        );
                    }
                    last_failure = Some((ErrorCode::MaxRetriesExceeded, outcome.error_message));
                },
                AttemptOutcome::Panicked { strategy, message } => {
                    if logging {
                        error!(
                            attempt,
                            strategy = %strategy,
                            error = %message,
                            "Submission strategy panicked"
                        );
                    }
                    last_failure = Some((ErrorCode::UnexpectedError, Some(message)));
                },
            }

            if attempt < max_retries {
                let delay = backoff_delay(attempt, &self.config, self.random.as_ref());
                if logging {
                    debug!(attempt, delay_ms = millis(delay), "Waiting before next attempt");
                }
                self.clock.sleep(delay).await;
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        let (code, message) = last_failure
            .unwrap_or((ErrorCode::MaxRetriesExceeded, Some("no attempts were made".to_string())));

        if logging {
            error!(
                attempts = max_retries,
                error_code = %code,
                error = message.as_deref().unwrap_or_default(),
                elapsed_ms = millis(elapsed),
                "Enqueue failed after all attempts"
            );
        }
        EnqueueResult::failed(code, message, max_retries, elapsed)
    }

    async fn run_attempt(&self, job: &JobSubmission) -> AttemptOutcome {
        let mut last_outcome = None;

        for (position, strategy) in self.strategies.iter().enumerate() {
            let name = strategy.name().to_string();

            let invoked = panic::catch_unwind(AssertUnwindSafe(|| strategy.submit(job)));
            let submission = match invoked {
                Ok(future) => future,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    return AttemptOutcome::Panicked { strategy: name, message };
                },
            };

            let outcome = match AssertUnwindSafe(submission).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    return AttemptOutcome::Panicked { strategy: name, message };
                },
            };

            if outcome.succeeded {
                return AttemptOutcome::Submitted { strategy: name, position };
            }
            if self.config.logging_enabled {
                debug!(
                    strategy = %name,
                    error_code = ?outcome.error_code,
                    error = outcome.error_message.as_deref().unwrap_or_default(),
                    "Submission strategy failed"
                );
            }
            last_outcome = Some(outcome);
        }

        AttemptOutcome::Failed(last_outcome.unwrap_or_else(|| {
            SubmissionOutcome::failure(
                NO_STRATEGY,
                ErrorCode::UnexpectedError,
                "no submission strategies configured",
            )
        }))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("strategy panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("strategy panicked: {message}")
    } else {
        "strategy panicked".to_string()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
