//! Log events emitted by the orchestrator.
//!
//! A capture layer records the level of every event whose target is the
//! orchestrator module. Each test installs it as the thread default, which
//! the current-thread test runtime keeps for the whole call.

use std::sync::{Arc, Mutex};

use jobline_core::{JobSubmission, SubmissionOutcome, TaskIdentifier, TestClock};
use jobline_queue::{
    backend::{
        mock::{MockQueueBackend, RpcResponse},
        BoxFuture,
    },
    error::BackendError,
    retry::FixedRandom,
    EnqueueClient, RetryConfig, SubmissionStrategy,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer,
};

const ORCHESTRATOR_TARGET: &str = "jobline_queue::enqueue";

#[derive(Clone, Default)]
struct LevelCapture {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl LevelCapture {
    fn levels(&self) -> Vec<Level> {
        self.levels.lock().unwrap().clone()
    }
}

impl<S: Subscriber> Layer<S> for LevelCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == ORCHESTRATOR_TARGET {
            self.levels.lock().unwrap().push(*metadata.level());
        }
    }
}

struct PanicsOnCall;

impl SubmissionStrategy for PanicsOnCall {
    fn name(&self) -> &str {
        "panics_on_call"
    }

    fn submit<'a>(&'a self, _job: &'a JobSubmission) -> BoxFuture<'a, SubmissionOutcome> {
        panic!("strategy exploded")
    }
}

fn job() -> JobSubmission {
    JobSubmission::new(TaskIdentifier::new("settle_invoice").unwrap())
}

fn client_for(backend: &MockQueueBackend, config: RetryConfig) -> EnqueueClient {
    EnqueueClient::new(Arc::new(backend.clone()), config)
        .unwrap()
        .with_clock(Arc::new(TestClock::new()))
        .with_random_source(Arc::new(FixedRandom::no_jitter()))
}

async fn capture_levels(client: &EnqueueClient) -> Vec<Level> {
    let capture = LevelCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    client.enqueue(job()).await;
    capture.levels()
}

#[tokio::test]
async fn primary_success_logs_start_then_info() {
    let backend = MockQueueBackend::new();
    let client = client_for(&backend, RetryConfig::default());

    let levels = capture_levels(&client).await;

    assert_eq!(levels, vec![Level::DEBUG, Level::INFO]);
}

#[tokio::test]
async fn fallback_success_warns_before_info() {
    let backend = MockQueueBackend::new();
    backend
        .set_rpc_default(RpcResponse::Error(BackendError::network("connection reset")))
        .await;
    let client = client_for(&backend, RetryConfig::default());

    let levels = capture_levels(&client).await;

    assert_eq!(levels, vec![Level::DEBUG, Level::DEBUG, Level::WARN, Level::INFO]);
}

#[tokio::test]
async fn exhaustion_ends_with_single_error() {
    let backend = MockQueueBackend::failing().await;
    let config = RetryConfig { max_retries: 2, ..RetryConfig::default() };
    let client = client_for(&backend, config);

    let levels = capture_levels(&client).await;

    // Per attempt: start, two strategy failures, attempt failure; one wait.
    let mut expected = vec![Level::DEBUG; 9];
    expected.push(Level::ERROR);
    assert_eq!(levels, expected);
}

#[tokio::test]
async fn contained_panic_logged_as_error() {
    let config = RetryConfig { max_retries: 1, ..RetryConfig::default() };
    let client = EnqueueClient::with_strategies(config, vec![Arc::new(PanicsOnCall)])
        .unwrap()
        .with_clock(Arc::new(TestClock::new()));

    let levels = capture_levels(&client).await;

    assert_eq!(levels, vec![Level::DEBUG, Level::ERROR, Level::ERROR]);
}

#[tokio::test]
async fn disabled_logging_emits_nothing() {
    let backend = MockQueueBackend::failing().await;
    let config = RetryConfig { max_retries: 2, logging_enabled: false, ..RetryConfig::default() };
    let client = client_for(&backend, config);

    assert!(capture_levels(&client).await.is_empty());

    let backend = MockQueueBackend::new();
    backend.set_rpc_default(RpcResponse::Null).await;
    let config = RetryConfig { logging_enabled: false, ..RetryConfig::default() };
    let client = client_for(&backend, config);

    assert!(capture_levels(&client).await.is_empty());
}
