//! Clock abstraction for elapsed-time measurement and backoff waits.
//!
//! Production code uses `RealClock`; tests inject `TestClock`, whose sleeps
//! complete immediately and are recorded so backoff sequences can be
//! asserted without waiting.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

/// Source of monotonic time and suspension.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Suspends the calling task for `duration`.
    ///
    /// Must not block the executor thread.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Wall clock backed by tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual clock for deterministic tests.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Debug, Clone)]
pub struct TestClock {
    elapsed_ns: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    base_instant: Instant,
}

impl TestClock {
    /// Creates a clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            base_instant: Instant::now(),
        }
    }

    /// Advances virtual time without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_ns.fetch_add(ns, Ordering::AcqRel);
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.sleeps.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(duration);
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(10));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(10));
        assert!(clock.recorded_sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_clock_sleep_is_recorded() {
        let clock = TestClock::new();
        let handle = clock.clone();

        clock.sleep(Duration::from_millis(1_500)).await;
        clock.sleep(Duration::from_secs(3)).await;

        assert_eq!(
            handle.recorded_sleeps(),
            vec![Duration::from_millis(1_500), Duration::from_secs(3)]
        );
        assert_eq!(handle.elapsed(), Duration::from_millis(4_500));
    }

    #[tokio::test]
    async fn real_clock_sleeps() {
        let clock = RealClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_millis(5)).await;

        assert!(clock.now().duration_since(start) >= Duration::from_millis(5));
    }
}
