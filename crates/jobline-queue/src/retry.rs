//! Capped exponential backoff with jitter.
//!
//! `RetryConfig` bounds how often and how patiently the enqueue client
//! retries. Delay calculation is pure: randomness comes from an injected
//! [`RandomSource`], so a fixed or seeded source yields exact values.

use std::{fmt, sync::Mutex, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Shortest wait ever returned by [`backoff_delay`].
pub const MIN_DELAY: Duration = Duration::from_millis(100);

/// Default jitter fraction: delays vary by up to ±25%.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;

const MAX_EXPONENT: u32 = 64;

/// Retry configuration for one enqueue client.
///
/// Created once and never mutated; every `enqueue` call reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_retries: u32,

    /// Delay after the first failed attempt.
    pub initial_delay: Duration,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Ceiling for any single delay.
    pub max_delay: Duration,

    /// Largest jitter fraction (0.0 to 1.0) applied to a capped delay.
    pub jitter_factor: f64,

    /// Whether the client emits log events.
    pub logging_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_factor: DEFAULT_JITTER_FACTOR,
            logging_enabled: true,
        }
    }
}

impl RetryConfig {
    /// Checks the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` naming the first violated bound.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(QueueError::configuration("max_retries must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(QueueError::configuration(format!(
                "backoff_multiplier must be a finite number greater than 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay < MIN_DELAY {
            return Err(QueueError::configuration(format!(
                "max_delay must be at least {}ms",
                MIN_DELAY.as_millis()
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(QueueError::configuration("initial_delay cannot exceed max_delay"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(QueueError::configuration("jitter_factor must be between 0.0 and 1.0"));
        }
        Ok(())
    }
}

/// Retries quickly for interactive paths: 5 attempts from 200ms, capped at 5s.
pub fn fast_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        initial_delay: Duration::from_millis(200),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_secs(5),
        ..RetryConfig::default()
    }
}

/// Retries for background work: 8 attempts from 2s, capped at 5 minutes.
pub fn patient_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 8,
        initial_delay: Duration::from_secs(2),
        backoff_multiplier: 2.5,
        max_delay: Duration::from_secs(300),
        ..RetryConfig::default()
    }
}

/// Un-jittered, uncapped delay after failed attempt `attempt` (1-based).
///
/// `initial_delay * backoff_multiplier^(attempt - 1)`, rounded to whole
/// milliseconds. Saturates instead of overflowing.
pub fn base_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
    let initial_ms = config.initial_delay.as_millis() as f64;
    let scaled = (initial_ms * config.backoff_multiplier.powi(exponent as i32)).round();

    if !scaled.is_finite() || scaled >= u64::MAX as f64 {
        return Duration::from_millis(u64::MAX);
    }
    Duration::from_millis(scaled.max(0.0) as u64)
}

/// Delay to wait after failed attempt `attempt` before the next one.
///
/// Caps [`base_delay`] at `max_delay`, perturbs it by a random fraction of
/// up to `jitter_factor` in a random direction, then clamps the result to
/// `[MIN_DELAY, max_delay]`.
pub fn backoff_delay(attempt: u32, config: &RetryConfig, random: &dyn RandomSource) -> Duration {
    let capped = base_delay(attempt, config).min(config.max_delay);
    let capped_ms = capped.as_millis() as f64;

    let fraction = random.unit().clamp(0.0, 1.0) * config.jitter_factor.clamp(0.0, 1.0);
    let offset = capped_ms * fraction;
    let jittered_ms = if random.coin() { capped_ms + offset } else { capped_ms - offset };

    let floor = MIN_DELAY.min(config.max_delay);
    Duration::from_millis(jittered_ms.round().max(0.0) as u64).clamp(floor, config.max_delay)
}

/// Randomness used for jitter.
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Uniform value in `[0.0, 1.0]`.
    fn unit(&self) -> f64;

    /// Fair coin; `true` lengthens the delay.
    fn coin(&self) -> bool;
}

/// Thread-local RNG; the production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn unit(&self) -> f64 {
        rand::rng().random_range(0.0..=1.0)
    }

    fn coin(&self) -> bool {
        rand::rng().random_bool(0.5)
    }
}

/// Reproducible RNG seeded from a `u64`.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Creates a source that yields the same sequence for the same seed.
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl RandomSource for SeededRandom {
    fn unit(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .random_range(0.0..=1.0)
    }

    fn coin(&self) -> bool {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).random_bool(0.5)
    }
}

/// Constant source for exact delay assertions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRandom {
    /// Value returned by [`RandomSource::unit`].
    pub unit: f64,
    /// Value returned by [`RandomSource::coin`].
    pub coin: bool,
}

impl FixedRandom {
    /// A source that never perturbs delays.
    pub fn no_jitter() -> Self {
        Self { unit: 0.0, coin: true }
    }
}

impl RandomSource for FixedRandom {
    fn unit(&self) -> f64 {
        self.unit
    }

    fn coin(&self) -> bool {
        self.coin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn exponential_base_delay_increases_correctly() {
        let config = RetryConfig::default();

        let delays = (1..=5).map(|attempt| base_delay(attempt, &config)).collect::<Vec<_>>();

        assert_eq!(delays, vec![secs(1), secs(2), secs(4), secs(8), secs(16)]);
    }

    #[test]
    fn fractional_multiplier_rounds_to_milliseconds() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(333),
            backoff_multiplier: 1.5,
            ..RetryConfig::default()
        };

        // 333 * 1.5 = 499.5 -> 500, 333 * 2.25 = 749.25 -> 749
        assert_eq!(base_delay(2, &config), Duration::from_millis(500));
        assert_eq!(base_delay(3, &config), Duration::from_millis(749));
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let config = RetryConfig::default();
        assert!(base_delay(u32::MAX, &config) >= base_delay(64, &config));
        assert_eq!(backoff_delay(u32::MAX, &config, &FixedRandom::no_jitter()), config.max_delay);
    }

    #[test]
    fn max_delay_enforced() {
        let config = RetryConfig::default();
        let random = FixedRandom { unit: 1.0, coin: true };

        assert_eq!(backoff_delay(10, &config, &random), secs(30));
    }

    #[test]
    fn jitter_applied_in_both_directions() {
        let config = RetryConfig::default();

        let longer = backoff_delay(3, &config, &FixedRandom { unit: 1.0, coin: true });
        let shorter = backoff_delay(3, &config, &FixedRandom { unit: 1.0, coin: false });
        let halfway = backoff_delay(3, &config, &FixedRandom { unit: 0.5, coin: false });

        assert_eq!(longer, secs(5));
        assert_eq!(shorter, secs(3));
        assert_eq!(halfway, Duration::from_millis(3_500));
    }

    #[test]
    fn small_delays_clamped_to_minimum() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::default()
        };

        let delay = backoff_delay(1, &config, &FixedRandom { unit: 1.0, coin: false });
        assert_eq!(delay, MIN_DELAY);
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let config = RetryConfig::default();
        let first = SeededRandom::new(7);
        let second = SeededRandom::new(7);

        let a = (1..=6).map(|n| backoff_delay(n, &config, &first)).collect::<Vec<_>>();
        let b = (1..=6).map(|n| backoff_delay(n, &config, &second)).collect::<Vec<_>>();

        assert_eq!(a, b);
    }

    #[test]
    fn thread_random_stays_within_jitter_band() {
        let config = RetryConfig::default();

        for _ in 0..50 {
            let delay = backoff_delay(2, &config, &ThreadRandom);
            assert!(delay >= Duration::from_millis(1_500), "delay too small: {delay:?}");
            assert!(delay <= Duration::from_millis(2_500), "delay too large: {delay:?}");
        }
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(fast_retry_config().validate().is_ok());
        assert!(patient_retry_config().validate().is_ok());

        let bad = [
            RetryConfig { max_retries: 0, ..RetryConfig::default() },
            RetryConfig { backoff_multiplier: 1.0, ..RetryConfig::default() },
            RetryConfig { backoff_multiplier: f64::NAN, ..RetryConfig::default() },
            RetryConfig { max_delay: Duration::from_millis(50), ..RetryConfig::default() },
            RetryConfig { initial_delay: secs(60), ..RetryConfig::default() },
            RetryConfig { jitter_factor: 1.5, ..RetryConfig::default() },
        ];

        for config in bad {
            assert!(config.validate().is_err(), "accepted {config:?}");
        }
    }
}
