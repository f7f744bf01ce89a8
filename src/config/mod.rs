//! Pipeline configuration.
//!
//! All tunables are plain serde structs so they can come from a TOML file,
//! environment overrides, or be built in code. Durations are carried as
//! millisecond fields with accessor methods; validation is explicit and runs
//! before any stage is spawned, with no silent fallbacks.

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub use loader::{load, load_from_file};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of jobs accumulated before a batch is emitted. Must be > 0.
    pub batch_size: usize,

    /// Bounded capacity of the intake queue shared by fresh submissions and
    /// re-injected retries.
    pub intake_capacity: usize,

    /// Bounded capacity of the batcher → processor queue.
    pub batch_queue_capacity: usize,

    /// Bounded capacity of the terminal-failure sink.
    pub error_capacity: usize,

    /// Backpressure behavior of `submit` when the intake queue is full.
    pub submit_policy: SubmitPolicy,

    /// Whether a partial batch is handed downstream (best-effort) when the
    /// pipeline shuts down. Defaults to discarding it.
    pub flush_partial_on_shutdown: bool,

    /// Optional deadline after which the pipeline cancels itself.
    pub deadline_ms: Option<u64>,

    /// Retry budget and backoff curve.
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            intake_capacity: 64,
            batch_queue_capacity: 4,
            error_capacity: 64,
            submit_policy: SubmitPolicy::Block,
            flush_partial_on_shutdown: false,
            deadline_ms: None,
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::invalid_configuration(
                "batch_size",
                "batch size must be greater than 0",
            ));
        }
        if self.intake_capacity == 0 {
            return Err(PipelineError::invalid_configuration(
                "intake_capacity",
                "intake capacity must be greater than 0",
            ));
        }
        if self.batch_queue_capacity == 0 {
            return Err(PipelineError::invalid_configuration(
                "batch_queue_capacity",
                "batch queue capacity must be greater than 0",
            ));
        }
        if self.error_capacity == 0 {
            return Err(PipelineError::invalid_configuration(
                "error_capacity",
                "error sink capacity must be greater than 0",
            ));
        }
        self.retry.validate()
    }
}

/// Backpressure decision for `submit` against a saturated intake queue.
///
/// This is an explicit configuration rather than a hidden default: `Block`
/// awaits queue space, `Drop` discards the job (counted and logged), `Reject`
/// returns [`PipelineError::IntakeFull`] to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPolicy {
    Block,
    Drop,
    Reject,
}

/// Retry budget and exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts allowed per job. `None` retries forever; the backoff
    /// curve keeps a permanently failing job from spinning hot.
    pub max_attempts: Option<u32>,

    /// Delay before the first re-attempt. 0 disables backoff entirely.
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay.
    pub max_delay_ms: u64,

    /// Multiplier applied per additional attempt. Must be >= 1.0.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Whether a job with `attempts` completed executions may run again.
    pub fn attempts_remaining(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    /// Backoff delay before re-attempting a job that has failed `attempt`
    /// times. Exponential in the attempt number, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(raw.min(self.max_delay_ms as f64) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == Some(0) {
            return Err(PipelineError::invalid_configuration(
                "retry.max_attempts",
                "at least one attempt is required; use None to retry forever",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(PipelineError::invalid_configuration(
                "retry.backoff_multiplier",
                "backoff multiplier must be >= 1.0",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(PipelineError::invalid_configuration(
                "retry.max_delay_ms",
                "max delay must be >= base delay",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_configuration_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn shrinking_multiplier_is_rejected() {
        let config = RetryConfig {
            backoff_multiplier: 0.5,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let config = RetryConfig {
            max_attempts: Some(0),
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let config = RetryConfig {
            max_attempts: None,
            base_delay_ms: 100,
            max_delay_ms: 250,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(250));
        assert_eq!(config.delay_for(10), Duration::from_millis(250));
    }

    #[test]
    fn zero_base_delay_disables_backoff() {
        let config = RetryConfig {
            base_delay_ms: 0,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(1), Duration::ZERO);
        assert_eq!(config.delay_for(50), Duration::ZERO);
    }

    #[test]
    fn attempt_budget_is_exclusive_of_the_limit() {
        let config = RetryConfig {
            max_attempts: Some(3),
            ..RetryConfig::default()
        };
        assert!(config.attempts_remaining(0));
        assert!(config.attempts_remaining(2));
        assert!(!config.attempts_remaining(3));

        let unbounded = RetryConfig {
            max_attempts: None,
            ..RetryConfig::default()
        };
        assert!(unbounded.attempts_remaining(u32::MAX));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(
            earlier in 1u32..40,
            later in 1u32..40,
            base in 1u64..1_000,
            cap in 1_000u64..60_000,
            multiplier in 1.0f64..4.0,
        ) {
            let config = RetryConfig {
                max_attempts: None,
                base_delay_ms: base,
                max_delay_ms: cap,
                backoff_multiplier: multiplier,
            };
            let (lo, hi) = if earlier <= later { (earlier, later) } else { (later, earlier) };
            prop_assert!(config.delay_for(lo) <= config.delay_for(hi));
            prop_assert!(config.delay_for(hi) <= Duration::from_millis(cap));
        }
    }
}
