//! Per-object exponential backoff for failed reconcile passes.
//!
//! kube-runtime hands every failed pass to the controller's error policy,
//! which asks a [`FailureTracker`] how long to wait. The tracker counts
//! consecutive failures per object and turns the count into a delay that
//! doubles from a floor up to a ceiling. A successful pass clears the count.

use std::time::Duration;

use dashmap::DashMap;

/// Bounds for exponential backoff between failed passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub floor: Duration,
    /// Upper bound on any delay
    pub ceiling: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Create a config from millisecond bounds
    ///
    /// A ceiling below the floor is raised to the floor.
    pub fn from_millis(floor_ms: u64, ceiling_ms: u64) -> Self {
        Self {
            floor: Duration::from_millis(floor_ms),
            ceiling: Duration::from_millis(ceiling_ms.max(floor_ms)),
        }
    }

    /// Delay to wait after `failures` consecutive failures
    ///
    /// `floor * 2^(failures - 1)`, capped at the ceiling. Zero failures
    /// yields the floor.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.floor
            .checked_mul(factor)
            .map_or(self.ceiling, |d| d.min(self.ceiling))
    }
}

/// Consecutive failure counts keyed by object identity (`namespace/name`).
#[derive(Debug, Default)]
pub struct FailureTracker {
    config: BackoffConfig,
    failures: DashMap<String, u32>,
}

impl FailureTracker {
    /// Create a tracker with the given bounds
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn record_failure(&self, key: &str) -> Duration {
        let mut entry = self.failures.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
        self.config.delay_for(*entry)
    }

    /// Forget previous failures after a successful pass
    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Current consecutive failure count
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map_or(0, |v| *v)
    }
}
