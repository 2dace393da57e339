//! Retry delays for transient store and analyzer failures

use std::time::Duration;

use rand::Rng;

use crate::config::{DispatcherConfig, ModerationConfig};

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial: Duration,
    /// Ceiling applied before jitter
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random, 0.0 disables it
    pub jitter: f64,
}

impl BackoffConfig {
    /// Short delays for the search read path, where a caller is waiting
    pub fn interactive() -> Self {
        Self {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Reconnect pacing for long-lived subscriptions
    pub fn reconnect() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl From<&DispatcherConfig> for BackoffConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.backoff_initial_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            multiplier: config.backoff_multiplier,
            jitter: config.backoff_jitter,
        }
    }
}

impl From<&ModerationConfig> for BackoffConfig {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.analyzer_backoff_initial_ms),
            max: Duration::from_millis(config.analyzer_backoff_max_ms),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Delay sequence `initial * multiplier^n`, capped at `max`, with jitter
/// applied to each delay but never compounded into the next one.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.jittered(base)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn base_delay(&self, retry: u32) -> f64 {
        let growth = self.config.multiplier.max(1.0).powi(retry.min(64) as i32);
        let cap = self.config.max.as_millis() as f64;
        (self.config.initial.as_millis() as f64 * growth).min(cap)
    }

    fn jittered(&self, base_ms: f64) -> Duration {
        let spread = base_ms * self.config.jitter.clamp(0.0, 1.0);
        let ms = if spread > 0.0 {
            base_ms + rand::rng().random_range(-spread..=spread)
        } else {
            base_ms
        };
        Duration::from_millis(ms.round().max(1.0) as u64)
    }
}
