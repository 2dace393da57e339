//! Trip switch for the Redis content store.
//!
//! After `failures` consecutive errors the breaker trips and every call is
//! refused until `cooldown` has elapsed. It then lets probe calls through;
//! `probes` successes close it, a single failure trips it again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::StoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding exported on `/metrics`
    pub fn gauge_value(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failures: u32,
    pub probes: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for CircuitBreakerConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            failures: config.breaker_failures.max(1),
            probes: config.breaker_probes.max(1),
            cooldown: Duration::from_millis(config.breaker_cooldown_ms),
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Tripped { since: Instant },
    Probing { successes: u32 },
}

pub struct CircuitBreaker {
    phase: Mutex<Phase>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            phase: Mutex::new(Phase::Closed { failures: 0 }),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut phase = self.lock();
        self.cool_down(&mut phase);
        match *phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Tripped { .. } => CircuitState::Open,
            Phase::Probing { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether a store call may go out right now
    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        let mut phase = self.lock();
        match *phase {
            Phase::Closed { ref mut failures } => *failures = 0,
            Phase::Probing { successes } if successes + 1 >= self.config.probes => {
                *phase = Phase::Closed { failures: 0 };
                tracing::info!("Store circuit closed, Redis recovered");
            }
            Phase::Probing { ref mut successes } => *successes += 1,
            Phase::Tripped { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        let mut phase = self.lock();
        match *phase {
            Phase::Closed { failures } if failures + 1 >= self.config.failures => {
                *phase = Phase::Tripped { since: Instant::now() };
                tracing::warn!(failures = failures + 1, "Store circuit tripped");
            }
            Phase::Closed { ref mut failures } => *failures += 1,
            Phase::Probing { .. } => {
                *phase = Phase::Tripped { since: Instant::now() };
                tracing::warn!("Store probe failed, circuit tripped again");
            }
            // Late failures from calls issued before the trip extend the cooldown
            Phase::Tripped { ref mut since } => *since = Instant::now(),
        }
    }

    fn cool_down(&self, phase: &mut Phase) {
        if let Phase::Tripped { since } = *phase {
            if since.elapsed() >= self.config.cooldown {
                *phase = Phase::Probing { successes: 0 };
                tracing::info!("Store circuit half-open, probing Redis");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Phase> {
        // A panic while holding the lock leaves a valid phase behind
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
