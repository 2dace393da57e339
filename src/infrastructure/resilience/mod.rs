//! Fault tolerance primitives shared by the store backends and the
//! moderation writer.
//!
//! - `CircuitBreaker`: stops hammering a failing store
//! - `ExponentialBackoff`: delays between retries of transient failures

mod backoff;
mod circuit_breaker;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
