//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: HTTP-facing error type
//! - `metrics`: Prometheus metrics helpers
//! - `redis`: Redis connection pool guarded by a circuit breaker
//! - `resilience`: Backoff and circuit breaker primitives

pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
pub mod resilience;
