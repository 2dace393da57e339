//! Redis connectivity for the Redis-backed content store.

pub mod pool;

pub use pool::{PoolError, RedisPool};
