//! Shared Redis connection for the content store.
//!
//! One multiplexed connection is opened on first use and handed out as
//! cheap clones. Every command is accounted against the store circuit
//! breaker, and a broken connection is discarded so the next command
//! reconnects.

use std::future::Future;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, RedisResult};
use tokio::sync::Mutex;

use crate::config::StoreConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Redis circuit open, refusing store call")]
    CircuitOpen,

    #[error("Redis connect timed out after {0:?}")]
    ConnectTimeout(Duration),
}

impl PoolError {
    /// Errors the caller may retry after backing off
    pub fn is_transient(&self) -> bool {
        match self {
            PoolError::CircuitOpen | PoolError::ConnectTimeout(_) => true,
            PoolError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_timeout() || e.is_connection_refusal()
            }
        }
    }
}

pub struct RedisPool {
    client: Client,
    shared: Mutex<Option<MultiplexedConnection>>,
    breaker: CircuitBreaker,
    connect_timeout: Duration,
    endpoint: String,
}

impl RedisPool {
    /// Validate the URL and prepare the client. No connection is made yet.
    pub fn new(config: &StoreConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.redis_url.as_str())?;
        let info = client.get_connection_info();

        Ok(Self {
            endpoint: format!("{}/{}", info.addr, info.redis.db),
            client,
            shared: Mutex::new(None),
            breaker: CircuitBreaker::with_config(CircuitBreakerConfig::from(config)),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        })
    }

    /// Client handle for dedicated connections such as pub/sub
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Host, port and database, without credentials
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Shared connection, opened on first use.
    ///
    /// Concurrent callers wait on the lock while one of them connects, so
    /// the connect attempt is bounded by `connect_timeout`.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.breaker.allow_request() {
            return Err(PoolError::CircuitOpen);
        }

        let mut shared = self.shared.lock().await;
        if let Some(conn) = shared.as_ref() {
            return Ok(conn.clone());
        }

        let connect = self.client.get_multiplexed_tokio_connection();
        let conn = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result.map_err(PoolError::from),
            Err(_) => Err(PoolError::ConnectTimeout(self.connect_timeout)),
        }
        .inspect_err(|e| {
            self.breaker.record_failure();
            tracing::error!(endpoint = %self.endpoint, error = %e, "Redis connect failed");
        })?;
        tracing::info!(endpoint = %self.endpoint, "Redis connection established");
        *shared = Some(conn.clone());
        Ok(conn)
    }

    /// Run one command against the shared connection.
    pub async fn execute<F, Fut, T>(&self, command: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match command(conn).await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) if e.kind() == redis::ErrorKind::ResponseError => {
                // Server answered, so the connection itself is healthy
                self.breaker.record_success();
                Err(e.into())
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    self.shared.lock().await.take();
                    tracing::warn!(endpoint = %self.endpoint, "Dropping broken Redis connection");
                }
                self.breaker.record_failure();
                Err(e.into())
            }
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        let reply: String = self
            .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        tracing::trace!(reply = %reply, circuit = self.circuit_state().as_str(), "Redis ping");
        Ok(())
    }
}
