//! Factory function for creating content stores

use std::sync::Arc;

use super::backend::ContentStore;
use super::memory_backend::MemoryContentStore;
use super::redis_backend::RedisContentStore;
use crate::config::StoreConfig;
use crate::redis::RedisPool;

/// Create a content store based on configuration.
///
/// Falls back to the memory store when Redis is requested but the URL
/// cannot be parsed. Connections are made lazily, so an unreachable server
/// surfaces as store errors rather than a startup failure.
pub fn create_content_store(config: &StoreConfig) -> Arc<dyn ContentStore> {
    match config.backend.as_str() {
        "redis" => match RedisPool::new(config) {
            Ok(pool) => {
                tracing::info!(
                    endpoint = %pool.endpoint(),
                    key_prefix = %config.key_prefix,
                    channel = %config.change_channel,
                    "Creating Redis content store"
                );
                Arc::new(RedisContentStore::new(
                    Arc::new(pool),
                    &config.key_prefix,
                    &config.change_channel,
                ))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid Redis configuration, falling back to memory store");
                Arc::new(MemoryContentStore::with_feed_capacity(config.feed_capacity))
            }
        },
        _ => {
            tracing::info!(capacity = config.feed_capacity, "Creating memory content store");
            Arc::new(MemoryContentStore::with_feed_capacity(config.feed_capacity))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_store() {
        let store = create_content_store(&StoreConfig::default());
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_create_redis_store() {
        let config = StoreConfig {
            backend: "redis".to_string(),
            ..Default::default()
        };
        assert_eq!(create_content_store(&config).backend_name(), "redis");
    }

    #[test]
    fn test_invalid_redis_url_falls_back() {
        let config = StoreConfig {
            backend: "redis".to_string(),
            redis_url: "not a url".to_string(),
            ..Default::default()
        };
        assert_eq!(create_content_store(&config).backend_name(), "memory");
    }
}
