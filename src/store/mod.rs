//! Content store: template persistence, conditional moderation writes and
//! the change feed.
//!
//! ## Backends
//!
//! - `memory` (default): `MemoryContentStore`, DashMap + broadcast feed
//! - `redis`: `RedisContentStore`, hashes + Lua CAS scripts + pub/sub feed
//!
//! Use `create_content_store()` to build the configured backend.

mod backend;
mod change;
mod factory;
mod memory_backend;
mod redis_backend;
mod seed;

pub use backend::{ConditionalWriteResult, ContentStore, StoreError};
pub use change::{ChangeEvent, ChangeFeed, ChangeKind};
pub use factory::create_content_store;
pub use memory_backend::MemoryContentStore;
pub use redis_backend::RedisContentStore;
pub use seed::import_templates;
