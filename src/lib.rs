// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::redis;
pub use infrastructure::resilience;

// Domain layer
pub mod changefeed;
pub mod moderation;
pub mod search;
pub mod store;
pub mod template;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
