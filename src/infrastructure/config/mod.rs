mod settings;

pub use settings::{
    DispatcherConfig, ModerationConfig, OtelConfig, SearchConfig, ServerConfig, Settings,
    StoreConfig,
};
