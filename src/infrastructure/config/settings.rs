use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional JSON file of templates imported at startup
    #[serde(default)]
    pub seed_file: Option<String>,
}

/// Content store backend selection
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "memory" (default) or "redis"
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Key prefix for template hashes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Pub/sub channel carrying change events
    #[serde(default = "default_change_channel")]
    pub change_channel: String,
    /// Capacity of the in-process change feed
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    /// Consecutive Redis failures that trip the breaker
    #[serde(default = "default_breaker_failures")]
    pub breaker_failures: u32,
    /// Successful probes needed to close it again
    #[serde(default = "default_breaker_probes")]
    pub breaker_probes: u32,
    #[serde(default = "default_breaker_cooldown_ms")]
    pub breaker_cooldown_ms: u64,
    /// Upper bound on opening the shared Redis connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    /// "heuristic" (default) or "remote"
    #[serde(default = "default_analyzer")]
    pub analyzer: String,
    /// Endpoint of the remote analyzer capability
    #[serde(default)]
    pub analyzer_endpoint: Option<String>,
    #[serde(default = "default_analyzer_timeout_ms")]
    pub analyzer_timeout_ms: u64,
    /// Calls per moderation when the analyzer times out or is unavailable
    #[serde(default = "default_analyzer_max_attempts")]
    pub analyzer_max_attempts: u32,
    #[serde(default = "default_analyzer_backoff_initial_ms")]
    pub analyzer_backoff_initial_ms: u64,
    #[serde(default = "default_analyzer_backoff_max_ms")]
    pub analyzer_backoff_max_ms: u64,
    /// Maximum number of characters handed to the analyzer
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default = "default_negative_sentiment_threshold")]
    pub negative_sentiment_threshold: f64,
    /// Window in seconds in which a moderated_at change marks the engine's own write
    #[serde(default = "default_self_write_window_seconds")]
    pub self_write_window_seconds: i64,
    #[serde(default = "default_sensitive_entities")]
    pub sensitive_entities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum number of events moderated in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_wait_ms")]
    pub batch_wait_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    #[serde(default = "default_body_weight")]
    pub body_weight: f64,
    #[serde(default = "default_tag_weight")]
    pub tag_weight: f64,
    #[serde(default = "default_variable_weight")]
    pub variable_weight: f64,
    #[serde(default = "default_fuzzy_factor")]
    pub fuzzy_factor: f64,
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
    #[serde(default = "default_use_count_cap")]
    pub use_count_cap: u64,
    #[serde(default = "default_use_count_divisor")]
    pub use_count_divisor: f64,
    #[serde(default = "default_view_count_cap")]
    pub view_count_cap: u64,
    #[serde(default = "default_view_count_divisor")]
    pub view_count_divisor: f64,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    /// Emit JSON log lines instead of the human-readable format
    #[serde(default)]
    pub json_logs: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "templates".to_string()
}

fn default_change_channel() -> String {
    "templates:changes".to_string()
}

fn default_feed_capacity() -> usize {
    1024
}

fn default_breaker_failures() -> u32 {
    5
}

fn default_breaker_probes() -> u32 {
    2
}

fn default_breaker_cooldown_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_analyzer() -> String {
    "heuristic".to_string()
}

fn default_analyzer_timeout_ms() -> u64 {
    5_000
}

fn default_analyzer_max_attempts() -> u32 {
    3
}

fn default_analyzer_backoff_initial_ms() -> u64 {
    200
}

fn default_analyzer_backoff_max_ms() -> u64 {
    2_000
}

fn default_max_text_length() -> usize {
    5_000
}

fn default_reject_threshold() -> f64 {
    0.7
}

fn default_review_threshold() -> f64 {
    0.5
}

fn default_negative_sentiment_threshold() -> f64 {
    0.8
}

fn default_self_write_window_seconds() -> i64 {
    5
}

fn default_sensitive_entities() -> Vec<String> {
    vec![
        "SSN".to_string(),
        "CREDIT_DEBIT_NUMBER".to_string(),
        "BANK_ROUTING".to_string(),
        "BANK_ACCOUNT_NUMBER".to_string(),
        "PASSPORT_NUMBER".to_string(),
    ]
}

fn default_concurrency() -> usize {
    8
}

fn default_batch_size() -> usize {
    25
}

fn default_batch_wait_ms() -> u64 {
    250
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_backoff_initial_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_jitter() -> f64 {
    0.1
}

fn default_title_weight() -> f64 {
    10.0
}

fn default_body_weight() -> f64 {
    5.0
}

fn default_tag_weight() -> f64 {
    8.0
}

fn default_variable_weight() -> f64 {
    3.0
}

fn default_fuzzy_factor() -> f64 {
    0.7
}

fn default_max_edit_distance() -> usize {
    2
}

fn default_use_count_cap() -> u64 {
    50
}

fn default_use_count_divisor() -> f64 {
    10.0
}

fn default_view_count_cap() -> u64 {
    100
}

fn default_view_count_divisor() -> f64 {
    50.0
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    100
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "prompt-template-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("store.backend", "memory")?
            .set_default("moderation.analyzer", "heuristic")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER_PORT, STORE_BACKEND, MODERATION_ANALYZER, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            seed_file: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            change_channel: default_change_channel(),
            feed_capacity: default_feed_capacity(),
            breaker_failures: default_breaker_failures(),
            breaker_probes: default_breaker_probes(),
            breaker_cooldown_ms: default_breaker_cooldown_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            analyzer: default_analyzer(),
            analyzer_endpoint: None,
            analyzer_timeout_ms: default_analyzer_timeout_ms(),
            analyzer_max_attempts: default_analyzer_max_attempts(),
            analyzer_backoff_initial_ms: default_analyzer_backoff_initial_ms(),
            analyzer_backoff_max_ms: default_analyzer_backoff_max_ms(),
            max_text_length: default_max_text_length(),
            reject_threshold: default_reject_threshold(),
            review_threshold: default_review_threshold(),
            negative_sentiment_threshold: default_negative_sentiment_threshold(),
            self_write_window_seconds: default_self_write_window_seconds(),
            sensitive_entities: default_sensitive_entities(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            batch_wait_ms: default_batch_wait_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            body_weight: default_body_weight(),
            tag_weight: default_tag_weight(),
            variable_weight: default_variable_weight(),
            fuzzy_factor: default_fuzzy_factor(),
            max_edit_distance: default_max_edit_distance(),
            use_count_cap: default_use_count_cap(),
            use_count_divisor: default_use_count_divisor(),
            view_count_cap: default_view_count_cap(),
            view_count_divisor: default_view_count_divisor(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            json_logs: false,
        }
    }
}
