//! Health check and statistics endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::changefeed::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: StoreHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct StoreHealthResponse {
    pub backend: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub changefeed: DispatcherStatsSnapshot,
    pub moderation: ModerationStats,
}

#[derive(Debug, Serialize)]
pub struct ModerationStats {
    pub analyzer: String,
    pub version: String,
}

/// GET /health
///
/// 200 when the store answers, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ping = state.store.ping().await;
    let connected = ping.is_ok();

    let (code, status) = if connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store: StoreHealthResponse {
            backend: state.store.backend_name().to_string(),
            connected,
            error: ping.err().map(|e| e.to_string()),
        },
    };

    (code, Json(body))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        changefeed: state.dispatcher.stats(),
        moderation: ModerationStats {
            analyzer: state.dispatcher.analyzer_method().to_string(),
            version: crate::moderation::MODERATION_VERSION.to_string(),
        },
    })
}
