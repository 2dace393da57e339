use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::search::search_templates;
use super::template::{
    create_template, delete_template, get_template, record_use, record_view, update_template,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/templates", post(create_template))
                .route("/templates/search", get(search_templates))
                .route(
                    "/templates/{id}",
                    get(get_template).put(update_template).delete(delete_template),
                )
                // Usage tracking
                .route("/templates/{id}/use", post(record_use))
                .route("/templates/{id}/view", post(record_view)),
        )
}
